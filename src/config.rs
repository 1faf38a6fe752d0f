use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 995;

/// Everything a session needs to reach and log into a mailbox.
///
/// Usually read from a TOML file and then overridden from the command line:
///
/// ```toml
/// host = "pop.example.com"
/// username = "ivan"
/// password = "secret"
/// ```
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Bound on connect and on every socket read/write, in seconds. Zero
    /// disables it.
    pub timeout_secs: u64,
    /// Skip certificate verification. Only for test servers.
    pub accept_invalid_certs: bool,
    /// Where attachments are written.
    pub output_dir: PathBuf,
    /// SQLite file that receives a summary of each retrieved message.
    pub db_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            timeout_secs: 30,
            accept_invalid_certs: false,
            output_dir: PathBuf::from("."),
            db_name: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("timeout_secs", &self.timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("output_dir", &self.output_dir)
            .field("db_name", &self.db_name)
            .finish()
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Config::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!("missing {}", missing.join(", "))));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".to_owned()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_toml__fills_defaults() {
        let config = Config::from_toml(
            "host = \"pop.example.com\"\nusername = \"ivan\"\npassword = \"pw\"\n",
        )
        .unwrap();
        assert_eq!("pop.example.com", config.host);
        assert_eq!(DEFAULT_PORT, config.port);
        assert_eq!(Some(Duration::from_secs(30)), config.timeout());
        assert_eq!(PathBuf::from("."), config.output_dir);
        config.validate().unwrap();
    }

    #[test]
    fn from_toml__rejects_unknown_keys() {
        assert!(matches!(
            Config::from_toml("hots = \"typo\"\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn validate__names_missing_fields() {
        let config = Config {
            host: "h".to_owned(),
            ..Config::default()
        };
        match config.validate() {
            Err(Error::Config(msg)) => assert_eq!("missing username, password", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn debug_output_hides_password() {
        let config = Config {
            password: "hunter2".to_owned(),
            ..Config::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn load__missing_file__is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("nope.toml")),
            Err(Error::Config(_))
        ));
    }
}
