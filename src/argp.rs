extern crate clap;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{App, Arg, ArgMatches};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::AppConfig;

fn app() -> App<'static, 'static> {
    App::new("pop3-fetch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fetch and decode mail from a POP3 server over TLS")
        .arg(Arg::with_name("address")
            .help("Server to connect to")
            .index(1))
        .arg(Arg::with_name("port")
            .help("Server port [default: 995]")
            .index(2))
        .arg(Arg::with_name("username")
            .short("u")
            .long("user")
            .value_name("USERNAME")
            .takes_value(true))
        .arg(Arg::with_name("password")
            .short("p")
            .long("pass")
            .value_name("PASSWORD")
            .takes_value(true))
        .arg(Arg::with_name("config")
            .long("config")
            .value_name("FILE")
            .help("TOML file with host, port, username, password and other settings")
            .takes_value(true))
        .arg(Arg::with_name("dbname")
            .short("n")
            .long("db")
            .value_name("DATABASE NAME")
            .help("Record a summary of every retrieved message in this SQLite file")
            .takes_value(true))
        .arg(Arg::with_name("out")
            .short("o")
            .long("out")
            .value_name("DIR")
            .help("Directory attachments are saved to")
            .takes_value(true))
        .arg(Arg::with_name("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .takes_value(true))
        .arg(Arg::with_name("insecure")
            .long("insecure")
            .help("Do not verify the server certificate"))
        .arg(Arg::with_name("console")
            .short("c")
            .long("console")
            .help("Enable console mode"))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .help("More logging; repeat for wire traces"))
}

pub fn arg_parse() -> Result<AppConfig> {
    arg_parse_from(std::env::args_os())
}

pub fn arg_parse_from<I, T>(args: I) -> Result<AppConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = app()
        .get_matches_from_safe(args)
        .map_err(|e| match e.kind {
            clap::ErrorKind::HelpDisplayed | clap::ErrorKind::VersionDisplayed => e.exit(),
            _ => Error::Config(e.message),
        })?;

    let mut config = match matches.value_of("config") {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &matches)?;
    config.validate()?;

    Ok(AppConfig {
        config,
        console: matches.is_present("console"),
        verbosity: matches.occurrences_of("verbose"),
    })
}

fn apply_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(host) = matches.value_of("address") {
        config.host = host.to_owned();
    }
    if let Some(port) = matches.value_of("port") {
        config.port = port
            .parse()
            .map_err(|_| Error::Config(format!("invalid port {:?}", port)))?;
    }
    if let Some(username) = matches.value_of("username") {
        config.username = username.to_owned();
    }
    if let Some(password) = matches.value_of("password") {
        config.password = password.to_owned();
    }
    if let Some(db_name) = matches.value_of("dbname") {
        config.db_name = Some(db_name.to_owned());
    }
    if let Some(out) = matches.value_of("out") {
        config.output_dir = PathBuf::from(out);
    }
    if let Some(timeout) = matches.value_of("timeout") {
        config.timeout_secs = timeout
            .parse()
            .map_err(|_| Error::Config(format!("invalid timeout {:?}", timeout)))?;
    }
    if matches.is_present("insecure") {
        config.accept_invalid_certs = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn arg_parse__positional_endpoint_and_credentials() {
        let app = arg_parse_from(&[
            "pop3-fetch", "pop.example.com", "1995", "-u", "ivan", "-p", "pw", "-c", "-vv",
        ])
        .unwrap();
        assert_eq!("pop.example.com", app.config.host);
        assert_eq!(1995, app.config.port);
        assert_eq!("ivan", app.config.username);
        assert!(app.console);
        assert_eq!(2, app.verbosity);
    }

    #[test]
    fn arg_parse__flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop3.toml");
        fs::write(
            &path,
            "host = \"pop.example.com\"\nusername = \"ivan\"\npassword = \"pw\"\ntimeout_secs = 5\n",
        )
        .unwrap();

        let app = arg_parse_from(&[
            "pop3-fetch",
            "--config",
            path.to_str().unwrap(),
            "-u",
            "other",
            "--db",
            "mail.db",
        ])
        .unwrap();
        assert_eq!("pop.example.com", app.config.host);
        assert_eq!(995, app.config.port);
        assert_eq!("other", app.config.username);
        assert_eq!(5, app.config.timeout_secs);
        assert_eq!(Some("mail.db".to_owned()), app.config.db_name);
        assert!(!app.console);
    }

    #[test]
    fn arg_parse__missing_credentials__is_config_error() {
        assert!(matches!(
            arg_parse_from(&["pop3-fetch", "pop.example.com"]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            arg_parse_from(&["pop3-fetch", "h", "not-a-port", "-u", "a", "-p", "b"]),
            Err(Error::Config(_))
        ));
    }
}
