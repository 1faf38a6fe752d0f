mod argp;
mod attachment;
mod command;
mod config;
mod console;
mod error;
mod mime;
mod persistence;
mod pop3;
mod reply;
mod tcpstream;

use std::error::Error as _;
use std::io;
use std::process;

use log::info;

use config::Config;
use error::Result;
use pop3::POP3Session;

#[derive(Debug)]
pub struct AppConfig {
    pub config: Config,
    pub console: bool,
    pub verbosity: u64,
}

fn main() {
    let app = match argp::arg_parse() {
        Ok(app) => app,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(2);
        }
    };
    init_log(app.verbosity);

    if let Err(err) = run(&app) {
        eprintln!("Error: {}", err);
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        process::exit(1);
    }
}

fn run(app: &AppConfig) -> Result<()> {
    let config = &app.config;
    let mut session: POP3Session = POP3Session::new(config.clone());
    session.connect(&config.host, config.port)?;
    if let Some(welcome) = session.welcome() {
        println!("{}", welcome);
    }
    session.login()?;
    info!("Logged in to {}:{} as {}", config.host, config.port, config.username);

    if app.console {
        let stdin = io::stdin();
        let stdout = io::stdout();
        return console::run_console(&mut session, stdin.lock(), stdout.lock());
    }

    let stat = session.stat()?;
    println!("{} messages ({} octets)", stat.count, stat.octets);
    session.quit()?;
    Ok(())
}

fn init_log(verbosity: u64) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply();
    if let Err(err) = result {
        eprintln!("Logging disabled: {}", err);
    }
}

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        let _ = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}][{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message,
                ))
            })
            .level(log::LevelFilter::Debug)
            .chain(std::io::stderr())
            .apply();
    })
}
