use std::io;

use thiserror::Error;

use crate::pop3::POP3State;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Socket or TLS failure. Fatal: the session has already dropped its
    /// transport.
    #[error("connection error during {context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed reply to {command}: {detail}")]
    Protocol { command: String, detail: String },
    #[error("{command} is not allowed while the session is {state:?}")]
    SessionState { command: String, state: POP3State },
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("bad arguments to {command}, usage: {usage}")]
    Usage {
        command: &'static str,
        usage: &'static str,
    },
    #[error("server rejected {command}: {reply}")]
    Rejected { command: String, reply: String },
    #[error("{}: {detail} (near {fragment:?})", part_label(.part))]
    MimeParse {
        part: Option<usize>,
        detail: String,
        fragment: String,
    },
    #[error("cannot decode {fragment:?}: {detail}")]
    Encoding { fragment: String, detail: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cannot write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

fn part_label(part: &Option<usize>) -> String {
    match *part {
        Some(index) => format!("MIME part {}", index),
        None => "message header".to_owned(),
    }
}

impl Error {
    pub fn connection(context: impl Into<String>, source: io::Error) -> Self {
        Error::Connection {
            context: context.into(),
            source,
        }
    }

    pub fn protocol(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Protocol {
            command: command.into(),
            detail: detail.into(),
        }
    }

    pub fn mime(part: Option<usize>, detail: impl Into<String>, fragment: &str) -> Self {
        Error::MimeParse {
            part,
            detail: detail.into(),
            fragment: truncate(fragment, 60),
        }
    }

    pub fn encoding(fragment: &str, detail: impl Into<String>) -> Self {
        Error::Encoding {
            fragment: truncate(fragment, 60),
            detail: detail.into(),
        }
    }

    /// Whether the transport was lost. The caller must reconnect before
    /// issuing anything else.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Connection { .. } => true,
            _ => false,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}
