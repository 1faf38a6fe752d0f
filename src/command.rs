//! The POP3 command table.
//!
//! Every command the client understands is listed once in `COMMANDS`; the
//! console parser, `help` and the session's state checks all read from it.

use std::fmt;

use crate::error::{Error, Result};
use crate::pop3::POP3State;
use crate::reply::ReplyShape;

pub struct CommandInfo {
    pub name: &'static str,
    pub usage: &'static str,
    pub doc: &'static str,
}

pub static COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "AUTH",
        usage: "AUTH <username> <password>",
        doc: "USER and PASS combined.",
    },
    CommandInfo {
        name: "DELE",
        usage: "DELE <msg>",
        doc: "Mark a message as to be deleted. Deletion happens at QUIT.",
    },
    CommandInfo {
        name: "HELP",
        usage: "HELP [command]",
        doc: "List available commands, or describe one command.",
    },
    CommandInfo {
        name: "LIST",
        usage: "LIST [msg]",
        doc: "Show the size of every message, or of the given one.",
    },
    CommandInfo {
        name: "NOOP",
        usage: "NOOP",
        doc: "Empty keep-alive message.",
    },
    CommandInfo {
        name: "PASS",
        usage: "PASS <password>",
        doc: "Send the password to the server. The previous command must be USER.",
    },
    CommandInfo {
        name: "QUIT",
        usage: "QUIT",
        doc: "End the session. The server now deletes marked messages.",
    },
    CommandInfo {
        name: "RETR",
        usage: "RETR <msg>",
        doc: "Download a message, print its text and save its attachments.",
    },
    CommandInfo {
        name: "RSET",
        usage: "RSET",
        doc: "Cancel deletion marks.",
    },
    CommandInfo {
        name: "STAT",
        usage: "STAT",
        doc: "Show how many messages there are on the server and their total size.",
    },
    CommandInfo {
        name: "TOP",
        usage: "TOP <msg> <lines>",
        doc: "Show the headers of a message and the first <lines> lines of its body.",
    },
    CommandInfo {
        name: "USER",
        usage: "USER <username>",
        doc: "Send the username to the server. The next command must be PASS.",
    },
];

fn lookup(name: &str) -> Option<&'static CommandInfo> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Registered command names in sorted order.
pub fn command_names() -> Vec<&'static str> {
    let mut names: Vec<_> = COMMANDS.iter().map(|c| c.name).collect();
    names.sort_unstable();
    names
}

/// The documented effect of `name`.
pub fn describe(name: &str) -> Result<&'static str> {
    lookup(name)
        .map(|c| c.doc)
        .ok_or_else(|| Error::UnknownCommand(name.to_owned()))
}

pub fn help(name: Option<&str>) -> Result<String> {
    match name {
        None => Ok(format!(
            "List of available commands:\n{}",
            command_names().join(", ")
        )),
        Some(name) => {
            let doc = describe(name)?;
            let usage = lookup(name).map_or("", |c| c.usage);
            Ok(format!("{}\n{}", usage, doc))
        }
    }
}

/// A single command line sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Stat,
    List(Option<u32>),
    Dele(u32),
    Rset,
    Top(u32, u32),
    Retr(u32),
    Noop,
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match *self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Stat => "STAT",
            Command::List(_) => "LIST",
            Command::Dele(_) => "DELE",
            Command::Rset => "RSET",
            Command::Top(..) => "TOP",
            Command::Retr(_) => "RETR",
            Command::Noop => "NOOP",
            Command::Quit => "QUIT",
        }
    }

    pub fn args(&self) -> Vec<String> {
        match *self {
            Command::User(ref arg) | Command::Pass(ref arg) => vec![arg.clone()],
            Command::List(Some(msg)) | Command::Dele(msg) | Command::Retr(msg) => {
                vec![msg.to_string()]
            }
            Command::Top(msg, lines) => vec![msg.to_string(), lines.to_string()],
            Command::Stat
            | Command::List(None)
            | Command::Rset
            | Command::Noop
            | Command::Quit => vec![],
        }
    }

    /// How a `+OK` reply to this command is terminated.
    pub fn shape(&self) -> ReplyShape {
        match *self {
            Command::List(None) | Command::Top(..) | Command::Retr(_) => ReplyShape::MultiLine,
            _ => ReplyShape::SingleLine,
        }
    }

    pub fn allowed_in(&self, state: POP3State) -> bool {
        match *self {
            Command::User(_) | Command::Pass(_) => state == POP3State::Connected,
            Command::Quit => {
                state == POP3State::Connected || state == POP3State::Authenticated
            }
            _ => state == POP3State::Authenticated,
        }
    }

    /// The CRLF-terminated wire form.
    pub fn to_line(&self) -> Result<String> {
        let args = self.args();
        if args.iter().any(|arg| arg.contains(|c| c == '\r' || c == '\n')) {
            return Err(Error::Usage {
                command: self.name(),
                usage: lookup(self.name()).map_or("", |c| c.usage),
            });
        }

        let mut line = self.name().to_owned();
        for arg in args {
            line.push(' ');
            line.push_str(&arg);
        }
        line.push_str("\r\n");
        Ok(line)
    }
}

/// Log-safe rendering; the password never appears.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Command::Pass(_) => write!(f, "PASS ****"),
            _ => {
                write!(f, "{}", self.name())?;
                for arg in self.args() {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
        }
    }
}

/// A line typed at the console, resolved against the command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Send(Command),
    Auth { username: String, password: String },
    Help(Option<String>),
}

impl Invocation {
    pub fn parse(name: &str, args: &[&str]) -> Result<Invocation> {
        let info = lookup(name).ok_or_else(|| Error::UnknownCommand(name.to_owned()))?;
        let number = |s: &str| s.parse::<u32>().map_err(|_| usage(info));

        let invocation = match (info.name, args) {
            ("AUTH", [user, pass]) => Invocation::Auth {
                username: (*user).to_owned(),
                password: (*pass).to_owned(),
            },
            ("HELP", []) => Invocation::Help(None),
            ("HELP", [topic]) => Invocation::Help(Some((*topic).to_owned())),
            ("USER", [user]) => Invocation::Send(Command::User((*user).to_owned())),
            ("PASS", [pass]) => Invocation::Send(Command::Pass((*pass).to_owned())),
            ("STAT", []) => Invocation::Send(Command::Stat),
            ("LIST", []) => Invocation::Send(Command::List(None)),
            ("LIST", [msg]) => Invocation::Send(Command::List(Some(number(*msg)?))),
            ("DELE", [msg]) => Invocation::Send(Command::Dele(number(*msg)?)),
            ("RSET", []) => Invocation::Send(Command::Rset),
            ("TOP", [msg, lines]) => {
                Invocation::Send(Command::Top(number(*msg)?, number(*lines)?))
            }
            ("RETR", [msg]) => Invocation::Send(Command::Retr(number(*msg)?)),
            ("NOOP", []) => Invocation::Send(Command::Noop),
            ("QUIT", []) => Invocation::Send(Command::Quit),
            _ => return Err(usage(info)),
        };
        Ok(invocation)
    }
}

fn usage(info: &'static CommandInfo) -> Error {
    Error::Usage {
        command: info.name,
        usage: info.usage,
    }
}
