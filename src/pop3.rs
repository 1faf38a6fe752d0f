use std::io::{self, BufReader, Write};

use log::{debug, info, warn};

use crate::command::{self, Command, Invocation};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mime::{self, DecodedMessage};
use crate::reply::{read_reply, Reply, ReplyShape};
use crate::tcpstream::{self, TlsStream, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum POP3State {
    Disconnected,
    Connected,
    Authenticated,
    /// Terminal. Reached through QUIT.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub count: u32,
    pub octets: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    pub msg: u32,
    pub octets: u64,
}

/// What a console invocation produced.
#[derive(Debug)]
pub enum Outcome {
    Reply(Reply),
    Stat(Stat),
    Listing(Vec<ListEntry>),
    Message(u32, DecodedMessage),
    Help(String),
}

/// One POP3 conversation. The session owns its transport; it is shut down
/// and dropped on QUIT, on any transport failure and when the session is
/// dropped.
pub struct POP3Session<T: Transport = TlsStream> {
    config: Config,
    transport: Option<BufReader<T>>,
    state: POP3State,
    welcome: Option<String>,
    /// The last USER got `+OK`; a `+OK` to PASS now authenticates.
    user_accepted: bool,
}

impl<T: Transport> POP3Session<T> {
    pub fn new(config: Config) -> Self {
        POP3Session {
            config,
            transport: None,
            state: POP3State::Disconnected,
            welcome: None,
            user_accepted: false,
        }
    }

    pub fn state(&self) -> POP3State {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server greeting, once connected.
    pub fn welcome(&self) -> Option<&str> {
        self.welcome.as_deref()
    }

    /// Takes ownership of an established transport and reads the greeting.
    pub fn attach(&mut self, transport: T) -> Result<Reply> {
        self.require(POP3State::Disconnected, "connect")?;
        self.transport = Some(BufReader::new(transport));

        let greeting = match self.read("greeting", ReplyShape::SingleLine) {
            Ok(greeting) => greeting,
            Err(err) => {
                self.release();
                return Err(err);
            }
        };
        if !greeting.is_ok() {
            self.release();
            return greeting.into_result("greeting");
        }

        info!("Got response from server: {}", greeting.text);
        self.welcome = Some(greeting.to_string());
        self.state = POP3State::Connected;
        Ok(greeting)
    }

    /// USER then PASS. The session only becomes authenticated if the server
    /// accepts both.
    pub fn auth(&mut self, username: &str, password: &str) -> Result<Reply> {
        self.require(POP3State::Connected, "AUTH")?;
        info!("Logging in as {} with USER/PASS...", username);
        self.send(&Command::User(username.to_owned()))?
            .into_result("USER")?;
        self.send(&Command::Pass(password.to_owned()))?
            .into_result("PASS")
    }

    /// `auth` with the configured credentials.
    pub fn login(&mut self) -> Result<Reply> {
        let username = self.config.username.clone();
        let password = self.config.password.clone();
        self.auth(&username, &password)
    }

    /// Writes one command and reads its reply.
    ///
    /// A `-ERR` reply is returned as a normal reply; only transport,
    /// framing and state problems are errors. `+OK` to USER then PASS
    /// authenticates the session, and QUIT closes it as `quit` does.
    pub fn send(&mut self, command: &Command) -> Result<Reply> {
        if *command == Command::Quit {
            return self.quit();
        }

        let reply = self.exchange(command)?;
        match *command {
            Command::User(_) => self.user_accepted = reply.is_ok(),
            Command::Pass(_) => {
                if reply.is_ok() && self.user_accepted {
                    self.state = POP3State::Authenticated;
                    info!("Logged in successfully");
                }
                self.user_accepted = false;
            }
            _ => (),
        }
        Ok(reply)
    }

    fn exchange(&mut self, command: &Command) -> Result<Reply> {
        if !command.allowed_in(self.state) {
            return Err(Error::SessionState {
                command: command.name().to_owned(),
                state: self.state,
            });
        }
        let line = command.to_line()?;
        debug!(">> {}", command);

        let written = match self.transport {
            Some(ref mut transport) => {
                let stream = transport.get_mut();
                stream.write_all(line.as_bytes()).and_then(|_| stream.flush())
            }
            None => {
                return Err(Error::SessionState {
                    command: command.name().to_owned(),
                    state: self.state,
                })
            }
        };
        if let Err(e) = written {
            self.release();
            self.state = POP3State::Disconnected;
            return Err(Error::connection(format!("sending {}", command.name()), e));
        }

        self.read(command.name(), command.shape())
    }

    pub fn stat(&mut self) -> Result<Stat> {
        let reply = self.send(&Command::Stat)?.into_result("STAT")?;
        let (count, octets) = parse_counts("STAT", &reply.text)?;
        Ok(Stat { count, octets })
    }

    /// Scan listing of one message, or of all of them.
    pub fn list(&mut self, msg: Option<u32>) -> Result<Vec<ListEntry>> {
        let reply = self.send(&Command::List(msg))?.into_result("LIST")?;
        let mut entries = Vec::new();
        match reply.body {
            None => {
                let (msg, octets) = parse_counts("LIST", &reply.text)?;
                entries.push(ListEntry { msg, octets });
            }
            Some(ref body) => {
                for line in body.lines().filter(|l| !l.trim().is_empty()) {
                    let (msg, octets) = parse_counts("LIST", line)?;
                    entries.push(ListEntry { msg, octets });
                }
            }
        }
        Ok(entries)
    }

    pub fn retrieve(&mut self, msg: u32) -> Result<DecodedMessage> {
        let reply = self.send(&Command::Retr(msg))?.into_result("RETR")?;
        mime::decode_message(reply.body())
    }

    pub fn top(&mut self, msg: u32, lines: u32) -> Result<Reply> {
        self.send(&Command::Top(msg, lines))?.into_result("TOP")
    }

    pub fn delete(&mut self, msg: u32) -> Result<Reply> {
        self.send(&Command::Dele(msg))?.into_result("DELE")
    }

    pub fn reset(&mut self) -> Result<Reply> {
        self.send(&Command::Rset)?.into_result("RSET")
    }

    pub fn noop(&mut self) -> Result<Reply> {
        self.send(&Command::Noop)?.into_result("NOOP")
    }

    /// Sends QUIT and closes the session for good. The transport is released
    /// even if the server never answers.
    pub fn quit(&mut self) -> Result<Reply> {
        self.require_one_of(&[POP3State::Connected, POP3State::Authenticated], "QUIT")?;
        let result = self.exchange(&Command::Quit);
        info!("Closing connection...");
        self.release();
        self.state = POP3State::Closed;
        result
    }

    /// See `command::help`. Only available once logged in.
    pub fn help(&self, name: Option<&str>) -> Result<String> {
        self.require(POP3State::Authenticated, "HELP")?;
        command::help(name)
    }

    /// Runs a parsed console line.
    pub fn dispatch(&mut self, invocation: &Invocation) -> Result<Outcome> {
        match *invocation {
            Invocation::Help(ref name) => self.help(name.as_deref()).map(Outcome::Help),
            Invocation::Auth {
                ref username,
                ref password,
            } => self.auth(username, password).map(Outcome::Reply),
            Invocation::Send(Command::Retr(msg)) => {
                self.retrieve(msg).map(|m| Outcome::Message(msg, m))
            }
            Invocation::Send(Command::Stat) => self.stat().map(Outcome::Stat),
            Invocation::Send(Command::List(msg)) => self.list(msg).map(Outcome::Listing),
            Invocation::Send(Command::Top(msg, lines)) => {
                self.top(msg, lines).map(Outcome::Reply)
            }
            Invocation::Send(Command::Dele(msg)) => self.delete(msg).map(Outcome::Reply),
            Invocation::Send(Command::Rset) => self.reset().map(Outcome::Reply),
            Invocation::Send(Command::Noop) => self.noop().map(Outcome::Reply),
            Invocation::Send(Command::Quit) => self.quit().map(Outcome::Reply),
            Invocation::Send(ref command) => self.send(command).map(Outcome::Reply),
        }
    }

    fn require(&self, state: POP3State, what: &str) -> Result<()> {
        self.require_one_of(&[state], what)
    }

    fn require_one_of(&self, states: &[POP3State], what: &str) -> Result<()> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::SessionState {
                command: what.to_owned(),
                state: self.state,
            })
        }
    }

    fn read(&mut self, what: &str, shape: ReplyShape) -> Result<Reply> {
        let result = match self.transport {
            Some(ref mut transport) => read_reply(transport, what, shape),
            None => Err(Error::connection(
                what,
                io::Error::new(io::ErrorKind::NotConnected, "no transport"),
            )),
        };
        if let Err(ref err) = result {
            if err.is_fatal() {
                warn!("Dropping connection after {}", err);
                self.release();
                self.state = POP3State::Disconnected;
            }
        }
        result
    }

    fn release(&mut self) {
        self.user_accepted = false;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.get_mut().shutdown() {
                debug!("Transport shutdown failed: {}", e);
            }
        }
    }
}

impl POP3Session<TlsStream> {
    /// Opens a TLS connection and reads the greeting.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<Reply> {
        self.require(POP3State::Disconnected, "connect")?;
        let stream = tcpstream::connect_tls(
            host,
            port,
            self.config.timeout(),
            self.config.accept_invalid_certs,
        )?;
        self.attach(stream)
    }
}

impl<T: Transport> Drop for POP3Session<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Parses the two numbers of a STAT or LIST line.
fn parse_counts(command: &str, text: &str) -> Result<(u32, u64)> {
    let mut fields = text.split_whitespace();
    let first = fields.next().and_then(|f| f.parse::<u32>().ok());
    let second = fields.next().and_then(|f| f.parse::<u64>().ok());
    match (first, second) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(Error::protocol(
            command,
            format!("expected two numbers, got {:?}", text),
        )),
    }
}
