use std::io::{self, BufRead, Write};

use log::{error, warn};

use crate::attachment::save_attachments;
use crate::command::Invocation;
use crate::error::{Error, Result};
use crate::mime::{DecodedItem, DecodedMessage};
use crate::persistence::{persist_emails, EmailEntity};
use crate::pop3::{Outcome, POP3Session, POP3State};
use crate::tcpstream::Transport;

/// Reads commands from `input` until QUIT or end of input.
///
/// Only a lost connection ends the loop early; every other error is printed
/// and the next command is read. End of input quits the session politely.
pub fn run_console<T, R, W>(session: &mut POP3Session<T>, input: R, mut output: W) -> Result<()>
where
    T: Transport,
    R: BufRead,
    W: Write,
{
    let mut lines = input.lines();
    while session.state() != POP3State::Closed {
        print(&mut output, "Type a command:")?;
        let line = match lines.next() {
            Some(line) => line.map_err(|e| Error::Io {
                path: "<stdin>".to_owned(),
                source: e,
            })?,
            None => {
                if session.state() != POP3State::Disconnected {
                    match session.quit() {
                        Ok(reply) => print(&mut output, &reply.to_string())?,
                        Err(err) => warn!("QUIT failed: {}", err),
                    }
                }
                break;
            }
        };

        let words: Vec<&str> = line.split_whitespace().collect();
        let (name, args) = match words.split_first() {
            Some((name, args)) => (*name, args),
            None => continue,
        };

        let result = Invocation::parse(name, args).and_then(|inv| session.dispatch(&inv));
        match result {
            Ok(outcome) => show_outcome(session, &mut output, outcome)?,
            Err(Error::UnknownCommand(_)) => print(&mut output, "UNKNOWN COMMAND")?,
            Err(err) if err.is_fatal() => {
                error!("{}", err);
                return Err(err);
            }
            Err(err) => print(&mut output, &format!("Error: {}", err))?,
        }
    }
    Ok(())
}

fn show_outcome<T: Transport, W: Write>(
    session: &POP3Session<T>,
    output: &mut W,
    outcome: Outcome,
) -> Result<()> {
    match outcome {
        Outcome::Reply(reply) => print(output, &reply.to_string()),
        Outcome::Stat(stat) => print(
            output,
            &format!("{} messages ({} octets)", stat.count, stat.octets),
        ),
        Outcome::Listing(entries) => {
            for entry in entries {
                print(output, &format!("{} {}", entry.msg, entry.octets))?;
            }
            Ok(())
        }
        Outcome::Help(text) => print(output, &text),
        Outcome::Message(msg, message) => show_message(session, output, msg, &message),
    }
}

fn show_message<T: Transport, W: Write>(
    session: &POP3Session<T>,
    output: &mut W,
    msg: u32,
    message: &DecodedMessage,
) -> Result<()> {
    print(output, &message.summary.to_string())?;
    for item in &message.items {
        match *item {
            DecodedItem::Text(ref text) => print(output, text)?,
            DecodedItem::Attachment { ref filename, .. } => {
                print(output, &format!("Saving attachment {}", filename))?
            }
        }
    }
    for failure in &message.failures {
        print(output, &format!("Skipped: {}", failure))?;
    }

    let config = session.config();
    // A message whose attachments cannot be written is still shown.
    if let Err(err) = save_attachments(&config.output_dir, &message.items) {
        warn!("{}", err);
        print(output, &format!("Error: {}", err))?;
    }
    if let Some(ref db_name) = config.db_name {
        let entity = EmailEntity {
            msg_number: msg,
            summary: &message.summary,
        };
        if let Err(err) = persist_emails(&[entity], db_name) {
            warn!("{}", err);
            print(output, &format!("Error: {}", err))?;
        }
    }
    Ok(())
}

fn print<W: Write>(output: &mut W, text: &str) -> Result<()> {
    writeln!(output, "{}", text).map_err(stdout_error)
}

fn stdout_error(source: io::Error) -> Error {
    Error::Io {
        path: "<stdout>".to_owned(),
        source,
    }
}
