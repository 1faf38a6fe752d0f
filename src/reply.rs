use std::fmt;
use std::io::{self, BufRead};

use log::{debug, warn};

use crate::error::{Error, Result};

const DOT: u8 = 0x2E;
const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// Which termination rule applies to a reply if its status is `+OK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    SingleLine,
    MultiLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Err,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: Status,
    /// Whatever followed the status token on the first line.
    pub text: String,
    /// Unstuffed body of a multi-line reply, terminator removed. Lines keep
    /// their CRLF endings.
    pub body: Option<String>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Converts a `-ERR` reply into `Error::Rejected`.
    pub fn into_result(self, command: &str) -> Result<Reply> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::Rejected {
                command: command.to_owned(),
                reply: self.text,
            })
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let token = match self.status {
            Status::Ok => "+OK",
            Status::Err => "-ERR",
        };
        if self.text.is_empty() {
            write!(f, "{}", token)?;
        } else {
            write!(f, "{} {}", token, self.text)?;
        }
        if let Some(ref body) = self.body {
            write!(f, "\n{}", body.trim_end_matches(|c| c == '\r' || c == '\n'))?;
        }
        Ok(())
    }
}

/// Reads exactly one reply from `reader`.
///
/// A `-ERR` status always ends the reply at the first line. A `+OK` reply
/// with `shape == MultiLine` continues until the lone `.` line. Bytes are
/// only turned into text once the whole reply has been read.
pub fn read_reply<R: BufRead>(reader: &mut R, command: &str, shape: ReplyShape) -> Result<Reply> {
    let mut line = Vec::new();
    read_line(reader, command, &mut line)?;
    let (status, text) = parse_status_line(command, strip_eol(&line))?;

    if status == Status::Err || shape == ReplyShape::SingleLine {
        debug!("<< {} {}", command, String::from_utf8_lossy(strip_eol(&line)));
        return Ok(Reply {
            status,
            text,
            body: None,
        });
    }

    let mut body = Vec::new();
    let mut lines = 0usize;
    loop {
        line.clear();
        read_line(reader, command, &mut line)?;
        let content = strip_eol(&line);
        if content == [DOT] {
            break;
        }

        if content.first() == Some(&DOT) {
            body.extend_from_slice(&content[1..]);
        } else {
            body.extend_from_slice(content);
        }
        body.extend_from_slice(&[CR, LF]);
        lines += 1;
    }
    debug!("<< {} +OK, {} lines, {} bytes", command, lines, body.len());

    Ok(Reply {
        status,
        text,
        body: Some(bytes_to_text(command, body)),
    })
}

fn read_line<R: BufRead>(reader: &mut R, command: &str, dst: &mut Vec<u8>) -> Result<()> {
    let nread = reader
        .read_until(LF, dst)
        .map_err(|e| Error::connection(format!("reading reply to {}", command), e))?;
    if nread == 0 {
        return Err(Error::connection(
            format!("reading reply to {}", command),
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the end of the reply",
            ),
        ));
    }
    Ok(())
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(&[LF]).unwrap_or(line);
    line.strip_suffix(&[CR]).unwrap_or(line)
}

fn parse_status_line(command: &str, line: &[u8]) -> Result<(Status, String)> {
    let (status, rest) = if let Some(rest) = line.strip_prefix(b"+OK") {
        (Status::Ok, rest)
    } else if let Some(rest) = line.strip_prefix(b"-ERR") {
        (Status::Err, rest)
    } else {
        return Err(Error::protocol(
            command,
            format!(
                "expected +OK or -ERR, got {:?}",
                String::from_utf8_lossy(line)
            ),
        ));
    };

    if !rest.is_empty() && rest[0] != b' ' {
        return Err(Error::protocol(
            command,
            format!("garbage after status token: {:?}", String::from_utf8_lossy(line)),
        ));
    }

    Ok((status, String::from_utf8_lossy(rest).trim().to_owned()))
}

fn bytes_to_text(command: &str, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Reply to {} is not valid UTF-8 (first bad byte at {}); decoding lossily",
                command,
                e.utf8_error().valid_up_to()
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

/// Removes the extra leading `.` a sender adds to a body line.
pub fn unstuff_line(line: &str) -> &str {
    if line.starts_with("..") {
        &line[1..]
    } else {
        line
    }
}

#[cfg(test)]
pub fn dot_unstuff(body: &str) -> String {
    body.split_inclusive('\n')
        .map(|line| line.strip_prefix('.').unwrap_or(line))
        .collect()
}

#[cfg(test)]
pub fn dot_stuff(body: &str) -> String {
    body.split_inclusive('\n')
        .map(|line| {
            if line.starts_with('.') {
                format!(".{}", line)
            } else {
                line.to_owned()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{BufReader, Cursor, Read};

    fn read(wire: &str, shape: ReplyShape) -> Result<Reply> {
        read_reply(&mut Cursor::new(wire.as_bytes().to_vec()), "TEST", shape)
    }

    /// Hands out one byte per `read` call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    #[test]
    fn read_reply__single_line_ok__returns_status_text() {
        let reply = read("+OK 2 320\r\n", ReplyShape::SingleLine).unwrap();
        assert_eq!(Status::Ok, reply.status);
        assert_eq!("2 320", reply.text);
        assert_eq!(None, reply.body);
    }

    #[test]
    fn read_reply__multi_line__stops_at_lone_dot_and_unstuffs() {
        let mut cursor = Cursor::new(
            b"+OK message follows\r\nSubject: hi\r\n\r\n..leading dot\r\n.\r\n+OK next\r\n".to_vec(),
        );
        let reply = read_reply(&mut cursor, "RETR", ReplyShape::MultiLine).unwrap();
        assert_eq!("Subject: hi\r\n\r\n.leading dot\r\n", reply.body());

        let next = read_reply(&mut cursor, "NOOP", ReplyShape::SingleLine).unwrap();
        assert_eq!("next", next.text);
    }

    #[test]
    fn read_reply__err_to_multi_line_command__is_single_line() {
        let mut cursor = Cursor::new(b"-ERR no such message\r\n+OK\r\n".to_vec());
        let reply = read_reply(&mut cursor, "RETR", ReplyShape::MultiLine).unwrap();
        assert_eq!(Status::Err, reply.status);
        assert_eq!("no such message", reply.text);
        assert_eq!(None, reply.body);
        assert_eq!(b"+OK\r\n".len() as u64, cursor.get_ref().len() as u64 - cursor.position());
    }

    #[test]
    fn read_reply__unknown_status__is_protocol_error() {
        match read("* OK IMAP4rev1 ready\r\n", ReplyShape::SingleLine) {
            Err(Error::Protocol { command, .. }) => assert_eq!("TEST", command),
            other => panic!("unexpected {:?}", other),
        }
        assert!(read("+OKAY\r\n", ReplyShape::SingleLine).is_err());
    }

    #[test]
    fn read_reply__eof_inside_body__is_connection_error() {
        match read("+OK\r\nline one\r\n", ReplyShape::MultiLine) {
            Err(Error::Connection { source, .. }) => {
                assert_eq!(io::ErrorKind::UnexpectedEof, source.kind())
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(read("", ReplyShape::SingleLine).unwrap_err().is_fatal());
    }

    #[test]
    fn read_reply__multibyte_text_split_across_reads__decodes_cleanly() {
        let wire = "+OK\r\nПривет, мир\r\ncafé\r\n.\r\n".as_bytes().to_vec();
        let mut reader = BufReader::with_capacity(1, Trickle(Cursor::new(wire)));
        let reply = read_reply(&mut reader, "RETR", ReplyShape::MultiLine).unwrap();
        assert_eq!("Привет, мир\r\ncafé\r\n", reply.body());
    }

    #[test]
    fn read_reply__invalid_utf8__decodes_lossily() {
        let mut cursor = Cursor::new(b"+OK\r\ncaf\xe9\r\n.\r\n".to_vec());
        let reply = read_reply(&mut cursor, "RETR", ReplyShape::MultiLine).unwrap();
        assert_eq!("caf\u{fffd}\r\n", reply.body());
    }

    #[test]
    fn display_includes_body_without_trailing_newlines() {
        let reply = Reply {
            status: Status::Ok,
            text: "2 messages".to_owned(),
            body: Some("1 120\r\n2 200\r\n".to_owned()),
        };
        assert_eq!("+OK 2 messages\n1 120\r\n2 200", reply.to_string());
    }

    #[test]
    fn unstuff_line_removes_only_one_dot() {
        assert_eq!(".", unstuff_line(".."));
        assert_eq!("..x", unstuff_line("...x"));
        assert_eq!(".x", unstuff_line(".x"));
    }

    proptest! {
        #[test]
        fn dot_stuffing_round_trips(lines in prop::collection::vec(r"\.{0,3}[a-z .]{0,12}", 0..12)) {
            let body: String = lines.iter().map(|l| format!("{}\r\n", l)).collect();
            prop_assert_eq!(&body, &dot_unstuff(&dot_stuff(&body)));

            let wire = format!("+OK\r\n{}.\r\n", dot_stuff(&body));
            let reply = read(&wire, ReplyShape::MultiLine).unwrap();
            prop_assert_eq!(body.as_str(), reply.body());
        }
    }
}
