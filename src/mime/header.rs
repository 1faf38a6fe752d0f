//! Line-oriented RFC 5322 header parsing.

use std::fmt;

use log::debug;

use super::encoded_word::decode_header_value;
use crate::error::{Error, Result};

pub const NO_SUBJECT: &str = "no subject";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    headers: Vec<Header>,
}

impl HeaderBlock {
    /// The first header called `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Splits `text` at the first blank line into a header block and the body.
///
/// Folded lines are unfolded. A text with no blank line is all headers.
pub fn split_headers(text: &str) -> (HeaderBlock, &str) {
    let mut headers: Vec<Header> = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        offset += line.len();
        let content = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if content.is_empty() {
            return (HeaderBlock { headers }, &text[offset..]);
        }

        if content.starts_with(|c| c == ' ' || c == '\t') {
            match headers.last_mut() {
                Some(last) => {
                    last.value.push(' ');
                    last.value.push_str(content.trim());
                }
                None => debug!("Ignoring continuation line before any header: {:?}", content),
            }
            continue;
        }

        match content.find(':') {
            Some(colon) => headers.push(Header {
                name: content[..colon].trim().to_owned(),
                value: content[colon + 1..].trim().to_owned(),
            }),
            None => debug!("Ignoring malformed header line: {:?}", content),
        }
    }

    (HeaderBlock { headers }, "")
}

/// The part of a structured value before its first `;`, e.g. `text/plain`.
pub fn main_value(value: &str) -> &str {
    value.split(';').next().unwrap_or("").trim()
}

/// Looks up a `name=value` or `name="value"` parameter of a structured
/// header value such as `Content-Type`.
pub fn param(value: &str, name: &str) -> Option<String> {
    split_params(value).into_iter().skip(1).find_map(|item| {
        let eq = item.find('=')?;
        if !item[..eq].trim().eq_ignore_ascii_case(name) {
            return None;
        }

        let raw = item[eq + 1..].trim();
        let unquoted = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            raw[1..raw.len() - 1].replace("\\\"", "\"")
        } else {
            raw.to_owned()
        };
        Some(unquoted)
    })
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (idx, ch) in value.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                items.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => (),
        }
    }
    items.push(&value[start..]);
    items
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub address: String,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSummary {
    pub sender: Sender,
    pub subject: String,
    pub date: Option<String>,
}

impl fmt::Display for HeaderSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "From: {}", self.sender)?;
        writeln!(f, "Subject: {}", self.subject)?;
        write!(f, "Date: {}", self.date.as_deref().unwrap_or(""))
    }
}

/// Splits `Display Name <address>` into its parts.
pub fn parse_sender(raw: &str) -> Result<Sender> {
    let (open, close) = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Err(Error::mime(None, "From header has no <address>", raw)),
    };

    let address = raw[open + 1..close].trim();
    if address.is_empty() {
        return Err(Error::mime(None, "From header has an empty address", raw));
    }

    let name = raw[..open].trim();
    let name = if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        &name[1..name.len() - 1]
    } else {
        name
    };

    Ok(Sender {
        name: decode_header_value(name),
        address: address.to_owned(),
    })
}

pub fn summarize(headers: &HeaderBlock) -> Result<HeaderSummary> {
    let from = headers
        .get("From")
        .ok_or_else(|| Error::mime(None, "message has no From header", ""))?;

    Ok(HeaderSummary {
        sender: parse_sender(from)?,
        subject: headers
            .get("Subject")
            .map(decode_header_value)
            .unwrap_or_else(|| NO_SUBJECT.to_owned()),
        date: headers.get("Date").map(str::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_headers__stops_at_first_blank_line() {
        let (headers, body) =
            split_headers("From: a <a@b.c>\r\nSubject: hi\r\n\r\nbody\r\n\r\nmore\r\n");
        assert_eq!(2, headers.headers.len());
        assert_eq!(Some("hi"), headers.get("subject"));
        assert_eq!("body\r\n\r\nmore\r\n", body);
    }

    #[test]
    fn split_headers__unfolds_continuation_lines() {
        let (headers, _) = split_headers(
            "Content-Type: multipart/mixed;\r\n\tboundary=\"abc\"\r\nX-Other: 1\r\n\r\n",
        );
        assert_eq!(
            Some("multipart/mixed; boundary=\"abc\""),
            headers.get("content-type")
        );
        assert_eq!(Some("1"), headers.get("X-Other"));
    }

    #[test]
    fn split_headers__without_blank_line__has_empty_body() {
        let (headers, body) = split_headers("Subject: x\nDate: y\n");
        assert_eq!(2, headers.headers.len());
        assert_eq!("", body);
    }

    #[test]
    fn param__quoted_and_bare() {
        let ct = "multipart/mixed; boundary=\"==b;1==\"; charset=UTF-8";
        assert_eq!("multipart/mixed", main_value(ct));
        assert_eq!(Some("==b;1==".to_owned()), param(ct, "BOUNDARY"));
        assert_eq!(Some("UTF-8".to_owned()), param(ct, "charset"));
        assert_eq!(None, param(ct, "name"));
    }

    #[test]
    fn parse_sender__encoded_name() {
        let sender = parse_sender("=?UTF-8?B?SXZhbg==?= <ivan@example.com>").unwrap();
        assert_eq!("Ivan", sender.name);
        assert_eq!("ivan@example.com", sender.address);
    }

    #[test]
    fn parse_sender__quoted_plain_name() {
        let sender = parse_sender("\"Doe, Jane\" <jane@example.com>").unwrap();
        assert_eq!("Doe, Jane", sender.name);
        assert_eq!("Doe, Jane (jane@example.com)", sender.to_string());
    }

    #[test]
    fn parse_sender__without_brackets__fails() {
        match parse_sender("jane@example.com") {
            Err(Error::MimeParse { part: None, fragment, .. }) => {
                assert_eq!("jane@example.com", fragment)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn summarize__missing_subject__uses_placeholder() {
        let (headers, _) = split_headers("From: Bob <bob@example.com>\r\nDate: Mon, 1 Jun 2020\r\n\r\n");
        let summary = summarize(&headers).unwrap();
        assert_eq!(NO_SUBJECT, summary.subject);
        assert_eq!(Some("Mon, 1 Jun 2020".to_owned()), summary.date);
    }

    #[test]
    fn summarize__missing_from__fails() {
        let (headers, _) = split_headers("Subject: x\r\n\r\n");
        assert!(matches!(summarize(&headers), Err(Error::MimeParse { .. })));
    }
}
