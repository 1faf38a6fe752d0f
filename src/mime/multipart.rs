//! Boundary-delimited part splitting (RFC 2046 section 5.1) and per-part
//! decoding.

use super::encoded_word::{decode_charset, decode_header_value};
use super::header::{main_value, param, split_headers, HeaderBlock};
use super::DecodedItem;
use crate::error::{Error, Result};
use crate::reply::unstuff_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    SevenBit,
    EightBit,
    Binary,
    Other(String),
}

impl TransferEncoding {
    pub fn parse(value: &str) -> TransferEncoding {
        let value = value.trim();
        if value.eq_ignore_ascii_case("base64") {
            TransferEncoding::Base64
        } else if value.eq_ignore_ascii_case("7bit") {
            TransferEncoding::SevenBit
        } else if value.eq_ignore_ascii_case("8bit") {
            TransferEncoding::EightBit
        } else if value.eq_ignore_ascii_case("binary") {
            TransferEncoding::Binary
        } else {
            TransferEncoding::Other(value.to_ascii_lowercase())
        }
    }

    fn is_identity(&self) -> bool {
        match *self {
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Lower-cased media type without parameters; empty if the part declares
    /// none.
    pub content_type: String,
    pub charset: Option<String>,
    pub disposition: Disposition,
    /// Already decoded from encoded-word form.
    pub filename: Option<String>,
    pub transfer_encoding: Option<TransferEncoding>,
    pub body: String,
}

/// The `boundary` parameter of the top-level `Content-Type`, if any.
pub fn boundary(headers: &HeaderBlock) -> Option<String> {
    headers
        .get("Content-Type")
        .and_then(|ct| param(ct, "boundary"))
        .filter(|b| !b.is_empty())
}

/// Returns the raw segments between consecutive boundary delimiter lines.
///
/// Text before the first delimiter and after the closing `--boundary--` is
/// dropped, as is a trailing segment that no delimiter closes. Segments
/// holding nothing but whitespace are skipped.
pub fn split_parts<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{}", boundary);
    let close = format!("--{}--", boundary);

    let mut segments = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let content = line.trim_end();
        let is_close = content == close;
        if is_close || content == delimiter {
            if let Some(begin) = start {
                let segment = &body[begin..offset];
                if !segment.trim().is_empty() {
                    segments.push(segment);
                }
            }
            if is_close {
                return segments;
            }
            start = Some(offset + line.len());
        }
        offset += line.len();
    }

    segments
}

/// Splits one segment into part headers and body and records how the part
/// declares itself.
pub fn parse_part(segment: &str) -> MimePart {
    let (headers, body) = split_headers(segment);
    // The line break before a delimiter belongs to the delimiter.
    let body = body
        .strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body);

    let content_type = headers.get("Content-Type").unwrap_or("");
    let disposition = headers.get("Content-Disposition").unwrap_or("");
    let filename = param(disposition, "filename").or_else(|| param(content_type, "name"));

    MimePart {
        content_type: main_value(content_type).to_ascii_lowercase(),
        charset: param(content_type, "charset"),
        disposition: if main_value(disposition).eq_ignore_ascii_case("attachment") {
            Disposition::Attachment
        } else {
            Disposition::Inline
        },
        filename: filename.map(|f| decode_header_value(&f)),
        transfer_encoding: headers
            .get("Content-Transfer-Encoding")
            .map(TransferEncoding::parse),
        body: body.to_owned(),
    }
}

/// Decodes one classified part. `index` is 1-based and only used in errors.
pub fn decode_part(index: usize, part: &MimePart) -> Result<DecodedItem> {
    if part.content_type.starts_with("text/") {
        decode_text(index, part).map(DecodedItem::Text)
    } else if part.disposition == Disposition::Attachment {
        decode_attachment(index, part)
    } else {
        Err(Error::mime(
            Some(index),
            format!(
                "neither a text part nor an attachment (content type {:?})",
                part.content_type
            ),
            &part.body,
        ))
    }
}

fn decode_text(index: usize, part: &MimePart) -> Result<String> {
    if part.transfer_encoding == Some(TransferEncoding::Base64) {
        let bytes = decode_base64(index, &part.body)?;
        let charset = part.charset.as_deref().unwrap_or("utf-8");
        return decode_charset(charset, &bytes)
            .map_err(|e| Error::mime(Some(index), e.to_string(), &part.body));
    }

    Ok(part
        .body
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .map(unstuff_line)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn decode_attachment(index: usize, part: &MimePart) -> Result<DecodedItem> {
    let filename = part
        .filename
        .clone()
        .ok_or_else(|| Error::mime(Some(index), "attachment has no filename", &part.body))?;

    let data = match part.transfer_encoding {
        Some(ref te) if te.is_identity() => part.body.clone().into_bytes(),
        _ => decode_base64(index, &part.body)?,
    };

    Ok(DecodedItem::Attachment { filename, data })
}

fn decode_base64(index: usize, body: &str) -> Result<Vec<u8>> {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    base64::decode(&compact)
        .map_err(|e| Error::mime(Some(index), format!("invalid base64: {}", e), body))
}
