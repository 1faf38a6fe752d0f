//! Decoding of retrieved messages into text and attachments.

pub mod encoded_word;
pub mod header;
pub mod multipart;

use log::{debug, warn};

use self::encoded_word::decode_charset;
use self::header::{param, split_headers, summarize, HeaderSummary};
use self::multipart::{boundary, decode_part, parse_part, split_parts, TransferEncoding};
use crate::error::{Error, Result};

/// One unit of output: a text block or a named attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedItem {
    Text(String),
    Attachment { filename: String, data: Vec<u8> },
}

#[derive(Debug)]
pub struct DecodedMessage {
    pub summary: HeaderSummary,
    /// In the order the parts appear in the message.
    pub items: Vec<DecodedItem>,
    /// Parts that could not be decoded. Each is an `Error::MimeParse`
    /// carrying the 1-based part index.
    pub failures: Vec<Error>,
}

/// Decodes the body of a RETR reply.
///
/// A broken top-level header (no usable `From`) fails the whole message; a
/// broken part is recorded in `failures` and the remaining parts are still
/// decoded.
pub fn decode_message(text: &str) -> Result<DecodedMessage> {
    let (headers, body) = split_headers(text);
    let summary = summarize(&headers)?;

    let boundary = match boundary(&headers) {
        Some(boundary) => boundary,
        None => {
            debug!("Single-part message from {}", summary.sender.address);
            let item = decode_single_part(&headers, body)?;
            return Ok(DecodedMessage {
                summary,
                items: vec![item],
                failures: vec![],
            });
        }
    };

    let mut items = Vec::new();
    let mut failures = Vec::new();
    for (index, segment) in split_parts(body, &boundary).into_iter().enumerate() {
        let index = index + 1;
        match decode_part(index, &parse_part(segment)) {
            Ok(item) => items.push(item),
            Err(err) => {
                warn!("Skipping undecodable part: {}", err);
                failures.push(err);
            }
        }
    }
    debug!(
        "Multipart message from {}: {} parts decoded, {} skipped",
        summary.sender.address,
        items.len(),
        failures.len()
    );

    Ok(DecodedMessage {
        summary,
        items,
        failures,
    })
}

fn decode_single_part(headers: &header::HeaderBlock, body: &str) -> Result<DecodedItem> {
    let base64 = headers
        .get("Content-Transfer-Encoding")
        .map(TransferEncoding::parse)
        == Some(TransferEncoding::Base64);

    if !base64 {
        return Ok(DecodedItem::Text(
            body.lines().collect::<Vec<_>>().join("\n"),
        ));
    }

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::decode(&compact)
        .map_err(|e| Error::mime(None, format!("invalid base64 body: {}", e), body))?;
    let charset = headers
        .get("Content-Type")
        .and_then(|ct| param(ct, "charset"))
        .unwrap_or_else(|| "utf-8".to_owned());
    decode_charset(&charset, &bytes)
        .map(DecodedItem::Text)
        .map_err(|e| Error::mime(None, e.to_string(), body))
}
