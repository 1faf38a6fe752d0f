//! RFC 2047 "encoded words", base64 (`B`) flavour only.

use std::borrow::Cow;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]+)\?[bB]\?([^?\s]*)\?=").unwrap();
    static ref WHOLE_ENCODED_WORD: Regex =
        Regex::new(r"^=\?([^?\s]+)\?[bB]\?([^?\s]*)\?=$").unwrap();
}

/// Decodes `word` if it is, in its entirety, an encoded word.
///
/// Anything else is returned unchanged; plain text is a legitimate input.
/// A word with an unknown charset or undecodable content is an
/// `Error::Encoding`.
pub fn decode_word(word: &str) -> Result<Cow<str>> {
    match WHOLE_ENCODED_WORD.captures(word.trim()) {
        Some(captures) => {
            let charset = captures.get(1).map_or("", |m| m.as_str());
            let data = captures.get(2).map_or("", |m| m.as_str());
            decode_payload(word, charset, data).map(Cow::Owned)
        }
        None => Ok(Cow::Borrowed(word)),
    }
}

/// Replaces every encoded word inside a header value.
///
/// Whitespace between two adjacent encoded words is dropped (RFC 2047
/// section 6.2). Words that fail to decode are kept as they were.
pub fn decode_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_end = 0;
    let mut prev_was_word = false;

    for whole in ENCODED_WORD.find_iter(value) {
        let gap = &value[last_end..whole.start()];
        if !(prev_was_word && gap.trim().is_empty()) {
            out.push_str(gap);
        }

        prev_was_word = match decode_word(whole.as_str()) {
            Ok(text) => {
                out.push_str(&text);
                true
            }
            Err(err) => {
                warn!("Keeping undecodable header word: {}", err);
                out.push_str(whole.as_str());
                false
            }
        };
        last_end = whole.end();
    }

    out.push_str(&value[last_end..]);
    out
}

fn decode_payload(word: &str, charset: &str, data: &str) -> Result<String> {
    let bytes =
        base64::decode(data).map_err(|e| Error::encoding(word, format!("invalid base64: {}", e)))?;
    decode_charset(charset, &bytes).map_err(|err| match err {
        Error::Encoding { detail, .. } => Error::encoding(word, detail),
        other => other,
    })
}

/// Decodes `bytes` in the named charset. Labels are matched the way
/// browsers match them, so `utf8`, `UTF-8` and `latin1` all work. An RFC 2231
/// language suffix (`utf-8*en`) is ignored.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> Result<String> {
    let label = charset.split('*').next().unwrap_or(charset).trim();
    let encoding = Encoding::for_label_no_replacement(label.as_bytes())
        .ok_or_else(|| Error::encoding(charset, format!("unknown charset {:?}", label)))?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| {
            Error::encoding(
                &String::from_utf8_lossy(bytes),
                format!("bytes are not valid {}", encoding.name()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decode_word__utf8_name__decodes() {
        assert_eq!("Ivan", decode_word("=?UTF-8?B?SXZhbg==?=").unwrap());
        assert_eq!("Ivan", decode_word("=?utf-8?b?SXZhbg==?=").unwrap());
    }

    #[test]
    fn decode_word__plain_text__is_returned_unchanged() {
        assert!(matches!(decode_word("hello world").unwrap(), Cow::Borrowed("hello world")));
        // Q encoding is not handled and passes through as text.
        assert_eq!(
            "=?ISO-8859-1?Q?Andr=E9?=",
            decode_word("=?ISO-8859-1?Q?Andr=E9?=").unwrap()
        );
    }

    #[test]
    fn decode_word__single_byte_charsets__decode() {
        let latin1 = format!("=?ISO-8859-1?B?{}?=", base64::encode(b"Andr\xe9"));
        assert_eq!("André", decode_word(&latin1).unwrap());

        let (cp1251, _, _) = encoding_rs::WINDOWS_1251.encode("Привет");
        let word = format!("=?windows-1251?B?{}?=", base64::encode(&cp1251));
        assert_eq!("Привет", decode_word(&word).unwrap());

        assert_eq!(
            "If you can read this yo",
            decode_word("=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=").unwrap()
        );
    }

    #[test]
    fn decode_word__unknown_charset__is_encoding_error() {
        match decode_word("=?x-klingon?B?SXZhbg==?=") {
            Err(Error::Encoding { fragment, detail }) => {
                assert_eq!("=?x-klingon?B?SXZhbg==?=", fragment);
                assert!(detail.contains("unknown charset"), "{}", detail);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_word__bad_payload__is_encoding_error() {
        assert!(matches!(
            decode_word("=?UTF-8?B?!!!!?="),
            Err(Error::Encoding { .. })
        ));
        // 0xff is never valid UTF-8
        let word = format!("=?UTF-8?B?{}?=", base64::encode(b"\xff\xfe"));
        assert!(matches!(decode_word(&word), Err(Error::Encoding { .. })));
    }

    #[test]
    fn decode_header_value__mixed_text() {
        let subject = format!("Re: {} again", "=?UTF-8?B?0J/RgNC40LLQtdGC?=");
        assert_eq!("Re: Привет again", decode_header_value(&subject));
    }

    #[test]
    fn decode_header_value__adjacent_words_are_joined() {
        let value = format!(
            "=?UTF-8?B?{}?=\r\n =?UTF-8?B?{}?=",
            base64::encode("Hello, "),
            base64::encode("world")
        );
        assert_eq!("Hello, world", decode_header_value(&value));
    }

    #[test]
    fn decode_header_value__keeps_undecodable_words() {
        assert_eq!(
            "Hi =?x-unknown?B?SXZhbg==?= Ivan",
            decode_header_value("Hi =?x-unknown?B?SXZhbg==?= =?UTF-8?B?SXZhbg==?=")
        );
    }

    proptest! {
        #[test]
        fn encoded_utf8_round_trips(s in "\\PC*") {
            let word = format!("=?UTF-8?B?{}?=", base64::encode(&s));
            prop_assert_eq!(s.as_str(), decode_word(&word).unwrap());
        }

        #[test]
        fn decode_header_value_never_panics(s in r"=\?.*\?[bB]\?.*\?=.*") {
            decode_header_value(&s);
        }
    }
}
