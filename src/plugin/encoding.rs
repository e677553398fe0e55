//! Text decoding for fetched pages
//!
//! Callbacks receive page bodies as raw bytes. Plugins turn them into text
//! with the charset announced by the server or with one they know the site
//! uses, typically `gbk` or `gb2312`.

use encoding_rs::Encoding;
use tracing::debug;

use crate::core::error::{Result, ScoutError};

pub const DEFAULT_CHARSET: &str = "utf-8";

/// Decode `body` with the encoding named by `label`, UTF-8 when absent
///
/// Labels follow the WHATWG encoding standard, so `gb2312` and `gbk` both
/// select GBK. Malformed sequences become U+FFFD.
pub fn decode_text(body: &[u8], label: Option<&str>) -> Result<String> {
    let label = label
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_CHARSET);
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| ScoutError::InvalidArgument(format!("unknown encoding: {}", label)))?;

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        debug!(encoding = used.name(), len = body.len(), "body contained malformed sequences");
    }
    Ok(text.into_owned())
}

/// The `charset` parameter of a Content-Type value, lowercased
pub fn charset_of(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
        })
        .filter(|charset| !charset.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // "中文" in GBK
    const GBK_CHINESE: [u8; 4] = [0xD6, 0xD0, 0xCE, 0xC4];

    #[test]
    fn test_decode_gbk() {
        assert_eq!(decode_text(&GBK_CHINESE, Some("gbk")).unwrap(), "中文");
        assert_eq!(decode_text(&GBK_CHINESE, Some("GB2312")).unwrap(), "中文");
    }

    #[test]
    fn test_default_is_utf8() {
        assert_eq!(decode_text("中文".as_bytes(), None).unwrap(), "中文");
        assert_eq!(decode_text(b"plain", Some("")).unwrap(), "plain");
        assert_eq!(decode_text(&GBK_CHINESE, None).unwrap(), "\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn test_unknown_label() {
        let err = decode_text(b"x", Some("klingon")).unwrap_err();
        assert!(matches!(err, ScoutError::InvalidArgument(_)));
        assert!(err.to_string().contains("klingon"));
    }

    #[test]
    fn test_charset_of() {
        assert_eq!(charset_of("text/html; charset=GBK").as_deref(), Some("gbk"));
        assert_eq!(charset_of("text/html;Charset=\"utf-8\"").as_deref(), Some("utf-8"));
        assert_eq!(charset_of("text/html"), None);
        assert_eq!(charset_of("text/html; charset="), None);
        assert_eq!(charset_of("charset=gbk"), None);
    }
}
