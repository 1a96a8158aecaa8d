//! Percent-encoding compatible with JavaScript's `encodeURI`.
//!
//! The delta syntax and `Raw` snapshots travel through clients that escape
//! text with `encodeURI`, so the server side must produce byte-identical
//! output for the same input. `encodeURI` leaves ASCII alphanumerics and
//! `; , / ? : @ & = + $ - _ . ! ~ * ' ( ) #` untouched and percent-encodes
//! every other byte of the UTF-8 encoding with uppercase hex.

/// Characters `encodeURI` leaves raw, beyond ASCII alphanumerics.
const RAW: &[u8] = b";,/?:@&=+$-_.!~*'()#";

fn is_raw(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || RAW.contains(&byte)
}

/// Encode `text` exactly as JavaScript's `encodeURI` would.
pub fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if is_raw(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Failure to decode a percent-escaped payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A `%` escape was truncated or contained non-hex digits.
    BadEscape(usize),
    /// The decoded bytes were not valid UTF-8.
    InvalidUtf8,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::BadEscape(pos) => write!(f, "bad percent escape at byte {}", pos),
            DecodeError::InvalidUtf8 => write!(f, "decoded bytes are not valid UTF-8"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a percent-escaped string into UTF-8 text.
///
/// The inverse of [`encode`]: `%XX` escapes become bytes, everything else is
/// passed through. `+` is a literal plus sign, matching `decodeURI` rather
/// than form decoding.
pub fn decode(text: &str) -> Result<String, DecodeError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(DecodeError::BadEscape(i));
            }
            let hi = hex_value(bytes[i + 1]).ok_or(DecodeError::BadEscape(i))?;
            let lo = hex_value(bytes[i + 2]).ok_or(DecodeError::BadEscape(i))?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| DecodeError::InvalidUtf8)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Expected strings below are the output of Node's encodeURI on the same
    // input, pasted verbatim.

    #[test]
    fn test_alphanumerics_pass_through() {
        assert_eq!(encode("abcXYZ019"), "abcXYZ019");
    }

    #[test]
    fn test_space_and_quotes() {
        assert_eq!(encode("a b\"c"), "a%20b%22c");
    }

    #[test]
    fn test_uri_structure_characters_stay_raw() {
        assert_eq!(
            encode("http://a.b/c?d=e&f=+$,#!~*'();:@"),
            "http://a.b/c?d=e&f=+$,#!~*'();:@"
        );
    }

    #[test]
    fn test_percent_and_brackets_escape() {
        assert_eq!(encode("100% <sure>"), "100%25%20%3Csure%3E");
    }

    #[test]
    fn test_multibyte_utf8() {
        assert_eq!(encode("caf\u{e9}"), "caf%C3%A9");
        assert_eq!(encode("\u{65e5}\u{672c}"), "%E6%97%A5%E6%9C%AC");
        // U+1F600 encodes as four UTF-8 bytes.
        assert_eq!(encode("\u{1f600}"), "%F0%9F%98%80");
    }

    #[test]
    fn test_newline_and_tab() {
        assert_eq!(encode("a\tb\nc"), "a%09b%0Ac");
    }

    #[test]
    fn test_decode_round_trip() {
        for text in ["", "hello world", "caf\u{e9} \u{1f600}", "a+b=c&d", "100%"] {
            assert_eq!(decode(&encode(text)).unwrap(), text);
        }
    }

    #[test]
    fn test_decode_plus_is_literal() {
        assert_eq!(decode("a+b").unwrap(), "a+b");
    }

    #[test]
    fn test_decode_truncated_escape() {
        assert_eq!(decode("abc%4"), Err(DecodeError::BadEscape(3)));
        assert_eq!(decode("%"), Err(DecodeError::BadEscape(0)));
    }

    #[test]
    fn test_decode_non_hex_escape() {
        assert_eq!(decode("%zz"), Err(DecodeError::BadEscape(0)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert_eq!(decode("%FF%FE"), Err(DecodeError::InvalidUtf8));
    }
}
