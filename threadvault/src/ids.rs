//! Base36 record ids and `tN_` fullnames.

use crate::error::ValidationError;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of `u64::MAX` in base36
const MAX_BASE36_LEN: usize = 13;

pub fn base36_encode(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(MAX_BASE36_LEN);
    while n > 0 {
        buf.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

pub fn base36_decode(s: &str) -> Option<u64> {
    if s.is_empty()
        || s.len() > MAX_BASE36_LEN
        || !s.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

/// Decode a client-supplied id, accepting an optional `<prefix>_` fullname prefix.
///
/// `parse_id("t3_abc", "t3")` and `parse_id("ABC", "t3")` both yield the same value.
pub fn parse_id(raw: &str, prefix: &str) -> Result<u64, ValidationError> {
    let lowered = raw.trim().to_ascii_lowercase();
    let bare = lowered
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(&lowered);
    base36_decode(bare)
        .ok_or_else(|| ValidationError::new("id", format!("'{raw}' is not a valid base36 id")))
}

/// Render a fullname such as `t3_1a2b3c`
pub fn fullname(prefix: &str, id: u64) -> String {
    format!("{}_{}", prefix, base36_encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_values() {
        assert_eq!(base36_encode(0), "0");
        assert_eq!(base36_encode(35), "z");
        assert_eq!(base36_encode(36), "10");
        assert_eq!(base36_encode(2_214_236_161), "10mark1");
        assert_eq!(base36_encode(u64::MAX), "3w5e11264sgsf");
        assert_eq!(base36_decode("3w5e11264sgsf"), Some(u64::MAX));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(base36_decode(""), None);
        assert_eq!(base36_decode("not-base36"), None);
        assert_eq!(base36_decode("+10"), None);
        assert_eq!(base36_decode("zzzzzzzzzzzzzzzz"), None);
    }

    #[test]
    fn test_parse_id_with_and_without_prefix() {
        assert_eq!(parse_id("t3_10", "t3").unwrap(), 36);
        assert_eq!(parse_id("T3_10", "t3").unwrap(), 36);
        assert_eq!(parse_id("10", "t3").unwrap(), 36);
        assert!(parse_id("t3_", "t3").is_err());
        assert!(parse_id("t1_!!", "t1").is_err());
    }

    #[test]
    fn test_fullname() {
        assert_eq!(fullname("t5", 36), "t5_10");
    }
}
