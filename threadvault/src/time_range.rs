//! Time token resolution for `after` / `before`.
//!
//! Grammar:
//!
//! ```text
//! token    := epoch | relative
//! epoch    := digits                 (absolute epoch seconds)
//! relative := digits ("d" | "h" | "m")  (that much time back from now)
//! ```
//!
//! Relative tokens always subtract from `now`, whichever bound they are used for.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_MINUTE: i64 = 60;

/// Resolve a time token to absolute epoch seconds.
pub fn resolve(token: &str, now: i64) -> Result<i64, ValidationError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(invalid(token, "empty time value"));
    }
    if token.starts_with('-') {
        return Err(invalid(token, "negative time values are not allowed"));
    }

    if token.bytes().all(|b| b.is_ascii_digit()) {
        return token
            .parse::<i64>()
            .map_err(|_| invalid(token, "epoch value out of range"));
    }

    let unit_start = token.len() - token.chars().last().map_or(0, char::len_utf8);
    let (digits, unit) = token.split_at(unit_start);
    let unit_seconds = match unit.to_ascii_lowercase().as_str() {
        "d" => SECONDS_PER_DAY,
        "h" => SECONDS_PER_HOUR,
        "m" => SECONDS_PER_MINUTE,
        _ => return Err(invalid(token, "expected an epoch or <n>d, <n>h, <n>m")),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(token, "expected an epoch or <n>d, <n>h, <n>m"));
    }

    digits
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_seconds))
        .and_then(|offset| now.checked_sub(offset))
        .ok_or_else(|| invalid(token, "relative time out of range"))
}

fn invalid(token: &str, reason: &str) -> ValidationError {
    ValidationError::new("time", format!("{reason}: '{token}'"))
}

/// Resolved `[after, before]` bounds in epoch seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub after: Option<i64>,
    pub before: Option<i64>,
}

impl TimeRange {
    /// Resolve both optional tokens, rejecting `after > before`.
    pub fn from_tokens(
        after: Option<&str>,
        before: Option<&str>,
        now: i64,
    ) -> Result<Self, ValidationError> {
        let after = after
            .map(|t| resolve(t, now).map_err(|e| e.for_field("after")))
            .transpose()?;
        let before = before
            .map(|t| resolve(t, now).map_err(|e| e.for_field("before")))
            .transpose()?;

        if let (Some(a), Some(b)) = (after, before) {
            if a > b {
                return Err(ValidationError::new(
                    "after",
                    format!("after ({a}) is later than before ({b})"),
                ));
            }
        }

        Ok(Self { after, before })
    }

    pub fn is_empty(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_relative_units() {
        assert_eq!(resolve("30d", NOW).unwrap(), NOW - 2_592_000);
        assert_eq!(resolve("24h", NOW).unwrap(), NOW - 86_400);
        assert_eq!(resolve("60m", NOW).unwrap(), NOW - 3_600);
        assert_eq!(resolve("7D", NOW).unwrap(), NOW - 604_800);
    }

    #[test]
    fn test_absolute_epoch() {
        assert_eq!(resolve("100", NOW).unwrap(), 100);
        assert_eq!(resolve(" 1500000000 ", NOW).unwrap(), 1_500_000_000);
    }

    #[test]
    fn test_rejects_garbage() {
        for token in ["abc", "", "d", "10x", "1.5d", "3dd", "-5", "-5d", "10s", "10é"] {
            let err = resolve(token, NOW).unwrap_err();
            assert_eq!(err.field, "time", "token {token:?}");
        }
    }

    #[test]
    fn test_rejects_overflow() {
        assert!(resolve("999999999999999999d", NOW).is_err());
        assert!(resolve("99999999999999999999", NOW).is_err());
    }

    #[test]
    fn test_range_order_enforced() {
        let err = TimeRange::from_tokens(Some("1d"), Some("2d"), NOW).unwrap_err();
        assert_eq!(err.field, "after");

        let ok = TimeRange::from_tokens(Some("2d"), Some("1d"), NOW).unwrap();
        assert_eq!(ok.after, Some(NOW - 2 * 86_400));
        assert_eq!(ok.before, Some(NOW - 86_400));

        let equal = TimeRange::from_tokens(Some("100"), Some("100"), NOW).unwrap();
        assert_eq!(equal.after, equal.before);
    }

    #[test]
    fn test_errors_are_attributed_to_bound() {
        let err = TimeRange::from_tokens(None, Some("soon"), NOW).unwrap_err();
        assert_eq!(err.field, "before");
    }
}
