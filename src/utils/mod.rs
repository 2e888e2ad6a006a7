//! Utility functions.
//!
//! Lexical validators and small parsing helpers used across the crate.

use std::time::Duration;

/// Check a bot token against the expected shape: a numeric bot id,
/// a colon, and a non-empty secret of alphanumerics, dashes or
/// underscores (e.g. `123456:ABC-DEF_ghi`).
pub fn is_valid_token(token: &str) -> bool {
    let Some((id, secret)) = token.split_once(':') else {
        return false;
    };

    !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_digit())
        && !secret.is_empty()
        && secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Check an API method name: ASCII letters only (e.g. `sendMessage`).
pub fn is_valid_method(method: &str) -> bool {
    !method.is_empty() && method.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Redact the secret half of a token for log output.
///
/// Keeps the bot id visible so concurrent bots can be told apart.
pub fn redact_token(token: &str) -> String {
    match token.split_once(':') {
        Some((id, _)) => format!("{}:***", id),
        None => "***".to_string(),
    }
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h").
///
/// Supported units:
/// - ms: milliseconds
/// - s: seconds
/// - m: minutes
/// - h: hours
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(secs) = input.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let split = input.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = input.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_secs(amount * 60)),
        "h" => Some(Duration::from_secs(amount * 3600)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tokens() {
        assert!(is_valid_token("123:ABCdef"));
        assert!(is_valid_token("123456789:AAE_x-9fK2bqQ"));
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("123456789"));
        assert!(!is_valid_token(":ABCdef"));
        assert!(!is_valid_token("123:"));
        assert!(!is_valid_token("abc:ABCdef"));
        assert!(!is_valid_token("123:with space"));
        assert!(!is_valid_token("123:ABC:def"));
    }

    #[test]
    fn test_valid_methods() {
        assert!(is_valid_method("getMe"));
        assert!(is_valid_method("sendMessage"));
        assert!(!is_valid_method(""));
        assert!(!is_valid_method("send_message"));
        assert!(!is_valid_method("getUpdates2"));
        assert!(!is_valid_method("../bot"));
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(redact_token("123:ABCdef"), "123:***");
        assert_eq!(redact_token("garbage"), "***");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration(""), None);
    }
}
