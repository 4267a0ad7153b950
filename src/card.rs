// 💳 Card Classifier - raw MagnetCards field → CardIdentity
//
// The field is either a bare token ("123", "456a") or a comma list
// ("123,456a,789 old"). Numeric tokens are live cards, anything else is a
// retired card whose number is the last run of digits in the token.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Suffix written next to a retired card number in output reports
pub const SUPERSEDED_MARK: &str = "(удалена)";

fn digit_run() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

// ============================================================================
// CARD IDENTITY
// ============================================================================

/// One owner's cards: the live one (if any) plus every retired number.
///
/// Never empty: `active.is_some() || !superseded.is_empty()` holds for every
/// value produced by [`parse_card_identity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIdentity {
    pub active: Option<String>,
    pub superseded: Vec<String>,
}

impl CardIdentity {
    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Every card number this identity knows, live one first
    pub fn all_numbers(&self) -> impl Iterator<Item = &str> {
        self.active
            .as_deref()
            .into_iter()
            .chain(self.superseded.iter().map(String::as_str))
    }
}

/// Parse failure with the substring that could not be classified
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} in '{input}'")]
pub struct CardParseError {
    pub input: String,
    pub reason: &'static str,
}

// ============================================================================
// PARSER
// ============================================================================

pub fn is_card_number(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Last run of digits inside a retired-card token ("456a" → "456")
pub fn extract_digits(token: &str) -> Option<&str> {
    digit_run().find_iter(token).last().map(|m| m.as_str())
}

pub fn parse_card_identity(raw: &str) -> Result<CardIdentity, CardParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CardParseError {
            input: raw.to_string(),
            reason: "empty card field",
        });
    }

    let mut identity = CardIdentity {
        active: None,
        superseded: Vec::new(),
    };

    if !trimmed.contains(',') {
        if is_card_number(trimmed) {
            identity.active = Some(trimmed.to_string());
        } else {
            let digits = extract_digits(trimmed).ok_or_else(|| CardParseError {
                input: trimmed.to_string(),
                reason: "no card number",
            })?;
            identity.superseded.push(digits.to_string());
        }
        return Ok(identity);
    }

    for token in trimmed.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }

        if is_card_number(token) {
            // Several live numbers in one field: the last one wins
            if let Some(previous) = identity.active.replace(token.to_string()) {
                tracing::debug!(previous = %previous, card = token, "live card overwritten within one field");
            }
        } else if let Some(digits) = extract_digits(token) {
            identity.superseded.push(digits.to_string());
        } else {
            tracing::warn!(token, field = trimmed, "card token without digits skipped");
        }
    }

    if identity.active.is_none() && identity.superseded.is_empty() {
        return Err(CardParseError {
            input: trimmed.to_string(),
            reason: "no card number",
        });
    }

    Ok(identity)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_numeric_is_active() {
        for raw in ["123", "0042", "9001234567", " 77 "] {
            let identity = parse_card_identity(raw).unwrap();
            assert_eq!(identity.active.as_deref(), Some(raw.trim()));
            assert!(identity.superseded.is_empty());
        }
    }

    #[test]
    fn test_bare_non_numeric_is_superseded() {
        let identity = parse_card_identity("456a").unwrap();
        assert_eq!(identity.active, None);
        assert_eq!(identity.superseded, vec!["456".to_string()]);

        let identity = parse_card_identity("old 789").unwrap();
        assert_eq!(identity.superseded, vec!["789".to_string()]);
    }

    #[test]
    fn test_trailing_digit_run_wins() {
        let identity = parse_card_identity("12x345").unwrap();
        assert_eq!(identity.superseded, vec!["345".to_string()]);
    }

    #[test]
    fn test_comma_list() {
        let identity = parse_card_identity("123,456a").unwrap();
        assert_eq!(identity.active.as_deref(), Some("123"));
        assert_eq!(identity.superseded, vec!["456".to_string()]);

        let identity = parse_card_identity("456a, 789b").unwrap();
        assert_eq!(identity.active, None);
        assert_eq!(identity.superseded, vec!["456".to_string(), "789".to_string()]);
    }

    #[test]
    fn test_last_numeric_token_wins() {
        let identity = parse_card_identity("111,222a,333").unwrap();
        assert_eq!(identity.active.as_deref(), Some("333"));
        assert_eq!(identity.superseded, vec!["222".to_string()]);
    }

    #[test]
    fn test_bare_without_digits_fails() {
        let err = parse_card_identity("deleted").unwrap_err();
        assert_eq!(err.input, "deleted");
        assert_eq!(err.to_string(), "no card number in 'deleted'");
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(parse_card_identity("").is_err());
        assert!(parse_card_identity("   ").is_err());
        assert!(parse_card_identity(" , ,").is_err());
    }

    #[test]
    fn test_list_token_without_digits_is_skipped() {
        let identity = parse_card_identity("123,lost").unwrap();
        assert_eq!(identity.active.as_deref(), Some("123"));
        assert!(identity.superseded.is_empty());

        assert!(parse_card_identity("lost,gone").is_err());
    }

    #[test]
    fn test_all_numbers() {
        let identity = parse_card_identity("5a,6,7b").unwrap();
        let numbers: Vec<&str> = identity.all_numbers().collect();
        assert_eq!(numbers, vec!["6", "5", "7"]);
    }
}
