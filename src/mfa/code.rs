//! Submitted MFA code classification.

use regex::Regex;

const BACKUP_CODE_PATTERN: &str = r"^[0-9a-fA-F]{6}-[0-9a-fA-F]{6}-[0-9a-fA-F]{6}$";

/// A submitted code, routed by shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedCode {
    /// Anything that is not a backup code; trimmed.
    Totp(String),
    /// `xxxxxx-xxxxxx-xxxxxx` hex backup code; lowercased.
    Backup(String),
}

impl ParsedCode {
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if is_backup_code(trimmed) {
            Self::Backup(trimmed.to_ascii_lowercase())
        } else {
            Self::Totp(trimmed.to_string())
        }
    }
}

/// Whether `value` has the backup code shape (case-insensitive).
#[must_use]
pub fn is_backup_code(value: &str) -> bool {
    Regex::new(BACKUP_CODE_PATTERN).is_ok_and(|regex| regex.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_codes_are_lowercased() {
        assert_eq!(
            ParsedCode::parse(" A1B2C3-D4E5F6-07890A "),
            ParsedCode::Backup("a1b2c3-d4e5f6-07890a".to_string())
        );
    }

    #[test]
    fn everything_else_is_totp() {
        assert_eq!(ParsedCode::parse("123456"), ParsedCode::Totp("123456".to_string()));
        assert_eq!(
            ParsedCode::parse("a1b2c3-d4e5f6"),
            ParsedCode::Totp("a1b2c3-d4e5f6".to_string())
        );
        assert_eq!(
            ParsedCode::parse("g1b2c3-d4e5f6-07890a"),
            ParsedCode::Totp("g1b2c3-d4e5f6-07890a".to_string())
        );
        assert_eq!(ParsedCode::parse(""), ParsedCode::Totp(String::new()));
    }
}
