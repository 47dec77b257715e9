use regex::Regex;
use std::sync::OnceLock;

use crate::errors::OpsError;

/// Minimum password length accepted by the platform's registration validator.
pub const MIN_PASSWORD_LEN: usize = 8;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // RFC 5322 simplified: local@domain.tld
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email regex is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    email.len() >= 5 && email_regex().is_match(email)
}

pub fn email(email: &str) -> Result<&str, OpsError> {
    let trimmed = email.trim();
    if is_valid_email(trimmed) {
        Ok(trimmed)
    } else {
        Err(OpsError::InvalidInput(format!("'{}' is not a valid email", email)))
    }
}

pub fn password(password: &str) -> Result<&str, OpsError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(OpsError::InvalidInput(format!(
            "password must have at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("student.e2e@test.com"));
        assert!(is_valid_email("user+tag@example.co.uk"));
        assert!(is_valid_email("  padded@example.com "));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user @example.com"));
    }

    #[test]
    fn test_password_length() {
        assert!(password("Senha123!").is_ok());
        assert!(matches!(password("short"), Err(OpsError::InvalidInput(_))));
    }
}
