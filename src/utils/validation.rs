use std::borrow::Cow;
use validator::{ValidateEmail, ValidationError};

/// Every address in a share request must be well formed.
pub fn validate_emails(emails: &[String]) -> Result<(), ValidationError> {
    if let Some(bad) = emails.iter().find(|e| !e.trim().validate_email()) {
        let mut error = ValidationError::new("email");
        error.message = Some(Cow::Owned(format!("{} is not a valid email address", bad)));
        return Err(error);
    }
    Ok(())
}

/// Trims, lowercases and de-duplicates addresses while keeping request order.
pub fn normalize_emails(emails: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    emails
        .iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty() && seen.insert(e.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_emails() {
        assert!(validate_emails(&["a@example.com".into(), " b@example.org ".into()]).is_ok());

        let err = validate_emails(&["a@example.com".into(), "not-an-email".into()]).unwrap_err();
        assert!(err.message.unwrap().contains("not-an-email"));
    }

    #[test]
    fn test_normalize_emails() {
        let emails = vec![
            "A@Example.com".to_string(),
            "a@example.com ".to_string(),
            "b@example.com".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(normalize_emails(&emails), vec!["a@example.com", "b@example.com"]);
    }
}
