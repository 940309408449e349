//! Field-level input checks shared by the entity constructors.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::ValidationError;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("slug pattern compiles"));

/// Trimmed, non-empty text
pub fn required_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(trimmed.to_string())
}

/// `None` for blank input, otherwise the trimmed text
#[must_use]
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Lower-cased address; blank input means "no email"
pub fn optional_email(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    match optional_text(value) {
        None => Ok(None),
        Some(email) if EMAIL.is_match(&email) => Ok(Some(email.to_lowercase())),
        Some(email) => Err(ValidationError::Invalid {
            field: "email",
            reason: format!("'{email}' is not an email address"),
        }),
    }
}

/// Percentage in `[0, 100]`
pub fn percentage(field: &'static str, value: Decimal) -> Result<Decimal, ValidationError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field,
            min: Decimal::ZERO,
            max: Decimal::ONE_HUNDRED,
            value,
        });
    }
    Ok(value)
}

pub fn non_negative(field: &'static str, value: Decimal) -> Result<Decimal, ValidationError> {
    if value < Decimal::ZERO {
        return Err(ValidationError::Invalid {
            field,
            reason: format!("{value} is negative"),
        });
    }
    Ok(value)
}

/// Lower-case ascii, digits and underscores
#[must_use]
pub fn is_slug(value: &str) -> bool {
    SLUG.is_match(value)
}

/// Trim, lower-case, drop blanks and duplicates, keep first-seen order
#[must_use]
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn emails() {
        assert_eq!(
            optional_email(Some(" Ana@Example.COM ")).unwrap(),
            Some("ana@example.com".to_string())
        );
        assert_eq!(optional_email(Some("  ")).unwrap(), None);
        assert!(optional_email(Some("ana@")).is_err());
        assert!(optional_email(Some("not an email")).is_err());
    }

    #[test]
    fn percentages() {
        assert!(percentage("rate", dec!(0)).is_ok());
        assert!(percentage("rate", dec!(100)).is_ok());
        assert!(percentage("rate", dec!(100.01)).is_err());
        assert!(percentage("rate", dec!(-1)).is_err());
    }

    #[test]
    fn tags_are_normalized() {
        let tags = vec![
            "VIP".to_string(),
            " honeymoon ".to_string(),
            "vip".to_string(),
            String::new(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["vip", "honeymoon"]);
    }

    #[test]
    fn slugs() {
        assert!(is_slug("seat_class"));
        assert!(!is_slug("Seat Class"));
        assert!(!is_slug(""));
    }
}
