//! Phone number normalization for mobile-money push payments.
//!
//! Users type numbers in whatever shape their phone shows them
//! (`0712 345 678`, `+254-712-345678`, `712345678`). The gateway only accepts
//! the canonical international form, so everything goes through [`normalize`]
//! before it can become a [`PhoneNumber`].

use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

/// Kenyan calling code.
pub const COUNTRY_CODE: &str = "254";
/// Calling code plus nine subscriber digits.
pub const PHONE_LENGTH: usize = 12;

const TRUNK_PREFIX: char = '0';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("phone number is empty")]
    Empty,

    #[error("phone number {normalized} has {length} characters, expected {PHONE_LENGTH} starting with {COUNTRY_CODE}")]
    BadFormat { normalized: String, length: usize },
}

impl ValidationError {
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::Empty => "empty",
            ValidationError::BadFormat { .. } => "bad_format",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ValidationError::Empty => "enter a valid number".to_string(),
            ValidationError::BadFormat { .. } => {
                format!("enter a valid number, e.g. 0712345678 or {COUNTRY_CODE}712345678")
            }
        }
    }
}

/// A phone number that is guaranteed to be in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits after the country code.
    pub fn subscriber(&self) -> &str {
        &self.0[COUNTRY_CODE.len()..]
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        normalize(value)
    }
}

/// Convert raw user input into a [`PhoneNumber`].
pub fn normalize(raw: &str) -> Result<PhoneNumber, ValidationError> {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = stripped.strip_prefix('+').unwrap_or(&stripped);

    if digits.is_empty() {
        return Err(ValidationError::Empty);
    }

    let normalized = if let Some(rest) = digits.strip_prefix(TRUNK_PREFIX) {
        format!("{COUNTRY_CODE}{rest}")
    } else if digits.starts_with(COUNTRY_CODE) {
        digits.to_string()
    } else {
        format!("{COUNTRY_CODE}{digits}")
    };

    let well_formed = normalized.starts_with(COUNTRY_CODE)
        && normalized.chars().all(|c| c.is_ascii_digit())
        && normalized.len() == PHONE_LENGTH;
    if !well_formed {
        let length = normalized.chars().count();
        return Err(ValidationError::BadFormat { normalized, length });
    }

    Ok(PhoneNumber(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trunk_prefix_is_replaced_by_country_code() {
        let phone = normalize("0712345678").expect("valid number");
        assert_eq!(phone.as_str(), "254712345678");
        assert_eq!(phone.subscriber(), "712345678");
    }

    #[test]
    fn trunk_prefix_keeps_trailing_digits_for_any_subscriber() {
        for subscriber in ["700000000", "712345678", "110987654", "799999999"] {
            let phone = normalize(&format!("0{subscriber}")).expect("valid number");
            assert_eq!(phone.as_str().len(), PHONE_LENGTH);
            assert!(phone.as_str().starts_with(COUNTRY_CODE));
            assert_eq!(phone.subscriber(), subscriber);
        }
    }

    #[test]
    fn international_forms_are_accepted() {
        assert_eq!(normalize("254712345678").unwrap().as_str(), "254712345678");
        assert_eq!(normalize("+254712345678").unwrap().as_str(), "254712345678");
        assert_eq!(normalize("+254 712-345-678").unwrap().as_str(), "254712345678");
    }

    #[test]
    fn bare_subscriber_gets_country_code_prepended() {
        assert_eq!(normalize("712345678").unwrap().as_str(), "254712345678");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(normalize(""), Err(ValidationError::Empty));
        assert_eq!(normalize("   "), Err(ValidationError::Empty));
        assert_eq!(normalize(" - "), Err(ValidationError::Empty));
        assert_eq!(normalize("+"), Err(ValidationError::Empty));
    }

    #[test]
    fn wrong_length_is_rejected_with_detail() {
        match normalize("07123") {
            Err(ValidationError::BadFormat { normalized, length }) => {
                assert_eq!(normalized, "2547123");
                assert_eq!(length, 7);
            }
            other => panic!("expected bad_format, got {:?}", other),
        }
        assert!(matches!(
            normalize("07123456789"),
            Err(ValidationError::BadFormat { length: 13, .. })
        ));
    }

    #[test]
    fn non_digits_are_rejected() {
        let err = normalize("07123456ab").unwrap_err();
        assert_eq!(err.reason(), "bad_format");
    }

    #[test]
    fn from_str_delegates_to_normalize() {
        let phone: PhoneNumber = "0712 345 678".parse().expect("valid number");
        assert_eq!(phone.to_string(), "254712345678");
    }
}
