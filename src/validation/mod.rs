use std::fmt;

use crate::error::AppError;

pub const TRANSACTION_ID_LEN: usize = 10;
pub const OTP_LEN: usize = 6;
pub const PHONE_MIN_LEN: usize = 8;
pub const PHONE_MAX_LEN: usize = 13;

/// Delivery channel derived from the user id shape: digits mean a phone
/// number, an address with '@' means email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpChannel {
    Phone,
    Email,
}

impl OtpChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpChannel::Phone => "PHONE",
            OtpChannel::Email => "EMAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

pub type ValidationResult<T = ()> = Result<T, ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

fn is_phone(value: &str) -> bool {
    value.len() >= PHONE_MIN_LEN
        && value.len() <= PHONE_MAX_LEN
        && value.chars().all(|ch| ch.is_ascii_digit())
}

fn is_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// A user id is the contact address the OTP goes to. Returns the derived
/// channel instead of stashing it in shared state.
pub fn validate_user_id(user_id: &str) -> ValidationResult<OtpChannel> {
    let user_id = sanitize_string(user_id);
    validate_required("user_id", &user_id)?;

    if is_phone(&user_id) {
        Ok(OtpChannel::Phone)
    } else if is_email(&user_id) {
        Ok(OtpChannel::Email)
    } else {
        Err(ValidationError::new(
            "user_id",
            "must be a phone number or an email address",
        ))
    }
}

pub fn validate_transaction_id(transaction_id: &str) -> ValidationResult {
    validate_required("transaction_id", transaction_id)?;

    if transaction_id.len() != TRANSACTION_ID_LEN
        || !transaction_id.chars().all(|ch| ch.is_ascii_digit())
    {
        return Err(ValidationError::new(
            "transaction_id",
            format!("must be exactly {} digits", TRANSACTION_ID_LEN),
        ));
    }

    Ok(())
}

pub fn validate_otp_format(otp: &str) -> ValidationResult {
    validate_required("otp", otp)?;

    if otp.len() != OTP_LEN || !otp.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new(
            "otp",
            format!("must be exactly {} digits", OTP_LEN),
        ));
    }

    Ok(())
}

pub fn validate_individual_id(individual_id: &str) -> ValidationResult {
    let individual_id = sanitize_string(individual_id);
    validate_required("individual_id", &individual_id)?;

    if !individual_id.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new(
            "individual_id",
            "must contain only digits",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn derives_phone_channel() {
        assert_eq!(validate_user_id("9395910872").unwrap(), OtpChannel::Phone);
        assert_eq!(validate_user_id(" 9395910872 ").unwrap(), OtpChannel::Phone);
    }

    #[test]
    fn derives_email_channel() {
        assert_eq!(
            validate_user_id("resident@example.com").unwrap(),
            OtpChannel::Email
        );
    }

    #[test]
    fn rejects_malformed_user_ids() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("12345").is_err());
        assert!(validate_user_id("not-an-address").is_err());
        assert!(validate_user_id("name@nodot").is_err());
        assert!(validate_user_id("@example.com").is_err());
    }

    #[test]
    fn validates_transaction_id() {
        assert!(validate_transaction_id("1234567890").is_ok());
        assert!(validate_transaction_id("123456789").is_err());
        assert!(validate_transaction_id("12345678901").is_err());
        assert!(validate_transaction_id("12345abcde").is_err());
        assert!(validate_transaction_id("").is_err());
    }

    #[test]
    fn validates_otp_format() {
        assert!(validate_otp_format("111111").is_ok());
        assert!(validate_otp_format("11111").is_err());
        assert!(validate_otp_format("1111111").is_err());
        assert!(validate_otp_format("11a111").is_err());
    }

    #[test]
    fn validates_individual_id() {
        assert!(validate_individual_id("7841261580").is_ok());
        assert!(validate_individual_id("78412-61580").is_err());
        assert!(validate_individual_id("").is_err());
    }
}
