//! Input validation run before a form is submitted.

use crate::common::models::{NewPost, NewReport, RegisterRequest};
use thiserror::Error;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 8;
pub const OTP_LEN: usize = 6;
pub const TITLE_MAX: usize = 200;
pub const CONTENT_MAX: usize = 10_000;
pub const MAX_TAGS: usize = 5;
pub const REASON_MAX: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Username must be between 3 and 30 characters")]
    UsernameLength,
    #[error("Username may only contain letters, numbers, underscores and dots")]
    UsernameCharacters,
    #[error("Password must be at least 8 characters")]
    PasswordTooShort,
    #[error("Password must contain at least one letter and one number")]
    PasswordTooWeak,
    #[error("The code must be 6 digits")]
    InvalidOtp,
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("A post can have at most 5 tags")]
    TooManyTags,
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::Required("Email"));
    }
    let (local, domain) = email.split_once('@').ok_or(ValidationError::InvalidEmail)?;
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::Required("Username"));
    }
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ValidationError::UsernameLength);
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(ValidationError::UsernameCharacters);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required("Password"));
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::PasswordTooShort);
    }
    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Err(ValidationError::PasswordTooWeak);
    }
    Ok(())
}

pub fn validate_otp(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.len() == OTP_LEN && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidOtp)
    }
}

fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn validate_post(post: &NewPost) -> Result<(), ValidationError> {
    bounded("Title", &post.title, TITLE_MAX)?;
    bounded("Content", &post.content, CONTENT_MAX)?;
    if post.tags.len() > MAX_TAGS {
        return Err(ValidationError::TooManyTags);
    }
    Ok(())
}

pub fn validate_report_reason(reason: &str) -> Result<(), ValidationError> {
    bounded("Reason", reason, REASON_MAX)
}

pub fn validate_report(report: &NewReport) -> Result<(), ValidationError> {
    validate_report_reason(&report.reason)
}

pub fn validate_registration(request: &RegisterRequest) -> Result<(), ValidationError> {
    validate_username(&request.username)?;
    validate_email(&request.email)?;
    validate_password(&request.password)
}
