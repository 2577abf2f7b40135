//! Input validation for every mutating operation.
//!
//! Each operation validates into one of these structs before touching the
//! rate limiter or the store. Only the first failing field is reported.

use std::borrow::Cow;

use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use crate::types::{AppError, AppResult};

pub const MAX_QUESTION_LEN: usize = 500;
pub const MAX_OPTION_LEN: usize = 200;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
pub const MAX_COMMENT_LEN: usize = 500;
pub const MIN_PASSWORD_LEN: usize = 6;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn required_uuid(value: &str, missing: &'static str, invalid: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(error("required", missing));
    }
    Uuid::parse_str(value.trim())
        .map(|_| ())
        .map_err(|_| error("uuid", invalid))
}

fn validate_poll_id(value: &str) -> Result<(), ValidationError> {
    required_uuid(value, "Poll ID is required", "Poll ID is invalid")
}

fn validate_option_id(value: &str) -> Result<(), ValidationError> {
    required_uuid(value, "Option ID is required", "Option ID is invalid")
}

fn validate_comment_id(value: &str) -> Result<(), ValidationError> {
    required_uuid(value, "Comment ID is required", "Comment ID is invalid")
}

fn validate_user_id(value: &str) -> Result<(), ValidationError> {
    required_uuid(value, "User ID is required", "User ID is invalid")
}

fn validate_question(value: &str) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(error("required", "Poll question is required"));
    }
    if len > MAX_QUESTION_LEN {
        return Err(error("length", "Question too long"));
    }
    Ok(())
}

fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.len() < MIN_OPTIONS {
        return Err(error("length", "At least 2 options required"));
    }
    if options.len() > MAX_OPTIONS {
        return Err(error("length", "Maximum 10 options allowed"));
    }
    for option in options {
        let len = option.trim().chars().count();
        if len == 0 {
            return Err(error("required", "Option cannot be empty"));
        }
        if len > MAX_OPTION_LEN {
            return Err(error("length", "Option too long"));
        }
    }
    Ok(())
}

fn validate_comment(value: &str) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(error("required", "Comment cannot be empty"));
    }
    // Measured on the trimmed text, which is what gets stored
    if len > MAX_COMMENT_LEN {
        return Err(error("length", "Comment is too long"));
    }
    Ok(())
}

fn validate_email_address(value: &str) -> Result<(), ValidationError> {
    if value.trim().to_string().validate_email() {
        Ok(())
    } else {
        Err(error("email", "Invalid email address."))
    }
}

fn validate_password(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(error("length", "Password must be at least 6 characters."));
    }
    Ok(())
}

fn validate_role(value: &str) -> Result<(), ValidationError> {
    match value {
        "admin" | "default" => Ok(()),
        "" => Err(error("required", "Role is required")),
        _ => Err(error("role", "Role must be 'admin' or 'default'")),
    }
}

#[derive(Debug, Validate)]
pub struct VoteInput<'a> {
    #[validate(custom(function = "validate_option_id"))]
    pub option_id: &'a str,
    #[validate(custom(function = "validate_poll_id"))]
    pub poll_id: &'a str,
}

#[derive(Debug, Validate)]
pub struct CreatePollInput<'a> {
    #[validate(custom(function = "validate_question"))]
    pub question: &'a str,
    #[validate(custom(function = "validate_options"))]
    pub options: &'a [String],
}

#[derive(Debug, Validate)]
pub struct PollIdInput<'a> {
    #[validate(custom(function = "validate_poll_id"))]
    pub poll_id: &'a str,
}

#[derive(Debug, Validate)]
pub struct CommentInput<'a> {
    #[validate(custom(function = "validate_poll_id"))]
    pub poll_id: &'a str,
    #[validate(custom(function = "validate_comment"))]
    pub content: &'a str,
}

#[derive(Debug, Validate)]
pub struct CommentIdInput<'a> {
    #[validate(custom(function = "validate_comment_id"))]
    pub comment_id: &'a str,
}

#[derive(Debug, Validate)]
pub struct CredentialsInput<'a> {
    #[validate(custom(function = "validate_email_address"))]
    pub email: &'a str,
    #[validate(custom(function = "validate_password"))]
    pub password: &'a str,
}

#[derive(Debug, Validate)]
pub struct RoleInput<'a> {
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: &'a str,
    #[validate(custom(function = "validate_role"))]
    pub role: &'a str,
}

/// First failing field message, in field-name order so the result is stable.
fn first_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(_, errs)| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid input".to_string())
}

pub fn validate_input<T: Validate>(input: &T) -> AppResult<()> {
    input
        .validate()
        .map_err(|errors| AppError::Validation(first_message(&errors)))
}

/// Parses an id that already passed validation.
pub fn parse_id(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| AppError::Validation("Invalid identifier".to_string()))
}
