use std::sync::LazyLock;

use regex::Regex;

use crate::error::ApiError;

pub const JUSTIFICATION_MIN: usize = 20;
pub const JUSTIFICATION_MAX: usize = 500;
pub const CANCEL_REASON_MIN: usize = 10;
pub const CANCEL_REASON_MAX: usize = 200;

const PLACEHOLDERS: &[&str] = &[
    "teste", "aaa", "preciso", "test", "aaaa", "aaaaa", "bbb", "ccc", "xxx", "zzz", "asdf",
    "qwerty",
];

/// A placeholder word, optionally with its final letter repeated.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    let words: Vec<String> = PLACEHOLDERS
        .iter()
        .map(|w| format!("{}+", regex::escape(w)))
        .collect();
    Regex::new(&format!("^(?:{})$", words.join("|"))).expect("placeholder pattern is valid")
});

/// Length in characters, not bytes.
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

pub fn check_email(value: &str) -> Result<(), ApiError> {
    check_length("email", value, 3, 254)?;
    if !value.contains('@') {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }
    Ok(())
}

pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(&value.trim().to_lowercase())
}

pub fn check_justification(value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest("justification is required".into()));
    }
    if is_placeholder(value) {
        return Err(ApiError::BadRequest(
            "justification must describe why access is needed".into(),
        ));
    }
    check_length("justification", value, JUSTIFICATION_MIN, JUSTIFICATION_MAX)
}

pub fn check_cancel_reason(value: &str) -> Result<(), ApiError> {
    check_length("reason", value, CANCEL_REASON_MIN, CANCEL_REASON_MAX)
}
