//! Post field rules applied before anything reaches a repository.

use super::error::DomainError;

pub const MAX_TITLE_CHARS: usize = 255;

pub fn validate_title(title: &str) -> Result<String, DomainError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_body(body: &str) -> Result<String, DomainError> {
    if body.trim().is_empty() {
        return Err(DomainError::validation("body must not be empty"));
    }
    Ok(body.to_string())
}
