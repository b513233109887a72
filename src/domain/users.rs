//! Account field rules for sign-up and sign-in payloads.

use super::error::DomainError;

pub const MAX_NAME_CHARS: usize = 128;
pub const MAX_EMAIL_CHARS: usize = 254;
pub const MAX_PASSWORD_CHARS: usize = 1024;

/// Validated sign-up payload.
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl NewAccount {
    pub fn parse(name: &str, email: &str, password: &str) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(DomainError::validation(format!(
                "name must be at most {MAX_NAME_CHARS} characters"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            email: normalize_email(email)?,
            password: validate_password(password)?,
        })
    }
}

/// Lower-cases and trims an address so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(DomainError::validation("email must not be empty"));
    }
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(DomainError::validation(format!(
            "email must be at most {MAX_EMAIL_CHARS} characters"
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            Ok(email.to_lowercase())
        }
        _ => Err(DomainError::validation("email must contain `@`")),
    }
}

pub fn validate_password(password: &str) -> Result<String, DomainError> {
    if password.is_empty() {
        return Err(DomainError::validation("password must not be empty"));
    }
    if password.chars().count() > MAX_PASSWORD_CHARS {
        return Err(DomainError::validation(format!(
            "password must be at most {MAX_PASSWORD_CHARS} characters"
        )));
    }
    Ok(password.to_string())
}
