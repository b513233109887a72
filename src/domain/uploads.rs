//! Upload naming rules.

use std::path::{Component, Path};

use super::error::DomainError;

pub const MAX_FILE_NAME_BYTES: usize = 255;

/// Accept a single normal path component without separators or control characters.
pub fn validate_file_name(file_name: &str) -> Result<(), DomainError> {
    if file_name.is_empty()
        || file_name.len() > MAX_FILE_NAME_BYTES
        || file_name.contains(['/', '\\'])
        || file_name.chars().any(char::is_control)
    {
        return Err(DomainError::validation("invalid file name"));
    }

    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(DomainError::validation("invalid file name")),
    }
}
