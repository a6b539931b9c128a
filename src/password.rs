//! Password policy checks, run before any KDF work.

use thiserror::Error;

/// Floor for every configured minimum.
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password must be at least {min} characters")]
    TooShort { min: usize },
    #[error("Passwords do not match")]
    Mismatch,
}

/// Checks a new password and its confirmation. Length is counted in
/// characters, not bytes.
pub fn validate_new_password(
    password: &str,
    confirmation: &str,
    min_length: usize,
) -> Result<(), PasswordError> {
    let min = min_length.max(MIN_PASSWORD_LENGTH);
    if password.chars().count() < min {
        return Err(PasswordError::TooShort { min });
    }
    if password != confirmation {
        return Err(PasswordError::Mismatch);
    }
    Ok(())
}
