//! Input checks that belong to the command line, not the pipeline.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("no text supplied")]
    Blank,
    #[error("text has {actual} characters, at least {min} are required")]
    TooShort { actual: usize, min: usize },
}

/// Reject text shorter than `min` characters once surrounding whitespace is
/// trimmed. `min == 0` disables the length check but not the blank check.
pub fn check_min_chars(text: &str, min: usize) -> Result<(), GateError> {
    let trimmed = text.trim();
    if trimmed.is_empty() && min > 0 {
        return Err(GateError::Blank);
    }
    let actual = trimmed.chars().count();
    if actual < min {
        return Err(GateError::TooShort { actual, min });
    }
    Ok(())
}
