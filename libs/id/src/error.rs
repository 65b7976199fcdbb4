//! Error types for logical ID validation.

use thiserror::Error;

/// Errors that can occur when building or parsing logical IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("logical ID cannot be empty")]
    Empty,

    /// The ID exceeds the provider's length limit.
    #[error("logical ID '{id}' is {len} characters (max {max})")]
    TooLong { id: String, len: usize, max: usize },

    /// The ID contains a character outside `[A-Za-z0-9]`.
    #[error("logical ID '{id}' contains invalid character {ch:?}")]
    InvalidCharacter { id: String, ch: char },

    /// The ID does not start with a letter.
    #[error("logical ID '{0}' must start with a letter")]
    MustStartWithLetter(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
