//! Engine-boundary error type.
//!
//! The core never exposes more than one error type across the public API
//! (see spec §7): every top-level operation returns `Result<T, EngineError>`.
//! Sub-kinds exist only to give callers a `matches!`-able handle; the
//! documented contract is the message text, not the variant name.

use thiserror::Error;

/// The single error type returned from every [`crate::Engine`] operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad caller input: empty content, empty query, unknown id, empty word list.
    #[error("input error: {0}")]
    Input(String),

    /// Underlying document parse/IO/write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Attempt to update/move a block that does not exist.
    #[error("invariant error: {0}")]
    Invariant(String),
}

impl EngineError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// True for [`EngineError::Input`].
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    /// True for [`EngineError::Storage`].
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
