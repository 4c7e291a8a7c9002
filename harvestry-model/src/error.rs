use std::fmt::{self, Display};

/// Errors produced by model constructors and parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidInstance(String),
    InvalidRunMode(String),
    InvalidProviderKind(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidInstance(raw) => {
                write!(f, "invalid index instance '{raw}', expected 0 or 1")
            }
            ModelError::InvalidRunMode(raw) => write!(f, "invalid run mode '{raw}'"),
            ModelError::InvalidProviderKind(raw) => {
                write!(f, "unknown provider kind '{raw}'")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
