//! Parsing error types
//!
//! Extraction itself never fails for a missing field; these errors describe
//! problems with page state that a strategy had to skip.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Embedded state could not be decoded: {reason}")]
    StateDecoding { reason: String },

    #[error("Embedded state assignment not found in markup")]
    StateNotFound,

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl ParsingError {
    pub fn state_decoding(reason: impl Into<String>) -> Self {
        Self::StateDecoding {
            reason: reason.into(),
        }
    }

    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the remaining strategies can still produce something useful
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::StateDecoding { .. } | Self::StateNotFound => true,
            Self::InvalidSelector { .. } => false,
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
