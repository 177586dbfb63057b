//! Capture error types.

use std::fmt;

/// "Capture call failed" errors.
#[derive(Debug)]
pub enum RexError {
    /// Pattern failed to compile.
    InvalidPattern {
        /// Offending pattern text.
        pattern: String,
        /// Compiler error text.
        message: String,
    },
}

impl fmt::Display for RexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern { pattern, message } => {
                write!(f, "Invalid capture pattern {pattern:?}: {message}")
            }
        }
    }
}

impl std::error::Error for RexError {}
