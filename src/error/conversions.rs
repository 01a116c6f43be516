//! Type conversions for PromptError
//!
//! This module contains From trait implementations for converting
//! common error types into PromptError.

use super::types::PromptError;

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
