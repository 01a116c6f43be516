//! Function call and function result payloads.
//!
//! These are the two non-content segment kinds a message may carry: a call
//! requested by the assistant, and the invocation result reported back.

use serde::{Deserialize, Serialize};

/// A function/tool call requested by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Call ID (used to match with the invocation result)
    #[serde(rename = "callId", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name
    pub name: String,
    /// Arguments as JSON value
    #[serde(rename = "input")]
    pub arguments: serde_json::Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            call_id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

/// Structured output of one function invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FunctionOutput {
    /// Plain text output
    Text { text: String },
    /// Structured JSON output
    Json { value: serde_json::Value },
    /// The invocation failed; the error text is reported to the model
    Error { message: String },
}

impl FunctionOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::Json { value }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Best-effort text rendering for diagnostics.
    pub fn to_text_lossy(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Json { value } => value.to_string(),
            Self::Error { message } => message.clone(),
        }
    }
}

/// The result of executing a previously requested function call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResult {
    /// Call ID this result answers
    #[serde(rename = "callId", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name
    pub name: String,
    /// Structured output
    pub output: FunctionOutput,
}

impl FunctionResult {
    pub fn new(name: impl Into<String>, output: FunctionOutput) -> Self {
        Self {
            call_id: None,
            name: name.into(),
            output,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}
