//! promptic
//!
//! Provider-agnostic prompt composition and streaming completion state.
//!
//! Prompts are built from composable [`PromptValue`]s whose components carry
//! type-keyed context (role constraints, completion parameters, model hints).
//! Composition merges contexts under a deterministic algebra; conversion
//! flattens a composed value into a concrete text prompt or an ordered chat
//! message list; [`streaming::CompletionStream`] coalesces provider deltas
//! into messages and a terminal [`Completion`].
//!
//! Provider transports, HTTP, retries, and wire formats live in collaborator
//! crates; this crate only defines the shared model and its laws.
#![deny(unsafe_code)]

pub mod convert;
pub mod error;
pub mod streaming;
pub mod types;

pub use error::{PromptError, Result};
pub use types::{
    ChatPrompt, Completion, CompletionKind, ContextMap, Message, MessagePartial, Prompt,
    PromptComponent, PromptValue, Role, RoleConstraint, StopReason, TextPrompt,
};

/// One-stop imports for typical usage.
pub mod prelude {
    pub use crate::error::{PromptError, Result};
    pub use crate::streaming::{
        CompletionEvent, CompletionEventSource, CompletionStream, StreamState,
    };
    pub use crate::types::{
        ChatPrompt, Completion, CompletionKind, CompletionParams, ContextMap, FunctionCall,
        FunctionOutput, FunctionResult, ImageSource, Message, MessagePartial, Prompt,
        PromptComponent, PromptValue, Resolvable, Role, RoleConstraint, StopReason, TextPrompt,
    };
}
