//! The core prompt data model.
//!
//! Values compose bottom-up: components carry contexts, prompt values carry
//! components, degeneration flattens values to segments, and conversion
//! turns segments into concrete text or chat prompts.

pub mod completion;
pub mod component;
pub mod context;
pub mod media;
pub mod message;
pub mod prompt;
pub mod role;
pub mod segment;
pub mod tools;

pub use completion::{ChatPrompt, Completion, Prompt, StopReason, TextPrompt};
pub use component::{ComponentPayload, LocalizedText, PromptComponent, Resolvable, VariableSlot};
pub use context::{
    CompletionKindKey, CompletionParams, CompletionParamsKey, ContextKey, ContextMap,
    ContextValue, ModelKey, RoleConstraintKey,
};
pub use media::ImageSource;
pub use message::{Message, MessagePartial, PartialKind};
pub use prompt::PromptValue;
pub use role::{CompletionKind, Role, RoleConstraint, RoleSet};
pub use segment::{Segment, SegmentPayload};
pub use tools::{FunctionCall, FunctionOutput, FunctionResult};
