//! Concrete prompts and the provider-independent completion value.

use serde::{Deserialize, Serialize};

use crate::error::{PromptError, Result};
use crate::types::message::Message;
use crate::types::prompt::PromptValue;
use crate::types::role::Role;

/// Why the provider stopped producing output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model completed its response naturally.
    Stop,
    /// The response hit the token limit.
    Length,
    /// The model stopped to request a function call.
    FunctionCall,
    /// Content was filtered by the provider.
    ContentFilter,
    /// The provider reported an error condition as the stop cause.
    Error,
    /// Provider-specific reason not covered above.
    Other(String),
}

/// A single-body text-completion prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPrompt {
    /// The full flattened body, kept as a composable value so collaborators
    /// can still inspect per-component metadata.
    pub content: PromptValue,
}

impl TextPrompt {
    pub fn new(content: PromptValue) -> Self {
        Self { content }
    }
}

/// An ordered list of role-tagged chat messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub messages: Vec<Message>,
}

impl ChatPrompt {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message, folding it into the last one when roles match.
    pub fn fold_in(&mut self, message: Message) -> Result<()> {
        match self.messages.last_mut() {
            Some(last) if last.role == message.role => last.append(message),
            _ => {
                self.messages.push(message);
                Ok(())
            }
        }
    }
}

/// The two concrete request shapes, matched exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Prompt {
    Text(TextPrompt),
    Chat(ChatPrompt),
}

impl Prompt {
    pub fn as_text(&self) -> Option<&TextPrompt> {
        match self {
            Self::Text(prompt) => Some(prompt),
            Self::Chat(_) => None,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatPrompt> {
        match self {
            Self::Chat(prompt) => Some(prompt),
            Self::Text(_) => None,
        }
    }
}

/// The provider-independent result of one exchange.
///
/// Holds the prompt history including the produced message, the message
/// itself, and the stop reason when one was reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub prompt: ChatPrompt,
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl Completion {
    /// Build a completion, always applying the continuation fold.
    ///
    /// When the prompt's last message and the new message are both
    /// assistant-authored, the new content is appended onto that last
    /// message instead of opening a duplicate assistant turn, and
    /// `Completion::message` is the merged message.
    pub fn new(
        mut prompt: ChatPrompt,
        message: Message,
        stop_reason: Option<StopReason>,
    ) -> Result<Self> {
        let folds = message.role == Role::Assistant
            && prompt.last().is_some_and(|last| last.role == Role::Assistant);
        let message = if folds {
            let last = prompt.messages.last_mut().expect("checked non-empty");
            last.append(message)?;
            last.clone()
        } else {
            prompt.messages.push(message.clone());
            message
        };
        Ok(Self {
            prompt,
            message,
            stop_reason,
        })
    }

    /// Multi-way coalescing of completion partials is deliberately
    /// unsupported: no merge semantics are defined for it, and callers must
    /// coalesce at the message level and synthesize the completion after.
    pub fn coalesce<I>(_partials: I) -> Result<Completion>
    where
        I: IntoIterator<Item = crate::streaming::CompletionEvent>,
    {
        Err(PromptError::UnsupportedCompletionCoalescing)
    }
}
