//! The provider-independent streaming event shape.
//!
//! Collaborators translate their vendor wire events into
//! [`CompletionEvent`]s; the core drives the source and never inspects
//! vendor payloads.

use std::pin::Pin;

use futures::Stream;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{PromptError, Result};
use crate::types::completion::StopReason;
use crate::types::message::MessagePartial;

/// One incremental event from a completion event source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// The partial message carried by this event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessagePartial>,
    /// The stop reason carried by this event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl CompletionEvent {
    /// An event carrying a message partial.
    pub fn delta(message: MessagePartial) -> Self {
        Self {
            message: Some(message),
            stop_reason: None,
        }
    }

    /// A terminal event carrying only a stop reason.
    pub fn stop(reason: StopReason) -> Self {
        Self {
            message: None,
            stop_reason: Some(reason),
        }
    }

    pub fn with_stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = Some(reason);
        self
    }
}

/// The async event sequence a collaborator supplies.
pub type CompletionEventSource =
    Pin<Box<dyn Stream<Item = Result<CompletionEvent>> + Send>>;

/// Deferred construction of an event source.
///
/// Invoked exactly once, at first subscription, so the underlying call is
/// not made until an observer appears.
pub type EventSourceFactory =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<CompletionEventSource>> + Send>;

/// Box a plain iterator of events into a ready event source.
pub fn event_source_from_iter<I>(events: I) -> CompletionEventSource
where
    I: IntoIterator<Item = std::result::Result<CompletionEvent, PromptError>>,
    I::IntoIter: Send + 'static,
{
    Box::pin(futures::stream::iter(events))
}
