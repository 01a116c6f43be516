//! Streaming completion support.
//!
//! [`CompletionStream`] drives a collaborator-supplied
//! [`CompletionEventSource`] through its lifecycle, coalescing partial
//! messages as they arrive and producing a terminal
//! [`Completion`](crate::types::completion::Completion).

mod events;
mod stream;

pub use events::{
    CompletionEvent, CompletionEventSource, EventSourceFactory, event_source_from_iter,
};
pub use stream::{CompletionMessages, CompletionStream, StreamState};
