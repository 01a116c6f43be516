//! The completion stream state machine.
//!
//! Drives a collaborator-supplied event source through
//! `waiting → streaming → {completed | canceled | failed}`, applying the
//! partial coalescing law to every delta and exposing one coalesced
//! "current message" plus a terminal [`Completion`].

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{Future, Stream, StreamExt};
use uuid::Uuid;

use crate::error::{PromptError, Result};
use crate::streaming::events::{
    CompletionEvent, CompletionEventSource, EventSourceFactory, event_source_from_iter,
};
use crate::types::completion::{ChatPrompt, Completion, StopReason};
use crate::types::message::{Message, MessagePartial};
use crate::types::role::Role;

/// Lifecycle state of a [`CompletionStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed; the factory has not produced a source yet.
    Waiting,
    /// The source is live and deltas are being coalesced.
    Streaming,
    /// The source ended; the terminal completion is available.
    Completed,
    /// Externally canceled; the source was released.
    Canceled,
    /// A source or coalescing failure ended the stream.
    Failed,
}

impl StreamState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }
}

/// A single-consumer stream of coalesced messages over one provider call.
///
/// The underlying call is not made until the first subscription. Each
/// delta event merges into the running message under the coalescing law;
/// the subscriber observes message snapshots and, on natural end, a
/// terminal [`Completion`] with the continuation fold applied against the
/// originating prompt.
pub struct CompletionStream {
    prompt: ChatPrompt,
    state: StreamState,
    factory: Option<EventSourceFactory>,
    connecting: Option<BoxFuture<'static, Result<CompletionEventSource>>>,
    source: Option<CompletionEventSource>,
    current: Option<MessagePartial>,
    last_index: Option<u64>,
    stop_reason: Option<StopReason>,
    completion: Option<Completion>,
    subscribed: bool,
}

impl CompletionStream {
    /// Create a stream over `prompt` whose source is produced by `factory`
    /// at first subscription.
    pub fn new<F, Fut>(prompt: ChatPrompt, factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CompletionEventSource>> + Send + 'static,
    {
        Self {
            prompt,
            state: StreamState::Waiting,
            factory: Some(Box::new(move || Box::pin(factory()))),
            connecting: None,
            source: None,
            current: None,
            last_index: None,
            stop_reason: None,
            completion: None,
            subscribed: false,
        }
    }

    /// The degenerate non-streaming instance: one whole event for the
    /// completion's message, then the synthetic stop.
    pub fn from_completion(completion: Completion) -> Self {
        let mut prompt = completion.prompt;
        // The produced message is re-folded when the stream finishes.
        prompt.messages.pop();
        let message = completion.message;
        let stop = completion.stop_reason.unwrap_or(StopReason::Stop);
        Self::new(prompt, move || {
            std::future::ready(Ok(event_source_from_iter([
                Ok(CompletionEvent::delta(MessagePartial::whole(message))),
                Ok(CompletionEvent::stop(stop)),
            ])))
        })
    }

    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Snapshot of the current coalesced message, once a delta arrived.
    pub fn current_message(&self) -> Option<Message> {
        self.current.clone().map(finish_partial)
    }

    /// The most recent stop reason carried by an event.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// The terminal completion, available once the stream completed.
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Subscribe to the coalesced message sequence.
    ///
    /// The factory is invoked here, exactly once. The stream is
    /// single-consumer: a second subscription attempt is a programmer
    /// error, and re-driving requires constructing a new stream.
    pub fn subscribe(&mut self) -> Result<CompletionMessages<'_>> {
        if self.subscribed {
            return Err(PromptError::AlreadySubscribed);
        }
        if self.state.is_terminal() {
            return Err(PromptError::StreamClosed(self.state_name()));
        }
        let factory = self
            .factory
            .take()
            .ok_or(PromptError::AlreadySubscribed)?;
        tracing::debug!("completion stream subscribed; invoking source factory");
        self.connecting = Some(factory());
        self.subscribed = true;
        Ok(CompletionMessages { stream: self })
    }

    /// Cancel the stream, releasing the underlying source.
    ///
    /// Idempotent; events racing with the cancellation are dropped, never
    /// applied.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(state = ?self.state, "completion stream canceled");
        self.state = StreamState::Canceled;
        self.factory = None;
        self.connecting = None;
        self.source = None;
    }

    /// Drain the stream to its terminal completion.
    pub async fn collect(mut self) -> Result<Completion> {
        let mut messages = self.subscribe()?;
        while let Some(message) = messages.next().await {
            message?;
        }
        self.completion
            .take()
            .ok_or(PromptError::StreamClosed("canceled"))
    }

    const fn state_name(&self) -> &'static str {
        match self.state {
            StreamState::Waiting => "waiting",
            StreamState::Streaming => "streaming",
            StreamState::Completed => "completed",
            StreamState::Canceled => "canceled",
            StreamState::Failed => "failed",
        }
    }

    fn fail(&mut self, error: PromptError) -> Poll<Option<Result<Message>>> {
        tracing::debug!(%error, "completion stream failed");
        self.state = StreamState::Failed;
        self.source = None;
        self.connecting = None;
        Poll::Ready(Some(Err(error)))
    }

    /// Apply one event to the running message; `Ok(true)` when the
    /// coalesced message changed.
    fn apply_event(&mut self, event: CompletionEvent) -> Result<bool> {
        if let Some(reason) = event.stop_reason {
            self.stop_reason = Some(reason);
        }
        let Some(incoming) = event.message else {
            return Ok(false);
        };

        let incoming_index = incoming.index;
        let mut current = match self.current.take() {
            Some(mut current) => {
                // The law clears merged indices; re-stamp the last seen one
                // so ordering is enforced across the whole delta chain.
                current.index = self.last_index;
                current.coalesce(incoming)?
            }
            None => incoming,
        };
        if current.id.is_none() {
            current.id = Some(Uuid::new_v4());
        }
        current.index = None;
        if let Some(index) = incoming_index {
            self.last_index = Some(index);
        }
        self.current = Some(current);
        Ok(true)
    }

    fn poll_next_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Message>>> {
        loop {
            match self.state {
                StreamState::Waiting => {
                    let Some(connecting) = self.connecting.as_mut() else {
                        return Poll::Ready(None);
                    };
                    match connecting.as_mut().poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Ok(source)) => {
                            tracing::debug!("completion stream entered streaming state");
                            self.connecting = None;
                            self.source = Some(source);
                            self.state = StreamState::Streaming;
                        }
                        Poll::Ready(Err(error)) => return self.fail(error),
                    }
                }
                StreamState::Streaming => {
                    let Some(source) = self.source.as_mut() else {
                        return Poll::Ready(None);
                    };
                    match source.as_mut().poll_next(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Err(error))) => return self.fail(error),
                        Poll::Ready(Some(Ok(event))) => match self.apply_event(event) {
                            Err(error) => return self.fail(error),
                            Ok(true) => {
                                let snapshot = self
                                    .current
                                    .clone()
                                    .map(finish_partial)
                                    .expect("delta just applied");
                                return Poll::Ready(Some(Ok(snapshot)));
                            }
                            Ok(false) => continue,
                        },
                        Poll::Ready(None) => {
                            // Natural end: synthesize the terminal stop when
                            // the source never reported one.
                            if self.stop_reason.is_none() {
                                self.stop_reason = Some(StopReason::Stop);
                            }
                            let message = self
                                .current
                                .take()
                                .map(finish_partial)
                                .unwrap_or_else(|| Message::new(Role::Assistant, ""));
                            match Completion::new(
                                self.prompt.clone(),
                                message,
                                self.stop_reason.clone(),
                            ) {
                                Ok(completion) => {
                                    tracing::debug!("completion stream completed");
                                    self.completion = Some(completion);
                                    self.source = None;
                                    self.state = StreamState::Completed;
                                    return Poll::Ready(None);
                                }
                                Err(error) => return self.fail(error),
                            }
                        }
                    }
                }
                StreamState::Completed | StreamState::Canceled | StreamState::Failed => {
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("state", &self.state)
            .field("subscribed", &self.subscribed)
            .field("stop_reason", &self.stop_reason)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Provider messages default to assistant authorship when the source never
/// carried a role.
fn finish_partial(partial: MessagePartial) -> Message {
    let role = partial.role.unwrap_or(Role::Assistant);
    Message {
        id: partial.id,
        role,
        content: partial.content.unwrap_or_default(),
    }
}

/// Borrowing subscription over a [`CompletionStream`].
pub struct CompletionMessages<'a> {
    stream: &'a mut CompletionStream,
}

impl Stream for CompletionMessages<'_> {
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().stream.poll_next_message(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prompt::PromptValue;

    fn delta(role: Option<Role>, text: &str, index: u64) -> CompletionEvent {
        let mut partial = MessagePartial::delta(PromptValue::text(text)).with_index(index);
        partial.role = role;
        CompletionEvent::delta(partial)
    }

    fn stream_of(events: Vec<Result<CompletionEvent>>) -> CompletionStream {
        CompletionStream::new(ChatPrompt::default(), move || {
            std::future::ready(Ok(event_source_from_iter(events)))
        })
    }

    #[tokio::test]
    async fn in_order_deltas_coalesce_and_complete() {
        let mut stream = stream_of(vec![
            Ok(delta(Some(Role::User), "Hel", 0)),
            Ok(delta(None, "lo", 1)),
            Ok(CompletionEvent::stop(StopReason::Stop)),
        ]);

        {
            let mut messages = stream.subscribe().unwrap();
            let mut last = None;
            while let Some(message) = messages.next().await {
                last = Some(message.unwrap());
            }
            assert_eq!(last.unwrap().text_lossy(), "Hello");
        }

        assert_eq!(stream.state(), StreamState::Completed);
        let completion = stream.completion().unwrap();
        assert_eq!(completion.message.text_lossy(), "Hello");
        assert_eq!(completion.message.role, Role::User);
        assert_eq!(completion.stop_reason, Some(StopReason::Stop));
    }

    #[tokio::test]
    async fn out_of_order_deltas_fail_the_stream() {
        let mut stream = stream_of(vec![
            Ok(delta(Some(Role::User), "lo", 1)),
            Ok(delta(None, "Hel", 0)),
        ]);

        {
            let mut messages = stream.subscribe().unwrap();
            let first = messages.next().await.unwrap();
            assert!(first.is_ok());
            let second = messages.next().await.unwrap();
            assert!(matches!(
                second,
                Err(PromptError::NonMonotonicIndex {
                    previous: 1,
                    next: 0
                })
            ));
            // The failure is terminal; nothing further is delivered.
            assert!(messages.next().await.is_none());
        }
        assert_eq!(stream.state(), StreamState::Failed);
        assert!(stream.completion().is_none());
    }

    #[tokio::test]
    async fn end_of_source_synthesizes_a_stop() {
        let mut stream = stream_of(vec![Ok(delta(Some(Role::Assistant), "done", 0))]);
        {
            let mut messages = stream.subscribe().unwrap();
            while let Some(message) = messages.next().await {
                message.unwrap();
            }
        }
        assert_eq!(stream.state(), StreamState::Completed);
        assert_eq!(
            stream.completion().unwrap().stop_reason,
            Some(StopReason::Stop)
        );
    }

    #[tokio::test]
    async fn second_subscription_is_a_programmer_error() {
        let mut stream = stream_of(vec![]);
        {
            let _messages = stream.subscribe().unwrap();
        }
        assert!(matches!(
            stream.subscribe(),
            Err(PromptError::AlreadySubscribed)
        ));
    }

    #[tokio::test]
    async fn factory_runs_once_and_lazily() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut stream = CompletionStream::new(ChatPrompt::default(), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(event_source_from_iter(vec![])))
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        {
            let mut messages = stream.subscribe().unwrap();
            assert!(messages.next().await.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_is_terminal_and_idempotent() {
        let mut stream = stream_of(vec![Ok(delta(Some(Role::User), "x", 0))]);
        stream.cancel();
        stream.cancel();
        assert_eq!(stream.state(), StreamState::Canceled);
        assert!(matches!(
            stream.subscribe(),
            Err(PromptError::StreamClosed("canceled"))
        ));
    }

    #[tokio::test]
    async fn stream_assigns_a_stable_identity() {
        let mut stream = stream_of(vec![
            Ok(delta(Some(Role::Assistant), "a", 0)),
            Ok(delta(None, "b", 1)),
        ]);
        let mut messages = stream.subscribe().unwrap();
        let first = messages.next().await.unwrap().unwrap();
        let second = messages.next().await.unwrap().unwrap();
        assert!(first.id.is_some());
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn from_completion_replays_the_whole_message() {
        let prompt = ChatPrompt::new(vec![Message::user("q")]);
        let original = Completion::new(
            prompt,
            Message::assistant("answer"),
            Some(StopReason::Length),
        )
        .unwrap();

        let replayed = CompletionStream::from_completion(original.clone())
            .collect()
            .await
            .unwrap();
        // The stream stamps its own identity; compare everything else.
        assert_eq!(replayed.message.role, original.message.role);
        assert_eq!(replayed.message.text_lossy(), original.message.text_lossy());
        assert_eq!(replayed.stop_reason, original.stop_reason);
        assert_eq!(
            replayed.prompt.messages.len(),
            original.prompt.messages.len()
        );
    }

    #[tokio::test]
    async fn collect_applies_the_continuation_fold() {
        let prompt = ChatPrompt::new(vec![
            Message::user("q"),
            Message::assistant("partial "),
        ]);
        let mut stream = CompletionStream::new(prompt, move || {
            std::future::ready(Ok(event_source_from_iter([
                Ok(delta(Some(Role::Assistant), "answer", 0)),
                Ok(CompletionEvent::stop(StopReason::Stop)),
            ])))
        });
        // collect consumes; keep construction separate for clarity.
        let completion = {
            let mut messages = stream.subscribe().unwrap();
            while let Some(message) = messages.next().await {
                message.unwrap();
            }
            drop(messages);
            stream.completion().cloned().unwrap()
        };
        assert_eq!(completion.prompt.messages.len(), 2);
        assert_eq!(completion.message.text_lossy(), "partial answer");
    }
}
