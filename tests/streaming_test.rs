//! Streaming completion tests
//!
//! Drive `CompletionStream` against scripted event sources: delta
//! coalescing, ordering failures, cancellation races, and the degenerate
//! replay of an already-finished completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use promptic::prelude::*;
use promptic::streaming::event_source_from_iter;
use promptic::types::MessagePartial;

fn delta(text: &str, index: u64) -> CompletionEvent {
    CompletionEvent::delta(
        MessagePartial::delta(PromptValue::text(text))
            .with_role(Role::Assistant)
            .with_index(index),
    )
}

fn scripted(events: Vec<Result<CompletionEvent>>) -> CompletionStream {
    CompletionStream::new(ChatPrompt::default(), move || {
        std::future::ready(Ok(event_source_from_iter(events)))
    })
}

#[tokio::test]
async fn deltas_coalesce_into_one_growing_message() {
    let mut stream = scripted(vec![
        Ok(delta("Hel", 0)),
        Ok(delta("lo", 1)),
        Ok(CompletionEvent::stop(StopReason::Stop)),
    ]);

    let snapshots: Vec<String> = {
        let mut messages = stream.subscribe().unwrap();
        let mut seen = Vec::new();
        while let Some(message) = messages.next().await {
            seen.push(message.unwrap().text_lossy());
        }
        seen
    };

    assert_eq!(snapshots, vec!["Hel".to_string(), "Hello".to_string()]);
    assert_eq!(stream.state(), StreamState::Completed);

    let completion = stream.completion().unwrap();
    assert_eq!(completion.message.text_lossy(), "Hello");
    assert_eq!(completion.stop_reason, Some(StopReason::Stop));
    // The produced message is also the last prompt entry.
    assert_eq!(completion.prompt.last(), Some(&completion.message));
}

#[tokio::test]
async fn out_of_order_indices_fail_exactly_once() {
    let mut stream = scripted(vec![Ok(delta("lo", 5)), Ok(delta("Hel", 2))]);

    let mut messages = stream.subscribe().unwrap();
    assert!(messages.next().await.unwrap().is_ok());
    assert!(matches!(
        messages.next().await,
        Some(Err(PromptError::NonMonotonicIndex {
            previous: 5,
            next: 2
        }))
    ));
    // Terminal: the error is delivered once, then the stream is closed.
    assert!(messages.next().await.is_none());
    drop(messages);
    assert_eq!(stream.state(), StreamState::Failed);
    assert!(stream.completion().is_none());
}

#[tokio::test]
async fn source_errors_move_the_stream_to_failed() {
    let mut stream = scripted(vec![
        Ok(delta("partial", 0)),
        Err(PromptError::source("connection reset")),
    ]);

    let mut messages = stream.subscribe().unwrap();
    assert!(messages.next().await.unwrap().is_ok());
    assert!(matches!(
        messages.next().await,
        Some(Err(PromptError::Source(_)))
    ));
    assert!(messages.next().await.is_none());
    drop(messages);
    assert_eq!(stream.state(), StreamState::Failed);
}

#[tokio::test]
async fn source_is_not_opened_until_subscription() {
    let opened = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&opened);
    let mut stream = CompletionStream::new(ChatPrompt::default(), move || {
        seen.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(event_source_from_iter(vec![Ok(delta("x", 0))])))
    });

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(opened.load(Ordering::SeqCst), 0);

    {
        let mut messages = stream.subscribe().unwrap();
        while let Some(message) = messages.next().await {
            message.unwrap();
        }
    }
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(matches!(
        stream.subscribe(),
        Err(PromptError::AlreadySubscribed)
    ));
}

#[tokio::test]
async fn cancellation_drops_events_still_in_flight() {
    let source = async_stream::stream! {
        yield Ok(delta("first", 0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        yield Ok(delta(" second", 1));
    };
    let mut stream = CompletionStream::new(ChatPrompt::default(), move || {
        let source: CompletionEventSource = Box::pin(source);
        std::future::ready(Ok(source))
    });

    let first = {
        let mut messages = stream.subscribe().unwrap();
        messages.next().await.unwrap().unwrap()
    };
    assert_eq!(first.text_lossy(), "first");

    stream.cancel();
    assert_eq!(stream.state(), StreamState::Canceled);
    // The pending delta never lands: no completion, state stays canceled.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(stream.completion().is_none());
    assert_eq!(stream.current_message().unwrap().text_lossy(), "first");
}

#[tokio::test]
async fn natural_end_without_stop_event_synthesizes_stop() {
    let completion = scripted(vec![Ok(delta("done", 0))]).collect().await.unwrap();
    assert_eq!(completion.stop_reason, Some(StopReason::Stop));
    assert_eq!(completion.message.role, Role::Assistant);
}

#[tokio::test]
async fn whole_snapshot_replaces_accumulated_deltas() {
    let whole = Message::assistant("final text");
    let mut events = vec![Ok(delta("garbled", 0))];
    events.push(Ok(CompletionEvent::delta(MessagePartial::whole(
        whole.clone(),
    ))));
    events.push(Ok(CompletionEvent::stop(StopReason::Stop)));

    let completion = scripted(events).collect().await.unwrap();
    // Delta content extended by the whole; the law concatenates.
    assert_eq!(completion.message.text_lossy(), "garbledfinal text");
}

#[tokio::test]
async fn replaying_a_completion_yields_equivalent_results() {
    let chat = (PromptValue::system("sys") + PromptValue::user("question"))
        .to_chat_prompt()
        .unwrap();
    let original = Completion::new(
        chat,
        Message::assistant("answer"),
        Some(StopReason::Length),
    )
    .unwrap();

    let replayed = CompletionStream::from_completion(original.clone())
        .collect()
        .await
        .unwrap();

    assert_eq!(replayed.message.text_lossy(), "answer");
    assert_eq!(replayed.message.role, Role::Assistant);
    assert_eq!(replayed.stop_reason, original.stop_reason);
    assert_eq!(
        replayed.prompt.messages.len(),
        original.prompt.messages.len()
    );
}

#[tokio::test]
async fn completion_folds_onto_an_assistant_prompt_tail() {
    let prompt = ChatPrompt::new(vec![
        Message::user("continue: "),
        Message::assistant("Once upon"),
    ]);
    let completion = CompletionStream::new(prompt, move || {
        std::future::ready(Ok(event_source_from_iter(vec![
            Ok(delta(" a time", 0)),
            Ok(CompletionEvent::stop(StopReason::Stop)),
        ])))
    })
    .collect()
    .await
    .unwrap();

    assert_eq!(completion.prompt.messages.len(), 2);
    assert_eq!(completion.message.text_lossy(), "Once upon a time");
}

#[tokio::test]
async fn factory_failure_is_delivered_to_the_subscriber() {
    let mut stream = CompletionStream::new(ChatPrompt::default(), move || {
        std::future::ready(Err(PromptError::source("dns lookup failed")))
    });
    let mut messages = stream.subscribe().unwrap();
    assert!(matches!(
        messages.next().await,
        Some(Err(PromptError::Source(_)))
    ));
    assert!(messages.next().await.is_none());
    drop(messages);
    assert_eq!(stream.state(), StreamState::Failed);
}
