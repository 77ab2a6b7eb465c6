//! Collection orchestrator scenarios against scripted sources
//!
//! Covers budget enforcement, retry/backoff, fatal source errors,
//! cancellation, malformed item handling and progress events.

mod common;

use common::*;
use csra_collector::{CollectionState, Page, SourceError};
use csra_common::{CollectionEvent, EventBus, StopReason};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_stops_at_max_without_requesting_next_page() {
    let source = ScriptedSource::with_pages(&[10, 10, 5]);
    let backoff = RecordingBackoff::new();

    let result = orchestrator(source.clone(), backoff).run(APP_ID, "us", 12).await;

    assert_eq!(result.records.len(), 12);
    assert_eq!(result.collected, 12);
    assert_eq!(result.requested, 12);
    assert_eq!(result.stop_reason, StopReason::ReachedMax);
    assert_eq!(result.final_state(), CollectionState::Done);
    assert_eq!(source.calls(), 2, "third page must never be requested");
    assert_eq!(result.page_attempts, vec![1, 1]);

    // Second page was requested with the first page's token
    assert_eq!(source.requested_tokens(), vec![None, Some(token(1))]);

    let states: Vec<_> = result
        .transitions
        .iter()
        .map(|t| (t.old_state, t.new_state))
        .collect();
    assert_eq!(
        states,
        vec![
            (CollectionState::Idle, CollectionState::Fetching),
            (CollectionState::Fetching, CollectionState::Processing),
            (CollectionState::Processing, CollectionState::Fetching),
            (CollectionState::Fetching, CollectionState::Processing),
            (CollectionState::Processing, CollectionState::Done),
        ]
    );
}

#[tokio::test]
async fn test_collects_until_exhausted() {
    let source = ScriptedSource::with_pages(&[10, 10, 5]);
    let result = orchestrator(source.clone(), RecordingBackoff::new())
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.collected, 25);
    assert_eq!(result.stop_reason, StopReason::Exhausted);
    assert_eq!(source.calls(), 3);
    assert!(result.warnings.is_empty());

    // Records keep source order
    let ids: Vec<_> = result.records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids[0], "google:com.example.app:r0");
    assert_eq!(ids[24], "google:com.example.app:r24");
}

#[tokio::test]
async fn test_rate_limited_twice_then_success() {
    let source = ScriptedSource::new(vec![
        Err(SourceError::RateLimited("slow down".to_string())),
        Err(SourceError::RateLimited("slow down".to_string())),
        Ok(page(0, 8, None)),
    ]);
    let backoff = RecordingBackoff::new();

    let result = orchestrator(source.clone(), backoff.clone())
        .run(APP_ID, "us", 50)
        .await;

    assert_eq!(result.collected, 8);
    assert_eq!(result.stop_reason, StopReason::Exhausted);
    assert_eq!(result.page_attempts, vec![3]);
    assert_eq!(
        backoff.delays(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );

    // Every retry re-used the same (initial) token
    assert_eq!(source.requested_tokens(), vec![None, None, None]);
}

#[tokio::test]
async fn test_retry_keeps_page_token() {
    let source = ScriptedSource::new(vec![
        Ok(page(0, 5, Some(token(1)))),
        Err(SourceError::TransientNetwork("reset".to_string())),
        Ok(page(5, 5, None)),
    ]);
    let result = orchestrator(source.clone(), RecordingBackoff::new())
        .run(APP_ID, "us", 50)
        .await;

    assert_eq!(result.collected, 10);
    assert_eq!(result.page_attempts, vec![1, 2]);
    assert_eq!(
        source.requested_tokens(),
        vec![None, Some(token(1)), Some(token(1))]
    );
}

#[tokio::test]
async fn test_not_found_aborts_with_no_records() {
    let source = ScriptedSource::new(vec![Err(SourceError::NotFound(
        "no such app".to_string(),
    ))]);
    let backoff = RecordingBackoff::new();

    let result = orchestrator(source.clone(), backoff.clone())
        .run(APP_ID, "us", 100)
        .await;

    assert!(result.records.is_empty());
    assert_eq!(result.stop_reason, StopReason::Aborted);
    assert_eq!(result.final_state(), CollectionState::Aborted);
    assert_eq!(source.calls(), 1, "fatal errors are not retried");
    assert!(backoff.delays().is_empty());
    assert_eq!(
        result.transitions.last().map(|t| t.new_state),
        Some(CollectionState::Aborted)
    );
}

#[tokio::test]
async fn test_unsupported_keeps_partial_result() {
    let source = ScriptedSource::new(vec![
        Ok(page(0, 10, Some(token(1)))),
        Err(SourceError::Unsupported("feed unavailable".to_string())),
    ]);

    let result = orchestrator(source, RecordingBackoff::new())
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.collected, 10);
    assert_eq!(result.stop_reason, StopReason::Unsupported);
    assert_eq!(result.final_state(), CollectionState::Done);
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn test_retries_exhausted_returns_partial_result() {
    let source = ScriptedSource::new(vec![
        Ok(page(0, 4, Some(token(1)))),
        Err(SourceError::TransientNetwork("timeout".to_string())),
        Err(SourceError::TransientNetwork("timeout".to_string())),
        Err(SourceError::RateLimited("429".to_string())),
        Err(SourceError::TransientNetwork("timeout".to_string())),
        Ok(page(4, 4, None)),
    ]);
    let backoff = RecordingBackoff::new();

    let result = orchestrator(source.clone(), backoff.clone())
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.collected, 4);
    assert_eq!(result.stop_reason, StopReason::RetriesExhausted);
    assert_eq!(result.final_state(), CollectionState::Done);
    assert_eq!(result.page_attempts, vec![1, 4]);
    assert_eq!(source.calls(), 5, "attempts per page are bounded");
    assert_eq!(backoff.delays().len(), 3);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("gave up after 4 attempts")));
}

#[tokio::test]
async fn test_zero_max_reviews_never_fetches() {
    let source = ScriptedSource::with_pages(&[10]);
    let result = orchestrator(source.clone(), RecordingBackoff::new())
        .run(APP_ID, "us", 0)
        .await;

    assert!(result.records.is_empty());
    assert_eq!(result.stop_reason, StopReason::ReachedMax);
    assert_eq!(source.calls(), 0);
    assert!(result.page_attempts.is_empty());
}

#[tokio::test]
async fn test_never_returns_more_than_max() {
    for max in [1, 7, 10, 11, 33, 50, 80] {
        let source = ScriptedSource::with_pages(&[10, 10, 10, 10, 10]);
        let result = orchestrator(source, RecordingBackoff::new())
            .run(APP_ID, "us", max)
            .await;

        assert!(result.records.len() <= max, "max {} got {}", max, result.records.len());
        assert_eq!(result.records.len(), max.min(50));
    }
}

#[tokio::test]
async fn test_malformed_reviews_dropped_and_counted() {
    let source = ScriptedSource::new(vec![Ok(Page {
        reviews: vec![
            raw_review(0),
            textless_review(1),
            raw_review(2),
            textless_review(3),
            raw_review(4),
        ],
        next: None,
    })]);

    let result = orchestrator(source, RecordingBackoff::new())
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.collected, 3);
    assert_eq!(result.dropped, 2);
    assert_eq!(result.warnings.len(), 2);
    assert_eq!(result.stop_reason, StopReason::Exhausted);
}

#[tokio::test]
async fn test_repeated_review_ids_dropped() {
    let source = ScriptedSource::new(vec![
        Ok(page(0, 3, Some(token(1)))),
        Ok(page(2, 3, None)),
    ]);

    let result = orchestrator(source, RecordingBackoff::new())
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.collected, 5);
    assert_eq!(result.dropped, 1);
    let mut ids: Vec<_> = result.records.iter().map(|r| r.id.as_str()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_cancelled_before_first_fetch() {
    let source = ScriptedSource::with_pages(&[10]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orchestrator(source.clone(), RecordingBackoff::new())
        .with_cancellation(cancel)
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.final_state(), CollectionState::Done);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_during_backoff() {
    let source = ScriptedSource::new(vec![
        Ok(page(0, 6, Some(token(1)))),
        Err(SourceError::RateLimited("429".to_string())),
        Ok(page(6, 6, None)),
    ]);
    let cancel = CancellationToken::new();
    let backoff = RecordingBackoff::cancelling(cancel.clone());

    let result = orchestrator(source.clone(), backoff.clone())
        .with_cancellation(cancel)
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.collected, 6);
    assert_eq!(source.calls(), 2);
    assert_eq!(backoff.delays().len(), 1);
}

#[tokio::test]
async fn test_cancelled_during_request_delay() {
    let source = ScriptedSource::with_pages(&[4, 4]);
    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let orch = orchestrator(source.clone(), RecordingBackoff::new())
        .with_request_delay(Duration::from_secs(60))
        .with_cancellation(cancel);
    let run = orch.run(APP_ID, "us", 100);
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancellation must interrupt the request delay");
    canceller.await.unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.final_state(), CollectionState::Done);
    assert_eq!(result.collected, 4);
    assert_eq!(result.records[0].id, "google:com.example.app:r0");
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_repeated_empty_pages_end_run() {
    let source = ScriptedSource::new(vec![
        Ok(page(0, 0, Some(token(1)))),
        Ok(page(0, 0, Some(token(2)))),
        Ok(page(0, 0, Some(token(3)))),
        Ok(page(0, 5, None)),
    ]);

    let result = orchestrator(source.clone(), RecordingBackoff::new())
        .run(APP_ID, "us", 100)
        .await;

    assert_eq!(result.stop_reason, StopReason::Exhausted);
    assert_eq!(source.calls(), 3);
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn test_progress_events() {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let source = ScriptedSource::new(vec![
        Err(SourceError::RateLimited("429".to_string())),
        Ok(page(0, 4, Some(token(1)))),
        Ok(page(4, 4, None)),
    ]);

    let result = orchestrator(source, RecordingBackoff::new())
        .with_event_bus(bus)
        .run(APP_ID, "us", 100)
        .await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id(), result.run_id);
        events.push(event);
    }

    assert!(matches!(events.first(), Some(CollectionEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(CollectionEvent::RunFinished {
            collected: 8,
            stop_reason: StopReason::Exhausted,
            ..
        })
    ));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CollectionEvent::PageProcessed { .. }))
            .count(),
        2
    );
    assert!(events.iter().any(|e| matches!(
        e,
        CollectionEvent::RetryScheduled {
            attempt: 1,
            delay_ms: 100,
            ..
        }
    )));
}

#[tokio::test]
async fn test_records_are_scored_and_tagged() {
    let source = ScriptedSource::new(vec![Ok(Page {
        reviews: vec![
            raw_review_with_text(0, "Terrible app, it leaked my personal data and I am worried"),
            raw_review_with_text(1, "Great app, love it"),
        ],
        next: None,
    })]);

    let result = orchestrator(source, RecordingBackoff::new())
        .run(APP_ID, "US", 10)
        .await;

    let leaked = &result.records[0];
    assert!(leaked.security_tags.contains("privacy"));
    assert!(leaked.security_tags.contains("data-breach"));
    assert!(leaked.sentiment_score < 0.0);
    assert_eq!(leaked.country, "us");

    let happy = &result.records[1];
    assert!(happy.security_tags.is_empty());
    assert!(happy.sentiment_score > 0.0);
}
