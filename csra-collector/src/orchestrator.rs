//! Collection orchestrator
//!
//! Drives one source through the run state machine:
//!
//! ```text
//! Idle → Fetching → Processing → (Fetching | Done)
//!          ↻ retry (same token, backoff)
//! any state → Aborted (fatal source error)
//! ```
//!
//! Each fetched page goes through normalize → score → classify before the
//! next page is requested. Retryable source errors re-enter Fetching with the
//! same token after an exponential backoff; the attempt count per page is
//! bounded. Cancellation is honoured before every fetch and during waits.

use crate::classifier::SecurityClassifier;
use crate::normalizer::{normalize, NormalizeContext};
use crate::sentiment::SentimentScorer;
use crate::store::DatasetStore;
use crate::types::{Page, PageToken, RawReview, ReviewSource, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csra_common::config::CollectionConfig;
use csra_common::{CollectionEvent, Error, EventBus, Platform, Review, StopReason};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Empty pages that still carry a next token tolerated in a row
const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 3;

// ============================================================================
// State machine
// ============================================================================

/// Collection run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionState {
    /// Created, nothing requested yet
    Idle,
    /// Waiting on the source for a page (including retries)
    Fetching,
    /// Normalizing, scoring and classifying a page
    Processing,
    /// Finished; see the run's stop reason
    Done,
    /// Fatal source error
    Aborted,
}

impl CollectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CollectionState::Done | CollectionState::Aborted)
    }

    /// Terminal state a run ends in for `reason`
    pub fn for_stop_reason(reason: StopReason) -> Self {
        if reason.is_abort() {
            CollectionState::Aborted
        } else {
            CollectionState::Done
        }
    }
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollectionState::Idle => "IDLE",
            CollectionState::Fetching => "FETCHING",
            CollectionState::Processing => "PROCESSING",
            CollectionState::Done => "DONE",
            CollectionState::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// State transition record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub old_state: CollectionState,
    pub new_state: CollectionState,
    pub transitioned_at: DateTime<Utc>,
}

// ============================================================================
// Retry policy and backoff
// ============================================================================

/// Per-page retry budget for retryable source errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Attempts per page, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CollectionConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based): the base delay
    /// doubled per prior failure, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Waits between retry attempts
///
/// Production runs use [`TokioBackoff`]; tests substitute an implementation
/// that records the requested delays without sleeping.
#[async_trait]
pub trait Backoff: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Backoff using the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

// ============================================================================
// Run result
// ============================================================================

/// Outcome of one collection run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub platform: Platform,
    pub app_id: String,
    pub country: String,
    /// Accepted records, in source order
    pub records: Vec<Review>,
    /// `max_reviews` requested by the caller
    pub requested: usize,
    /// Equal to `records.len()`
    pub collected: usize,
    /// Raw reviews dropped as malformed, repeated within the run, or
    /// rejected by the store
    pub dropped: usize,
    /// Records kept in `records` that an earlier run had already stored
    pub already_stored: usize,
    pub stop_reason: StopReason,
    /// Human-readable notes on drops, retries given up and early stops
    pub warnings: Vec<String>,
    /// Fetch attempts used per requested page
    pub page_attempts: Vec<u32>,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Terminal state of the run
    pub fn final_state(&self) -> CollectionState {
        CollectionState::for_stop_reason(self.stop_reason)
    }

    /// Number of pages the source was asked for
    pub fn pages_requested(&self) -> usize {
        self.page_attempts.len()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Mutable bookkeeping of an in-flight run
struct RunProgress {
    run_id: Uuid,
    state: CollectionState,
    transitions: Vec<StateTransition>,
    records: Vec<Review>,
    ids: HashSet<String>,
    dropped: usize,
    already_stored: usize,
    warnings: Vec<String>,
    page_attempts: Vec<u32>,
    started_at: DateTime<Utc>,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: CollectionState::Idle,
            transitions: Vec::new(),
            records: Vec::new(),
            ids: HashSet::new(),
            dropped: 0,
            already_stored: 0,
            warnings: Vec::new(),
            page_attempts: Vec::new(),
            started_at: Utc::now(),
        }
    }

    fn transition_to(&mut self, new_state: CollectionState) {
        debug!(run_id = %self.run_id, from = %self.state, to = %new_state, "Collection state transition");
        self.transitions.push(StateTransition {
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        });
        self.state = new_state;
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/// Result of fetching one page, retries included
enum FetchOutcome {
    Page(Page),
    Stop(StopReason),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs collections against one review source
pub struct CollectionOrchestrator {
    source: Arc<dyn ReviewSource>,
    scorer: Arc<SentimentScorer>,
    classifier: Arc<SecurityClassifier>,
    policy: RetryPolicy,
    backoff: Arc<dyn Backoff>,
    events: Option<EventBus>,
    store: Option<DatasetStore>,
    request_delay: Duration,
    cancel: CancellationToken,
}

impl CollectionOrchestrator {
    /// Orchestrator with the default retry policy, tokio backoff, no
    /// politeness delay and no store
    pub fn new(
        source: Arc<dyn ReviewSource>,
        scorer: Arc<SentimentScorer>,
        classifier: Arc<SecurityClassifier>,
    ) -> Self {
        Self {
            source,
            scorer,
            classifier,
            policy: RetryPolicy::default(),
            backoff: Arc::new(TokioBackoff),
            events: None,
            store: None,
            request_delay: Duration::ZERO,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Append accepted records to `store` as they are produced
    pub fn with_store(mut self, store: DatasetStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Fixed pause between successful page fetches
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn platform(&self) -> Platform {
        self.source.platform()
    }

    /// Collect up to `max_reviews` records for `app_id` in `country`
    ///
    /// Never fails: every early stop is reported through the result's stop
    /// reason and warnings.
    pub async fn run(&self, app_id: &str, country: &str, max_reviews: usize) -> RunResult {
        let ctx = NormalizeContext::new(self.source.platform(), app_id, country);
        let mut run = RunProgress::new();

        info!(
            run_id = %run.run_id,
            platform = %ctx.platform,
            app_id = %ctx.app_id,
            country = %ctx.country,
            max_reviews,
            "Starting review collection"
        );
        self.emit(CollectionEvent::RunStarted {
            run_id: run.run_id,
            platform: ctx.platform,
            app_id: ctx.app_id.clone(),
            country: ctx.country.clone(),
            max_reviews,
            timestamp: Utc::now(),
        });

        let stop_reason = if max_reviews == 0 {
            StopReason::ReachedMax
        } else {
            self.collect_pages(&mut run, &ctx, max_reviews).await
        };

        self.finish(run, ctx, max_reviews, stop_reason)
    }

    async fn collect_pages(
        &self,
        run: &mut RunProgress,
        ctx: &NormalizeContext,
        max_reviews: usize,
    ) -> StopReason {
        let mut token: Option<PageToken> = None;
        let mut page_index = 0usize;
        let mut ordinal = 0usize;
        let mut empty_pages = 0u32;

        loop {
            run.transition_to(CollectionState::Fetching);
            let page = match self.fetch_with_retry(run, ctx, token.as_ref(), page_index).await {
                FetchOutcome::Page(page) => page,
                FetchOutcome::Stop(reason) => return reason,
            };

            run.transition_to(CollectionState::Processing);
            let received = page.reviews.len();
            let before = run.records.len();
            let dropped_before = run.dropped;

            for (index, raw) in page.reviews.iter().enumerate() {
                if run.records.len() >= max_reviews {
                    debug!(
                        run_id = %run.run_id,
                        page = page_index,
                        skipped = received - index,
                        "Page truncated to remaining budget"
                    );
                    break;
                }
                self.process_item(run, ctx, raw, ordinal).await;
                ordinal += 1;
            }

            let accepted = run.records.len() - before;
            debug!(
                run_id = %run.run_id,
                page = page_index,
                received,
                accepted,
                total = run.records.len(),
                "Page processed"
            );
            self.emit(CollectionEvent::PageProcessed {
                run_id: run.run_id,
                page_index,
                received,
                accepted,
                dropped: run.dropped - dropped_before,
                total: run.records.len(),
                timestamp: Utc::now(),
            });
            page_index += 1;

            if run.records.len() >= max_reviews {
                return StopReason::ReachedMax;
            }
            match page.next {
                Some(next) => token = Some(next),
                None => return StopReason::Exhausted,
            }

            if received == 0 {
                empty_pages += 1;
                if empty_pages >= MAX_CONSECUTIVE_EMPTY_PAGES {
                    warn!(run_id = %run.run_id, page = page_index, "Source keeps returning empty pages");
                    run.warn(format!(
                        "stopped after {} consecutive empty pages",
                        empty_pages
                    ));
                    return StopReason::Exhausted;
                }
            } else {
                empty_pages = 0;
            }

            if !self.request_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return StopReason::Cancelled,
                    _ = tokio::time::sleep(self.request_delay) => {}
                }
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        run: &mut RunProgress,
        ctx: &NormalizeContext,
        token: Option<&PageToken>,
        page_index: usize,
    ) -> FetchOutcome {
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                if attempt > 0 {
                    run.page_attempts.push(attempt);
                }
                info!(run_id = %run.run_id, page = page_index, "Collection cancelled");
                return FetchOutcome::Stop(StopReason::Cancelled);
            }

            attempt += 1;
            let result = self
                .source
                .fetch_page(&ctx.app_id, &ctx.country, token)
                .await;

            let err = match result {
                Ok(page) => {
                    if attempt > 1 {
                        debug!(run_id = %run.run_id, page = page_index, attempt, "Page fetch succeeded after retry");
                    }
                    run.page_attempts.push(attempt);
                    return FetchOutcome::Page(page);
                }
                Err(err) => err,
            };

            match err {
                SourceError::NotFound(ref reason) => {
                    error!(
                        run_id = %run.run_id,
                        app_id = %ctx.app_id,
                        country = %ctx.country,
                        reason = %reason,
                        "Source rejected app id or country"
                    );
                    run.page_attempts.push(attempt);
                    run.warn(err.to_string());
                    return FetchOutcome::Stop(StopReason::Aborted);
                }
                SourceError::Unsupported(ref reason) => {
                    warn!(
                        run_id = %run.run_id,
                        app_id = %ctx.app_id,
                        page = page_index,
                        reason = %reason,
                        "Source offers no further reviews; keeping partial result"
                    );
                    run.page_attempts.push(attempt);
                    run.warn(err.to_string());
                    return FetchOutcome::Stop(StopReason::Unsupported);
                }
                SourceError::RateLimited(_) | SourceError::TransientNetwork(_) => {}
            }

            if attempt >= self.policy.max_attempts {
                error!(
                    run_id = %run.run_id,
                    page = page_index,
                    attempt,
                    error = %err,
                    "Page fetch failed: retry budget exhausted"
                );
                run.page_attempts.push(attempt);
                run.warn(format!(
                    "page {}: gave up after {} attempts: {}",
                    page_index, attempt, err
                ));
                return FetchOutcome::Stop(StopReason::RetriesExhausted);
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                run_id = %run.run_id,
                page = page_index,
                attempt,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "Page fetch failed, backing off"
            );
            self.emit(CollectionEvent::RetryScheduled {
                run_id: run.run_id,
                page_index,
                attempt,
                delay_ms: delay.as_millis() as u64,
                reason: err.to_string(),
                timestamp: Utc::now(),
            });
            run.transition_to(CollectionState::Fetching);

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    run.page_attempts.push(attempt);
                    info!(run_id = %run.run_id, page = page_index, "Collection cancelled during backoff");
                    return FetchOutcome::Stop(StopReason::Cancelled);
                }
                _ = self.backoff.sleep(delay) => {}
            }
        }
    }

    async fn process_item(
        &self,
        run: &mut RunProgress,
        ctx: &NormalizeContext,
        raw: &RawReview,
        ordinal: usize,
    ) {
        let normalized = match normalize(raw, ctx, ordinal) {
            Ok(normalized) => normalized,
            Err(reason) => {
                debug!(run_id = %run.run_id, ordinal, reason = %reason, "Dropping malformed review");
                run.dropped += 1;
                run.warn(format!("review #{} dropped: {}", ordinal, reason));
                return;
            }
        };

        if run.ids.contains(&normalized.id) {
            debug!(run_id = %run.run_id, id = %normalized.id, "Dropping repeated review");
            run.dropped += 1;
            run.warn(format!("review {} dropped: repeated id", normalized.id));
            return;
        }

        let sentiment = self.scorer.score(&normalized.text);
        let tags = self.classifier.classify(&normalized.text);
        let review = normalized.assemble(sentiment, tags);

        if let Some(store) = &self.store {
            match store.append(review.clone()).await {
                Ok(()) => {}
                Err(Error::DuplicateRecord(_)) => {
                    debug!(run_id = %run.run_id, id = %review.id, "Review already in dataset");
                    run.already_stored += 1;
                    run.warn(format!("review {} already in dataset", review.id));
                }
                Err(e) => {
                    warn!(run_id = %run.run_id, id = %review.id, error = %e, "Dataset append failed");
                    run.dropped += 1;
                    run.warn(format!("review {} dropped: {}", review.id, e));
                    return;
                }
            }
        }

        run.ids.insert(review.id.clone());
        run.records.push(review);
    }

    fn finish(
        &self,
        mut run: RunProgress,
        ctx: NormalizeContext,
        requested: usize,
        stop_reason: StopReason,
    ) -> RunResult {
        run.transition_to(CollectionState::for_stop_reason(stop_reason));

        let collected = run.records.len();
        info!(
            run_id = %run.run_id,
            app_id = %ctx.app_id,
            requested,
            collected,
            dropped = run.dropped,
            already_stored = run.already_stored,
            pages = run.page_attempts.len(),
            stop_reason = %stop_reason,
            "Review collection finished"
        );
        self.emit(CollectionEvent::RunFinished {
            run_id: run.run_id,
            requested,
            collected,
            dropped: run.dropped,
            stop_reason,
            timestamp: Utc::now(),
        });

        RunResult {
            run_id: run.run_id,
            platform: ctx.platform,
            app_id: ctx.app_id,
            country: ctx.country,
            records: run.records,
            requested,
            collected,
            dropped: run.dropped,
            already_stored: run.already_stored,
            stop_reason,
            warnings: run.warnings,
            page_attempts: run.page_attempts,
            transitions: run.transitions,
            started_at: run.started_at,
            finished_at: Utc::now(),
        }
    }

    fn emit(&self, event: CollectionEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }
}
