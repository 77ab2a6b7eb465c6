//! Shared fixtures for collector integration tests
//!
//! `ScriptedSource` replays a fixed sequence of page results and records
//! every request; `RecordingBackoff` records retry delays without sleeping.

#![allow(dead_code)]

use async_trait::async_trait;
use csra_collector::types::PlayStoreRawReview;
use csra_collector::{
    Backoff, CollectionOrchestrator, Page, PageToken, RawReview, ReviewSource, RetryPolicy,
    SecurityClassifier, SecurityTaxonomy, SentimentScorer, SourceError,
};
use csra_common::Platform;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const APP_ID: &str = "com.example.app";

/// Source that replays scripted results; an exhausted script yields an
/// empty final page
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Page, SourceError>>>,
    requests: Mutex<Vec<Option<PageToken>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Page, SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Source serving pages of the given sizes, each linked to the next
    pub fn with_pages(sizes: &[usize]) -> Arc<Self> {
        let mut first_id = 0;
        let pages = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let next = (i + 1 < sizes.len()).then(|| token(i + 1));
                let built = page(first_id, size, next);
                first_id += size;
                Ok(built)
            })
            .collect();
        Self::new(pages)
    }

    /// Number of fetch_page calls so far
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Tokens passed to each fetch_page call
    pub fn requested_tokens(&self) -> Vec<Option<PageToken>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewSource for ScriptedSource {
    fn platform(&self) -> Platform {
        Platform::PlayStore
    }

    async fn fetch_page(
        &self,
        _app_id: &str,
        _country: &str,
        token: Option<&PageToken>,
    ) -> Result<Page, SourceError> {
        self.requests.lock().unwrap().push(token.cloned());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }
}

/// Backoff that records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingBackoff {
    delays: Mutex<Vec<Duration>>,
    cancel_on_sleep: Option<CancellationToken>,
}

impl RecordingBackoff {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backoff that cancels `token` and then never wakes up
    pub fn cancelling(token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            delays: Mutex::new(Vec::new()),
            cancel_on_sleep: Some(token),
        })
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backoff for RecordingBackoff {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
        if let Some(token) = &self.cancel_on_sleep {
            token.cancel();
            std::future::pending::<()>().await;
        }
    }
}

pub fn token(n: usize) -> PageToken {
    PageToken::Continuation(format!("token-{}", n))
}

/// Well-formed Play Store review number `n`
pub fn raw_review(n: usize) -> RawReview {
    raw_review_with_text(n, &format!("Review number {} works fine", n))
}

pub fn raw_review_with_text(n: usize, text: &str) -> RawReview {
    RawReview::PlayStore(PlayStoreRawReview {
        review_id: Some(format!("r{}", n)),
        user_name: Some(format!("user{}", n)),
        content: Some(text.to_string()),
        score: Some((n % 5 + 1) as i64),
        at_seconds: Some(1_700_000_000 + n as i64 * 60),
        thumbs_up_count: Some(0),
        app_version: Some("1.0".to_string()),
    })
}

/// Play Store review with no text field
pub fn textless_review(n: usize) -> RawReview {
    match raw_review(n) {
        RawReview::PlayStore(mut r) => {
            r.content = None;
            RawReview::PlayStore(r)
        }
        other => other,
    }
}

pub fn page(first_id: usize, size: usize, next: Option<PageToken>) -> Page {
    Page {
        reviews: (first_id..first_id + size).map(raw_review).collect(),
        next,
    }
}

pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(1_000),
        max_attempts: 4,
    }
}

pub fn classifier() -> Arc<SecurityClassifier> {
    let taxonomy = SecurityTaxonomy::builtin().expect("builtin taxonomy");
    Arc::new(SecurityClassifier::new(&taxonomy).expect("classifier"))
}

/// Orchestrator over `source` with the test retry policy and a recording backoff
pub fn orchestrator(
    source: Arc<ScriptedSource>,
    backoff: Arc<RecordingBackoff>,
) -> CollectionOrchestrator {
    CollectionOrchestrator::new(source, Arc::new(SentimentScorer::new()), classifier())
        .with_retry_policy(test_policy())
        .with_backoff(backoff)
}
