//! Collection entry points
//!
//! `Collector` owns everything that is loaded once per process (scorer,
//! classifier, dataset store, config) and builds an orchestrator per run.

use crate::classifier::{SecurityClassifier, SecurityTaxonomy};
use crate::orchestrator::{Backoff, CollectionOrchestrator, RetryPolicy, RunResult, TokioBackoff};
use crate::sentiment::SentimentScorer;
use crate::sources::source_for;
use crate::store::DatasetStore;
use crate::types::ReviewSource;
use csra_common::config::CollectionConfig;
use csra_common::{Error, EventBus, Platform, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Parameters of one collection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRequest {
    pub platform: Platform,
    pub app_id: String,
    /// Country code; empty means the configured default
    pub country: String,
    pub max_reviews: usize,
}

impl CollectRequest {
    pub fn new(platform: Platform, app_id: impl Into<String>, country: impl Into<String>, max_reviews: usize) -> Self {
        Self {
            platform,
            app_id: app_id.into(),
            country: country.into(),
            max_reviews,
        }
    }
}

/// Shared pipeline for one or more collection runs
pub struct Collector {
    config: CollectionConfig,
    scorer: Arc<SentimentScorer>,
    classifier: Arc<SecurityClassifier>,
    store: DatasetStore,
    backoff: Arc<dyn Backoff>,
    events: Option<EventBus>,
    cancel: CancellationToken,
}

impl Collector {
    /// Build the pipeline from configuration
    ///
    /// Loads the security taxonomy from `config.taxonomy_path` when set,
    /// otherwise the built-in one.
    pub fn new(config: CollectionConfig) -> Result<Self> {
        let taxonomy = SecurityTaxonomy::load_or_builtin(config.taxonomy_path.as_deref())?;
        let classifier = SecurityClassifier::new(&taxonomy)?;
        info!(
            tags = classifier.tag_count(),
            custom = config.taxonomy_path.is_some(),
            "Security taxonomy loaded"
        );

        Ok(Self::with_parts(config, SentimentScorer::new(), classifier))
    }

    /// Build the pipeline from already constructed parts
    pub fn with_parts(
        config: CollectionConfig,
        scorer: SentimentScorer,
        classifier: SecurityClassifier,
    ) -> Self {
        Self {
            config,
            scorer: Arc::new(scorer),
            classifier: Arc::new(classifier),
            store: DatasetStore::new(),
            backoff: Arc::new(TokioBackoff),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_store(mut self, store: DatasetStore) -> Self {
        self.store = store;
        self
    }

    /// Dataset every run of this collector appends to
    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Token that cancels every run of this collector
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Orchestrator for `source`, wired to this collector's pipeline
    pub fn orchestrator(&self, source: Arc<dyn ReviewSource>) -> CollectionOrchestrator {
        let mut orchestrator =
            CollectionOrchestrator::new(source, self.scorer.clone(), self.classifier.clone())
                .with_retry_policy(RetryPolicy::from_config(&self.config))
                .with_backoff(self.backoff.clone())
                .with_store(self.store.clone())
                .with_request_delay(Duration::from_millis(self.config.request_delay_ms))
                .with_cancellation(self.cancel.clone());
        if let Some(events) = &self.events {
            orchestrator = orchestrator.with_event_bus(events.clone());
        }
        orchestrator
    }

    /// Run one collection against the platform's live source
    ///
    /// # Errors
    /// Only when the source adapter cannot be constructed; collection
    /// failures are reported in the returned `RunResult`.
    pub async fn collect(&self, request: &CollectRequest) -> Result<RunResult> {
        let source = source_for(request.platform, &self.config)
            .map_err(|e| Error::Internal(format!("Failed to create {} source: {}", request.platform, e)))?;
        Ok(self.collect_from(source, request).await)
    }

    /// Run one collection against an explicit source
    pub async fn collect_from(&self, source: Arc<dyn ReviewSource>, request: &CollectRequest) -> RunResult {
        let country = if request.country.trim().is_empty() {
            self.config.default_country.as_str()
        } else {
            request.country.as_str()
        };
        self.orchestrator(source)
            .run(&request.app_id, country, request.max_reviews)
            .await
    }

    /// Run several collections concurrently; results keep request order
    pub async fn collect_many(&self, requests: &[CollectRequest]) -> Vec<Result<RunResult>> {
        join_all(requests.iter().map(|request| self.collect(request))).await
    }

    /// Run several collections concurrently against explicit sources
    pub async fn collect_many_from(
        &self,
        jobs: Vec<(Arc<dyn ReviewSource>, CollectRequest)>,
    ) -> Vec<RunResult> {
        join_all(
            jobs.iter()
                .map(|(source, request)| self.collect_from(source.clone(), request)),
        )
        .await
    }
}

/// Collect reviews with the default configuration
///
/// Convenience wrapper over [`Collector`]; records also end up in the
/// collector's store, which is dropped afterwards.
pub async fn collect(
    platform: Platform,
    app_id: &str,
    country: &str,
    max_reviews: usize,
) -> Result<RunResult> {
    let collector = Collector::new(CollectionConfig::default())?;
    collector
        .collect(&CollectRequest::new(platform, app_id, country, max_reviews))
        .await
}
