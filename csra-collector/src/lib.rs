//! csra-collector library interface
//!
//! Review collection pipeline for app store security analysis:
//! source adapters → normalizer → sentiment scorer → security classifier,
//! driven by the collection orchestrator into a dataset store.

pub mod classifier;
pub mod collector;
pub mod export;
pub mod filter;
pub mod normalizer;
pub mod orchestrator;
pub mod sentiment;
pub mod sources;
pub mod store;
pub mod types;

pub use classifier::{SecurityClassifier, SecurityTaxonomy};
pub use collector::{collect, CollectRequest, Collector};
pub use export::{export_csv, export_processed_csv, parse_csv};
pub use filter::{filter, ReviewFilter};
pub use normalizer::{normalize, NormalizeContext, NormalizedReview};
pub use orchestrator::{
    Backoff, CollectionOrchestrator, CollectionState, RetryPolicy, RunResult, StateTransition,
    TokioBackoff,
};
pub use sentiment::{Sentiment, SentimentScorer};
pub use store::{DatasetStats, DatasetStore};
pub use types::{Page, PageToken, RawReview, ReviewSource, SourceError};
