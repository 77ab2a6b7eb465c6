//! # CSRA Common Library
//!
//! Shared code for the review collection pipeline:
//! - Canonical review record (`Review`, `Platform`, `SentimentLabel`)
//! - Collection progress events (`CollectionEvent`, `EventBus`)
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use events::{CollectionEvent, EventBus};
pub use models::{Platform, Review, SentimentLabel, StopReason};
