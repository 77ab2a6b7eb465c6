//! Review source adapters
//!
//! One adapter per supported store:
//! 1. **play_store** - Google Play `batchexecute` reviews RPC, continuation tokens
//! 2. **app_store** - iTunes customer reviews RSS feed, numbered pages (max 10)
//!
//! Both adapters space their requests with a `governor` rate limiter and map
//! HTTP failures onto `SourceError` so the orchestrator can decide between
//! retrying, stopping and aborting.

pub mod app_store;
pub mod play_store;

pub use app_store::AppStoreSource;
pub use play_store::PlayStoreSource;

use crate::types::{ReviewSource, SourceError};
use csra_common::config::{get_user_agent, CollectionConfig};
use csra_common::Platform;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Total request timeout for review endpoints
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection timeout for review endpoints
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Direct (unkeyed) limiter shared by all requests of one adapter
pub(crate) type SourceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Build the HTTP client used by both adapters
pub(crate) fn build_http_client() -> Result<Client, SourceError> {
    Client::builder()
        .user_agent(get_user_agent())
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| SourceError::TransientNetwork(format!("Failed to build HTTP client: {}", e)))
}

/// Limiter allowing `per_second` requests per second
pub(crate) fn build_rate_limiter(per_second: u32) -> SourceRateLimiter {
    let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(per_second))
}

/// Check an app id has the shape its store uses
///
/// - Play Store: package name with at least two dot-separated segments
/// - App Store: numeric id with at least 6 digits
pub fn validate_app_id(platform: Platform, app_id: &str) -> bool {
    let app_id = app_id.trim();
    match platform {
        Platform::PlayStore => {
            let segments: Vec<&str> = app_id.split('.').collect();
            segments.len() >= 2 && segments.iter().all(|s| !s.is_empty())
        }
        Platform::AppStore => app_id.len() >= 6 && app_id.chars().all(|c| c.is_ascii_digit()),
    }
}

/// Create the adapter for a platform
pub fn source_for(
    platform: Platform,
    config: &CollectionConfig,
) -> Result<Arc<dyn ReviewSource>, SourceError> {
    let source: Arc<dyn ReviewSource> = match platform {
        Platform::PlayStore => Arc::new(PlayStoreSource::new(config)?),
        Platform::AppStore => Arc::new(AppStoreSource::new()?),
    };
    Ok(source)
}
