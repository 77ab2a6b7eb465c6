//! Core Types and Trait Definitions for csra-collector
//!
//! - `ReviewSource`: one implementation per review source (Play Store, App Store)
//! - `RawReview`: source-specific review shape, consumed only by the normalizer
//! - `SourceError`: adapter failure taxonomy driving the orchestrator's retry policy

use async_trait::async_trait;
use csra_common::Platform;
use std::fmt;
use thiserror::Error;

/// Country used when the caller does not specify one
pub const DEFAULT_COUNTRY: &str = "us";

// ============================================================================
// Raw reviews
// ============================================================================

/// Review as returned by the Play Store reviews RPC
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayStoreRawReview {
    pub review_id: Option<String>,
    pub user_name: Option<String>,
    pub content: Option<String>,
    /// Star score as sent by the source (not range checked)
    pub score: Option<i64>,
    /// Submission time, unix seconds
    pub at_seconds: Option<i64>,
    pub thumbs_up_count: Option<u64>,
    pub app_version: Option<String>,
}

/// Review as returned by the App Store customer reviews feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppStoreRawReview {
    pub id: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Rating label, e.g. "4"
    pub rating: Option<String>,
    /// RFC 3339 timestamp with offset, e.g. "2024-03-01T09:12:44-07:00"
    pub updated: Option<String>,
    pub version: Option<String>,
}

/// Source-specific raw review
#[derive(Debug, Clone, PartialEq)]
pub enum RawReview {
    PlayStore(PlayStoreRawReview),
    AppStore(AppStoreRawReview),
}

impl RawReview {
    pub fn platform(&self) -> Platform {
        match self {
            RawReview::PlayStore(_) => Platform::PlayStore,
            RawReview::AppStore(_) => Platform::AppStore,
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Opaque position in a source's review listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// Play Store continuation token
    Continuation(String),
    /// App Store feed page number (1-based)
    PageNumber(u32),
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageToken::Continuation(token) => {
                // Continuation tokens are long; a prefix is enough for logs
                let prefix: String = token.chars().take(12).collect();
                write!(f, "continuation:{}", prefix)
            }
            PageToken::PageNumber(n) => write!(f, "page:{}", n),
        }
    }
}

/// One page of raw reviews
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub reviews: Vec<RawReview>,
    /// `None` when the source has no further pages
    pub next: Option<PageToken>,
}

// ============================================================================
// Errors
// ============================================================================

/// Review source failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Source throttled the request; retry the same token after backing off
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network or server failure; retryable
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Invalid app id or country; fatal to the run
    #[error("Not found: {0}")]
    NotFound(String),

    /// Source offers no review access for this app/country; ends the run
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl SourceError {
    /// True for errors the orchestrator retries with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited(_) | SourceError::TransientNetwork(_)
        )
    }

    /// Map an HTTP status from a review endpoint to an error
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            404 => SourceError::NotFound(format!("{} (HTTP 404)", context)),
            429 => SourceError::RateLimited(format!("{} (HTTP 429)", context)),
            403 | 451 => SourceError::Unsupported(format!("{} (HTTP {})", context, status)),
            _ => SourceError::TransientNetwork(format!("{} (HTTP {})", context, status)),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::TransientNetwork(err.to_string())
    }
}

/// Per-item normalization failure; the item is dropped and counted
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("review text is missing")]
    MissingText,

    #[error("review date is missing or unusable: {0}")]
    MissingDate(String),
}

// ============================================================================
// Source adapter trait
// ============================================================================

/// Review source adapter
///
/// Each call performs at most one network round-trip and returns at most one
/// page. Adapters keep no pagination state; the caller passes the token back.
///
/// # Example
/// ```rust,ignore
/// use csra_collector::types::ReviewSource;
///
/// let source = AppStoreSource::new(&config)?;
/// let page = source.fetch_page("389801252", "us", None).await?;
/// println!("{} reviews, next: {:?}", page.reviews.len(), page.next);
/// ```
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Platform this adapter collects from
    fn platform(&self) -> Platform;

    /// Fetch one page of reviews
    ///
    /// # Arguments
    /// * `app_id` - Package name (Play Store) or numeric id (App Store)
    /// * `country` - 2-letter country code
    /// * `token` - Position returned by the previous call, `None` for the first page
    async fn fetch_page(
        &self,
        app_id: &str,
        country: &str,
        token: Option<&PageToken>,
    ) -> Result<Page, SourceError>;
}

/// Resolve the country used for a request: trimmed, lowercase, "us" if empty
pub fn effective_country(country: &str) -> String {
    let trimmed = country.trim();
    if trimmed.is_empty() {
        DEFAULT_COUNTRY.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}
