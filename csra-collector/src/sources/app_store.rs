//! Apple App Store review source
//!
//! Reads the iTunes customer reviews RSS feed in JSON form:
//! `https://itunes.apple.com/{country}/rss/customerreviews/page={n}/id={app_id}/sortby=mostrecent/json`
//!
//! The feed serves at most 10 pages of 50 reviews. Every value is wrapped in a
//! `{"label": ...}` object, and `entry` is an object instead of an array when
//! a page holds a single review.

use super::{build_http_client, build_rate_limiter, validate_app_id, SourceRateLimiter};
use crate::types::{
    effective_country, AppStoreRawReview, Page, PageToken, RawReview, ReviewSource, SourceError,
};
use async_trait::async_trait;
use csra_common::Platform;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// iTunes feed base URL
const ITUNES_BASE_URL: &str = "https://itunes.apple.com";

/// Last page the feed serves
pub const MAX_FEED_PAGE: u32 = 10;

/// Requests per second sent to iTunes
const REQUESTS_PER_SECOND: u32 = 2;

#[derive(Debug, Deserialize)]
struct FeedResponse {
    feed: Option<Feed>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    entry: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<FeedEntry>),
    One(Box<FeedEntry>),
}

#[derive(Debug, Deserialize)]
struct Label {
    label: String,
}

#[derive(Debug, Deserialize)]
struct FeedAuthor {
    name: Option<Label>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    id: Option<Label>,
    author: Option<FeedAuthor>,
    title: Option<Label>,
    content: Option<Label>,
    #[serde(rename = "im:rating")]
    rating: Option<Label>,
    #[serde(rename = "im:version")]
    version: Option<Label>,
    updated: Option<Label>,
    /// Present only on the app's own metadata entry, which older feeds put first
    #[serde(rename = "im:name")]
    app_name: Option<Label>,
}

impl FeedEntry {
    fn into_raw(self) -> RawReview {
        RawReview::AppStore(AppStoreRawReview {
            id: self.id.map(|l| l.label),
            author: self.author.and_then(|a| a.name).map(|l| l.label),
            title: self.title.map(|l| l.label),
            content: self.content.map(|l| l.label),
            rating: self.rating.map(|l| l.label),
            updated: self.updated.map(|l| l.label),
            version: self.version.map(|l| l.label),
        })
    }
}

/// Apple App Store review source
pub struct AppStoreSource {
    http_client: Client,
    rate_limiter: SourceRateLimiter,
}

impl AppStoreSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self {
            http_client: build_http_client()?,
            rate_limiter: build_rate_limiter(REQUESTS_PER_SECOND),
        })
    }
}

#[async_trait]
impl ReviewSource for AppStoreSource {
    fn platform(&self) -> Platform {
        Platform::AppStore
    }

    async fn fetch_page(
        &self,
        app_id: &str,
        country: &str,
        token: Option<&PageToken>,
    ) -> Result<Page, SourceError> {
        if !validate_app_id(Platform::AppStore, app_id) {
            return Err(SourceError::NotFound(format!(
                "'{}' is not a numeric App Store id",
                app_id
            )));
        }

        let page_number = match token {
            None => 1,
            Some(PageToken::PageNumber(n)) if (1..=MAX_FEED_PAGE).contains(n) => *n,
            Some(other) => {
                return Err(SourceError::NotFound(format!(
                    "App Store feed cannot resume from {}",
                    other
                )))
            }
        };

        let country = effective_country(country);
        let url = feed_url(app_id.trim(), &country, page_number);

        self.rate_limiter.until_ready().await;

        debug!(app_id = %app_id, country = %country, page = page_number, url = %url, "Requesting App Store reviews page");

        let response = self.http_client.get(&url).send().await?;

        if let Some(err) = status_error(response.status().as_u16(), &country, app_id) {
            return Err(err);
        }

        let text = response.text().await?;
        let page = parse_feed_page(&text, page_number)?;

        debug!(
            app_id = %app_id,
            page = page_number,
            reviews = page.reviews.len(),
            has_next = page.next.is_some(),
            "App Store page parsed"
        );

        Ok(page)
    }
}

/// Error for a non-success feed response, `None` for 2xx
///
/// Unknown storefront codes come back as 400 and throttling as 503.
pub fn status_error(status: u16, country: &str, app_id: &str) -> Option<SourceError> {
    match status {
        200..=299 => None,
        400 => Some(SourceError::NotFound(format!(
            "App Store storefront '{}' rejected the request (HTTP 400)",
            country
        ))),
        503 => Some(SourceError::RateLimited(
            "App Store feed throttled (HTTP 503)".to_string(),
        )),
        _ => Some(SourceError::from_status(
            status,
            &format!("App Store reviews for {}", app_id),
        )),
    }
}

/// Feed URL for one page
pub fn feed_url(app_id: &str, country: &str, page: u32) -> String {
    format!(
        "{}/{}/rss/customerreviews/page={}/id={}/sortby=mostrecent/json",
        ITUNES_BASE_URL, country, page, app_id
    )
}

/// Parse one feed page
///
/// An empty page, or the feed's last page, has no next token.
pub fn parse_feed_page(body: &str, page_number: u32) -> Result<Page, SourceError> {
    let response: FeedResponse = serde_json::from_str(body).map_err(|e| {
        SourceError::TransientNetwork(format!("App Store feed parse failed: {}", e))
    })?;

    let feed = response.feed.ok_or_else(|| {
        SourceError::Unsupported("App Store returned no review feed for this app".to_string())
    })?;

    let entries = match feed.entry {
        None => Vec::new(),
        Some(OneOrMany::Many(entries)) => entries,
        Some(OneOrMany::One(entry)) => vec![*entry],
    };

    let reviews: Vec<RawReview> = entries
        .into_iter()
        .filter(|entry| entry.app_name.is_none())
        .map(FeedEntry::into_raw)
        .collect();

    let next = if reviews.is_empty() || page_number >= MAX_FEED_PAGE {
        None
    } else {
        Some(PageToken::PageNumber(page_number + 1))
    };

    Ok(Page { reviews, next })
}
