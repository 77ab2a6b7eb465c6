//! Google Play Store review source
//!
//! Queries the Play Store web client's `batchexecute` endpoint with the
//! `UsvDTd` reviews RPC. Responses are a `)]}'`-prefixed JSON envelope whose
//! payload is itself a JSON string of positional arrays.
//!
//! # Review layout (payload `[0][i]`)
//! - `[0]` review id
//! - `[1][0]` author name
//! - `[2]` star score
//! - `[4]` review text
//! - `[5][0]` submission time, unix seconds
//! - `[6]` thumbs-up count
//! - `[10]` app version at review time
//!
//! The continuation token for the next page is at `payload[-2][-1]`.

use super::{build_http_client, build_rate_limiter, validate_app_id, SourceRateLimiter};
use crate::types::{
    effective_country, Page, PageToken, PlayStoreRawReview, RawReview, ReviewSource, SourceError,
};
use async_trait::async_trait;
use csra_common::config::CollectionConfig;
use csra_common::Platform;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

/// Play Store RPC endpoint
const PLAY_STORE_RPC_URL: &str = "https://play.google.com/_/PlayStoreUi/data/batchexecute";

/// RPC id of the reviews listing
const REVIEWS_RPC_ID: &str = "UsvDTd";

/// Sort order "newest first"
const SORT_NEWEST: u8 = 2;

/// Anti-JSON-hijacking prefix on every batchexecute response
const RESPONSE_PREFIX: &str = ")]}'";

/// Requests per second sent to the Play Store
const REQUESTS_PER_SECOND: u32 = 1;

/// Google Play Store review source
pub struct PlayStoreSource {
    http_client: Client,
    rate_limiter: SourceRateLimiter,
    /// Review language (`hl` parameter)
    lang: String,
    /// Reviews requested per page
    page_size: usize,
}

impl PlayStoreSource {
    pub fn new(config: &CollectionConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http_client: build_http_client()?,
            rate_limiter: build_rate_limiter(REQUESTS_PER_SECOND),
            lang: config.lang.clone(),
            page_size: config.page_size.max(1),
        })
    }
}

#[async_trait]
impl ReviewSource for PlayStoreSource {
    fn platform(&self) -> Platform {
        Platform::PlayStore
    }

    async fn fetch_page(
        &self,
        app_id: &str,
        country: &str,
        token: Option<&PageToken>,
    ) -> Result<Page, SourceError> {
        if !validate_app_id(Platform::PlayStore, app_id) {
            return Err(SourceError::NotFound(format!(
                "'{}' is not a Play Store package name",
                app_id
            )));
        }

        let continuation = match token {
            None => None,
            Some(PageToken::Continuation(t)) => Some(t.as_str()),
            Some(other) => {
                return Err(SourceError::NotFound(format!(
                    "Play Store cannot resume from {}",
                    other
                )))
            }
        };

        let country = effective_country(country);
        let body = build_request_body(app_id, self.page_size, continuation);

        self.rate_limiter.until_ready().await;

        debug!(
            app_id = %app_id,
            country = %country,
            page_size = self.page_size,
            continued = continuation.is_some(),
            "Requesting Play Store reviews page"
        );

        let response = self
            .http_client
            .post(PLAY_STORE_RPC_URL)
            .query(&[("hl", self.lang.as_str()), ("gl", country.as_str())])
            .form(&[("f.req", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(
                status.as_u16(),
                &format!("Play Store reviews for {}", app_id),
            ));
        }

        let text = response.text().await?;
        let page = parse_reviews_response(&text)?;

        debug!(
            app_id = %app_id,
            reviews = page.reviews.len(),
            has_next = page.next.is_some(),
            "Play Store page parsed"
        );

        Ok(page)
    }
}

/// Build the `f.req` form value for one reviews page
pub fn build_request_body(app_id: &str, count: usize, continuation: Option<&str>) -> String {
    let token = continuation.map_or(Value::Null, |t| Value::String(t.to_string()));
    let inner = json!([null, null, [2, SORT_NEWEST, [count, null, token], null, []], [app_id, 7]]);
    json!([[[REVIEWS_RPC_ID, inner.to_string(), null, "generic"]]]).to_string()
}

/// Parse a batchexecute response into a page of raw reviews
///
/// A `null` payload means the app has no (more) reviews for this
/// language/country and yields an empty, final page.
pub fn parse_reviews_response(body: &str) -> Result<Page, SourceError> {
    let json_start = body
        .strip_prefix(RESPONSE_PREFIX)
        .and_then(|rest| rest.find('[').map(|i| &rest[i..]))
        .ok_or_else(|| {
            SourceError::TransientNetwork("Play Store response missing envelope".to_string())
        })?;

    // The envelope may be followed by length-prefixed chunks; the stream
    // deserializer stops after the first complete value.
    let envelope: Value = serde_json::Deserializer::from_str(json_start)
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| SourceError::TransientNetwork("Play Store response is empty".to_string()))?
        .map_err(|e| {
            SourceError::TransientNetwork(format!("Play Store envelope parse failed: {}", e))
        })?;

    let payload = match envelope[0][2].as_str() {
        Some(payload) => payload,
        None => return Ok(Page::default()),
    };

    let data: Value = serde_json::from_str(payload).map_err(|e| {
        SourceError::TransientNetwork(format!("Play Store payload parse failed: {}", e))
    })?;

    let reviews: Vec<RawReview> = data[0]
        .as_array()
        .map(|items| items.iter().map(parse_review).collect())
        .unwrap_or_default();

    let next = data
        .as_array()
        .filter(|parts| parts.len() >= 2)
        .and_then(|parts| parts[parts.len() - 2].as_array())
        .and_then(|token_part| token_part.last())
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(|t| PageToken::Continuation(t.to_string()));

    Ok(Page { reviews, next })
}

fn parse_review(item: &Value) -> RawReview {
    RawReview::PlayStore(PlayStoreRawReview {
        review_id: item[0].as_str().map(str::to_string),
        user_name: item[1][0].as_str().map(str::to_string),
        content: item[4].as_str().map(str::to_string),
        score: item[2].as_i64(),
        at_seconds: item[5][0].as_i64(),
        thumbs_up_count: item[6].as_u64(),
        app_version: item[10].as_str().map(str::to_string),
    })
}
