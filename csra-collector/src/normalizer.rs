//! Raw review → canonical record mapping
//!
//! Drops a review only when its text field is absent or it has no usable
//! date. A missing or out-of-range rating is kept as "no rating".

use crate::sentiment::Sentiment;
use crate::types::{
    effective_country, AppStoreRawReview, MalformedRecord, PlayStoreRawReview, RawReview,
};
use chrono::{DateTime, TimeZone, Utc};
use csra_common::{Platform, Review};
use std::collections::BTreeSet;

/// Collection parameters stamped onto every record of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeContext {
    pub platform: Platform,
    pub app_id: String,
    /// Lowercase country code
    pub country: String,
}

impl NormalizeContext {
    pub fn new(platform: Platform, app_id: &str, country: &str) -> Self {
        Self {
            platform,
            app_id: app_id.trim().to_string(),
            country: effective_country(country),
        }
    }
}

/// Review in canonical form, before scoring and classification
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReview {
    pub id: String,
    pub platform: Platform,
    pub app_id: String,
    pub country: String,
    pub text: String,
    pub rating: Option<u8>,
    pub date: DateTime<Utc>,
}

impl NormalizedReview {
    /// Complete the record with its sentiment and security tags
    pub fn assemble(self, sentiment: Sentiment, security_tags: BTreeSet<String>) -> Review {
        Review {
            id: self.id,
            platform: self.platform,
            app_id: self.app_id,
            country: self.country,
            text: self.text,
            rating: self.rating,
            date: self.date,
            sentiment_score: sentiment.compound,
            sentiment_label: sentiment.label,
            security_tags,
        }
    }
}

/// Normalize one raw review
///
/// # Arguments
/// * `raw` - Review as returned by a source adapter
/// * `ctx` - Platform, app id and country of the run
/// * `ordinal` - Position of the raw review within the run; only used to
///   synthesize an id when the source sent none
///
/// # Errors
/// `MalformedRecord` when text or date are missing; the caller drops the item.
pub fn normalize(
    raw: &RawReview,
    ctx: &NormalizeContext,
    ordinal: usize,
) -> Result<NormalizedReview, MalformedRecord> {
    let fields = match raw {
        RawReview::PlayStore(r) => play_store_fields(r)?,
        RawReview::AppStore(r) => app_store_fields(r)?,
    };

    let source_id = fields
        .source_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("idx-{}", ordinal));

    Ok(NormalizedReview {
        id: format!("{}:{}:{}", ctx.platform.slug(), ctx.app_id, source_id),
        platform: ctx.platform,
        app_id: ctx.app_id.clone(),
        country: ctx.country.clone(),
        text: fields.text,
        rating: fields.rating,
        date: fields.date,
    })
}

/// Platform-independent view of the fields the canonical record needs
struct CanonicalFields {
    source_id: Option<String>,
    text: String,
    rating: Option<u8>,
    date: DateTime<Utc>,
}

fn play_store_fields(r: &PlayStoreRawReview) -> Result<CanonicalFields, MalformedRecord> {
    let text = r.content.clone().ok_or(MalformedRecord::MissingText)?;
    let seconds = r
        .at_seconds
        .ok_or_else(|| MalformedRecord::MissingDate("no timestamp".to_string()))?;
    let date = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| MalformedRecord::MissingDate(format!("timestamp {} out of range", seconds)))?;

    Ok(CanonicalFields {
        source_id: r.review_id.clone(),
        text,
        rating: r.score.and_then(valid_rating),
        date,
    })
}

fn app_store_fields(r: &AppStoreRawReview) -> Result<CanonicalFields, MalformedRecord> {
    let text = r.content.clone().ok_or(MalformedRecord::MissingText)?;
    let updated = r
        .updated
        .as_deref()
        .ok_or_else(|| MalformedRecord::MissingDate("no updated field".to_string()))?;
    let date = DateTime::parse_from_rfc3339(updated.trim())
        .map_err(|e| MalformedRecord::MissingDate(format!("'{}': {}", updated, e)))?
        .with_timezone(&Utc);

    Ok(CanonicalFields {
        source_id: r.id.clone(),
        text,
        rating: r
            .rating
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(valid_rating),
        date,
    })
}

fn valid_rating(score: i64) -> Option<u8> {
    (1..=5).contains(&score).then_some(score as u8)
}
