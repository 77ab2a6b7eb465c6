//! Canonical review record shared by the collector and its consumers

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Compound score at or above which a review is Positive
pub const POSITIVE_THRESHOLD: f64 = 0.05;

/// Compound score at or below which a review is Negative
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

/// Review source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    /// Google Play Store
    #[serde(rename = "google")]
    PlayStore,
    /// Apple App Store
    #[serde(rename = "apple")]
    AppStore,
}

impl Platform {
    /// Short identifier used in ids, file names and CSV columns
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::PlayStore => "google",
            Platform::AppStore => "apple",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "play" | "playstore" | "google-play" => Ok(Platform::PlayStore),
            "apple" | "ios" | "appstore" | "app-store" => Ok(Platform::AppStore),
            other => Err(Error::InvalidInput(format!("unknown platform: {}", other))),
        }
    }
}

/// Discrete sentiment label derived from the compound score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Map a compound score to a label using the fixed thresholds
    pub fn from_score(score: f64) -> Self {
        if score >= POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if score <= NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "neutral" => Ok(SentimentLabel::Neutral),
            "negative" => Ok(SentimentLabel::Negative),
            other => Err(Error::InvalidInput(format!("unknown sentiment label: {}", other))),
        }
    }
}

/// Why a collection run stopped
///
/// Shown to the user alongside the collected/requested counts; a run is not
/// a success/failure boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Collected `max_reviews` records
    ReachedMax,
    /// Source reported no further pages
    Exhausted,
    /// Source has no review access for this app/country
    Unsupported,
    /// Retry budget for a page ran out; partial result
    RetriesExhausted,
    /// External cancellation between page fetches
    Cancelled,
    /// Fatal source error (invalid app id or country)
    Aborted,
}

impl StopReason {
    /// True for the stop reasons that end in the `Aborted` state
    pub fn is_abort(&self) -> bool {
        matches!(self, StopReason::Aborted)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::ReachedMax => "reached max reviews",
            StopReason::Exhausted => "source exhausted",
            StopReason::Unsupported => "reviews unsupported by source",
            StopReason::RetriesExhausted => "retries exhausted",
            StopReason::Cancelled => "cancelled",
            StopReason::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Canonical review record
///
/// Built once per raw review after normalization, scoring and
/// classification have all succeeded. Never mutated after it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// `<platform>:<app_id>:<source id>`, unique within a run
    pub id: String,
    pub platform: Platform,
    pub app_id: String,
    /// Lowercase ISO country code used for collection
    pub country: String,
    /// Review body (may be empty)
    pub text: String,
    /// Star rating 1-5, absent if the source omitted it
    pub rating: Option<u8>,
    /// Submission date (UTC)
    pub date: DateTime<Utc>,
    /// Compound polarity in [-1.0, 1.0]
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    /// Matched security taxonomy tags
    pub security_tags: BTreeSet<String>,
}

impl Review {
    /// True if at least one security tag matched
    pub fn is_security_related(&self) -> bool {
        !self.security_tags.is_empty()
    }

    /// Number of whitespace separated words in the body
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
