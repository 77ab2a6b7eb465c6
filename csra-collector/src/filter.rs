//! Record filtering
//!
//! All criteria are optional and combined with AND. Filtering never reorders
//! records.

use chrono::{DateTime, Utc};
use csra_common::{Review, SentimentLabel};

/// Filter criteria; `Default` matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilter {
    /// Inclusive `(from, to)` bounds on the review date
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub sentiment_label: Option<SentimentLabel>,
    /// Record must carry this security tag
    pub security_tag: Option<String>,
    /// Minimum star rating; records without a rating never match
    pub min_rating: Option<u8>,
}

impl ReviewFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.date_range = Some((from, to));
        self
    }

    pub fn with_sentiment(mut self, label: SentimentLabel) -> Self {
        self.sentiment_label = Some(label);
        self
    }

    pub fn with_security_tag(mut self, tag: impl Into<String>) -> Self {
        self.security_tag = Some(tag.into());
        self
    }

    pub fn with_min_rating(mut self, rating: u8) -> Self {
        self.min_rating = Some(rating);
        self
    }

    /// True if `review` satisfies every set criterion
    pub fn matches(&self, review: &Review) -> bool {
        if let Some((from, to)) = self.date_range {
            if review.date < from || review.date > to {
                return false;
            }
        }
        if let Some(label) = self.sentiment_label {
            if review.sentiment_label != label {
                return false;
            }
        }
        if let Some(tag) = &self.security_tag {
            if !review.security_tags.contains(tag) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            match review.rating {
                Some(rating) if rating >= min => {}
                _ => return false,
            }
        }
        true
    }
}

/// Records matching `filter`, in input order
pub fn filter(records: &[Review], filter: &ReviewFilter) -> Vec<Review> {
    records
        .iter()
        .filter(|review| filter.matches(review))
        .cloned()
        .collect()
}
