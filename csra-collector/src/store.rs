//! In-memory dataset of finished review records
//!
//! Append-only: records are handed out as shared `Arc<Review>` and there is
//! no mutation API. Cloning a `DatasetStore` shares the same dataset, so
//! concurrent collection runs can append to one store.

use crate::export::{export_csv, parse_csv};
use crate::filter::ReviewFilter;
use csra_common::{Error, Result, Review, SentimentLabel};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct StoreInner {
    records: Vec<Arc<Review>>,
    ids: HashSet<String>,
}

/// Shared, append-only review dataset
#[derive(Debug, Clone, Default)]
pub struct DatasetStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record
    ///
    /// # Errors
    /// `DuplicateRecord` if a record with the same id is already stored; the
    /// store is left unchanged.
    pub async fn append(&self, review: Review) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.ids.insert(review.id.clone()) {
            return Err(Error::DuplicateRecord(review.id));
        }
        inner.records.push(Arc::new(review));
        Ok(())
    }

    /// Append several records, all or nothing
    pub async fn append_all(&self, reviews: Vec<Review>) -> Result<()> {
        let mut inner = self.inner.write().await;

        let mut batch_ids = HashSet::with_capacity(reviews.len());
        for review in &reviews {
            if inner.ids.contains(&review.id) || !batch_ids.insert(review.id.as_str()) {
                return Err(Error::DuplicateRecord(review.id.clone()));
            }
        }

        for review in reviews {
            inner.ids.insert(review.id.clone());
            inner.records.push(Arc::new(review));
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.ids.contains(id)
    }

    /// Shared handles to all records, in append order
    pub async fn records(&self) -> Vec<Arc<Review>> {
        self.inner.read().await.records.clone()
    }

    /// Owned copies of all records, in append order
    pub async fn snapshot(&self) -> Vec<Review> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .map(|r| Review::clone(r))
            .collect()
    }

    /// Records matching `filter`, in append order
    pub async fn query(&self, filter: &ReviewFilter) -> Vec<Review> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| Review::clone(r))
            .collect()
    }

    pub async fn stats(&self) -> DatasetStats {
        let inner = self.inner.read().await;
        DatasetStats::from_records(inner.records.iter().map(|r| r.as_ref()))
    }

    /// Write the dataset as CSV
    pub async fn save_csv(&self, path: &Path) -> Result<()> {
        let records = self.snapshot().await;
        let bytes = export_csv(&records)?;
        tokio::fs::write(path, bytes).await?;
        info!(path = %path.display(), records = records.len(), "Dataset saved");
        Ok(())
    }

    /// Load a dataset previously written by `save_csv`
    pub async fn load_csv(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let records = parse_csv(&bytes)?;
        debug!(path = %path.display(), records = records.len(), "Dataset CSV parsed");

        let store = Self::new();
        store.append_all(records).await?;
        Ok(store)
    }
}

/// Summary of a dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetStats {
    pub total: usize,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    /// Records with at least one security tag
    pub security_related: usize,
    /// Occurrences per security tag
    pub tag_counts: BTreeMap<String, usize>,
    /// Mean of the ratings present; `None` when no record has a rating
    pub average_rating: Option<f64>,
}

impl DatasetStats {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Review>,
    {
        let mut stats = DatasetStats::default();
        let mut rating_sum = 0u64;
        let mut rated = 0u64;

        for review in records {
            stats.total += 1;
            match review.sentiment_label {
                SentimentLabel::Positive => stats.positive += 1,
                SentimentLabel::Neutral => stats.neutral += 1,
                SentimentLabel::Negative => stats.negative += 1,
            }
            if review.is_security_related() {
                stats.security_related += 1;
            }
            for tag in &review.security_tags {
                *stats.tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
            if let Some(rating) = review.rating {
                rating_sum += u64::from(rating);
                rated += 1;
            }
        }

        if rated > 0 {
            stats.average_rating = Some(rating_sum as f64 / rated as f64);
        }
        stats
    }

    /// Share of security related records, 0-100
    pub fn security_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.security_related as f64 / self.total as f64 * 100.0
        }
    }
}
