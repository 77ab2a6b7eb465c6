//! End-to-end pipeline tests: collector, dataset store, export and filtering

mod common;

use common::*;
use csra_collector::{
    export_csv, filter, parse_csv, CollectRequest, Collector, DatasetStore, Page, ReviewFilter,
    ReviewSource, SentimentScorer,
};
use csra_common::config::CollectionConfig;
use csra_common::{Platform, SentimentLabel, StopReason};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn test_collector() -> Collector {
    let config = CollectionConfig {
        request_delay_ms: 0,
        ..CollectionConfig::default()
    };
    Collector::with_parts(config, SentimentScorer::new(), (*classifier()).clone())
        .with_backoff(RecordingBackoff::new())
}

fn security_page() -> Page {
    Page {
        reviews: vec![
            raw_review_with_text(0, "They sell my data to third parties, terrible"),
            raw_review_with_text(1, "Great design and smooth scrolling"),
            raw_review_with_text(2, "My account was hacked twice, awful security"),
            raw_review_with_text(3, "Works fine"),
        ],
        next: None,
    }
}

#[tokio::test]
async fn test_concurrent_runs_share_store() {
    let collector = test_collector();

    let first: Arc<dyn ReviewSource> = ScriptedSource::with_pages(&[10, 10]);
    let second: Arc<dyn ReviewSource> = ScriptedSource::with_pages(&[7]);
    let results = collector
        .collect_many_from(vec![
            (first, CollectRequest::new(Platform::PlayStore, "com.first.app", "us", 15)),
            (second, CollectRequest::new(Platform::PlayStore, "com.second.app", "gb", 100)),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].collected, 15);
    assert_eq!(results[0].stop_reason, StopReason::ReachedMax);
    assert_eq!(results[1].collected, 7);
    assert_eq!(results[1].country, "gb");

    let store = collector.store();
    assert_eq!(store.len().await, 22);
    assert!(store.contains("google:com.first.app:r0").await);
    assert!(store.contains("google:com.second.app:r0").await);
}

#[tokio::test]
async fn test_empty_country_uses_configured_default() {
    let collector = test_collector();
    let source: Arc<dyn ReviewSource> = ScriptedSource::with_pages(&[2]);

    let result = collector
        .collect_from(source, &CollectRequest::new(Platform::PlayStore, APP_ID, "", 10))
        .await;

    assert_eq!(result.country, "us");
    assert!(result.records.iter().all(|r| r.country == "us"));
}

#[tokio::test]
async fn test_recollection_returns_newest_reviews_without_duplicating_store() {
    let collector = test_collector();
    let request = CollectRequest::new(Platform::PlayStore, APP_ID, "us", 5);

    let first = collector
        .collect_from(ScriptedSource::with_pages(&[5, 5, 5, 5]), &request)
        .await;
    let source = ScriptedSource::with_pages(&[5, 5, 5, 5]);
    let second = collector.collect_from(source.clone(), &request).await;

    assert_eq!(first.collected, 5);
    assert_eq!(first.already_stored, 0);

    assert_eq!(second.stop_reason, StopReason::ReachedMax);
    assert_eq!(second.collected, 5);
    assert_eq!(second.dropped, 0);
    assert_eq!(second.already_stored, 5);
    assert_eq!(source.calls(), 1);
    let ids: Vec<_> = second.records.iter().map(|r| r.id.as_str()).collect();
    let first_ids: Vec<_> = first.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, first_ids);
    assert_eq!(ids[0], "google:com.example.app:r0");
    assert_eq!(second.warnings.len(), 5);

    assert_eq!(collector.store().len().await, 5);
}

#[tokio::test]
async fn test_filter_and_export_collected_dataset() {
    let collector = test_collector();
    let source: Arc<dyn ReviewSource> = ScriptedSource::new(vec![Ok(security_page())]);
    let result = collector
        .collect_from(source, &CollectRequest::new(Platform::PlayStore, APP_ID, "us", 10))
        .await;
    assert_eq!(result.collected, 4);

    let privacy = filter(&result.records, &ReviewFilter::new().with_security_tag("privacy"));
    assert_eq!(privacy.len(), 1);
    assert_eq!(privacy[0].id, "google:com.example.app:r0");

    let negative = filter(
        &result.records,
        &ReviewFilter::new().with_sentiment(SentimentLabel::Negative),
    );
    let negative_ids: Vec<_> = negative.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        negative_ids,
        vec!["google:com.example.app:r0", "google:com.example.app:r2"]
    );

    let parsed = parse_csv(&export_csv(&result.records).unwrap()).unwrap();
    assert_eq!(parsed.len(), result.records.len());
    for (original, read_back) in result.records.iter().zip(&parsed) {
        assert_eq!(read_back.id, original.id);
        assert_eq!(read_back.text, original.text);
        assert_eq!(read_back.rating, original.rating);
        assert_eq!(read_back.date, original.date);
        assert_eq!(read_back.sentiment_label, original.sentiment_label);
        assert_eq!(read_back.security_tags, original.security_tags);
        assert!((read_back.sentiment_score - original.sentiment_score).abs() < 1e-4);
    }
}

#[tokio::test]
async fn test_store_persists_and_reports_stats() {
    let collector = test_collector();
    let source: Arc<dyn ReviewSource> = ScriptedSource::new(vec![Ok(security_page())]);
    collector
        .collect_from(source, &CollectRequest::new(Platform::PlayStore, APP_ID, "us", 10))
        .await;

    let stats = collector.store().stats().await;
    assert_eq!(stats.total, 4);
    assert_eq!(stats.security_related, 2);
    assert_eq!(stats.security_percentage(), 50.0);
    assert!(stats.average_rating.is_some());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reviews.csv");
    collector.store().save_csv(&path).await.unwrap();

    let loaded = DatasetStore::load_csv(&path).await.unwrap();
    assert_eq!(loaded.len().await, 4);
    assert_eq!(loaded.stats().await.security_related, 2);

    let hacked = loaded
        .query(&ReviewFilter::new().with_security_tag("account-security"))
        .await;
    assert_eq!(hacked.len(), 1);
    assert_eq!(hacked[0].id, "google:com.example.app:r2");
}
