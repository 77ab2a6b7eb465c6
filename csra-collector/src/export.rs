//! CSV export of review records
//!
//! Column order matches the canonical record:
//! `id,platform,app_id,country,text,rating,date,sentiment_score,sentiment_label,security_tags`
//!
//! Tags are joined with `;`, the score is written with 4 decimals, dates are
//! RFC 3339 UTC and an absent rating is an empty field.

use chrono::{DateTime, SecondsFormat, Utc};
use csra_common::{Error, Platform, Result, Review, SentimentLabel};
use csv::{Reader, StringRecord, Writer};
use std::collections::BTreeSet;

/// Header of the canonical export
pub const CSV_HEADER: [&str; 10] = [
    "id",
    "platform",
    "app_id",
    "country",
    "text",
    "rating",
    "date",
    "sentiment_score",
    "sentiment_label",
    "security_tags",
];

/// Extra columns of the processed export
pub const PROCESSED_EXTRA_COLUMNS: [&str; 2] = ["content_length", "word_count"];

/// Separator between security tags inside one field
pub(crate) const TAG_SEPARATOR: &str = ";";

/// Encode records as CSV with a header row
pub fn export_csv(records: &[Review]) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for review in records {
        writer.write_record(record_fields(review))?;
    }
    finish(writer)
}

/// Encode records with the analysis columns appended
/// (`content_length` in characters, `word_count`)
pub fn export_processed_csv(records: &[Review]) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER.iter().chain(PROCESSED_EXTRA_COLUMNS.iter()))?;
    for review in records {
        let mut fields = record_fields(review).to_vec();
        fields.push(review.text.chars().count().to_string());
        fields.push(review.word_count().to_string());
        writer.write_record(&fields)?;
    }
    finish(writer)
}

/// Decode CSV produced by `export_csv` (or `export_processed_csv`; extra
/// columns are ignored)
///
/// # Errors
/// `InvalidInput` when the header does not start with the canonical columns
/// or a field cannot be parsed; the message names the data row.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Review>> {
    let mut reader = Reader::from_reader(bytes);

    let headers = reader.headers()?.clone();
    let matches_header = headers.len() >= CSV_HEADER.len()
        && CSV_HEADER
            .iter()
            .zip(headers.iter())
            .all(|(expected, actual)| *expected == actual.trim());
    if !matches_header {
        return Err(Error::InvalidInput(format!(
            "Unexpected CSV header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let review = parse_row(&row)
            .map_err(|e| Error::InvalidInput(format!("CSV row {}: {}", index + 1, e)))?;
        records.push(review);
    }
    Ok(records)
}

fn record_fields(review: &Review) -> [String; 10] {
    [
        review.id.clone(),
        review.platform.slug().to_string(),
        review.app_id.clone(),
        review.country.clone(),
        review.text.clone(),
        review.rating.map(|r| r.to_string()).unwrap_or_default(),
        review.date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        format!("{:.4}", review.sentiment_score),
        review.sentiment_label.as_str().to_string(),
        review
            .security_tags
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(TAG_SEPARATOR),
    ]
}

fn parse_row(row: &StringRecord) -> std::result::Result<Review, String> {
    let field = |i: usize| row.get(i).ok_or_else(|| format!("missing column {}", CSV_HEADER[i]));

    let platform: Platform = field(1)?.parse().map_err(|e: Error| e.to_string())?;
    let rating = match field(5)?.trim() {
        "" => None,
        value => Some(
            value
                .parse::<u8>()
                .map_err(|e| format!("rating '{}': {}", value, e))?,
        ),
    };
    let raw_date = field(6)?;
    let date: DateTime<Utc> = raw_date
        .parse()
        .map_err(|e| format!("date '{}': {}", raw_date, e))?;
    let sentiment_score: f64 = field(7)?
        .parse()
        .map_err(|e| format!("sentiment_score: {}", e))?;
    let sentiment_label: SentimentLabel =
        field(8)?.parse().map_err(|e: Error| e.to_string())?;
    let security_tags: BTreeSet<String> = field(9)?
        .split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(Review {
        id: field(0)?.to_string(),
        platform,
        app_id: field(2)?.to_string(),
        country: field(3)?.to_string(),
        text: field(4)?.to_string(),
        rating,
        date,
        sentiment_score,
        sentiment_label,
        security_tags,
    })
}

fn finish(mut writer: Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer.flush()?;
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}
