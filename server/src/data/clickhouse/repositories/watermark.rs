//! Watermark repositories
//!
//! File watermarks track per-file loader progress (done/failed, latest entry
//! per filename wins). The enricher watermark is a single latest-wins row
//! marking the lexicographic upper bound of enriched spans.

use std::collections::HashSet;

use chrono::Utc;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::constants::ENRICHER_WATERMARK_KEY;
use crate::data::clickhouse::ClickhouseError;
use crate::data::clickhouse::schema::ENRICHER_WATERMARK_TABLE;
use crate::data::types::{EnricherWatermark, FileStatus};
use crate::utils::time::chrono_to_time;

// ============================================================================
// FILE WATERMARKS
// ============================================================================

#[derive(Row, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FileWatermarkRow {
    filename: String,
    status: String,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    processed_at: OffsetDateTime,
    row_count: u64,
    error_message: String,
}

/// Filenames already recorded in the watermark table, regardless of status.
/// A `failed` entry counts as processed; failed files are not retried.
pub async fn processed_files(
    client: &Client,
    watermark_table: &str,
) -> Result<HashSet<String>, ClickhouseError> {
    let sql = format!("SELECT Filename FROM {} FINAL", watermark_table);
    let filenames = client.query(&sql).fetch_all::<String>().await?;
    Ok(filenames.into_iter().collect())
}

/// Record a file processing result
pub async fn record_file(
    client: &Client,
    watermark_table: &str,
    filename: &str,
    status: FileStatus,
    row_count: u64,
    error_message: &str,
) -> Result<(), ClickhouseError> {
    let row = FileWatermarkRow {
        filename: filename.to_string(),
        status: status.as_str().to_string(),
        processed_at: chrono_to_time(Utc::now()),
        row_count,
        error_message: error_message.to_string(),
    };

    let mut insert: clickhouse::insert::Insert<FileWatermarkRow> =
        client.insert(watermark_table).await?;
    insert.write(&row).await?;
    insert.end().await?;
    Ok(())
}

// ============================================================================
// ENRICHER WATERMARK
// ============================================================================

#[derive(Row, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnricherWatermarkFetchRow {
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    last_timestamp: OffsetDateTime,
    last_span_id: String,
}

#[derive(Row, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnricherWatermarkInsertRow {
    watermark_key: String,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    last_timestamp: OffsetDateTime,
    last_span_id: String,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    updated_at: OffsetDateTime,
}

/// Read the current enricher watermark; absent means nothing enriched yet.
pub async fn get_enricher_watermark(client: &Client) -> Result<EnricherWatermark, ClickhouseError> {
    let row = client
        .query(
            "SELECT LastTimestamp, LastSpanId FROM enricher_watermark FINAL \
             WHERE WatermarkKey = ? LIMIT 1",
        )
        .bind(ENRICHER_WATERMARK_KEY)
        .fetch_optional::<EnricherWatermarkFetchRow>()
        .await?;

    Ok(match row {
        Some(row) => EnricherWatermark {
            last_timestamp: row.last_timestamp,
            last_span_id: row.last_span_id,
        },
        None => EnricherWatermark::origin(),
    })
}

/// Advance the enricher watermark (latest-wins insert)
pub async fn update_enricher_watermark(
    client: &Client,
    watermark: &EnricherWatermark,
) -> Result<(), ClickhouseError> {
    let row = EnricherWatermarkInsertRow {
        watermark_key: ENRICHER_WATERMARK_KEY.to_string(),
        last_timestamp: watermark.last_timestamp,
        last_span_id: watermark.last_span_id.clone(),
        updated_at: chrono_to_time(Utc::now()),
    };

    let mut insert: clickhouse::insert::Insert<EnricherWatermarkInsertRow> =
        client.insert(ENRICHER_WATERMARK_TABLE).await?;
    insert.write(&row).await?;
    insert.end().await?;
    Ok(())
}
