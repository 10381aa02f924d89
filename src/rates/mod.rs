pub mod frankfurter;

pub use frankfurter::*;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use crate::config::AppConfig;
use crate::error::Result;
use crate::storage::{write_history, ArtifactPaths};
use crate::types::RateSeries;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Daily rates for the configured basket, inclusive of both ends
    async fn fetch_history(&self, start: NaiveDate, end: NaiveDate) -> Result<RateSeries>;
}

/// Fetch the configured range up to `today` and overwrite the historical table.
/// Any fetch error is returned as-is; nothing is written in that case.
pub async fn fetch_and_store(
    source: &dyn RateSource,
    config: &AppConfig,
    paths: &ArtifactPaths,
    today: NaiveDate,
) -> Result<RateSeries> {
    let series = source.fetch_history(config.source.start_date, today).await?;
    write_history(paths.history_file(), &series)?;
    info!(
        "Historical rates refreshed: {} rows ({} .. {})",
        series.len(),
        series.first_date().map(|d| d.to_string()).unwrap_or_default(),
        series.last_date().map(|d| d.to_string()).unwrap_or_default()
    );
    Ok(series)
}
