use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::JobManager;
use crate::storage::ArtifactPaths;
use crate::types::{CurrencyPair, MetricsRecord, RateSeries};

/// Shared by every handler. Handlers only read artifacts; writes go through `jobs`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub paths: ArtifactPaths,
    pub jobs: Arc<JobManager>,
}

impl AppState {
    pub fn new(jobs: Arc<JobManager>) -> Self {
        Self {
            config: Arc::new(jobs.config().clone()),
            paths: jobs.paths().clone(),
            jobs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RatePoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateColumn {
    pub pair: CurrencyPair,
    pub label: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatesResponse {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<RateColumn>,
}

impl From<&RateSeries> for RatesResponse {
    fn from(series: &RateSeries) -> Self {
        let columns = series
            .pairs()
            .iter()
            .enumerate()
            .map(|(i, pair)| RateColumn {
                pair: pair.clone(),
                label: pair.label(),
                values: series.records().iter().map(|r| r.rates[i]).collect(),
            })
            .collect();
        Self {
            dates: series.records().iter().map(|r| r.date).collect(),
            columns,
        }
    }
}

/// Recent history drawn next to one currency's forecast
#[derive(Debug, Clone, Serialize)]
pub struct ForecastPanel {
    pub pair: CurrencyPair,
    pub label: String,
    pub history: Vec<RatePoint>,
    pub forecast: Vec<RatePoint>,
    pub download: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ForecastsResponse {
    pub panels: Vec<ForecastPanel>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub metrics: Vec<MetricsRecord>,
}
