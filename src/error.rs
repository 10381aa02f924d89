//! Error types shared by the fetcher, the pipeline and the job runner

use std::path::PathBuf;
use thiserror::Error;

use crate::types::CurrencyPair;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Rate request failed with status code: {status}")]
    Fetch { status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Insufficient data for {pair}: need {required} values, have {available}")]
    InsufficientData {
        pair: CurrencyPair,
        required: usize,
        available: usize,
    },

    #[error("Artifact not found: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Invalid rate series: {0}")]
    InvalidSeries(String),

    #[error("Invalid configuration: {}", .0.join(", "))]
    InvalidConfig(Vec<String>),

    #[error("Another job is already active: {0}")]
    JobBusy(uuid::Uuid),

    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("Training thread terminated without a result")]
    TrainingAborted,

    #[error("Model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_message_carries_status() {
        let err = ForecastError::Fetch { status: 503 };
        assert_eq!(err.to_string(), "Rate request failed with status code: 503");
    }

    #[test]
    fn test_insufficient_data_names_pair() {
        let err = ForecastError::InsufficientData {
            pair: CurrencyPair::new("USD", "EUR"),
            required: 1030,
            available: 500,
        };
        assert!(err.to_string().contains("USD/EUR"));
    }

    #[test]
    fn test_invalid_config_joins_messages() {
        let err = ForecastError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid configuration: a, b");
    }
}
