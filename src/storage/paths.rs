use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::Result;
use crate::types::CurrencyPair;

pub const MODEL_WEIGHTS_EXTENSION: &str = "safetensors";
pub const MODEL_META_EXTENSION: &str = "json";

/// Every persisted artifact name, derived from configuration in one place
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    history_file: PathBuf,
    models_dir: PathBuf,
    forecasts_dir: PathBuf,
    metrics_file: PathBuf,
    future_days: usize,
}

impl ArtifactPaths {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            history_file: config.paths.history_file.clone(),
            models_dir: config.paths.models_dir.clone(),
            forecasts_dir: config.paths.forecasts_dir.clone(),
            metrics_file: config.paths.metrics_file.clone(),
            future_days: config.model.future_days,
        }
    }

    /// Re-root every path under `root`
    pub fn under(root: &Path, config: &AppConfig) -> Self {
        let paths = Self::from_config(config);
        Self {
            history_file: root.join(paths.history_file),
            models_dir: root.join(paths.models_dir),
            forecasts_dir: root.join(paths.forecasts_dir),
            metrics_file: root.join(paths.metrics_file),
            future_days: paths.future_days,
        }
    }

    pub fn history_file(&self) -> &Path {
        &self.history_file
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn forecasts_dir(&self) -> &Path {
        &self.forecasts_dir
    }

    pub fn metrics_file(&self) -> &Path {
        &self.metrics_file
    }

    /// `models/model_USD_EUR.safetensors`
    pub fn model_weights(&self, pair: &CurrencyPair) -> PathBuf {
        self.models_dir
            .join(format!("model_{}.{}", pair.file_stem(), MODEL_WEIGHTS_EXTENSION))
    }

    /// `models/model_USD_EUR.json`
    pub fn model_meta(&self, pair: &CurrencyPair) -> PathBuf {
        self.models_dir
            .join(format!("model_{}.{}", pair.file_stem(), MODEL_META_EXTENSION))
    }

    /// `forecasts/forecast_USD_EUR_30d.csv`
    pub fn forecast_file(&self, pair: &CurrencyPair) -> PathBuf {
        self.forecasts_dir.join(self.forecast_file_name(pair))
    }

    pub fn forecast_file_name(&self, pair: &CurrencyPair) -> String {
        format!("forecast_{}_{}d.csv", pair.file_stem(), self.future_days)
    }
}

/// Create the parent directory of `path` if it has one
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let paths = ArtifactPaths::from_config(&AppConfig::default());
        let pair = CurrencyPair::new("USD", "EUR");

        assert_eq!(paths.history_file(), Path::new("data/historical_rates.csv"));
        assert_eq!(paths.model_weights(&pair), PathBuf::from("models/model_USD_EUR.safetensors"));
        assert_eq!(paths.model_meta(&pair), PathBuf::from("models/model_USD_EUR.json"));
        assert_eq!(paths.forecast_file(&pair), PathBuf::from("forecasts/forecast_USD_EUR_30d.csv"));
        assert_eq!(paths.metrics_file(), Path::new("metrics.csv"));
    }

    #[test]
    fn test_horizon_is_part_of_forecast_name() {
        let mut config = AppConfig::default();
        config.model.future_days = 7;
        let paths = ArtifactPaths::under(Path::new("/tmp/run"), &config);
        let pair = CurrencyPair::new("CHF", "EUR");
        assert_eq!(
            paths.forecast_file(&pair),
            PathBuf::from("/tmp/run/forecasts/forecast_CHF_EUR_7d.csv")
        );
        assert_eq!(paths.forecast_file_name(&pair), "forecast_CHF_EUR_7d.csv");
    }
}
