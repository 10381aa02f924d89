use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::CurrencyPair;

/// The single configuration structure handed to every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub source: SourceSettings,
    pub paths: PathSettings,
    pub model: ModelSettings,
    pub training: TrainingSettings,
    pub dashboard: DashboardSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            paths: PathSettings::default(),
            model: ModelSettings::default(),
            training: TrainingSettings::default(),
            dashboard: DashboardSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Source validation
        if self.source.base_currency.len() != 3 {
            errors.push("base_currency must be a 3-letter code".to_string());
        }
        if self.source.quote_currencies.is_empty() {
            errors.push("quote_currencies must not be empty".to_string());
        }
        if self.source.quote_currencies.iter().any(|q| q.len() != 3) {
            errors.push("quote_currencies must be 3-letter codes".to_string());
        }
        if self.source.api_url.is_empty() {
            errors.push("api_url must not be empty".to_string());
        }

        // Model validation
        if self.model.look_back == 0 {
            errors.push("look_back must be > 0".to_string());
        }
        if self.model.future_days == 0 {
            errors.push("future_days must be > 0".to_string());
        }
        if self.model.hidden_units == 0 {
            errors.push("hidden_units must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            errors.push("dropout must be in [0, 1)".to_string());
        }

        // Training validation
        if self.training.epochs == 0 {
            errors.push("epochs must be > 0".to_string());
        }
        if self.training.batch_size == 0 {
            errors.push("batch_size must be > 0".to_string());
        }
        if self.training.learning_rate <= 0.0 {
            errors.push("learning_rate must be > 0".to_string());
        }
        if self.training.validation_split <= 0.0 || self.training.validation_split >= 1.0 {
            errors.push("validation_split must be between 0 and 1".to_string());
        }
        if self.training.lr_factor <= 0.0 || self.training.lr_factor >= 1.0 {
            errors.push("lr_factor must be between 0 and 1".to_string());
        }
        if self.training.lr_patience >= self.training.early_stopping_patience {
            errors.push("lr_patience must be < early_stopping_patience".to_string());
        }
        if self.training.stack_size_mb == 0 {
            errors.push("stack_size_mb must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Currency pairs in training order
    pub fn pairs(&self) -> Vec<CurrencyPair> {
        CurrencyPair::basket(&self.source.base_currency, &self.source.quote_currencies)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub api_url: String,
    pub base_currency: String,
    pub quote_currencies: Vec<String>,
    pub start_date: NaiveDate,
    /// No timeout unless set
    pub request_timeout_secs: Option<u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.frankfurter.app".to_string(),
            base_currency: "EUR".to_string(),
            quote_currencies: vec![
                "USD".to_string(),
                "AUD".to_string(),
                "GBP".to_string(),
                "CHF".to_string(),
            ],
            start_date: NaiveDate::from_ymd_opt(1999, 1, 1).unwrap_or_default(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    pub history_file: PathBuf,
    pub models_dir: PathBuf,
    pub forecasts_dir: PathBuf,
    pub metrics_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            history_file: PathBuf::from("data/historical_rates.csv"),
            models_dir: PathBuf::from("models"),
            forecasts_dir: PathBuf::from("forecasts"),
            metrics_file: PathBuf::from("metrics.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub look_back: usize,
    pub future_days: usize,
    pub hidden_units: usize,
    pub dropout: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            look_back: 1000,
            future_days: 30,
            hidden_units: 64,
            dropout: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub early_stopping_patience: usize,
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_learning_rate: f64,
    /// Stack of the training thread; backprop through long sequences recurses deeply
    pub stack_size_mb: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 80,
            batch_size: 32,
            learning_rate: 0.001,
            validation_split: 0.2,
            early_stopping_patience: 10,
            lr_patience: 5,
            lr_factor: 0.5,
            min_learning_rate: 1e-6,
            stack_size_mb: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSettings {
    pub port: u16,
    /// Days of history drawn next to each forecast
    pub history_days: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            history_days: 365,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pairs().len(), 4);
        assert_eq!(config.pairs()[0].label(), "USD/EUR");
        assert_eq!(config.source.start_date, NaiveDate::from_ymd_opt(1999, 1, 1).unwrap());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = AppConfig::default();
        config.model.look_back = 0;
        config.training.validation_split = 1.5;
        config.training.lr_patience = 20;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("look_back")));
        assert!(errors.iter().any(|e| e.contains("validation_split")));
        assert!(errors.iter().any(|e| e.contains("lr_patience")));
    }
}
