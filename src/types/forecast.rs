use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::CurrencyPair;

/// Predicted rates for the days following the last historical date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub pair: CurrencyPair,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl Forecast {
    /// Index `values` by consecutive calendar days starting the day after `last_date`
    pub fn following(pair: CurrencyPair, last_date: NaiveDate, values: Vec<f64>) -> Self {
        let dates = (1..=values.len() as i64)
            .map(|offset| last_date + Duration::days(offset))
            .collect();
        Self { pair, dates, values }
    }

    pub fn horizon(&self) -> usize {
        self.values.len()
    }
}

/// Held-out accuracy of one currency's model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(rename = "Currency")]
    pub currency: String,
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "R2")]
    pub r2: f64,
}
