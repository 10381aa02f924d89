use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::CurrencyPair;
use crate::error::{ForecastError, Result};

/// One calendar day of the historical table. `rates[i]` belongs to `pairs[i]`
/// of the owning series; `None` marks a day the source omitted the currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub date: NaiveDate,
    pub rates: Vec<Option<f64>>,
}

/// Date-ordered table of rates for a fixed basket of currency pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSeries {
    pairs: Vec<CurrencyPair>,
    records: Vec<RateRecord>,
}

impl RateSeries {
    /// Build a series from records that are already in date order.
    /// Fails if dates are not strictly increasing or a row has the wrong width.
    pub fn new(pairs: Vec<CurrencyPair>, records: Vec<RateRecord>) -> Result<Self> {
        for record in &records {
            if record.rates.len() != pairs.len() {
                return Err(ForecastError::InvalidSeries(format!(
                    "record {} has {} rates, expected {}",
                    record.date,
                    record.rates.len(),
                    pairs.len()
                )));
            }
        }

        if let Some(pos) = records.windows(2).position(|w| w[0].date >= w[1].date) {
            return Err(ForecastError::InvalidSeries(format!(
                "dates not strictly increasing at {} -> {}",
                records[pos].date,
                records[pos + 1].date
            )));
        }

        Ok(Self { pairs, records })
    }

    /// Sort records by date first. Duplicate dates are still rejected.
    pub fn from_unordered(pairs: Vec<CurrencyPair>, mut records: Vec<RateRecord>) -> Result<Self> {
        records.sort_by_key(|r| r.date);
        Self::new(pairs, records)
    }

    pub fn pairs(&self) -> &[CurrencyPair] {
        &self.pairs
    }

    pub fn records(&self) -> &[RateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// One currency's column with missing days dropped
    pub fn column(&self, pair: &CurrencyPair) -> Option<CurrencySeries> {
        let idx = self.pairs.iter().position(|p| p == pair)?;
        let mut dates = Vec::with_capacity(self.records.len());
        let mut values = Vec::with_capacity(self.records.len());

        for record in &self.records {
            if let Some(value) = record.rates[idx] {
                if value.is_finite() {
                    dates.push(record.date);
                    values.push(value);
                }
            }
        }

        Some(CurrencySeries {
            pair: pair.clone(),
            dates,
            values,
        })
    }

    /// Every column, in basket order
    pub fn columns(&self) -> Vec<CurrencySeries> {
        self.pairs.iter().filter_map(|p| self.column(p)).collect()
    }
}

/// Gap-free values of a single currency, parallel to their dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencySeries {
    pub pair: CurrencyPair,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl CurrencySeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Most recent `n` observations (all of them if shorter)
    pub fn tail(&self, n: usize) -> CurrencySeries {
        let start = self.values.len().saturating_sub(n);
        CurrencySeries {
            pair: self.pair.clone(),
            dates: self.dates[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn pairs() -> Vec<CurrencyPair> {
        vec![CurrencyPair::new("USD", "EUR"), CurrencyPair::new("GBP", "EUR")]
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        let records = vec![
            RateRecord { date: d("2024-01-02"), rates: vec![Some(1.1), Some(0.86)] },
            RateRecord { date: d("2024-01-02"), rates: vec![Some(1.2), Some(0.87)] },
        ];
        assert!(RateSeries::new(pairs(), records.clone()).is_err());
        assert!(RateSeries::from_unordered(pairs(), records).is_err());
    }

    #[test]
    fn test_unordered_records_are_sorted() {
        let records = vec![
            RateRecord { date: d("2024-01-04"), rates: vec![Some(1.3), Some(0.85)] },
            RateRecord { date: d("2024-01-02"), rates: vec![Some(1.1), Some(0.86)] },
            RateRecord { date: d("2024-01-03"), rates: vec![Some(1.2), None] },
        ];
        let series = RateSeries::from_unordered(pairs(), records).unwrap();
        let dates: Vec<NaiveDate> = series.records().iter().map(|r| r.date).collect();
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(series.first_date(), Some(d("2024-01-02")));
        assert_eq!(series.last_date(), Some(d("2024-01-04")));
    }

    #[test]
    fn test_column_drops_gaps_per_currency() {
        let records = vec![
            RateRecord { date: d("2024-01-02"), rates: vec![Some(1.1), Some(0.86)] },
            RateRecord { date: d("2024-01-03"), rates: vec![Some(1.2), None] },
            RateRecord { date: d("2024-01-04"), rates: vec![None, Some(0.85)] },
        ];
        let series = RateSeries::new(pairs(), records).unwrap();

        let usd = series.column(&CurrencyPair::new("USD", "EUR")).unwrap();
        assert_eq!(usd.values, vec![1.1, 1.2]);
        assert_eq!(usd.last_date(), Some(d("2024-01-03")));

        let gbp = series.column(&CurrencyPair::new("GBP", "EUR")).unwrap();
        assert_eq!(gbp.values, vec![0.86, 0.85]);

        assert!(series.column(&CurrencyPair::new("JPY", "EUR")).is_none());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let records = vec![RateRecord { date: d("2024-01-02"), rates: vec![Some(1.1)] }];
        assert!(RateSeries::new(pairs(), records).is_err());
    }

    #[test]
    fn test_tail() {
        let series = CurrencySeries {
            pair: CurrencyPair::new("USD", "EUR"),
            dates: vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04")],
            values: vec![1.0, 2.0, 3.0],
        };
        assert_eq!(series.tail(2).values, vec![2.0, 3.0]);
        assert_eq!(series.tail(10).len(), 3);
    }
}
