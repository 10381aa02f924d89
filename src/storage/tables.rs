use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use super::paths::ensure_parent;
use crate::error::{ForecastError, Result};
use crate::types::{CurrencyPair, Forecast, MetricsRecord, RateRecord, RateSeries};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const METRICS_HEADER: [&str; 4] = ["Currency", "MAE", "RMSE", "R2"];

fn require(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ForecastError::MissingArtifact { path: path.to_path_buf() })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| ForecastError::InvalidSeries(format!("bad date '{}': {}", raw, e)))
}

fn parse_cell(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|e| ForecastError::InvalidSeries(format!("bad rate '{}': {}", raw, e)))
}

fn parse_pairs(headers: &StringRecord) -> Result<Vec<CurrencyPair>> {
    headers
        .iter()
        .skip(1)
        .map(|h| CurrencyPair::from_str(h).map_err(ForecastError::InvalidSeries))
        .collect()
}

/// Overwrite the historical table: `Date,USD/EUR,...`, gaps as empty cells
pub fn write_history(path: &Path, series: &RateSeries) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;

    let mut header = vec!["Date".to_string()];
    header.extend(series.pairs().iter().map(|p| p.label()));
    writer.write_record(&header)?;

    for record in series.records() {
        let mut row = Vec::with_capacity(record.rates.len() + 1);
        row.push(record.date.format(DATE_FORMAT).to_string());
        row.extend(
            record
                .rates
                .iter()
                .map(|rate| rate.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    info!("Saved {} rows to {}", series.len(), path.display());
    Ok(())
}

pub fn read_history(path: &Path) -> Result<RateSeries> {
    require(path)?;
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let pairs = parse_pairs(reader.headers()?)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let date = parse_date(row.get(0).unwrap_or_default())?;
        let rates = row.iter().skip(1).map(parse_cell).collect::<Result<Vec<_>>>()?;
        records.push(RateRecord { date, rates });
    }

    RateSeries::new(pairs, records)
}

/// One forecast file: `Date,USD/EUR`
pub fn write_forecast(path: &Path, forecast: &Forecast) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(["Date".to_string(), forecast.pair.label()])?;

    for (date, value) in forecast.dates.iter().zip(&forecast.values) {
        writer.write_record([date.format(DATE_FORMAT).to_string(), value.to_string()])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn read_forecast(path: &Path) -> Result<Forecast> {
    require(path)?;
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let pair = parse_pairs(reader.headers()?)?
        .into_iter()
        .next()
        .ok_or_else(|| ForecastError::InvalidSeries(format!("{} has no value column", path.display())))?;

    let mut dates = Vec::new();
    let mut values = Vec::new();
    for row in reader.records() {
        let row = row?;
        dates.push(parse_date(row.get(0).unwrap_or_default())?);
        let value = parse_cell(row.get(1).unwrap_or_default())?
            .ok_or_else(|| ForecastError::InvalidSeries(format!("empty forecast value in {}", path.display())))?;
        values.push(value);
    }

    Ok(Forecast { pair, dates, values })
}

/// The metrics table always carries its header, even with no rows
pub fn write_metrics(path: &Path, metrics: &[MetricsRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(METRICS_HEADER)?;
    for record in metrics {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Saved metrics for {} currencies to {}", metrics.len(), path.display());
    Ok(())
}

pub fn read_metrics(path: &Path) -> Result<Vec<MetricsRecord>> {
    require(path)?;
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let records = reader.deserialize().collect::<std::result::Result<Vec<MetricsRecord>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_history_file_keeps_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("historical_rates.csv");
        let pairs = vec![CurrencyPair::new("USD", "EUR"), CurrencyPair::new("AUD", "EUR")];
        let series = RateSeries::new(
            pairs,
            vec![
                RateRecord { date: d("2024-03-01"), rates: vec![Some(1.0832), Some(1.6612)] },
                RateRecord { date: d("2024-03-04"), rates: vec![Some(1.0854), None] },
            ],
        )
        .unwrap();

        write_history(&path, &series).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Date,USD/EUR,AUD/EUR\n"));
        assert!(text.contains("2024-03-04,1.0854,\n"));

        let loaded = read_history(&path).unwrap();
        assert_eq!(loaded, series);
    }

    #[test]
    fn test_missing_history_is_reported_as_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_history(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, ForecastError::MissingArtifact { .. }));
    }

    #[test]
    fn test_forecast_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast_GBP_EUR_3d.csv");
        let forecast = Forecast::following(CurrencyPair::new("GBP", "EUR"), d("2024-03-04"), vec![0.85, 0.851, 0.852]);

        write_forecast(&path, &forecast).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Date,GBP/EUR\n2024-03-05,0.85\n"));

        let loaded = read_forecast(&path).unwrap();
        assert_eq!(loaded.pair, forecast.pair);
        assert_eq!(loaded.dates, forecast.dates);
        for (a, b) in loaded.values.iter().zip(&forecast.values) {
            assert_relative_eq!(a, b);
        }
    }

    #[test]
    fn test_metrics_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        write_metrics(&path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Currency,MAE,RMSE,R2\n");
        assert!(read_metrics(&path).unwrap().is_empty());

        let rows = vec![
            MetricsRecord { currency: "USD/EUR".into(), mae: 0.01, rmse: 0.012, r2: 0.4 },
            MetricsRecord { currency: "CHF/EUR".into(), mae: 0.02, rmse: 0.025, r2: -0.1 },
        ];
        write_metrics(&path, &rows).unwrap();
        assert_eq!(read_metrics(&path).unwrap(), rows);
    }
}
