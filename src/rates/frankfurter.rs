use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

use super::RateSource;
use crate::config::SourceSettings;
use crate::error::{ForecastError, Result};
use crate::types::{CurrencyPair, RateRecord, RateSeries};

/// Client for the Frankfurter historical reference-rate API
#[derive(Debug, Clone)]
pub struct FrankfurterClient {
    client: Client,
    base_url: String,
    base_currency: String,
    pairs: Vec<CurrencyPair>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    rates: BTreeMap<String, HashMap<String, f64>>,
}

impl FrankfurterClient {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            base_currency: settings.base_currency.to_uppercase(),
            pairs: CurrencyPair::basket(&settings.base_currency, &settings.quote_currencies),
        })
    }

    fn history_url(&self, start: NaiveDate, end: NaiveDate) -> String {
        let symbols: Vec<&str> = self.pairs.iter().map(|p| p.quote.as_str()).collect();
        format!(
            "{}/{}..{}?base={}&symbols={}",
            self.base_url,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            self.base_currency,
            symbols.join(",")
        )
    }
}

#[async_trait]
impl RateSource for FrankfurterClient {
    async fn fetch_history(&self, start: NaiveDate, end: NaiveDate) -> Result<RateSeries> {
        let url = self.history_url(start, end);
        info!("Fetching {} rates from {} to {}", self.base_currency, start, end);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ForecastError::Fetch { status: status.as_u16() });
        }

        let body: HistoryResponse = resp.json().await?;
        let series = parse_history(body.rates, &self.pairs)?;
        info!("Fetched {} daily records", series.len());
        Ok(series)
    }
}

/// Turn the date-keyed response into a series; a currency missing on a day becomes a gap
fn parse_history(
    rates: BTreeMap<String, HashMap<String, f64>>,
    pairs: &[CurrencyPair],
) -> Result<RateSeries> {
    let mut records = Vec::with_capacity(rates.len());

    for (date_str, values) in rates {
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| ForecastError::InvalidSeries(format!("bad date '{}': {}", date_str, e)))?;
        let rates = pairs.iter().map(|p| values.get(&p.quote).copied()).collect();
        records.push(RateRecord { date, rates });
    }

    RateSeries::from_unordered(pairs.to_vec(), records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, Router};

    const SAMPLE: &str = r#"{
        "amount": 1.0,
        "base": "EUR",
        "start_date": "1999-01-04",
        "end_date": "1999-01-07",
        "rates": {
            "1999-01-05": {"AUD": 1.8944, "CHF": 1.6123, "GBP": 0.7122, "USD": 1.179},
            "1999-01-04": {"AUD": 1.91, "CHF": 1.6168, "GBP": 0.7111, "USD": 1.1789},
            "1999-01-07": {"AUD": 1.8832, "CHF": 1.6138, "USD": 1.1632},
            "1999-01-06": {"AUD": 1.882, "CHF": 1.6116, "GBP": 0.7076, "USD": 1.1743}
        }
    }"#;

    fn settings(api_url: String) -> SourceSettings {
        SourceSettings {
            api_url,
            ..SourceSettings::default()
        }
    }

    async fn spawn_stub(status: StatusCode, body: &'static str) -> String {
        let app = Router::new().fallback(move || async move { (status, body) });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_history_url() {
        let client = FrankfurterClient::new(&settings("https://api.frankfurter.app/".into())).unwrap();
        let url = client.history_url(
            NaiveDate::from_ymd_opt(1999, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        );
        assert_eq!(
            url,
            "https://api.frankfurter.app/1999-01-01..2024-06-30?base=EUR&symbols=USD,AUD,GBP,CHF"
        );
    }

    #[test]
    fn test_parse_history_orders_dates_and_keeps_gaps() {
        let body: HistoryResponse = serde_json::from_str(SAMPLE).unwrap();
        let pairs = CurrencyPair::basket("EUR", &SourceSettings::default().quote_currencies);
        let series = parse_history(body.rates, &pairs).unwrap();

        assert_eq!(series.len(), 4);
        assert!(series.records().windows(2).all(|w| w[0].date < w[1].date));

        let gbp = series.column(&CurrencyPair::new("GBP", "EUR")).unwrap();
        assert_eq!(gbp.len(), 3);
        let usd = series.column(&CurrencyPair::new("USD", "EUR")).unwrap();
        assert_eq!(usd.values, vec![1.1789, 1.179, 1.1743, 1.1632]);
    }

    #[test]
    fn test_parse_history_rejects_bad_dates() {
        let mut rates = BTreeMap::new();
        rates.insert("04/01/1999".to_string(), HashMap::from([("USD".to_string(), 1.0)]));
        let pairs = vec![CurrencyPair::new("USD", "EUR")];
        assert!(matches!(
            parse_history(rates, &pairs),
            Err(ForecastError::InvalidSeries(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_history_success() {
        let url = spawn_stub(StatusCode::OK, SAMPLE).await;
        let client = FrankfurterClient::new(&settings(url)).unwrap();
        let series = client
            .fetch_history(
                NaiveDate::from_ymd_opt(1999, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(1999, 1, 7).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series.last_date(), NaiveDate::from_ymd_opt(1999, 1, 7));
    }

    #[tokio::test]
    async fn test_fetch_history_non_success_status_fails() {
        let url = spawn_stub(StatusCode::SERVICE_UNAVAILABLE, "down").await;
        let client = FrankfurterClient::new(&settings(url)).unwrap();
        let err = client
            .fetch_history(
                NaiveDate::from_ymd_opt(1999, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(1999, 1, 7).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Fetch { status: 503 }));
    }
}
