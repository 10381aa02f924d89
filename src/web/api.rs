use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use tracing::{error, warn};
use uuid::Uuid;

use super::state::{
    AppState, ForecastPanel, ForecastsResponse, MetricsResponse, RatePoint, RatesResponse,
};
use crate::engine::JobKind;
use crate::error::ForecastError;
use crate::storage::{read_forecast, read_history, read_metrics};
use crate::types::CurrencyPair;

fn error_response(err: ForecastError) -> Response {
    let status = match &err {
        ForecastError::MissingArtifact { .. } | ForecastError::JobNotFound(_) => StatusCode::NOT_FOUND,
        ForecastError::JobBusy(_) => StatusCode::CONFLICT,
        ForecastError::InvalidSeries(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    }
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

/// Serve a persisted CSV file as a download
fn csv_download(path: &std::path::Path, filename: &str) -> Response {
    match std::fs::read(path) {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => error_response(ForecastError::MissingArtifact {
            path: path.to_path_buf(),
        }),
        Err(e) => error_response(e.into()),
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// === Rates ===

pub async fn get_rates(State(state): State<AppState>) -> impl IntoResponse {
    match read_history(state.paths.history_file()) {
        Ok(series) => (StatusCode::OK, Json(RatesResponse::from(&series))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_rates_csv(State(state): State<AppState>) -> impl IntoResponse {
    let path = state.paths.history_file();
    csv_download(path, &file_name(path))
}

// === Forecasts ===

pub async fn get_forecasts(State(state): State<AppState>) -> impl IntoResponse {
    let series = match read_history(state.paths.history_file()) {
        Ok(series) => series,
        Err(e) => return error_response(e),
    };

    let mut response = ForecastsResponse::default();
    for pair in state.config.pairs() {
        let forecast = match read_forecast(&state.paths.forecast_file(&pair)) {
            Ok(forecast) => forecast,
            Err(ForecastError::MissingArtifact { .. }) => {
                warn!("No forecast available for {}", pair);
                response
                    .warnings
                    .push(format!("No forecast available for {}; run a training job first", pair));
                continue;
            }
            Err(e) => {
                warn!("Unreadable forecast for {}: {}", pair, e);
                response.warnings.push(format!("Forecast for {} is unreadable: {}", pair, e));
                continue;
            }
        };

        let history = series
            .column(&pair)
            .map(|c| c.tail(state.config.dashboard.history_days))
            .map(|c| {
                c.dates
                    .into_iter()
                    .zip(c.values)
                    .map(|(date, value)| RatePoint { date, value })
                    .collect()
            })
            .unwrap_or_default();

        response.panels.push(ForecastPanel {
            label: pair.label(),
            download: format!("/api/forecasts/{}/csv", pair.file_stem()),
            history,
            forecast: forecast
                .dates
                .into_iter()
                .zip(forecast.values)
                .map(|(date, value)| RatePoint { date, value })
                .collect(),
            pair,
        });
    }

    (StatusCode::OK, Json(response)).into_response()
}

pub async fn get_forecast_csv(
    State(state): State<AppState>,
    Path(pair): Path<String>,
) -> impl IntoResponse {
    let pair = match CurrencyPair::from_str(&pair) {
        Ok(pair) => pair,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({"error": e}))).into_response(),
    };
    csv_download(
        &state.paths.forecast_file(&pair),
        &state.paths.forecast_file_name(&pair),
    )
}

// === Metrics ===

pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match read_metrics(state.paths.metrics_file()) {
        Ok(metrics) => (StatusCode::OK, Json(MetricsResponse { metrics })).into_response(),
        Err(e @ ForecastError::MissingArtifact { .. }) => {
            warn!("Metrics requested before any training run");
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": e.to_string(),
                    "warning": "Metrics are not available yet; run a training job first"
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn get_metrics_csv(State(state): State<AppState>) -> impl IntoResponse {
    let path = state.paths.metrics_file();
    csv_download(path, &file_name(path))
}

// === Jobs ===

#[derive(Debug, Default, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub clean_slate: bool,
}

async fn submit(state: &AppState, kind: JobKind) -> Response {
    match state.jobs.submit(kind).await {
        Ok(record) => (StatusCode::ACCEPTED, Json(record)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn post_fetch_job(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, JobKind::Fetch).await
}

pub async fn post_train_job(
    State(state): State<AppState>,
    body: std::result::Result<Json<TrainRequest>, JsonRejection>,
) -> impl IntoResponse {
    // a bare POST means the defaults; a body that does not parse is refused
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => TrainRequest::default(),
        Err(rejection) => {
            warn!("Rejected training request: {}", rejection.body_text());
            return (rejection.status(), Json(json!({"error": rejection.body_text()}))).into_response();
        }
    };
    submit(
        &state,
        JobKind::Train {
            clean_slate: request.clean_slate,
        },
    )
    .await
}

pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "active": state.jobs.active().await,
        "jobs": state.jobs.list().await,
    }))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.jobs.status(id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_job_result(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.jobs.result(id).await {
        Ok((record, _)) if !record.status.is_finished() => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!("Job {} is {}", id, record.status),
                "job": record,
            })),
        )
            .into_response(),
        Ok((record, result)) => (StatusCode::OK, Json(json!({"job": record, "result": result}))).into_response(),
        Err(e) => error_response(e),
    }
}

// === Config & health ===

pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::JobManager;
    use crate::rates::MockRateSource;
    use crate::storage::{write_forecast, write_history, write_metrics, ArtifactPaths};
    use crate::types::{Forecast, MetricsRecord, RateRecord, RateSeries};
    use crate::web::router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state(dir: &TempDir, source: MockRateSource) -> AppState {
        let mut config = AppConfig::default();
        config.source.quote_currencies = vec!["USD".to_string(), "GBP".to_string()];
        config.dashboard.history_days = 5;
        let paths = ArtifactPaths::under(dir.path(), &config);
        AppState::new(Arc::new(JobManager::new(config, paths, Arc::new(source))))
    }

    fn seed_history(state: &AppState) -> NaiveDate {
        let first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let records = (0..10)
            .map(|i| RateRecord {
                date: first + chrono::Duration::days(i),
                rates: vec![Some(1.08), Some(0.85)],
            })
            .collect();
        let series = RateSeries::new(state.config.pairs(), records).unwrap();
        write_history(state.paths.history_file(), &series).unwrap();
        series.last_date().unwrap()
    }

    async fn call(state: &AppState, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone())
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn post_json(state: &AppState, uri: &str, body: &'static str) -> (StatusCode, serde_json::Value) {
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    async fn call_json(state: &AppState, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = call(state, method, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call_json(&state(&dir, MockRateSource::new()), "GET", "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_forecast_becomes_warning() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MockRateSource::new());
        let last = seed_history(&state);

        let usd = CurrencyPair::new("USD", "EUR");
        let forecast = Forecast::following(usd.clone(), last, vec![1.09, 1.1, 1.11]);
        write_forecast(&state.paths.forecast_file(&usd), &forecast).unwrap();

        let (status, body) = call_json(&state, "GET", "/api/forecasts").await;
        assert_eq!(status, StatusCode::OK);

        let panels = body["panels"].as_array().unwrap();
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0]["label"], "USD/EUR");
        assert_eq!(panels[0]["history"].as_array().unwrap().len(), 5);
        assert_eq!(panels[0]["forecast"].as_array().unwrap().len(), 3);
        assert_eq!(panels[0]["forecast"][0]["date"], "2024-03-11");

        let warnings = body["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().unwrap().contains("GBP/EUR"));
    }

    #[tokio::test]
    async fn test_metrics_missing_then_present() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MockRateSource::new());

        let (status, body) = call_json(&state, "GET", "/api/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["warning"].is_string());

        let record = MetricsRecord {
            currency: "USD/EUR".to_string(),
            mae: 0.01,
            rmse: 0.02,
            r2: 0.9,
        };
        write_metrics(state.paths.metrics_file(), &[record]).unwrap();

        let (status, body) = call_json(&state, "GET", "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metrics"][0]["Currency"], "USD/EUR");

        let (status, csv) = call(&state, "GET", "/api/metrics/csv").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(csv).unwrap().starts_with("Currency,MAE,RMSE,R2"));
    }

    #[tokio::test]
    async fn test_forecast_csv_download() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MockRateSource::new());
        let last = seed_history(&state);
        let usd = CurrencyPair::new("USD", "EUR");
        write_forecast(&state.paths.forecast_file(&usd), &Forecast::following(usd, last, vec![1.1])).unwrap();

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/forecasts/USD_EUR/csv")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("forecast_USD_EUR_30d.csv"));

        let (status, _) = call(&state, "GET", "/api/forecasts/CHF_EUR/csv").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, "GET", "/api/forecasts/nonsense/csv").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rates_json() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MockRateSource::new());

        let (status, _) = call(&state, "GET", "/api/rates").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        seed_history(&state);
        let (status, body) = call_json(&state, "GET", "/api/rates").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dates"].as_array().unwrap().len(), 10);
        assert_eq!(body["columns"][1]["label"], "GBP/EUR");
    }

    #[tokio::test]
    async fn test_job_submission_and_polling() {
        let dir = TempDir::new().unwrap();
        let mut source = MockRateSource::new();
        source
            .expect_fetch_history()
            .returning(|_, _| Err(ForecastError::Fetch { status: 500 }));
        let state = state(&dir, source);

        let (status, job) = call_json(&state, "POST", "/api/jobs/fetch").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(job["kind"], "fetch");
        let id = job["id"].as_str().unwrap().to_string();

        let mut finished = false;
        for _ in 0..200 {
            let (status, body) = call_json(&state, "GET", &format!("/api/jobs/{}", id)).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] == "Failed" {
                finished = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(finished);

        let (status, body) = call_json(&state, "GET", &format!("/api/jobs/{}/result", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["job"]["error"].as_str().unwrap().contains("500"));

        let (_, body) = call_json(&state, "GET", "/api/jobs").await;
        assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

        let (status, _) = call(&state, "GET", &format!("/api/jobs/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_train_request_body_must_parse() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MockRateSource::new());

        let (status, body) = post_json(&state, "/api/jobs/train", r#"{"clean_slate": "true"}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());
        assert!(state.jobs.list().await.is_empty());

        let (status, job) = post_json(&state, "/api/jobs/train", r#"{"clean_slate": true}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(job["kind"], "train");
        assert_eq!(job["clean_slate"], true);
    }

    #[tokio::test]
    async fn test_bare_train_request_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MockRateSource::new());

        let (status, job) = call_json(&state, "POST", "/api/jobs/train").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(job["clean_slate"], false);
    }
}
