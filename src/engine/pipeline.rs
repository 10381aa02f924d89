use candle_core::Device;
use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{ForecastError, Result};
use crate::ml::{
    build_windows, evaluate_windows, forecast_next, predict_windows, split_windows, DatasetSplit,
    MinMaxScaler, ModelMetadata, ModelParams, ModelStore, Trainer,
};
use crate::storage::{read_history, write_forecast, write_metrics, ArtifactPaths};
use crate::types::{CurrencyPair, CurrencySeries, Forecast, MetricsRecord, RateSeries};

/// Per-currency processing steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Load,
    CheckLength,
    Scale,
    Window,
    Split,
    Train,
    Evaluate,
    Forecast,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "LOAD",
            Stage::CheckLength => "CHECK_LENGTH",
            Stage::Scale => "SCALE",
            Stage::Window => "WINDOW",
            Stage::Split => "SPLIT",
            Stage::Train => "TRAIN",
            Stage::Evaluate => "EVALUATE",
            Stage::Forecast => "FORECAST",
            Stage::Persist => "PERSIST",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OutcomeState {
    Persisted {
        metrics: MetricsRecord,
        model_file: PathBuf,
        forecast_file: PathBuf,
    },
    Skipped {
        reason: String,
    },
    Failed {
        stage: Stage,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyOutcome {
    pub pair: CurrencyPair,
    #[serde(flatten)]
    pub state: OutcomeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cleared_models: Vec<PathBuf>,
    pub outcomes: Vec<CurrencyOutcome>,
    pub metrics_file: PathBuf,
}

impl RunReport {
    /// Metrics of every persisted currency, in run order
    pub fn metrics(&self) -> Vec<MetricsRecord> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.state {
                OutcomeState::Persisted { metrics, .. } => Some(metrics.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn persisted_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeState::Persisted { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeState::Skipped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeState::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&OutcomeState) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.state)).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Delete every persisted model before training
    pub clean_slate: bool,
}

struct StageFailure {
    stage: Stage,
    error: ForecastError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure>;
}

impl<T, E: Into<ForecastError>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure> {
        self.map_err(|e| StageFailure {
            stage,
            error: e.into(),
        })
    }
}

struct Persisted {
    metrics: MetricsRecord,
    model_file: PathBuf,
    forecast_file: PathBuf,
}

/// Sequential train / evaluate / forecast run over the configured basket
pub struct TrainingPipeline {
    config: AppConfig,
    paths: ArtifactPaths,
    trainer: Trainer,
    store: ModelStore,
}

impl TrainingPipeline {
    pub fn new(config: AppConfig, paths: ArtifactPaths) -> Self {
        let trainer = Trainer::new(config.training.clone());
        let store = ModelStore::new(paths.clone());
        Self {
            config,
            paths,
            trainer,
            store,
        }
    }

    fn params(&self) -> ModelParams {
        ModelParams {
            look_back: self.config.model.look_back,
            future_days: self.config.model.future_days,
            hidden_units: self.config.model.hidden_units,
            dropout: self.config.model.dropout as f32,
        }
    }

    fn device(&self) -> &Device {
        self.trainer.device()
    }

    /// Train on the persisted historical table. A missing table ends the run.
    pub fn run(&self, options: PipelineOptions) -> Result<RunReport> {
        let series = read_history(self.paths.history_file())?;
        self.run_on_series(&series, options)
    }

    pub fn run_on_series(&self, series: &RateSeries, options: PipelineOptions) -> Result<RunReport> {
        let started_at = Utc::now();
        info!("═══════════════════════════════════════════════════════════");
        info!("  Training run: {} rows of history", series.len());
        info!("═══════════════════════════════════════════════════════════");

        // an empty table must not cost the persisted models
        let last_date = series
            .last_date()
            .ok_or_else(|| ForecastError::InvalidSeries("historical table has no rows".to_string()))?;

        let cleared_models = if options.clean_slate {
            let removed = self.store.clear_all()?;
            warn!("Clean slate: removed {} model files", removed.len());
            removed
        } else {
            Vec::new()
        };

        let mut outcomes = Vec::new();
        for pair in self.config.pairs() {
            let state = match self.process(&pair, series, last_date) {
                Ok(done) => {
                    info!(
                        "✓ {} persisted: MAE={:.5} RMSE={:.5} R2={:.4}",
                        pair, done.metrics.mae, done.metrics.rmse, done.metrics.r2
                    );
                    OutcomeState::Persisted {
                        metrics: done.metrics,
                        model_file: done.model_file,
                        forecast_file: done.forecast_file,
                    }
                }
                Err(StageFailure {
                    error: error @ ForecastError::InsufficientData { .. },
                    ..
                }) => {
                    warn!("Skipping {}: {}", pair, error);
                    OutcomeState::Skipped {
                        reason: error.to_string(),
                    }
                }
                Err(StageFailure { stage, error }) => {
                    error!("{} failed at {}: {}", pair, stage, error);
                    OutcomeState::Failed {
                        stage,
                        error: error.to_string(),
                    }
                }
            };
            outcomes.push(CurrencyOutcome { pair, state });
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            cleared_models,
            outcomes,
            metrics_file: self.paths.metrics_file().to_path_buf(),
        };
        write_metrics(self.paths.metrics_file(), &report.metrics())?;

        info!(
            "Run finished: {} persisted, {} skipped, {} failed",
            report.persisted_count(),
            report.skipped_count(),
            report.failed_count()
        );
        Ok(report)
    }

    fn process(
        &self,
        pair: &CurrencyPair,
        series: &RateSeries,
        last_date: NaiveDate,
    ) -> std::result::Result<Persisted, StageFailure> {
        let params = self.params();
        info!("── {} ──", pair);

        let column: CurrencySeries = series
            .column(pair)
            .ok_or_else(|| ForecastError::InvalidSeries(format!("no {} column in history", pair)))
            .at(Stage::Load)?;

        let required = params.look_back + params.future_days;
        if column.len() < required {
            return Err(ForecastError::InsufficientData {
                pair: pair.clone(),
                required,
                available: column.len(),
            })
            .at(Stage::CheckLength);
        }

        let scaler = MinMaxScaler::fit(&column.values)
            .ok_or_else(|| ForecastError::InvalidSeries(format!("{} has no values", pair)))
            .at(Stage::Scale)?;
        let scaled = scaler.scale_all(&column.values);

        let windows = build_windows(pair, &scaled, params.look_back, params.future_days).at(Stage::Window)?;
        let split = split_windows(windows, self.config.training.validation_split);
        if split.train.is_empty() || split.validation.is_empty() {
            return Err(ForecastError::InsufficientData {
                pair: pair.clone(),
                required: required + 2,
                available: column.len(),
            })
            .at(Stage::Split);
        }

        let (model, varmap, report) = self.trainer.fit(pair, params, &split).at(Stage::Train)?;

        let metrics = self.evaluate(pair, &model, &scaler, &split).at(Stage::Evaluate)?;

        let forecast = forecast_next(pair, &model, &scaler, &scaled, last_date, self.device()).at(Stage::Forecast)?;

        let metadata = ModelMetadata {
            pair: pair.clone(),
            params,
            scaler,
            last_date,
            trained_at: Utc::now(),
            report,
        };
        let model_file = self.store.save(&varmap, &metadata).at(Stage::Persist)?;
        let forecast_file = self.paths.forecast_file(pair);
        write_forecast(&forecast_file, &forecast).at(Stage::Persist)?;

        Ok(Persisted {
            metrics,
            model_file,
            forecast_file,
        })
    }

    /// Inverse-scaled validation predictions scored against the true horizons
    fn evaluate(
        &self,
        pair: &CurrencyPair,
        model: &crate::ml::Seq2SeqForecaster,
        scaler: &MinMaxScaler,
        split: &DatasetSplit,
    ) -> Result<MetricsRecord> {
        let horizon = model.params().future_days;
        let predicted = predict_windows(model, &split.validation, self.config.training.batch_size, self.device())?
            .mapv(|v| scaler.inverse(v));

        let truth: Vec<f64> = split
            .validation
            .iter()
            .flat_map(|w| w.target.iter().map(|&v| scaler.inverse(v)))
            .collect();
        let truth = Array2::from_shape_vec((split.validation.len(), horizon), truth)
            .map_err(|e| ForecastError::InvalidSeries(e.to_string()))?;

        Ok(evaluate_windows(pair, &truth, &predicted))
    }
}

/// Re-run only the forecast step, using persisted models against the current historical table
pub fn refresh_forecasts(config: &AppConfig, paths: &ArtifactPaths) -> Result<Vec<Forecast>> {
    let series = read_history(paths.history_file())?;
    let last_date = series
        .last_date()
        .ok_or_else(|| ForecastError::InvalidSeries("historical table has no rows".to_string()))?;
    let store = ModelStore::new(paths.clone());
    let device = Device::Cpu;

    let mut forecasts = Vec::new();
    for pair in config.pairs() {
        if !store.exists(&pair) {
            warn!("No persisted model for {}, skipping", pair);
            continue;
        }
        let Some(column) = series.column(&pair) else {
            warn!("No {} column in history, skipping", pair);
            continue;
        };

        let trained = match store.load(&pair, &device) {
            Ok(trained) => trained,
            Err(e) => {
                error!("Cannot load {} model, skipping: {}", pair, e);
                continue;
            }
        };
        if trained.metadata.params.future_days != config.model.future_days {
            warn!(
                "{} model predicts {} days but {} are configured; retrain it",
                pair, trained.metadata.params.future_days, config.model.future_days
            );
            continue;
        }

        let scaler = trained.metadata.scaler;
        let scaled = scaler.scale_all(&column.values);
        match forecast_next(&pair, &trained.model, &scaler, &scaled, last_date, &device) {
            Ok(forecast) => {
                write_forecast(&paths.forecast_file(&pair), &forecast)?;
                info!("✓ {} forecast refreshed from {}", pair, last_date);
                forecasts.push(forecast);
            }
            Err(e @ ForecastError::InsufficientData { .. }) => warn!("Skipping {}: {}", pair, e),
            Err(e) => return Err(e),
        }
    }
    Ok(forecasts)
}

fn training_thread(config: &AppConfig) -> std::thread::Builder {
    std::thread::Builder::new()
        .name("fx-training".to_string())
        .stack_size(config.training.stack_size_mb * 1024 * 1024)
}

/// Run the pipeline on its own thread; the receiver resolves when it finishes
pub fn spawn_training(
    config: AppConfig,
    paths: ArtifactPaths,
    options: PipelineOptions,
) -> Result<oneshot::Receiver<Result<RunReport>>> {
    let (tx, rx) = oneshot::channel();
    training_thread(&config).spawn(move || {
        let report = TrainingPipeline::new(config, paths).run(options);
        let _ = tx.send(report);
    })?;
    Ok(rx)
}

/// Blocking variant of [`spawn_training`]
pub fn run_training_blocking(config: AppConfig, paths: ArtifactPaths, options: PipelineOptions) -> Result<RunReport> {
    let handle = training_thread(&config).spawn(move || TrainingPipeline::new(config, paths).run(options))?;
    handle.join().map_err(|_| ForecastError::TrainingAborted)?
}
