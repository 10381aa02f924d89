use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::model::{ModelParams, Seq2SeqForecaster};
use super::scaler::MinMaxScaler;
use super::trainer::TrainingReport;
use crate::error::{ForecastError, Result};
use crate::storage::{ArtifactPaths, MODEL_META_EXTENSION, MODEL_WEIGHTS_EXTENSION};
use crate::types::CurrencyPair;

/// JSON sidecar written next to the weights file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub pair: CurrencyPair,
    pub params: ModelParams,
    pub scaler: MinMaxScaler,
    /// Last observation the model was trained on
    pub last_date: NaiveDate,
    pub trained_at: DateTime<Utc>,
    pub report: TrainingReport,
}

/// A model rebuilt from disk together with what it needs for inference
pub struct TrainedModel {
    pub model: Seq2SeqForecaster,
    pub metadata: ModelMetadata,
}

/// Reads and writes per-currency model artifacts under the models directory
pub struct ModelStore {
    paths: ArtifactPaths,
}

impl ModelStore {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self { paths }
    }

    pub fn models_dir(&self) -> &Path {
        self.paths.models_dir()
    }

    pub fn ensure_models_dir(&self) -> Result<()> {
        std::fs::create_dir_all(self.paths.models_dir())?;
        Ok(())
    }

    pub fn exists(&self, pair: &CurrencyPair) -> bool {
        self.paths.model_weights(pair).exists() && self.paths.model_meta(pair).exists()
    }

    /// Write weights then metadata, overwriting any previous model for the pair
    pub fn save(&self, varmap: &VarMap, metadata: &ModelMetadata) -> Result<PathBuf> {
        self.ensure_models_dir()?;

        let weights = self.paths.model_weights(&metadata.pair);
        varmap.save(&weights)?;
        std::fs::write(
            self.paths.model_meta(&metadata.pair),
            serde_json::to_string_pretty(metadata)?,
        )?;

        info!("Saved {} model to {}", metadata.pair, weights.display());
        Ok(weights)
    }

    pub fn load_metadata(&self, pair: &CurrencyPair) -> Result<ModelMetadata> {
        let path = self.paths.model_meta(pair);
        if !path.exists() {
            return Err(ForecastError::MissingArtifact { path });
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(&path)?)?)
    }

    pub fn load(&self, pair: &CurrencyPair, device: &Device) -> Result<TrainedModel> {
        let metadata = self.load_metadata(pair)?;
        let weights = self.paths.model_weights(pair);
        if !weights.exists() {
            return Err(ForecastError::MissingArtifact { path: weights });
        }

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Seq2SeqForecaster::new(metadata.params, vb)?;
        varmap.load(&weights)?;

        info!("Loaded {} model from {}", pair, weights.display());
        Ok(TrainedModel { model, metadata })
    }

    /// Remove every persisted model artifact. Other files in the directory are left alone.
    pub fn clear_all(&self) -> Result<Vec<PathBuf>> {
        let dir = self.paths.models_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if is_model_artifact(&path) {
                std::fs::remove_file(&path)?;
                warn!("Deleted model file: {}", path.display());
                removed.push(path);
            }
        }
        removed.sort();
        Ok(removed)
    }
}

fn is_model_artifact(path: &Path) -> bool {
    let is_model_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("model_"))
        .unwrap_or(false);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    path.is_file() && is_model_name && (ext == MODEL_WEIGHTS_EXTENSION || ext == MODEL_META_EXTENSION)
}
