use candle_core::{DType, Device, Tensor};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

use super::dataset::{to_tensors, DatasetSplit, Window};
use super::model::{ModelParams, Seq2SeqForecaster};
use crate::config::TrainingSettings;
use crate::error::{ForecastError, Result};
use crate::types::CurrencyPair;

/// Summary of one model fit
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub final_learning_rate: f64,
    pub stopped_early: bool,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
}

/// Stops after `patience` epochs without improvement and keeps the best weights seen
struct EarlyStopping {
    patience: usize,
    best: f64,
    best_epoch: usize,
    wait: usize,
    best_weights: Option<HashMap<String, Tensor>>,
}

impl EarlyStopping {
    fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            best_epoch: 0,
            wait: 0,
            best_weights: None,
        }
    }

    /// Returns true when training should stop
    fn on_epoch_end(&mut self, epoch: usize, val_loss: f64, varmap: &VarMap) -> candle_core::Result<bool> {
        if val_loss < self.best {
            self.best = val_loss;
            self.best_epoch = epoch;
            self.wait = 0;
            self.best_weights = Some(snapshot(varmap)?);
            Ok(false)
        } else {
            self.wait += 1;
            Ok(self.wait >= self.patience)
        }
    }

    fn restore_best(&self, varmap: &VarMap) -> candle_core::Result<()> {
        match &self.best_weights {
            Some(weights) => restore(varmap, weights),
            None => Ok(()),
        }
    }
}

/// Multiplies the learning rate by `factor` after `patience` epochs of plateau
struct ReduceLrOnPlateau {
    patience: usize,
    factor: f64,
    min_lr: f64,
    best: f64,
    wait: usize,
}

impl ReduceLrOnPlateau {
    fn new(settings: &TrainingSettings) -> Self {
        Self {
            patience: settings.lr_patience,
            factor: settings.lr_factor,
            min_lr: settings.min_learning_rate,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    /// New learning rate, if it changed
    fn on_epoch_end(&mut self, val_loss: f64, current_lr: f64) -> Option<f64> {
        if val_loss < self.best {
            self.best = val_loss;
            self.wait = 0;
            return None;
        }

        self.wait += 1;
        if self.wait < self.patience {
            return None;
        }

        self.wait = 0;
        let reduced = (current_lr * self.factor).max(self.min_lr);
        if reduced < current_lr {
            Some(reduced)
        } else {
            None
        }
    }
}

fn snapshot(varmap: &VarMap) -> candle_core::Result<HashMap<String, Tensor>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| candle_core::Error::Msg("variable map lock poisoned".to_string()))?;
    data.iter()
        .map(|(name, var)| Ok((name.clone(), var.as_tensor().copy()?)))
        .collect()
}

fn restore(varmap: &VarMap, weights: &HashMap<String, Tensor>) -> candle_core::Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| candle_core::Error::Msg("variable map lock poisoned".to_string()))?;
    for (name, var) in data.iter() {
        if let Some(saved) = weights.get(name) {
            var.set(saved)?;
        }
    }
    Ok(())
}

/// Mean squared error over `windows`, evaluated in inference mode
fn evaluate_loss(
    model: &Seq2SeqForecaster,
    windows: &[Window],
    batch_size: usize,
    device: &Device,
) -> candle_core::Result<f64> {
    let mut total = 0.0;
    for batch in windows.chunks(batch_size) {
        let (x, y) = to_tensors(batch, device)?;
        let pred = model.forward_t(&x, false)?;
        let batch_loss = loss::mse(&pred, &y)?.to_scalar::<f32>()? as f64;
        total += batch_loss * batch.len() as f64;
    }
    Ok(total / windows.len().max(1) as f64)
}

pub struct Trainer {
    settings: TrainingSettings,
    device: Device,
}

impl Trainer {
    pub fn new(settings: TrainingSettings) -> Self {
        Self {
            settings,
            device: Device::Cpu,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Fit a fresh model on the scaled windows of one currency
    pub fn fit(
        &self,
        pair: &CurrencyPair,
        params: ModelParams,
        split: &DatasetSplit,
    ) -> Result<(Seq2SeqForecaster, VarMap, TrainingReport)> {
        if split.train.is_empty() || split.validation.is_empty() {
            let available = split.train.len() + split.validation.len();
            return Err(ForecastError::InsufficientData {
                pair: pair.clone(),
                required: params.look_back + params.future_days + 2,
                available: params.look_back + params.future_days + available,
            });
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        let model = Seq2SeqForecaster::new(params, vb)?;

        let adam = ParamsAdamW {
            lr: self.settings.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(varmap.all_vars(), adam)?;

        let mut early_stopping = EarlyStopping::new(self.settings.early_stopping_patience);
        let mut lr_schedule = ReduceLrOnPlateau::new(&self.settings);
        let mut train_losses = Vec::new();
        let mut val_losses = Vec::new();
        let mut stopped_early = false;

        info!(
            "Training {}: {} train / {} validation windows, up to {} epochs",
            pair,
            split.train.len(),
            split.validation.len(),
            self.settings.epochs
        );
        let start_time = Instant::now();

        for epoch in 1..=self.settings.epochs {
            let mut epoch_loss = 0.0;
            for batch in split.train.chunks(self.settings.batch_size) {
                let (x, y) = to_tensors(batch, &self.device)?;
                let pred = model.forward_t(&x, true)?;
                let batch_loss = loss::mse(&pred, &y)?;
                optimizer.backward_step(&batch_loss)?;
                epoch_loss += batch_loss.to_scalar::<f32>()? as f64 * batch.len() as f64;
            }
            let train_loss = epoch_loss / split.train.len() as f64;
            let val_loss = evaluate_loss(&model, &split.validation, self.settings.batch_size, &self.device)?;
            train_losses.push(train_loss);
            val_losses.push(val_loss);

            debug!(
                "{} epoch {}: loss={:.6} val_loss={:.6} lr={:.2e}",
                pair,
                epoch,
                train_loss,
                val_loss,
                optimizer.learning_rate()
            );

            if let Some(lr) = lr_schedule.on_epoch_end(val_loss, optimizer.learning_rate()) {
                info!("{} epoch {}: reducing learning rate to {:.2e}", pair, epoch, lr);
                optimizer.set_learning_rate(lr);
            }

            if early_stopping.on_epoch_end(epoch, val_loss, &varmap)? {
                info!(
                    "{} early stop at epoch {} (best epoch {}, val_loss={:.6})",
                    pair, epoch, early_stopping.best_epoch, early_stopping.best
                );
                stopped_early = true;
                break;
            }
        }

        early_stopping.restore_best(&varmap)?;

        let report = TrainingReport {
            epochs_run: train_losses.len(),
            best_epoch: early_stopping.best_epoch,
            best_val_loss: early_stopping.best,
            final_learning_rate: optimizer.learning_rate(),
            stopped_early,
            train_samples: split.train.len(),
            validation_samples: split.validation.len(),
            train_losses,
            val_losses,
        };

        info!(
            "✓ {} trained in {:.1}s: {} epochs, best val_loss={:.6}",
            pair,
            start_time.elapsed().as_secs_f64(),
            report.epochs_run,
            report.best_val_loss
        );

        Ok((model, varmap, report))
    }
}
