pub mod dataset;
pub mod forecaster;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod scaler;
pub mod trainer;

pub use dataset::{build_windows, split_windows, DatasetSplit, Window};
pub use forecaster::{forecast_next, predict_windows};
pub use metrics::evaluate_windows;
pub use model::{ModelParams, Seq2SeqForecaster};
pub use persistence::{ModelMetadata, ModelStore, TrainedModel};
pub use scaler::MinMaxScaler;
pub use trainer::{Trainer, TrainingReport};
