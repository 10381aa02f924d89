pub mod jobs;
pub mod pipeline;

pub use jobs::{JobKind, JobManager, JobRecord, JobResult, JobStatus};
pub use pipeline::{
    refresh_forecasts, run_training_blocking, spawn_training, CurrencyOutcome, OutcomeState,
    PipelineOptions, RunReport, Stage, TrainingPipeline,
};
