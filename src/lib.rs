pub mod analysis;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod ingestion;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod record;
pub mod sentiment;
pub mod trainer;

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use tracing::{info, warn};

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use features::{EngineeredBatch, FeatureSchema, CURRENT_SCHEMA};
pub use model::TrainedModel;
pub use predictor::{Prediction, TrendingOutlook, TrendingPredictor};
pub use record::RawVideoRecord;
pub use trainer::TrainingOutcome;

fn log_rejected(batch: &EngineeredBatch) {
    if !batch.rejected.is_empty() {
        warn!(
            "{} rows rejected for missing fields, first at row {}",
            batch.rejected.len(),
            batch.rejected[0].row
        );
    }
}

/// Engineers the features of an already loaded raw table without labeling.
pub fn engineer_frame(df: &DataFrame, now: DateTime<Utc>) -> anyhow::Result<EngineeredBatch> {
    let raws = dataset::raw_records_from_frame(df)?;
    let batch = features::prepare_batch(&raws, now).context("Failed to prepare features")?;
    log_rejected(&batch);
    Ok(batch)
}

/// Loads a raw table and engineers its features without labeling.
pub fn engineer_csv(csv_path: &Path, now: DateTime<Utc>) -> anyhow::Result<EngineeredBatch> {
    let df = dataset::load_csv_file(csv_path)
        .with_context(|| format!("Failed to read raw table {:?}", csv_path))?;
    engineer_frame(&df, now)
}

/// Loads a raw table, labels it and trains a model on it.
pub fn train_from_csv(
    csv_path: &Path,
    settings: &config::TrainingSettings,
    now: DateTime<Utc>,
) -> anyhow::Result<(EngineeredBatch, TrainingOutcome)> {
    let raws = dataset::load_raw_records(csv_path)
        .with_context(|| format!("Failed to read raw table {:?}", csv_path))?;

    let batch = features::prepare_training_batch(&raws, now, settings.trending_quantile)
        .with_context(|| format!("Failed to prepare features for {:?}", csv_path))?;
    log_rejected(&batch);
    info!(
        "Prepared {} rows, {} trending",
        batch.len(),
        batch.trending_count()
    );

    let outcome = trainer::train_trending_model(&batch, &CURRENT_SCHEMA, settings, now)
        .context("Training failed")?;
    Ok((batch, outcome))
}
