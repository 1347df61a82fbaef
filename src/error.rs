use polars::prelude::PolarsError;
use thiserror::Error;

/// Problem with a single raw field of a video record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing required field '{0}'")]
    Missing(&'static str),

    #[error("field '{field}' {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl FieldError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        FieldError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            FieldError::Missing(field) => field,
            FieldError::Invalid { field, .. } => field,
        }
    }
}

/// Errors raised while turning a raw table into an engineered one.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Input table has no column '{0}'")]
    MissingColumn(String),

    #[error("Row {row}: {source}")]
    InvalidRow {
        row: usize,
        #[source]
        source: FieldError,
    },

    #[error("No usable rows left in batch ({rejected} rejected)")]
    EmptyBatch { rejected: usize },

    #[error("Table error: {0}")]
    Polars(#[from] PolarsError),
}

/// Errors raised by the model trainer.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Not enough rows to train: {0}")]
    NotEnoughRows(usize),

    #[error("Training labels contain a single class ({0})")]
    SingleClass(&'static str),

    #[error("Oversampling needs at least {needed} minority samples, found {found}")]
    TooFewMinority { found: usize, needed: usize },

    #[error("Batch has no Is_Trending labels")]
    Unlabeled,

    #[error("Cross-validation fold {fold} has no {missing} rows")]
    DegenerateFold { fold: usize, missing: &'static str },

    #[error("Hyperparameter grid is empty")]
    EmptyGrid,

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("Table error: {0}")]
    Polars(#[from] PolarsError),
}

/// Errors raised while saving or loading a model artifact.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Classifier persistence error: {0}")]
    Classifier(String),

    #[error("Artifact schema version {found} is not supported (expected {expected})")]
    SchemaVersion { expected: u32, found: u32 },
}

/// Errors raised per prediction request.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Invalid video: {0}")]
    InvalidInput(#[from] FieldError),

    #[error("Feature '{name}' is not finite ({value})")]
    NonFiniteFeature { name: String, value: f64 },

    #[error("Classifier returned no probability")]
    EmptyOutput,

    #[error("Classifier returned a non-finite probability ({0})")]
    NonFiniteOutput(f32),
}

/// Errors raised by the catalog API client.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Environment variable '{0}' with the API key is not set")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No region returned any video")]
    NothingFetched,

    #[error("Table error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
