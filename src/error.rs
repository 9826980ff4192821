use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("linfa error: {0}")]
    Linfa(#[from] linfa::Error),

    #[error("failed to fit scaler: {0}")]
    Scaler(String),

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("training set mixes 3-field and 4-field feature vectors")]
    MixedLayouts,

    #[error("need at least {required} samples to split, got {actual}")]
    NotEnoughSamples { required: usize, actual: usize },

    #[error("persisted model and scaler do not belong together: {0}")]
    IncompatibleArtifacts(String),

    #[error("invalid training parameter: {0}")]
    InvalidParameter(String),
}
