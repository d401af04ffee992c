use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the core pipeline. All are detected synchronously and
/// propagate to the immediate caller; the core never retries and never
/// substitutes defaults for structural problems.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("column '{0}' not found in input series")]
    MissingColumn(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("insufficient data for sensor '{sensor}' in {mode} mode: no overlapping days between device and reference")]
    InsufficientData { sensor: String, mode: String },

    #[error("feature vector shape mismatch: expected width {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("model artifact not found at {path}")]
    ModelNotFound { path: PathBuf },

    #[error("failed to read model artifact {path}: {source}")]
    ModelIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact {path} is malformed: {source}")]
    MalformedModel {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
