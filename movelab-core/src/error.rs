//! Structured error types for training, prediction and persistence.
//!
//! Every failure in the core is surfaced to the caller. A failed fit is never
//! turned into an empty result.

use thiserror::Error;

/// Errors from the training/evaluation core.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Shape or content violations the caller can fix (length mismatch,
    /// empty inputs, non-binary labels, out-of-range parameters).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The boosting procedure itself failed (numerical breakdown etc).
    #[error("training failed: {0}")]
    Training(String),

    /// The model could not produce predictions for the given matrix.
    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("model persistence failed: {0}")]
    Persist(#[from] PersistError),
}

/// Errors from saving or loading a serialized model.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unrecognized model format '{0}'")]
    Format(String),

    #[error("unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("checksum mismatch: file says {expected}, contents hash to {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl PersistError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
