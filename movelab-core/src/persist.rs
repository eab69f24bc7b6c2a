//! Model persistence behind a swappable store interface.
//!
//! `JsonModelStore` layout: a single JSON file holding an envelope
//! `{ schema_version, format, checksum, model }` where `checksum` is the
//! BLAKE3 hex digest of the serialized model.
//!
//! Features:
//! - Atomic writes (write to `.tmp`, rename into place)
//! - Parent directories created on save
//! - Format, version and checksum validation on load

use crate::booster::GradientBoostedClassifier;
use crate::error::PersistError;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Current schema version for persisted models.
pub const SCHEMA_VERSION: u32 = 1;

const FORMAT: &str = "movelab-gbdt";

/// Save/load capability for fitted models.
pub trait ModelStore: Send + Sync {
    fn save(&self, model: &GradientBoostedClassifier, path: &Path) -> Result<(), PersistError>;

    fn load(&self, path: &Path) -> Result<GradientBoostedClassifier, PersistError>;
}

/// JSON envelope store with checksum validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModelStore;

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    schema_version: u32,
    format: &'a str,
    checksum: String,
    model: &'a RawValue,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    schema_version: u32,
    format: String,
    checksum: String,
    model: Box<RawValue>,
}

impl ModelStore for JsonModelStore {
    fn save(&self, model: &GradientBoostedClassifier, path: &Path) -> Result<(), PersistError> {
        let model_json = serde_json::to_string(model)?;
        let raw = RawValue::from_string(model_json)?;
        let envelope = EnvelopeOut {
            schema_version: SCHEMA_VERSION,
            format: FORMAT,
            checksum: blake3::hash(raw.get().as_bytes()).to_hex().to_string(),
            model: &raw,
        };
        let bytes = serde_json::to_vec(&envelope)?;
        write_atomic(path, &bytes)?;

        info!(
            path = %path.display(),
            trees = model.n_trees(),
            bytes = bytes.len(),
            "saved model"
        );
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<GradientBoostedClassifier, PersistError> {
        let content = fs::read_to_string(path).map_err(|e| PersistError::io(path, e))?;
        let envelope: EnvelopeIn = serde_json::from_str(&content)?;

        if envelope.format != FORMAT {
            return Err(PersistError::Format(envelope.format));
        }
        if envelope.schema_version > SCHEMA_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: envelope.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        let actual = blake3::hash(envelope.model.get().as_bytes())
            .to_hex()
            .to_string();
        if actual != envelope.checksum {
            return Err(PersistError::ChecksumMismatch {
                expected: envelope.checksum,
                actual,
            });
        }

        let model: GradientBoostedClassifier = serde_json::from_str(envelope.model.get())?;
        model
            .check_integrity()
            .map_err(|reason| PersistError::Format(format!("{FORMAT}: {reason}")))?;
        Ok(model)
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
///
/// On any failure the temp file is removed, so `path` either holds the old
/// contents, the complete new contents, or does not exist.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
    }

    let tmp_path = tmp_path_for(path);
    if let Err(e) = fs::write(&tmp_path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(PersistError::io(&tmp_path, e));
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PersistError::io(path, e)
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
