//! Embedding-model manifest and integrity verification.
//!
//! Each model file ships with a TOML manifest beside it (`facenet.onnx` →
//! `facenet.toml`) that pins its checksum, input size and output dimension.
//! The dimension is deployment metadata, never a compile-time guess.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Model descriptor read from `<model>.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub sha256: String,
    /// Square input edge in pixels.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    pub embedding_dim: usize,
}

fn default_input_size() -> u32 {
    160
}

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: String, path: PathBuf },

    #[error("model manifest not found: {path}")]
    MissingManifest { path: PathBuf },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: String,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Manifest location for a model file.
pub fn manifest_path_for(model_path: &Path) -> PathBuf {
    model_path.with_extension("toml")
}

pub fn parse_manifest(path: &Path, text: &str) -> Result<ModelManifest, ModelIntegrityError> {
    let manifest: ModelManifest =
        toml::from_str(text).map_err(|e| ModelIntegrityError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let invalid = |message: &str| ModelIntegrityError::Manifest {
        path: path.to_path_buf(),
        message: message.to_string(),
    };
    if manifest.embedding_dim == 0 {
        return Err(invalid("embedding_dim must be positive"));
    }
    if manifest.input_size == 0 {
        return Err(invalid("input_size must be positive"));
    }
    if manifest.sha256.len() != 64 || !manifest.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("sha256 must be 64 hex characters"));
    }

    Ok(manifest)
}

pub fn load_manifest(path: &Path) -> Result<ModelManifest, ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingManifest {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path).map_err(|source| ModelIntegrityError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(path, &text)
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    digest_reader(path, file)
}

fn digest_reader(path: &Path, reader: impl io::Read) -> Result<String, ModelIntegrityError> {
    let mut hasher = Sha256::new();
    io::copy(&mut io::BufReader::new(reader), &mut hasher).map_err(|source| {
        ModelIntegrityError::Read {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check a model file against the checksum its manifest pins.
///
/// A model that cannot be found is reported under the manifest's name.
pub fn verify_checksum(
    model_path: &Path,
    manifest: &ModelManifest,
) -> Result<(), ModelIntegrityError> {
    let file = fs::File::open(model_path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ModelIntegrityError::MissingModel {
            name: manifest.name.clone(),
            path: model_path.to_path_buf(),
        },
        _ => ModelIntegrityError::Open {
            path: model_path.to_path_buf(),
            source,
        },
    })?;

    let got = digest_reader(model_path, file)?;
    if got.eq_ignore_ascii_case(&manifest.sha256) {
        return Ok(());
    }
    Err(ModelIntegrityError::ChecksumMismatch {
        name: manifest.name.clone(),
        path: model_path.to_path_buf(),
        expected: manifest.sha256.to_ascii_lowercase(),
        got,
    })
}

/// Load the manifest beside `model_path` and check the model against it.
pub fn verify_model(model_path: &Path) -> Result<ModelManifest, ModelIntegrityError> {
    let manifest = load_manifest(&manifest_path_for(model_path))?;
    verify_checksum(model_path, &manifest)?;
    tracing::info!(
        name = %manifest.name,
        embedding_dim = manifest.embedding_dim,
        input_size = manifest.input_size,
        "model verified"
    );
    Ok(manifest)
}
