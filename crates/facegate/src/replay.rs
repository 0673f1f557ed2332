//! Recorded detector sessions.
//!
//! A session file is JSON Lines, one frame per line:
//!
//! ```text
//! {"timestamp_ms": 0, "bounding_box": {"x": 120, "y": 80, "width": 160, "height": 160},
//!  "left_eye_open": 0.93, "right_eye_open": 0.91, "image": "frames/0000.png"}
//! ```
//!
//! `image` is resolved relative to the session file. It is a full camera
//! frame cropped around `bounding_box`, unless `cropped` is true.

use std::path::{Path, PathBuf};

use facegate_core::model::crop_face;
use facegate_core::{FaceObservation, ModelError};
use serde::Deserialize;
use thiserror::Error;

use crate::engine::Frame;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load frame image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame {path}: {source}")]
    Crop {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedFrame {
    #[serde(flatten)]
    pub observation: FaceObservation,
    pub image: PathBuf,
    #[serde(default)]
    pub cropped: bool,
}

impl RecordedFrame {
    /// Load the image and produce the face crop the engine consumes.
    pub fn load(&self, base_dir: &Path, padding: u32) -> Result<Frame, ReplayError> {
        let path = base_dir.join(&self.image);
        let image = image::open(&path)
            .map_err(|source| ReplayError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgb8();

        let crop = if self.cropped {
            image
        } else {
            crop_face(&image, &self.observation.bounding_box, padding)
                .map_err(|source| ReplayError::Crop { path, source })?
        };

        Ok(Frame {
            observation: self.observation.clone(),
            crop,
        })
    }
}

/// Parse session lines. Blank lines and `#` comments are skipped.
pub fn parse_session(text: &str) -> Result<Vec<RecordedFrame>, ReplayError> {
    let mut frames = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let frame = serde_json::from_str(line).map_err(|source| ReplayError::Parse {
            line: idx + 1,
            source,
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

pub fn load_session(path: &Path) -> Result<Vec<RecordedFrame>, ReplayError> {
    let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let frames = parse_session(&text)?;
    tracing::info!(path = %path.display(), frames = frames.len(), "session loaded");
    Ok(frames)
}
