//! Embedding model capability and face-crop preprocessing.
//!
//! The engine only needs "face image in, fixed-length vector out". Anything
//! implementing [`EmbeddingModel`] can be injected: the ONNX backend behind
//! the `onnx` feature, or a closure wrapped in [`FnModel`] for tests.

use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

use crate::codec;
use crate::error::EmbeddingError;
use crate::types::{BoundingBox, Embedding};

/// Default square input edge for FaceNet-style models.
pub const DEFAULT_INPUT_SIZE: u32 = 160;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("face crop is empty after clamping to the frame")]
    EmptyCrop,
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("embedding model inference failed: {0}")]
    Inference(String),
    #[error("failed to load embedding model {path}: {message}")]
    Load { path: PathBuf, message: String },
}

/// Maps a cropped face to a raw embedding of fixed dimension.
pub trait EmbeddingModel: Send {
    /// Output length. Fixed for the lifetime of the model.
    fn dimension(&self) -> usize;

    fn infer(&mut self, face: &RgbImage) -> Result<Vec<f32>, ModelError>;
}

impl<M: EmbeddingModel + ?Sized> EmbeddingModel for Box<M> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn infer(&mut self, face: &RgbImage) -> Result<Vec<f32>, ModelError> {
        (**self).infer(face)
    }
}

/// Adapts a closure into an [`EmbeddingModel`].
pub struct FnModel<F> {
    dimension: usize,
    infer: F,
}

impl<F> FnModel<F>
where
    F: FnMut(&RgbImage) -> Vec<f32> + Send,
{
    pub fn new(dimension: usize, infer: F) -> Self {
        Self { dimension, infer }
    }
}

impl<F> EmbeddingModel for FnModel<F>
where
    F: FnMut(&RgbImage) -> Vec<f32> + Send,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn infer(&mut self, face: &RgbImage) -> Result<Vec<f32>, ModelError> {
        Ok((self.infer)(face))
    }
}

/// Run the model and normalize its output.
///
/// Fails with `DimensionMismatch` if the model returns a vector whose
/// length disagrees with [`EmbeddingModel::dimension`]. A zero output is
/// returned as a degenerate embedding rather than an error.
pub fn extract_embedding<M>(model: &mut M, face: &RgbImage) -> Result<Embedding, ModelError>
where
    M: EmbeddingModel + ?Sized,
{
    let raw = model.infer(face)?;
    if raw.len() != model.dimension() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: model.dimension(),
            found: raw.len(),
        }
        .into());
    }
    Ok(codec::normalize(raw))
}

/// Cut the face out of a frame, grown by `padding` pixels on every side and
/// clamped to the frame.
pub fn crop_face(
    frame: &RgbImage,
    bbox: &BoundingBox,
    padding: u32,
) -> Result<RgbImage, ModelError> {
    let pad = i64::from(padding);
    let width = i64::from(frame.width());
    let height = i64::from(frame.height());

    let left = (bbox.x.floor() as i64 - pad).max(0);
    let top = (bbox.y.floor() as i64 - pad).max(0);
    let right = ((bbox.x + bbox.width).ceil() as i64 + pad).min(width);
    let bottom = ((bbox.y + bbox.height).ceil() as i64 + pad).min(height);

    if right <= left || bottom <= top {
        return Err(ModelError::EmptyCrop);
    }

    Ok(imageops::crop_imm(
        frame,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    )
    .to_image())
}

/// Resize to `input_size`² and scale each channel to `[-1, 1]`, HWC order.
pub fn preprocess(face: &RgbImage, input_size: u32) -> Vec<f32> {
    let resized = imageops::resize(face, input_size, input_size, FilterType::Triangle);
    resized
        .as_raw()
        .iter()
        .map(|&c| f32::from(c) / 127.5 - 1.0)
        .collect()
}

#[cfg(feature = "onnx")]
pub mod onnx {
    //! ONNX Runtime backend.

    use std::fmt::Display;
    use std::path::Path;

    use image::RgbImage;
    use ndarray::Array4;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::Value;

    use super::{preprocess, EmbeddingModel, ModelError};

    /// Embedding model with `[1, S, S, 3]` float input and one float output.
    pub struct OnnxEmbeddingModel {
        session: Session,
        input_size: u32,
        dimension: usize,
    }

    fn load_error(path: &Path, e: impl Display) -> ModelError {
        ModelError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }

    fn inference_error(e: impl Display) -> ModelError {
        ModelError::Inference(e.to_string())
    }

    impl OnnxEmbeddingModel {
        pub fn load(path: &Path, input_size: u32, dimension: usize) -> Result<Self, ModelError> {
            let builder = Session::builder().map_err(|e| load_error(path, e))?;
            let builder = builder
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| load_error(path, e))?;
            let session = builder
                .commit_from_file(path)
                .map_err(|e| load_error(path, e))?;

            tracing::info!(
                path = %path.display(),
                input_size,
                dimension,
                "embedding model loaded"
            );
            Ok(Self {
                session,
                input_size,
                dimension,
            })
        }
    }

    impl EmbeddingModel for OnnxEmbeddingModel {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn infer(&mut self, face: &RgbImage) -> Result<Vec<f32>, ModelError> {
            let size = self.input_size as usize;
            let input = Array4::from_shape_vec((1, size, size, 3), preprocess(face, self.input_size))
                .map_err(inference_error)?;
            let tensor = Value::from_array(input).map_err(inference_error)?;

            let outputs = self
                .session
                .run(ort::inputs![tensor])
                .map_err(inference_error)?;
            let (_name, output) = outputs
                .iter()
                .next()
                .ok_or_else(|| ModelError::Inference("model produced no outputs".to_string()))?;
            let (_shape, data) = output.try_extract_tensor::<f32>().map_err(inference_error)?;
            Ok(data.to_vec())
        }
    }
}
