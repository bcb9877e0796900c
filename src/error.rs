use std::path::PathBuf;
use thiserror::Error;

use crate::model::ElementType;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} pixels, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
    #[error("camera error: {0}")]
    Camera(#[from] nokhwa::NokhwaError),
    #[error("no frames found in {}", .0.display())]
    NoFrames(PathBuf),
}

#[derive(Debug, Error)]
pub enum InferError {
    #[error("model asset not found at {}", .0.display())]
    ModelMissing(PathBuf),
    #[error("model asset is corrupt: {0}")]
    CorruptModel(String),
    #[error("input shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("model input element type is {0}, expected f32")]
    ElementType(ElementType),
    #[error("backend execution failed: {0}")]
    Backend(String),
    #[error("analyzer worker panicked")]
    WorkerPanicked,
}

impl InferError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, InferError::Backend(_))
    }
}

impl From<candle_core::Error> for InferError {
    fn from(err: candle_core::Error) -> Self {
        InferError::Backend(err.to_string())
    }
}
