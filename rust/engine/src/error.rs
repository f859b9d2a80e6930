// Error types shared by the scene, the render pipeline and the C layer

use crate::scene::ImageId;

/// Errors returned synchronously by scene commands and queries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("invalid pixel data length: expected {expected}, got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },
    #[error("image dimensions must be non-zero (got {width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("image {0} not found")]
    NotFound(ImageId),
    #[error("invalid image size {width}x{height}")]
    InvalidSize { width: f64, height: f64 },
    #[error("image ids exhausted")]
    IdsExhausted,
}

/// A single image's bitmap could not be materialized.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to decode image {id}: {reason}")]
pub struct DecodeError {
    pub id: ImageId,
    pub reason: String,
}

impl DecodeError {
    pub fn new(id: ImageId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// The drawing surface rejected an operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("restore without matching save")]
    UnbalancedRestore,
    #[error("non-finite transform")]
    InvalidTransform,
    #[error("surface error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("a render pass is already in flight")]
    Busy,
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}
