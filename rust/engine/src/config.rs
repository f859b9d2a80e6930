// Engine configuration

use crate::error::SceneError;

/// Largest width/height an image may be resized to by default (the canvas size).
pub const DEFAULT_MAX_DIMENSION: f64 = 2560.0;

/// Largest bitmap the vello decoder will upload.
pub const DEFAULT_MAX_BITMAP_DIMENSION: u32 = 8192;

/// How size updates are validated before they reach a transform.
///
/// `Clamp` rewrites out-of-range sizes, so a query may not return the value
/// that was written. Use `Trust` to have sizes stored exactly as given.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePolicy {
    /// Normalize into `[1, max_dimension]`; negative sizes flip sign first.
    #[default]
    Clamp = 0,
    /// Store any positive size as given; the host enforces bounds.
    Trust = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_dimension: f64,
    pub size_policy: SizePolicy,
    pub max_bitmap_dimension: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            size_policy: SizePolicy::Clamp,
            max_bitmap_dimension: DEFAULT_MAX_BITMAP_DIMENSION,
        }
    }
}

impl EngineConfig {
    /// Apply the size policy to a requested `(width, height)`.
    pub fn resolve_size(&self, width: f64, height: f64) -> Result<(f64, f64), SceneError> {
        if !width.is_finite() || !height.is_finite() {
            return Err(SceneError::InvalidSize { width, height });
        }
        match self.size_policy {
            SizePolicy::Clamp => Ok((self.clamp_dimension(width), self.clamp_dimension(height))),
            SizePolicy::Trust if width > 0.0 && height > 0.0 => Ok((width, height)),
            SizePolicy::Trust => Err(SceneError::InvalidSize { width, height }),
        }
    }

    fn clamp_dimension(&self, value: f64) -> f64 {
        value.abs().clamp(1.0, self.max_dimension.max(1.0))
    }
}
