// Canvas module - vello implementations of the decoder and drawing surface

use peniko::kurbo::{Affine, Rect};
use peniko::{ImageBrush, ImageData};
use vello::peniko::{ImageAlphaType, ImageFormat};
use vello::Scene;

use crate::config::DEFAULT_MAX_BITMAP_DIMENSION;
use crate::error::{DecodeError, SurfaceError};
use crate::image::PixelBuffer;
use crate::render::{BitmapDecoder, DrawingSurface};
use crate::scene::ImageId;

/// Wraps pixel buffers as peniko images. The blob is shared, not copied.
pub struct VelloDecoder {
    max_dimension: u32,
}

impl VelloDecoder {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl Default for VelloDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BITMAP_DIMENSION)
    }
}

impl BitmapDecoder for VelloDecoder {
    type Bitmap = ImageData;

    async fn decode(&self, id: ImageId, pixels: PixelBuffer) -> Result<ImageData, DecodeError> {
        let (width, height) = (pixels.width(), pixels.height());
        if width > self.max_dimension || height > self.max_dimension {
            return Err(DecodeError::new(
                id,
                format!(
                    "{width}x{height} exceeds the {} px bitmap limit",
                    self.max_dimension
                ),
            ));
        }

        Ok(ImageData {
            data: pixels.blob(),
            format: ImageFormat::Rgba8,
            width,
            height,
            alpha_type: ImageAlphaType::Alpha,
        })
    }
}

/// Draws into a vello `Scene` with a canvas-style save/restore stack.
pub struct VelloSurface<'a> {
    scene: &'a mut Scene,
    current: Affine,
    stack: Vec<Affine>,
}

impl<'a> VelloSurface<'a> {
    /// `base` maps canvas pixels to target pixels (usually the display scale).
    pub fn new(scene: &'a mut Scene, base: Affine) -> Self {
        Self {
            scene,
            current: base,
            stack: Vec::new(),
        }
    }
}

impl DrawingSurface for VelloSurface<'_> {
    type Bitmap = ImageData;

    fn save(&mut self) -> Result<(), SurfaceError> {
        self.stack.push(self.current);
        Ok(())
    }

    fn restore(&mut self) -> Result<(), SurfaceError> {
        self.current = self.stack.pop().ok_or(SurfaceError::UnbalancedRestore)?;
        Ok(())
    }

    fn transform(&mut self, affine: Affine) -> Result<(), SurfaceError> {
        if !affine.is_finite() {
            return Err(SurfaceError::InvalidTransform);
        }
        self.current = self.current * affine;
        Ok(())
    }

    fn draw_bitmap(&mut self, bitmap: &ImageData, dest: Rect) -> Result<(), SurfaceError> {
        if bitmap.width == 0 || bitmap.height == 0 {
            return Err(SurfaceError::Backend("empty bitmap".into()));
        }
        let fit = Affine::translate((dest.x0, dest.y0))
            * Affine::scale_non_uniform(
                dest.width() / bitmap.width as f64,
                dest.height() / bitmap.height as f64,
            );
        let transform = self.current * fit;
        if !transform.is_finite() {
            return Err(SurfaceError::InvalidTransform);
        }

        self.scene
            .draw_image(&ImageBrush::new(bitmap.clone()), transform);
        Ok(())
    }
}
