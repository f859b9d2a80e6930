/// Image storage module
///
/// Holds the immutable RGBA8 pixel buffers handed over by the host and the
/// per-image record (pixels, placement, bitmap cache) owned by the scene.
/// Pixels live in a peniko `Blob` so the decoded bitmap can share them
/// without a second copy.

use peniko::Blob;
use std::sync::Arc;

use crate::error::SceneError;
use crate::scene::ImageId;
use crate::transform::Transform;

const BYTES_PER_PIXEL: usize = 4;

/// Owned RGBA8 pixels of one image. Never mutated after creation.
#[derive(Clone)]
pub struct PixelBuffer {
    data: Blob<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Copy `pixels` into a new buffer after checking `len == width * height * 4`.
    pub fn from_rgba(pixels: &[u8], width: u32, height: u32) -> Result<Self, SceneError> {
        let expected = expected_len(width, height);
        if pixels.len() != expected {
            return Err(SceneError::InvalidBufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        if width == 0 || height == 0 {
            return Err(SceneError::ZeroDimensions { width, height });
        }

        Ok(Self {
            data: Blob::new(Arc::new(pixels.to_vec())),
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.data()
    }

    /// Shared handle to the pixel bytes (reference count bump, no copy).
    pub fn blob(&self) -> Blob<u8> {
        self.data.clone()
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Saturates on overflow so an absurd size can never match a real slice.
fn expected_len(width: u32, height: u32) -> usize {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .unwrap_or(usize::MAX)
}

/// Render-cache state of one image.
#[derive(Debug, Clone, Default)]
pub enum CacheState<B> {
    #[default]
    Uncached,
    Decoding,
    Cached(B),
}

impl<B> CacheState<B> {
    pub fn is_cached(&self) -> bool {
        matches!(self, CacheState::Cached(_))
    }

    pub fn bitmap(&self) -> Option<&B> {
        match self {
            CacheState::Cached(bitmap) => Some(bitmap),
            _ => None,
        }
    }
}

/// One placed image, owned by the scene.
#[derive(Debug)]
pub struct Image<B> {
    pub(crate) id: ImageId,
    pub(crate) buffer: PixelBuffer,
    pub(crate) transform: Transform,
    pub(crate) cache: CacheState<B>,
}

impl<B> Image<B> {
    pub(crate) fn new(id: ImageId, buffer: PixelBuffer) -> Self {
        let transform = Transform::new(buffer.width() as f64, buffer.height() as f64);
        Self {
            id,
            buffer,
            transform,
            cache: CacheState::Uncached,
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn cache(&self) -> &CacheState<B> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pixels(width: u32, height: u32) -> Vec<u8> {
        let size = (width * height * 4) as usize;
        vec![255u8; size]
    }

    #[test]
    fn test_from_rgba_copies_pixels() {
        let mut pixels = create_test_pixels(2, 3);
        pixels[0] = 7;
        let buffer = PixelBuffer::from_rgba(&pixels, 2, 3).unwrap();

        pixels[0] = 9;
        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.height(), 3);
        assert_eq!(buffer.as_bytes().len(), 24);
        assert_eq!(buffer.as_bytes()[0], 7);
    }

    #[test]
    fn test_invalid_dimensions() {
        let pixels = create_test_pixels(2, 2);

        let result = PixelBuffer::from_rgba(&pixels, 10, 10);
        assert_eq!(
            result.unwrap_err(),
            SceneError::InvalidBufferSize {
                expected: 400,
                actual: 16
            }
        );
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let pixels = create_test_pixels(2, 2);
        assert!(PixelBuffer::from_rgba(&pixels[..15], 2, 2).is_err());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let result = PixelBuffer::from_rgba(&[], 0, 5);
        assert_eq!(
            result.unwrap_err(),
            SceneError::ZeroDimensions {
                width: 0,
                height: 5
            }
        );
    }

    #[test]
    fn test_overflowing_dimensions() {
        let result = PixelBuffer::from_rgba(&[0; 4], u32::MAX, u32::MAX);
        assert!(matches!(result, Err(SceneError::InvalidBufferSize { .. })));
    }

    #[test]
    fn test_blob_shares_bytes() {
        let buffer = PixelBuffer::from_rgba(&create_test_pixels(1, 1), 1, 1).unwrap();
        let blob = buffer.blob();
        assert_eq!(blob.id(), buffer.blob().id());
        assert_eq!(blob.data(), buffer.as_bytes());
    }

    #[test]
    fn test_new_image_starts_uncached() {
        let buffer = PixelBuffer::from_rgba(&create_test_pixels(4, 2), 4, 2).unwrap();
        let image: Image<()> = Image::new(3, buffer);
        assert_eq!(image.id(), 3);
        assert!(!image.cache().is_cached());
        assert_eq!(image.transform().width, 4.0);
        assert_eq!(image.transform().original_height, 2.0);
    }
}
