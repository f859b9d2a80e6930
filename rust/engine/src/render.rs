//! Render pipeline
//!
//! A render pass has two phases. `begin_render` marks every uncached image as
//! decoding and hands back the work as a [`RenderPass`]; the pass decodes all
//! of it concurrently without touching the scene. `finish_render` installs the
//! decoded bitmaps and draws the whole scene bottom to top. Only one pass may
//! be in flight at a time.
//!
//! A pass owns a token whose weak half stays in the scene. Dropping the pass
//! or its batch unfinished (a cancelled future, a panicking decoder) frees the
//! scene, and the next `begin_render` returns its images to `Uncached`.

use futures::future::join_all;
use parking_lot::{Mutex, MutexGuard};
use peniko::kurbo::{Affine, Rect};
use peniko::ImageData;
use std::future::Future;
use std::sync::{Arc, Weak};

use crate::error::{DecodeError, RenderError, SurfaceError};
use crate::image::{CacheState, PixelBuffer};
use crate::scene::{ImageId, SceneManager};

/// Target of the draw phase. The engine never creates one; the host lends it
/// for the duration of a render.
pub trait DrawingSurface {
    type Bitmap;

    /// Push the current transform state.
    fn save(&mut self) -> Result<(), SurfaceError>;

    /// Pop back to the last saved transform state.
    fn restore(&mut self) -> Result<(), SurfaceError>;

    /// Post-multiply `affine` onto the current transform.
    fn transform(&mut self, affine: Affine) -> Result<(), SurfaceError>;

    /// Draw `bitmap` stretched to fill `dest` under the current transform.
    fn draw_bitmap(&mut self, bitmap: &Self::Bitmap, dest: Rect) -> Result<(), SurfaceError>;
}

/// Turns pixel buffers into surface-native bitmaps.
pub trait BitmapDecoder {
    type Bitmap;

    fn decode(
        &self,
        id: ImageId,
        pixels: PixelBuffer,
    ) -> impl Future<Output = Result<Self::Bitmap, DecodeError>>;
}

/// Outcome of a completed pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RenderReport {
    /// Bitmaps decoded during this pass.
    pub decoded: usize,
    /// Images drawn onto the surface.
    pub drawn: usize,
    /// Per-image decode failures; those images were skipped and stay uncached.
    pub failures: Vec<DecodeError>,
}

/// Decode work collected by [`SceneManager::begin_render`].
#[must_use = "a render pass must be decoded and finished"]
pub struct RenderPass {
    jobs: Vec<(ImageId, PixelBuffer)>,
    token: Arc<()>,
}

impl RenderPass {
    pub fn pending(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.jobs.iter().map(|(id, _)| *id)
    }

    /// Decode every pending image concurrently and wait for all of them.
    pub async fn decode<D: BitmapDecoder>(self, decoder: &D) -> DecodedBatch<D::Bitmap> {
        let results = join_all(
            self.jobs
                .into_iter()
                .map(|(id, pixels)| async move { (id, decoder.decode(id, pixels).await) }),
        )
        .await;
        DecodedBatch {
            results,
            _token: self.token,
        }
    }
}

pub struct DecodedBatch<B> {
    results: Vec<(ImageId, Result<B, DecodeError>)>,
    _token: Arc<()>,
}

impl<B> SceneManager<B> {
    /// Start a pass: every uncached image moves to decoding.
    pub fn begin_render(&mut self) -> Result<RenderPass, RenderError> {
        if self.render_in_flight() {
            tracing::warn!("render rejected: pass already in flight");
            return Err(RenderError::Busy);
        }
        self.reset_abandoned_decodes();

        let token = Arc::new(());
        self.render_pass = Arc::downgrade(&token);

        let jobs = self
            .images
            .iter_mut()
            .filter(|image| matches!(image.cache, CacheState::Uncached))
            .map(|image| {
                image.cache = CacheState::Decoding;
                (image.id, image.buffer.clone())
            })
            .collect();
        Ok(RenderPass { jobs, token })
    }

    /// True while a pass (or its decoded batch) is alive and unfinished.
    pub fn render_in_flight(&self) -> bool {
        self.render_pass.strong_count() > 0
    }

    /// Give up on `pass` without drawing; its images go back to `Uncached`.
    pub fn abort_render(&mut self, pass: RenderPass) {
        drop(pass);
        self.reset_abandoned_decodes();
    }

    fn reset_abandoned_decodes(&mut self) {
        if self.render_in_flight() {
            return;
        }
        for image in &mut self.images {
            if matches!(image.cache, CacheState::Decoding) {
                tracing::debug!(id = image.id, "abandoned decode reset");
                image.cache = CacheState::Uncached;
            }
        }
    }

    /// Install decoded bitmaps, then composite the scene onto `surface`.
    pub fn finish_render<S>(
        &mut self,
        batch: DecodedBatch<B>,
        surface: &mut S,
    ) -> Result<RenderReport, RenderError>
    where
        S: DrawingSurface<Bitmap = B>,
    {
        self.render_pass = Weak::new();

        let mut report = RenderReport::default();
        for (id, result) in batch.results {
            // deleted while its decode was in flight
            let Some(index) = self.index_of(id) else {
                continue;
            };
            let image = &mut self.images[index];
            match result {
                Ok(bitmap) => {
                    image.cache = CacheState::Cached(bitmap);
                    report.decoded += 1;
                }
                Err(err) => {
                    tracing::warn!(id, error = %err, "bitmap decode failed, image skipped");
                    image.cache = CacheState::Uncached;
                    report.failures.push(err);
                }
            }
        }

        for image in &self.images {
            let Some(bitmap) = image.cache.bitmap() else {
                continue;
            };
            surface.save()?;
            let drawn = surface
                .transform(image.transform.placement())
                .and_then(|_| surface.draw_bitmap(bitmap, image.transform.local_rect()));
            surface.restore()?;
            drawn?;
            report.drawn += 1;
        }

        tracing::debug!(
            decoded = report.decoded,
            drawn = report.drawn,
            failed = report.failures.len(),
            "render pass complete"
        );
        Ok(report)
    }

    /// Full pass: decode missing bitmaps, wait for all of them, then draw.
    pub async fn render<D, S>(&mut self, decoder: &D, surface: &mut S) -> Result<RenderReport, RenderError>
    where
        D: BitmapDecoder<Bitmap = B>,
        S: DrawingSurface<Bitmap = B>,
    {
        let pass = self.begin_render()?;
        let batch = pass.decode(decoder).await;
        self.finish_render(batch, surface)
    }

    /// Drop every cached bitmap; the next pass decodes them again.
    /// Results of a pass still in flight are installed when it finishes.
    pub fn clear_bitmap_cache(&mut self) {
        for image in &mut self.images {
            image.cache = CacheState::Uncached;
        }
    }
}

/// A scene behind a single lock, for hosts that call in from several threads.
///
/// The lock is released while a pass is decoding so commands are not blocked
/// by slow decodes; the in-flight guard keeps passes from overlapping.
pub struct SharedScene<B = ImageData> {
    inner: Arc<Mutex<SceneManager<B>>>,
}

impl<B> SharedScene<B> {
    pub fn new(scene: SceneManager<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scene)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SceneManager<B>> {
        self.inner.lock()
    }

    pub async fn render<D, S>(&self, decoder: &D, surface: &mut S) -> Result<RenderReport, RenderError>
    where
        D: BitmapDecoder<Bitmap = B>,
        S: DrawingSurface<Bitmap = B>,
    {
        let pass = self.lock().begin_render()?;
        let batch = pass.decode(decoder).await;
        self.lock().finish_render(batch, surface)
    }
}

impl<B> Clone for SharedScene<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
