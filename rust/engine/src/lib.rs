mod canvas;
mod config;
mod error;
mod gfx;
mod image;
mod render;
mod scene;
mod transform;

pub use canvas::{VelloDecoder, VelloSurface};
pub use config::{EngineConfig, SizePolicy, DEFAULT_MAX_BITMAP_DIMENSION, DEFAULT_MAX_DIMENSION};
pub use error::{DecodeError, RenderError, SceneError, SurfaceError};
pub use gfx::{Gfx, GfxError, MacSurface};
pub use image::{CacheState, Image, PixelBuffer};
pub use render::{BitmapDecoder, DecodedBatch, DrawingSurface, RenderPass, RenderReport, SharedScene};
pub use scene::{ImageId, ImageSize, SceneManager};
pub use transform::Transform;

use parking_lot::Mutex;
use peniko::kurbo::Affine;
use peniko::Color;
use std::cell::RefCell;
use std::ffi::{c_char, CString};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_err(e: impl std::fmt::Display) {
    let msg = CString::new(e.to_string()).unwrap_or_default();
    LAST_ERROR.with(|s| *s.borrow_mut() = Some(msg));
}

/// Last error message on this thread, or null. Valid until the next failing call.
#[no_mangle]
pub extern "C" fn dcore_last_error() -> *const c_char {
    LAST_ERROR.with(|s| s.borrow().as_ref().map_or(std::ptr::null(), |msg| msg.as_ptr()))
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcoreStatus {
    Ok = 0,
    Err = 1,
    NotFound = 2,
    InvalidBufferSize = 3,
    Busy = 4,
}

impl From<&SceneError> for DcoreStatus {
    fn from(e: &SceneError) -> Self {
        match e {
            SceneError::NotFound(_) => DcoreStatus::NotFound,
            SceneError::InvalidBufferSize { .. } => DcoreStatus::InvalidBufferSize,
            _ => DcoreStatus::Err,
        }
    }
}

fn status_of<T>(result: Result<T, SceneError>) -> DcoreStatus {
    match result {
        Ok(_) => DcoreStatus::Ok,
        Err(e) => {
            let status = DcoreStatus::from(&e);
            set_err(e);
            status
        }
    }
}

/// Engine settings. Pass null to `dcore_create` for the defaults.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct DcoreConfig {
    pub max_dimension: f64,
    pub size_policy: SizePolicy,
    pub max_bitmap_dimension: u32,
}

impl From<&DcoreConfig> for EngineConfig {
    fn from(c: &DcoreConfig) -> Self {
        EngineConfig {
            max_dimension: c.max_dimension,
            size_policy: c.size_policy,
            max_bitmap_dimension: c.max_bitmap_dimension,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DcoreImageSize {
    pub width: f64,
    pub height: f64,
    pub original_width: f64,
    pub original_height: f64,
}

impl From<ImageSize> for DcoreImageSize {
    fn from(s: ImageSize) -> Self {
        Self {
            width: s.width,
            height: s.height,
            original_width: s.original_width,
            original_height: s.original_height,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DcorePoint {
    pub x: f64,
    pub y: f64,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct DcoreRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

struct Output {
    gfx: Option<Gfx>,
    canvas: vello::Scene,
}

struct Engine {
    scene: SharedScene,
    decoder: VelloDecoder,
    output: Mutex<Output>,
}

pub struct DcoreContext(Engine);

fn context<'a>(ctx: *const DcoreContext) -> Option<&'a Engine> {
    match unsafe { ctx.as_ref() } {
        Some(ctx) => Some(&ctx.0),
        None => {
            set_err("null context");
            None
        }
    }
}

/// Write `value` through `out`, failing on null.
fn write_out<T>(out: *mut T, value: T) -> DcoreStatus {
    match unsafe { out.as_mut() } {
        Some(slot) => {
            *slot = value;
            DcoreStatus::Ok
        }
        None => {
            set_err("null output pointer");
            DcoreStatus::Err
        }
    }
}

#[no_mangle]
pub extern "C" fn dcore_create(config: *const DcoreConfig) -> *mut DcoreContext {
    let config = unsafe { config.as_ref() }.map(EngineConfig::from).unwrap_or_default();
    let decoder = VelloDecoder::new(config.max_bitmap_dimension);
    let engine = Engine {
        scene: SharedScene::new(SceneManager::with_config(config)),
        decoder,
        output: Mutex::new(Output {
            gfx: None,
            canvas: vello::Scene::new(),
        }),
    };
    Box::into_raw(Box::new(DcoreContext(engine)))
}

#[no_mangle]
pub extern "C" fn dcore_destroy(ctx: *mut DcoreContext) {
    if !ctx.is_null() {
        unsafe { drop(Box::from_raw(ctx)) }
    }
}

/// Create the GPU presenter for a host view. Replaces any previous one.
#[no_mangle]
pub extern "C" fn dcore_attach_surface(ctx: *const DcoreContext, desc: *const MacSurface) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let Some(desc) = (unsafe { desc.as_ref() }) else {
        set_err("null surface descriptor");
        return DcoreStatus::Err;
    };

    match pollster::block_on(Gfx::new_macos(desc)) {
        Ok(gfx) => {
            engine.output.lock().gfx = Some(gfx);
            DcoreStatus::Ok
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to attach surface");
            set_err(e);
            DcoreStatus::Err
        }
    }
}

#[no_mangle]
pub extern "C" fn dcore_resize(ctx: *const DcoreContext, desc: *const MacSurface) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let Some(desc) = (unsafe { desc.as_ref() }) else {
        set_err("null surface descriptor");
        return DcoreStatus::Err;
    };
    match engine.output.lock().gfx.as_mut() {
        Some(gfx) => {
            gfx.resize(desc);
            DcoreStatus::Ok
        }
        None => {
            set_err("no surface attached");
            DcoreStatus::Err
        }
    }
}

/// Copy `len` RGBA8 bytes into a new image on top of the scene.
#[no_mangle]
pub extern "C" fn dcore_add_image(
    ctx: *const DcoreContext,
    width: u32,
    height: u32,
    data: *const u8,
    len: usize,
    out_id: *mut ImageId,
) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    if out_id.is_null() || (data.is_null() && len > 0) {
        set_err("null pointer passed to dcore_add_image");
        return DcoreStatus::Err;
    }

    let bytes = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };
    let result = engine.scene.lock().add_image(width, height, bytes);
    match result {
        Ok(id) => write_out(out_id, id),
        Err(e) => status_of::<()>(Err(e)),
    }
}

/// Hit-test `(x, y)`; returns true and writes the id on a hit, clears the
/// selection and returns false otherwise.
#[no_mangle]
pub extern "C" fn dcore_select_image(ctx: *const DcoreContext, x: f64, y: f64, out_id: *mut ImageId) -> bool {
    let Some(engine) = context(ctx) else {
        return false;
    };
    let selected = engine.scene.lock().select_image(x, y);
    match selected {
        Some(id) => {
            if let Some(slot) = unsafe { out_id.as_mut() } {
                *slot = id;
            }
            true
        }
        None => false,
    }
}

#[no_mangle]
pub extern "C" fn dcore_selected_image(ctx: *const DcoreContext, out_id: *mut ImageId) -> bool {
    let Some(engine) = context(ctx) else {
        return false;
    };
    let selected = engine.scene.lock().selected_image();
    match (selected, unsafe { out_id.as_mut() }) {
        (Some(id), Some(slot)) => {
            *slot = id;
            true
        }
        (selected, _) => selected.is_some(),
    }
}

/// Returns true if an image was removed.
#[no_mangle]
pub extern "C" fn dcore_delete_selected_image(ctx: *const DcoreContext) -> bool {
    context(ctx).is_some_and(|engine| engine.scene.lock().delete_selected_image().is_some())
}

#[no_mangle]
pub extern "C" fn dcore_move_image_relative(ctx: *const DcoreContext, id: ImageId, dx: f64, dy: f64) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().move_image_relative(id, dx, dy);
    status_of(result)
}

#[no_mangle]
pub extern "C" fn dcore_move_image_absolute(ctx: *const DcoreContext, id: ImageId, x: f64, y: f64) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().move_image_absolute(id, x, y);
    status_of(result)
}

#[no_mangle]
pub extern "C" fn dcore_update_image_size(
    ctx: *const DcoreContext,
    id: ImageId,
    width: f64,
    height: f64,
) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().update_image_size(id, width, height);
    status_of(result)
}

#[no_mangle]
pub extern "C" fn dcore_update_image_rotation(ctx: *const DcoreContext, id: ImageId, degrees: f64) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().update_image_rotation(id, degrees);
    status_of(result)
}

/// Resize and reposition in one call (corner-handle drags).
#[no_mangle]
pub extern "C" fn dcore_update_image_geometry(
    ctx: *const DcoreContext,
    id: ImageId,
    width: f64,
    height: f64,
    x: f64,
    y: f64,
) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().update_image_geometry(id, width, height, x, y);
    status_of(result)
}

#[no_mangle]
pub extern "C" fn dcore_get_image_size(ctx: *const DcoreContext, id: ImageId, out: *mut DcoreImageSize) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().get_image_size(id);
    match result {
        Ok(size) => write_out(out, size.into()),
        Err(e) => status_of::<()>(Err(e)),
    }
}

#[no_mangle]
pub extern "C" fn dcore_get_image_pos(ctx: *const DcoreContext, id: ImageId, out: *mut DcorePoint) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().get_image_pos(id);
    match result {
        Ok((x, y)) => write_out(out, DcorePoint { x, y }),
        Err(e) => status_of::<()>(Err(e)),
    }
}

#[no_mangle]
pub extern "C" fn dcore_get_image_rotation(ctx: *const DcoreContext, id: ImageId, out: *mut f64) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };
    let result = engine.scene.lock().get_image_rotation(id);
    match result {
        Ok(degrees) => write_out(out, degrees),
        Err(e) => status_of::<()>(Err(e)),
    }
}

#[no_mangle]
pub extern "C" fn dcore_image_count(ctx: *const DcoreContext) -> usize {
    context(ctx).map_or(0, |engine| engine.scene.lock().image_count())
}

/// Decode any new images, composite the scene and present it if a surface is
/// attached. Images that failed to decode are skipped; their count is written
/// to `out_failed` (may be null) and the first failure becomes the last error.
#[no_mangle]
pub extern "C" fn dcore_render(ctx: *const DcoreContext, clear: DcoreRgba, out_failed: *mut u32) -> DcoreStatus {
    let Some(engine) = context(ctx) else {
        return DcoreStatus::Err;
    };

    let mut output = engine.output.lock();
    let Output { gfx, canvas } = &mut *output;
    canvas.reset();

    let scale = gfx.as_ref().map_or(1.0, |gfx| gfx.scale() as f64);
    let result = {
        let mut surface = VelloSurface::new(canvas, Affine::scale(scale));
        pollster::block_on(engine.scene.render(&engine.decoder, &mut surface))
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            let status = match e {
                RenderError::Busy => DcoreStatus::Busy,
                RenderError::Surface(_) => DcoreStatus::Err,
            };
            set_err(e);
            return status;
        }
    };
    if let Some(slot) = unsafe { out_failed.as_mut() } {
        *slot = report.failures.len() as u32;
    }
    if let Some(first) = report.failures.first() {
        set_err(first);
    }

    if let Some(gfx) = gfx {
        let color = Color::new([clear.r, clear.g, clear.b, clear.a]);
        if let Err(e) = gfx.present(canvas, color) {
            tracing::error!(error = %e, "present failed");
            set_err(e);
            return DcoreStatus::Err;
        }
    }
    DcoreStatus::Ok
}
