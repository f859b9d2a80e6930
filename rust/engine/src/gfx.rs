// Graphics module - presents the composited vello scene through wgpu

use peniko::Color;
use raw_window_handle::{AppKitDisplayHandle, AppKitWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::c_void;
use std::ptr::NonNull;
use vello::{AaConfig, AaSupport, RenderParams, Renderer, RendererOptions, Scene};

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("wgpu error: {0}")]
    Wgpu(String),
    #[error("invalid surface")]
    InvalidSurface,
    #[error("vello error: {0}")]
    Vello(String),
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct MacSurface {
    pub ns_view: *mut c_void,        // NSView*
    pub ca_metal_layer: *mut c_void, // CAMetalLayer*
    pub scale_factor: f32,
    pub width_px: i32,
    pub height_px: i32,
}

impl MacSurface {
    fn size(&self) -> (u32, u32) {
        (self.width_px.max(1) as u32, self.height_px.max(1) as u32)
    }
}

/// Vello renders into an Rgba8Unorm storage texture; the swapchain is Bgra8,
/// so every frame ends with a blit.
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

pub struct Gfx {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    renderer: Renderer,
    blitter: wgpu::util::TextureBlitter,
    target: wgpu::TextureView,
    scale: f32,
}

impl Gfx {
    pub async fn new_macos(desc: &MacSurface) -> Result<Self, GfxError> {
        // SAFETY: the host guarantees a live NSView*; raw-window-handle only
        // needs the view pointer.
        let ns_view = NonNull::new(desc.ns_view).ok_or(GfxError::InvalidSurface)?;
        let win = RawWindowHandle::AppKit(AppKitWindowHandle::new(ns_view));
        let disp = RawDisplayHandle::AppKit(AppKitDisplayHandle::new());

        let instance = wgpu::Instance::default();
        let surface = unsafe {
            instance
                .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle: disp,
                    raw_window_handle: win,
                })
                .map_err(|e| GfxError::Wgpu(format!("{e:?}")))?
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GfxError::Wgpu(format!("{e:?}")))?;

        // vello needs more storage buffers than the default limit
        let mut limits = wgpu::Limits::default();
        limits.max_storage_buffers_per_shader_stage = 8;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("dingboard device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| GfxError::Wgpu(format!("{e:?}")))?;

        let (w, h) = desc.size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: SURFACE_FORMAT,
            width: w,
            height: h,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let renderer = Renderer::new(
            &device,
            RendererOptions {
                use_cpu: false,
                antialiasing_support: AaSupport {
                    area: true,
                    msaa8: false,
                    msaa16: false,
                },
                num_init_threads: None,
                pipeline_cache: None,
            },
        )
        .map_err(|e| GfxError::Vello(format!("{e:?}")))?;

        let blitter = wgpu::util::TextureBlitter::new(&device, SURFACE_FORMAT);
        let target = create_target(&device, w, h);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            renderer,
            blitter,
            target,
            scale: desc.scale_factor,
        })
    }

    pub fn resize(&mut self, desc: &MacSurface) {
        let (w, h) = desc.size();
        self.scale = desc.scale_factor;
        if (w, h) == (self.config.width, self.config.height) {
            return;
        }
        self.config.width = w;
        self.config.height = h;
        self.surface.configure(&self.device, &self.config);
        self.target = create_target(&self.device, w, h);
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn present(&mut self, scene: &Scene, clear: Color) -> Result<(), GfxError> {
        let params = RenderParams {
            base_color: clear,
            width: self.config.width,
            height: self.config.height,
            antialiasing_method: AaConfig::Area,
        };
        self.renderer
            .render_to_texture(&self.device, &self.queue, scene, &self.target, &params)
            .map_err(|e| GfxError::Vello(format!("{e:?}")))?;

        let frame = self
            .surface
            .get_current_texture()
            .map_err(|e| GfxError::Wgpu(format!("get_current_texture: {e:?}")))?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present blit"),
            });
        self.blitter
            .copy(&self.device, &mut encoder, &self.target, &frame_view);
        self.queue.submit(Some(encoder.finish()));
        frame.present();

        Ok(())
    }
}

fn create_target(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("composite target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
