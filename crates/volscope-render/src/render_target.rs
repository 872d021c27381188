//! Surfaces the renderers draw into.

use std::sync::mpsc;

use crate::context::GpuContext;
use crate::error::{RenderError, RenderResult};
use crate::texture::{aligned_bytes_per_row, create_color_texture, create_depth_texture};

/// Color and depth attachments of a frame.
pub trait RenderTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// View of the current color image.
    fn color_view(&self) -> RenderResult<&wgpu::TextureView>;
    fn depth_view(&self) -> &wgpu::TextureView;
    fn color_format(&self) -> wgpu::TextureFormat;
}

/// Format of offscreen color images.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A render target backed by textures, readable from the host.
pub struct OffscreenTarget {
    width: u32,
    height: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl OffscreenTarget {
    #[must_use]
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let color = create_color_texture(device, width, height, OFFSCREEN_FORMAT);
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = create_depth_texture(device, width, height);
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            width,
            height,
            color,
            color_view,
            depth_view,
        }
    }

    /// Reallocates both attachments when the size changes.
    pub fn set_size(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if (width.max(1), height.max(1)) != (self.width, self.height) {
            *self = Self::new(device, width, height);
        }
    }

    /// Nothing to present offscreen.
    pub fn swap(&mut self) {}

    #[must_use]
    pub fn color_texture(&self) -> &wgpu::Texture {
        &self.color
    }

    /// Copies the color image back to the host as tightly packed RGBA rows.
    ///
    /// Waits for all submitted GPU work; do not call this every frame.
    pub async fn get_pixels(&self, ctx: &GpuContext) -> RenderResult<Vec<u8>> {
        ctx.check_device()?;
        let bytes_per_row = aligned_bytes_per_row(self.width, 4);
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Offscreen Readback Buffer"),
            size: u64::from(bytes_per_row) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback copy encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.wait_idle()?;
        rx.recv()
            .map_err(|_| RenderError::BufferMapFailed)?
            .map_err(|_| RenderError::BufferMapFailed)?;

        let data = slice.get_mapped_range();
        let row_bytes = (self.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        for row in data.chunks_exact(bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }
}

impl RenderTarget for OffscreenTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn color_view(&self) -> RenderResult<&wgpu::TextureView> {
        Ok(&self.color_view)
    }

    fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    fn color_format(&self) -> wgpu::TextureFormat {
        OFFSCREEN_FORMAT
    }
}

/// A render target presenting to a window surface.
pub struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
}

impl SurfaceTarget {
    /// Configures `surface` at `width` x `height`, preferring an sRGB format.
    pub fn new(ctx: &GpuContext, surface: wgpu::Surface<'static>, width: u32, height: u32) -> RenderResult<Self> {
        let caps = surface.get_capabilities(&ctx.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| caps.formats.first().copied())
            .ok_or(RenderError::SurfaceConfigurationFailed)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&ctx.device, &config);
        let depth_view = create_depth_texture(&ctx.device, config.width, config.height)
            .create_view(&wgpu::TextureViewDescriptor::default());
        log::info!("configured surface {}x{} as {format:?}", config.width, config.height);

        Ok(Self {
            surface,
            config,
            depth_view,
            frame: None,
        })
    }

    /// Reconfigures the surface and depth buffer for a new window size.
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.frame = None;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&ctx.device, &self.config);
        self.depth_view = create_depth_texture(&ctx.device, width, height)
            .create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("resized surface to {width}x{height}");
    }

    /// Acquires the next presentable image.
    ///
    /// A lost or outdated surface is reconfigured and acquisition retried once.
    pub fn swap(&mut self, ctx: &GpuContext) -> RenderResult<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&ctx.device, &self.config);
                self.surface.get_current_texture()?
            }
            Err(e) => return Err(e.into()),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some((frame, view));
        Ok(())
    }

    /// Presents the acquired image, if any.
    pub fn present(&mut self) {
        if let Some((frame, _)) = self.frame.take() {
            frame.present();
        }
    }
}

impl RenderTarget for SurfaceTarget {
    fn width(&self) -> u32 {
        self.config.width
    }

    fn height(&self) -> u32 {
        self.config.height
    }

    fn color_view(&self) -> RenderResult<&wgpu::TextureView> {
        self.frame
            .as_ref()
            .map(|(_, view)| view)
            .ok_or(RenderError::NoFrame)
    }

    fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    fn color_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}
