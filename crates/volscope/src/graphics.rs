//! Device acquisition and resource factories.

use std::sync::Arc;

use pollster::FutureExt;
use volscope_core::PowerPreference;
use volscope_render::{
    GpuContext, Mesh, OffscreenTarget, PathTraceRenderer, RayMarchRenderer, RenderResult,
    SurfaceTarget, Volume,
};
use winit::window::Window;

/// Entry point owning the GPU context.
///
/// Every renderer, target and volume made through a `Graphics` shares its
/// device, so they are only valid together.
pub struct Graphics {
    ctx: GpuContext,
}

impl Graphics {
    /// Acquires a device able to present to `window` and configures its surface.
    pub async fn init(
        window: Arc<Window>,
        power: PowerPreference,
    ) -> RenderResult<(Self, SurfaceTarget)> {
        let size = window.inner_size();
        let (ctx, surface) = GpuContext::new_windowed(window, power).await?;
        let target = SurfaceTarget::new(&ctx, surface, size.width, size.height)?;
        log::info!("graphics initialized for a {}x{} window", size.width, size.height);
        Ok((Self { ctx }, target))
    }

    /// Blocking variant of [`Graphics::init`].
    pub fn init_blocking(
        window: Arc<Window>,
        power: PowerPreference,
    ) -> RenderResult<(Self, SurfaceTarget)> {
        Self::init(window, power).block_on()
    }

    /// Acquires a device without any presentation surface.
    pub async fn init_headless(power: PowerPreference) -> RenderResult<Self> {
        let ctx = GpuContext::new_headless(power).await?;
        log::info!("graphics initialized headless");
        Ok(Self { ctx })
    }

    /// Blocking variant of [`Graphics::init_headless`].
    pub fn init_headless_blocking(power: PowerPreference) -> RenderResult<Self> {
        Self::init_headless(power).block_on()
    }

    #[must_use]
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn create_ray_march_renderer(
        &self,
        color_format: wgpu::TextureFormat,
    ) -> RenderResult<RayMarchRenderer> {
        RayMarchRenderer::new(&self.ctx, color_format).block_on()
    }

    pub fn create_path_trace_renderer(
        &self,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> RenderResult<PathTraceRenderer> {
        PathTraceRenderer::new(&self.ctx, output_format, (width, height)).block_on()
    }

    #[must_use]
    pub fn create_offscreen_target(&self, width: u32, height: u32) -> OffscreenTarget {
        OffscreenTarget::new(&self.ctx.device, width, height)
    }

    /// Creates a single-channel volume.
    ///
    /// `pixel_dims` and `physical_dims` are in x, y, z order; `data` is laid
    /// out x fastest, then y, then z.
    pub fn create_volume(
        &self,
        data: &[u8],
        pixel_dims: [u32; 3],
        physical_dims: [f32; 3],
    ) -> RenderResult<Volume> {
        let mut volume = Volume::new(&self.ctx, physical_dims, pixel_dims)?;
        let [x, y, z] = pixel_dims.map(|d| d as usize);
        volume.add_channel(&self.ctx, data, [z, y, x])?;
        Ok(volume)
    }

    /// Creates an empty volume to which channels are added one at a time.
    pub fn create_empty_volume(
        &self,
        pixel_dims: [u32; 3],
        physical_dims: [f32; 3],
    ) -> RenderResult<Volume> {
        Volume::new(&self.ctx, physical_dims, pixel_dims)
    }

    pub fn create_mesh(
        &self,
        positions: &[[f32; 3]],
        colors: &[[f32; 4]],
        indices: &[u16],
    ) -> RenderResult<Mesh> {
        Mesh::new(&self.ctx.device, positions, colors, indices)
    }
}
