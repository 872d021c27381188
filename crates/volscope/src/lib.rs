//! volscope: interactive GPU volume rendering for multi-channel 3D datasets.
//!
//! Volumes hold up to any number of 8-bit channels. Each channel is mapped
//! through its own lookup table, the enabled channels are fused on the GPU, and
//! the result is drawn either by a single-pass ray marcher or by a progressive
//! path tracer.
//!
//! # Quick Start
//!
//! ```no_run
//! use volscope::*;
//!
//! fn main() -> RenderResult<()> {
//!     init_logging();
//!     let graphics = Graphics::init_headless_blocking(PowerPreference::default())?;
//!
//!     let data = vec![128u8; 32 * 32 * 32];
//!     let volume = graphics.create_volume(&data, [32, 32, 32], [1.0, 1.0, 1.0])?;
//!     let mut scene = Scene::new();
//!     scene.add_volume(volume, Mat4::IDENTITY);
//!
//!     let options = ViewerOptions::default().with_size(256, 256);
//!     render_to_file("volume.png", &graphics, &mut scene, &Camera::new(1.0), &options)?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

mod graphics;
mod headless;

pub use graphics::Graphics;
pub use headless::{render_to_file, render_to_image, HEADLESS_PATH_TRACE_FRAMES};

// Re-export core types
pub use volscope_core::{
    color_by_index, enabled_channels, ChannelState, ControlPoint, Histogram, Lut, Mat4,
    ObjectId, PathTraceSettings, PowerPreference, RendererKind, Vec2, Vec3, Vec4,
    ViewerOptions, VolscopeError, VolumeRenderSettings, MAX_FUSED_CHANNELS,
};

// Re-export render types
pub use volscope_render::{
    box_mesh, cube_mesh, save_image, Camera, FuseOutcome, FusedSlot, FusionPipeline,
    GpuContext, LightDesc, Mesh, MeshRenderer, OffscreenTarget, PathTraceRenderer,
    ProjectionMode, RayMarchRenderer, RenderError, RenderResult, RenderTarget, Scene,
    SceneObject, SceneObjectKind, SceneVolume, SurfaceTarget, UniformSlot, Volume,
    OFFSCREEN_FORMAT,
};

/// Initializes `env_logger` from `RUST_LOG`. Calling it again is harmless.
pub fn init_logging() {
    if env_logger::try_init().is_ok() {
        log::debug!("logging initialized");
    }
}
