//! Rendering backend for volscope.
//!
//! This crate provides the wgpu side of volume rendering:
//! - GPU context, render targets and frame capture
//! - Volume resources and the compute pass that fuses channels
//! - The ray-march and progressive path-trace renderers
//! - Shader modules with their fixed bind-group layouts

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// GPU code converts between u32 sizes and f32 uniforms constantly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::pub_underscore_fields)]

pub mod buffer;
pub mod camera;
pub mod context;
pub mod error;
pub mod fusion;
pub mod geometry;
pub mod mesh;
pub mod path_trace;
pub mod progressive;
pub mod pt_uniforms;
pub mod ray_march;
pub mod render_target;
pub mod scene;
pub mod screenshot;
pub mod shader;
pub mod texture;
pub mod volume;

pub use camera::{Camera, ProjectionMode, RayProjection};
pub use context::GpuContext;
pub use error::{RenderError, RenderResult};
pub use fusion::{FuseOutcome, FusedSlot, FusionPipeline};
pub use mesh::{box_mesh, cube_mesh, Mesh, MeshRenderer};
pub use path_trace::PathTraceRenderer;
pub use progressive::{DirtySet, FrameSync, ProgressiveState, UniformSlot};
pub use pt_uniforms::{
    exposure_from_slider, CameraUniforms, ChannelsUniforms, ExposureUniforms,
    GlobalParamsUniforms, LightDesc, LightUniforms, ProgressiveUniforms,
};
pub use ray_march::{RayMarchParams, RayMarchRenderer, RayMarchTransforms};
pub use render_target::{OffscreenTarget, RenderTarget, SurfaceTarget, OFFSCREEN_FORMAT};
pub use scene::{Scene, SceneObject, SceneObjectKind, SceneVolume};
pub use screenshot::{encode_png, save_image, ScreenshotError};
pub use shader::{Shader, ShaderKind};
pub use volume::{Volume, VolumeData};
