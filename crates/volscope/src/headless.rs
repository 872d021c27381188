//! Rendering a scene to an image buffer or file without a window.
//!
//! Useful for integration tests, batch processing and automated snapshots.

use std::path::Path;

use volscope_core::{RendererKind, ViewerOptions};
use volscope_render::{
    Camera, MeshRenderer, RenderError, RenderResult, Scene, OFFSCREEN_FORMAT,
};

use crate::graphics::Graphics;

/// Frames the path tracer accumulates before a headless capture.
pub const HEADLESS_PATH_TRACE_FRAMES: u32 = 32;

/// Renders one image of `scene` and returns it as tightly packed RGBA rows,
/// top row first.
///
/// The image is `options.width` x `options.height` and drawn with
/// `options.renderer`. `camera` is cloned and given the image aspect ratio.
/// The ray marcher draws every volume followed by the scene's meshes. The
/// path tracer draws only the first volume and accumulates
/// [`HEADLESS_PATH_TRACE_FRAMES`] frames.
pub fn render_to_image(
    graphics: &Graphics,
    scene: &mut Scene,
    camera: &Camera,
    options: &ViewerOptions,
) -> RenderResult<Vec<u8>> {
    let ctx = graphics.context();
    let (width, height) = (options.width.max(1), options.height.max(1));
    let target = graphics.create_offscreen_target(width, height);
    let mut camera = camera.clone();
    camera.set_aspect_ratio(width as f32 / height as f32);

    match options.renderer {
        RendererKind::RayMarch => {
            let mut renderer = graphics.create_ray_march_renderer(OFFSCREEN_FORMAT)?;
            renderer.set_clear_color(options.background_color);
            renderer.render(ctx, &target, &camera, scene, &options.volume)?;
            let mut meshes = pollster::block_on(MeshRenderer::new(ctx, OFFSCREEN_FORMAT))?;
            meshes.render(ctx, &target, &camera, scene)?;
        }
        RendererKind::PathTrace => {
            let object = scene.first_volume().ok_or(RenderError::NoVolume)?;
            let mut renderer = graphics.create_path_trace_renderer(OFFSCREEN_FORMAT, width, height)?;
            renderer.set_settings(&options.path_trace);
            renderer.set_volume(ctx, object)?;
            for _ in 0..HEADLESS_PATH_TRACE_FRAMES {
                renderer.render(ctx, &target, &camera, scene)?;
            }
            log::debug!("path traced {} samples", renderer.sample_counter() + 1);
        }
    }

    pollster::block_on(target.get_pixels(ctx))
}

/// Renders one image of `scene` and saves it as PNG or JPEG, chosen by the
/// file extension.
pub fn render_to_file(
    path: impl AsRef<Path>,
    graphics: &Graphics,
    scene: &mut Scene,
    camera: &Camera,
    options: &ViewerOptions,
) -> RenderResult<()> {
    let data = render_to_image(graphics, scene, camera, options)?;
    volscope_render::save_image(path, &data, options.width.max(1), options.height.max(1))?;
    Ok(())
}
