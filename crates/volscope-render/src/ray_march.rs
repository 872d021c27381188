//! Single-pass ray marching through a cube proxy.
//!
//! Every enabled volume object gets one indexed draw of its 36-index cube. The
//! fragment shader marches from the proxy surface through the clip box, so no
//! frame history is kept: each render is a fresh single-sample image.

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use volscope_core::{ObjectId, VolumeRenderSettings};

use crate::buffer::{create_staging_buffer, create_uniform_buffer};
use crate::camera::{Camera, RayProjection};
use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::fusion::{FusedSlot, FusionPipeline};
use crate::render_target::RenderTarget;
use crate::scene::Scene;
use crate::shader::{create_ray_march_bind_group, primitive_state, Shader, ShaderKind};
use crate::texture::{create_linear_sampler, DEPTH_FORMAT};
use crate::volume::Volume;

/// Vertex-stage matrices.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RayMarchTransforms {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

/// Fragment-stage parameters. Layout must match WGSL `Params` exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RayMarchParams {
    pub inverse_model_view: [[f32; 4]; 4],
    pub clip_min: [f32; 3],
    pub brightness: f32,
    pub clip_max: [f32; 3],
    pub density: f32,
    pub volume_scale: [f32; 3],
    pub mask_alpha: f32,
    pub resolution: [f32; 2],
    /// Always `[1, 1]`: atlas tiling is not used.
    pub atlas_tiles: [f32; 2],
    pub gamma_min: f32,
    pub gamma_max: f32,
    pub gamma_scale: f32,
    /// 1.0 for perspective rays, 0.0 for orthographic.
    pub is_perspective: f32,
    pub ortho_scale: f32,
    pub ortho_thickness: f32,
    pub max_steps: u32,
    pub slices: u32,
    pub max_project: u32,
    pub _pad: [u32; 3],
}

impl RayMarchParams {
    /// Parameters for one object, taken as given from `settings`.
    #[must_use]
    pub fn new(
        settings: &VolumeRenderSettings,
        model_view: Mat4,
        projection: RayProjection,
        volume: &Volume,
        resolution: [f32; 2],
    ) -> Self {
        let (is_perspective, ortho_scale) = match projection {
            RayProjection::Perspective { .. } => (1.0, 1.0),
            RayProjection::Orthographic { scale } => (0.0, scale),
        };
        let physical = volume.physical_dims();

        Self {
            inverse_model_view: model_view.inverse().to_cols_array_2d(),
            clip_min: settings.clip_min.to_array(),
            brightness: settings.brightness,
            clip_max: settings.clip_max.to_array(),
            density: settings.density,
            volume_scale: (physical / physical.max_element()).to_array(),
            mask_alpha: settings.mask_alpha,
            resolution,
            atlas_tiles: [1.0, 1.0],
            gamma_min: settings.gamma_min,
            gamma_max: settings.gamma_max,
            gamma_scale: settings.gamma_scale,
            is_perspective,
            ortho_scale,
            ortho_thickness: settings.ortho_thickness,
            max_steps: settings.max_steps,
            slices: volume.pixel_dims()[2],
            max_project: u32::from(settings.max_project),
            _pad: [0; 3],
        }
    }
}

struct RayMarchObjectData {
    transforms: wgpu::Buffer,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Fused ping-pong texture the bind group samples.
    source: FusedSlot,
}

/// Objects drawn in one render call.
struct DrawItem {
    id: ObjectId,
    transforms: RayMarchTransforms,
    params: RayMarchParams,
}

/// Ray-march volume renderer.
pub struct RayMarchRenderer {
    shader: Shader,
    pipeline: wgpu::RenderPipeline,
    fusion: FusionPipeline,
    sampler: wgpu::Sampler,
    cache: HashMap<ObjectId, RayMarchObjectData>,
    clear_color: wgpu::Color,
}

/// Blends with straight alpha on both color and alpha.
const VOLUME_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

impl RayMarchRenderer {
    /// Compiles the shaders and builds the pipelines for `color_format` targets.
    pub async fn new(ctx: &GpuContext, color_format: wgpu::TextureFormat) -> RenderResult<Self> {
        let device = &ctx.device;
        let shader = Shader::load(device, ShaderKind::RayMarchVolume).await?;
        let targets = [Some(wgpu::ColorTargetState {
            format: color_format,
            blend: Some(VOLUME_BLEND),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Ray March Pipeline"),
            layout: Some(shader.pipeline_layout()),
            vertex: shader.vertex_state(),
            fragment: Some(shader.fragment_state(&targets)),
            primitive: primitive_state(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        let fusion = FusionPipeline::new(device).await?;
        log::info!("ray march renderer ready ({color_format:?})");

        Ok(Self {
            shader,
            pipeline,
            fusion,
            sampler: create_linear_sampler(device),
            cache: HashMap::new(),
            clear_color: wgpu::Color::BLACK,
        })
    }

    /// Color the target is cleared to before drawing.
    pub fn set_clear_color(&mut self, color: Vec3) {
        self.clear_color = wgpu::Color {
            r: f64::from(color.x),
            g: f64::from(color.y),
            b: f64::from(color.z),
            a: 1.0,
        };
    }

    #[must_use]
    pub fn fusion(&self) -> &FusionPipeline {
        &self.fusion
    }

    /// Renders every enabled volume of `scene` into `target`.
    ///
    /// Channel view states are pushed into the LUTs, then every volume is
    /// fused in the same command encoder, single-channel ones included. A
    /// camera the ray setup cannot use is logged and treated as perspective.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        target: &dyn RenderTarget,
        camera: &Camera,
        scene: &mut Scene,
        settings: &VolumeRenderSettings,
    ) -> RenderResult<()> {
        ctx.check_device()?;
        let device = &ctx.device;
        let width = target.width();
        let height = target.height();
        let resolution = [width as f32, height as f32];
        let projection = camera.ray_projection_or_default();
        let view = camera.view_matrix();
        let projection_matrix = camera.projection_matrix();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Ray March Encoder"),
        });

        let mut items = Vec::new();
        for object in scene.volumes_mut() {
            let id = object.id;
            let transform = object.transform;
            let Some(scene_volume) = object.as_volume_mut() else {
                continue;
            };
            if !scene_volume.enabled || scene_volume.volume.channel_count() == 0 {
                continue;
            }
            scene_volume.apply_channel_states(ctx)?;
            let outcome = self.fusion.fuse(
                device,
                &mut encoder,
                &mut scene_volume.volume,
                &scene_volume.channel_states,
            );
            let source = outcome.slot;
            let volume = &scene_volume.volume;
            let model_view = view * transform * volume.normalized_transform();
            let item = DrawItem {
                id,
                transforms: RayMarchTransforms {
                    model_view: model_view.to_cols_array_2d(),
                    projection: projection_matrix.to_cols_array_2d(),
                },
                params: RayMarchParams::new(settings, model_view, projection, volume, resolution),
            };
            self.ensure_object_data(device, id, volume, source, &item);
            self.stage_uniforms(device, &mut encoder, &item);
            items.push(item);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Ray March Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color_view()?,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: target.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, resolution[0], resolution[1], 0.0, 1.0);
            pass.set_scissor_rect(0, 0, width, height);
            pass.set_pipeline(&self.pipeline);

            for item in &items {
                let (Some(data), Some(volume)) = (
                    self.cache.get(&item.id),
                    scene.get(item.id).and_then(|o| o.as_volume()).map(|v| &v.volume),
                ) else {
                    continue;
                };
                pass.set_bind_group(0, &data.bind_group, &[]);
                pass.set_vertex_buffer(0, volume.position_buffer().slice(..));
                pass.set_index_buffer(volume.index_buffer().slice(..), volume.index_format());
                pass.draw_indexed(0..volume.index_count(), 0, 0..1);
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("ray marched {} volume(s) at {width}x{height}", items.len());
        Ok(())
    }

    fn ensure_object_data(
        &mut self,
        device: &wgpu::Device,
        id: ObjectId,
        volume: &Volume,
        source: FusedSlot,
        item: &DrawItem,
    ) {
        let view = volume.fused_view(source);

        if let Some(data) = self.cache.get_mut(&id) {
            if data.source != source {
                data.bind_group = create_ray_march_bind_group(
                    device,
                    &self.shader,
                    &data.transforms,
                    &self.sampler,
                    view,
                    &data.params,
                );
                data.source = source;
                log::debug!("object {id} now samples {source:?}");
            }
            return;
        }

        let transforms = create_uniform_buffer(device, &item.transforms, Some("Ray March Transforms"));
        let params = create_uniform_buffer(device, &item.params, Some("Ray March Params"));
        let bind_group =
            create_ray_march_bind_group(device, &self.shader, &transforms, &self.sampler, view, &params);
        self.cache.insert(
            id,
            RayMarchObjectData {
                transforms,
                params,
                bind_group,
                source,
            },
        );
    }

    /// Copies this frame's uniforms through staging buffers inside `encoder`.
    fn stage_uniforms(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, item: &DrawItem) {
        let Some(data) = self.cache.get(&item.id) else {
            return;
        };
        let transforms = create_staging_buffer(device, &[item.transforms], Some("Ray March Transforms Upload"));
        let params = create_staging_buffer(device, &[item.params], Some("Ray March Params Upload"));
        encoder.copy_buffer_to_buffer(&transforms, 0, &data.transforms, 0, TRANSFORMS_SIZE);
        encoder.copy_buffer_to_buffer(&params, 0, &data.params, 0, PARAMS_SIZE);
    }

    /// Drops the cached resources of one object.
    pub fn forget(&mut self, id: ObjectId) {
        self.cache.remove(&id);
    }

    /// Drops every cached resource, e.g. after volumes were replaced wholesale.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cached_objects(&self) -> usize {
        self.cache.len()
    }

    /// Fused slot currently bound for `id`.
    #[must_use]
    pub fn bound_source(&self, id: ObjectId) -> Option<FusedSlot> {
        self.cache.get(&id).map(|d| d.source)
    }
}

const TRANSFORMS_SIZE: u64 = std::mem::size_of::<RayMarchTransforms>() as u64;
const PARAMS_SIZE: u64 = std::mem::size_of::<RayMarchParams>() as u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_match_wgsl() {
        assert_eq!(TRANSFORMS_SIZE, 128);
        assert_eq!(PARAMS_SIZE, 176);
    }

    #[test]
    fn test_params_layout_offsets() {
        let mut p: RayMarchParams = bytemuck::Zeroable::zeroed();
        p.brightness = 1.0;
        p.density = 2.0;
        p.mask_alpha = 3.0;
        p.gamma_min = 4.0;
        p.ortho_thickness = 5.0;
        p.max_project = 6;
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&p));
        assert_eq!(floats[19], 1.0);
        assert_eq!(floats[23], 2.0);
        assert_eq!(floats[27], 3.0);
        assert_eq!(floats[32], 4.0);
        assert_eq!(floats[37], 5.0);
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&p));
        assert_eq!(words[40], 6);
    }

    #[test]
    fn test_blend_is_straight_alpha() {
        assert_eq!(VOLUME_BLEND.color, VOLUME_BLEND.alpha);
        assert_eq!(VOLUME_BLEND.color.src_factor, wgpu::BlendFactor::SrcAlpha);
    }
}
