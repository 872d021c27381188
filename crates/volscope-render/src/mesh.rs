//! Flat-colored triangle meshes drawn alongside volumes.

use std::collections::HashMap;

use volscope_core::{ObjectId, VolscopeError};

use crate::buffer::{create_index_buffer, create_uniform_buffer, create_vertex_buffer, update_buffer};
use crate::camera::Camera;
use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::geometry::{cube_positions, CUBE_INDICES};
use crate::render_target::RenderTarget;
use crate::scene::{Scene, SceneObjectKind};
use crate::shader::{create_mesh_bind_group, primitive_state, Shader, ShaderKind};
use crate::texture::DEPTH_FORMAT;

/// Uniforms of the mesh shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshTransforms {
    pub model_view_projection: [[f32; 4]; 4],
}

/// GPU buffers of one triangle mesh.
pub struct Mesh {
    position_buffer: wgpu::Buffer,
    color_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    vertex_count: usize,
}

impl Mesh {
    /// Uploads positions, per-vertex colors and triangle indices.
    pub fn new(
        device: &wgpu::Device,
        positions: &[[f32; 3]],
        colors: &[[f32; 4]],
        indices: &[u16],
    ) -> RenderResult<Self> {
        if colors.len() != positions.len() {
            return Err(VolscopeError::SizeMismatch {
                expected: positions.len(),
                actual: colors.len(),
            }
            .into());
        }
        if let Some(&bad) = indices.iter().find(|&&i| usize::from(i) >= positions.len()) {
            return Err(VolscopeError::SizeMismatch {
                expected: positions.len(),
                actual: usize::from(bad) + 1,
            }
            .into());
        }

        let index_count = indices.len() as u32;
        Ok(Self {
            position_buffer: create_vertex_buffer(device, positions, Some("Mesh Positions")),
            color_buffer: create_vertex_buffer(device, colors, Some("Mesh Colors")),
            index_buffer: create_index_buffer(device, indices, Some("Mesh Indices")),
            index_count,
            vertex_count: positions.len(),
        })
    }

    /// A single-colored mesh.
    pub fn with_color(
        device: &wgpu::Device,
        positions: &[[f32; 3]],
        color: [f32; 4],
        indices: &[u16],
    ) -> RenderResult<Self> {
        Self::new(device, positions, &vec![color; positions.len()], indices)
    }

    #[must_use]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }
}

struct MeshObjectData {
    transforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Draws the mesh objects of a scene.
pub struct MeshRenderer {
    shader: Shader,
    pipeline: wgpu::RenderPipeline,
    cache: HashMap<ObjectId, MeshObjectData>,
}

impl MeshRenderer {
    pub async fn new(ctx: &GpuContext, color_format: wgpu::TextureFormat) -> RenderResult<Self> {
        let shader = Shader::load(&ctx.device, ShaderKind::Mesh).await?;
        let targets = [Some(wgpu::ColorTargetState {
            format: color_format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let pipeline = ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Mesh Pipeline"),
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
        Ok(Self {
            shader,
            pipeline,
            cache: HashMap::new(),
        })
    }

    /// Draws every mesh object of `scene` into `target`, loading the existing
    /// color and depth so meshes composite over an earlier volume pass.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        target: &dyn RenderTarget,
        camera: &Camera,
        scene: &Scene,
    ) -> RenderResult<()> {
        ctx.check_device()?;
        let view_projection = camera.view_projection_matrix();

        let mut drawn = Vec::new();
        for object in scene.objects() {
            let SceneObjectKind::Mesh(mesh) = &object.kind else {
                continue;
            };
            let uniforms = MeshTransforms {
                model_view_projection: (view_projection * object.transform).to_cols_array_2d(),
            };
            let data = self.cache.entry(object.id).or_insert_with(|| {
                let transforms = create_uniform_buffer(&ctx.device, &uniforms, Some("Mesh Transforms"));
                let bind_group = create_mesh_bind_group(&ctx.device, &self.shader, &transforms);
                MeshObjectData {
                    transforms,
                    bind_group,
                }
            });
            update_buffer(&ctx.queue, &data.transforms, &[uniforms]);
            drawn.push((object.id, mesh));
        }
        if drawn.is_empty() {
            return Ok(());
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mesh Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mesh Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color_view()?,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: target.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            for (id, mesh) in &drawn {
                let Some(data) = self.cache.get(id) else {
                    continue;
                };
                pass.set_bind_group(0, &data.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.position_buffer.slice(..));
                pass.set_vertex_buffer(1, mesh.color_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Drops the cached resources of one object.
    pub fn forget(&mut self, id: ObjectId) {
        self.cache.remove(&id);
    }

    #[must_use]
    pub fn cached_objects(&self) -> usize {
        self.cache.len()
    }
}

/// A unit cube mesh centered at the origin, for bounding boxes and tests.
pub fn cube_mesh(device: &wgpu::Device, color: [f32; 4]) -> RenderResult<Mesh> {
    box_mesh(device, [1.0; 3], [0.0; 3], color)
}

/// An axis-aligned box of size `dimensions` centered at `center`.
pub fn box_mesh(
    device: &wgpu::Device,
    dimensions: [f32; 3],
    center: [f32; 3],
    color: [f32; 4],
) -> RenderResult<Mesh> {
    Mesh::with_color(
        device,
        &cube_positions(dimensions, center),
        color,
        &CUBE_INDICES,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transforms_size() {
        assert_eq!(std::mem::size_of::<MeshTransforms>(), 64);
    }
}
