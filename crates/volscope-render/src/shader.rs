//! Shader modules, bind-group layouts and pipeline layouts.
//!
//! Every shader is described by a [`ShaderKind`]; loading one yields a [`Shader`]
//! holding the compiled module and the layouts that match the binding indices
//! hard-coded in its WGSL. Bind groups are built by the free functions at the
//! bottom of this module, one per kind and group.

use crate::error::{RenderError, RenderResult};

/// The shader programs used by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Position + color triangle meshes.
    Mesh,
    /// Ray marching through a cube proxy.
    RayMarchVolume,
    /// Progressive path tracing over a fullscreen quad.
    PathTraceVolume,
    /// HDR to display mapping over a fullscreen quad.
    Tonemap,
    /// Accumulates one channel into the fused volume.
    Fuse,
    /// Clears both fused volumes.
    ClearFuse,
}

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x4];

const POSITION_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 12,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &POSITION_ATTRIBUTES,
};

const COLOR_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 16,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &COLOR_ATTRIBUTES,
};

const POSITION_ONLY: [wgpu::VertexBufferLayout<'static>; 1] = [POSITION_LAYOUT];
const POSITION_COLOR: [wgpu::VertexBufferLayout<'static>; 2] = [POSITION_LAYOUT, COLOR_LAYOUT];

impl ShaderKind {
    /// Every kind.
    pub const ALL: [ShaderKind; 6] = [
        ShaderKind::Mesh,
        ShaderKind::RayMarchVolume,
        ShaderKind::PathTraceVolume,
        ShaderKind::Tonemap,
        ShaderKind::Fuse,
        ShaderKind::ClearFuse,
    ];

    /// WGSL source.
    #[must_use]
    pub fn source(self) -> &'static str {
        match self {
            Self::Mesh => include_str!("shaders/mesh.wgsl"),
            Self::RayMarchVolume => include_str!("shaders/raymarch.wgsl"),
            Self::PathTraceVolume => include_str!("shaders/ptvolume.wgsl"),
            Self::Tonemap => include_str!("shaders/tonemap.wgsl"),
            Self::Fuse => include_str!("shaders/fuse.wgsl"),
            Self::ClearFuse => include_str!("shaders/clearfuse.wgsl"),
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Mesh => "Mesh Shader",
            Self::RayMarchVolume => "Ray March Volume Shader",
            Self::PathTraceVolume => "Path Trace Volume Shader",
            Self::Tonemap => "Tonemap Shader",
            Self::Fuse => "Fuse Shader",
            Self::ClearFuse => "Clear Fuse Shader",
        }
    }

    #[must_use]
    pub fn is_compute(self) -> bool {
        matches!(self, Self::Fuse | Self::ClearFuse)
    }

    #[must_use]
    pub fn vertex_entry(self) -> Option<&'static str> {
        (!self.is_compute()).then_some("vs_main")
    }

    #[must_use]
    pub fn fragment_entry(self) -> Option<&'static str> {
        (!self.is_compute()).then_some("fs_main")
    }

    #[must_use]
    pub fn compute_entry(self) -> Option<&'static str> {
        self.is_compute().then_some("main")
    }

    /// Vertex buffers: position + color for meshes, position only for the
    /// volume proxies and fullscreen quads, none for compute shaders.
    #[must_use]
    pub fn vertex_buffer_layouts(self) -> &'static [wgpu::VertexBufferLayout<'static>] {
        match self {
            Self::Mesh => &POSITION_COLOR,
            Self::RayMarchVolume | Self::PathTraceVolume | Self::Tonemap => &POSITION_ONLY,
            Self::Fuse | Self::ClearFuse => &[],
        }
    }

    fn bind_group_layout_entries(self) -> Vec<Vec<wgpu::BindGroupLayoutEntry>> {
        use wgpu::ShaderStages as S;
        use wgpu::TextureViewDimension as D;
        match self {
            Self::Mesh => vec![vec![uniform_entry(0, S::VERTEX)]],
            Self::RayMarchVolume => vec![vec![
                uniform_entry(0, S::VERTEX_FRAGMENT),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
                texture_entry(2, S::FRAGMENT, D::D3, true),
                uniform_entry(3, S::FRAGMENT),
            ]],
            Self::PathTraceVolume => vec![vec![
                uniform_entry(0, S::FRAGMENT),
                uniform_entry(1, S::FRAGMENT),
                uniform_entry(2, S::FRAGMENT),
                uniform_entry(3, S::FRAGMENT),
                uniform_entry(4, S::FRAGMENT),
                sampler_entry(5, wgpu::SamplerBindingType::Filtering),
                texture_entry(6, S::FRAGMENT, D::D3, true),
                sampler_entry(7, wgpu::SamplerBindingType::NonFiltering),
                texture_entry(8, S::FRAGMENT, D::D2, false),
                texture_entry(9, S::FRAGMENT, D::D2, false),
            ]],
            Self::Tonemap => vec![vec![
                uniform_entry(0, S::FRAGMENT),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
                texture_entry(2, S::FRAGMENT, D::D2, false),
            ]],
            Self::Fuse => vec![
                vec![storage_entry(0), texture_entry(1, S::COMPUTE, D::D3, true)],
                vec![
                    texture_entry(0, S::COMPUTE, D::D3, true),
                    uniform_entry(1, S::COMPUTE),
                ],
            ],
            Self::ClearFuse => vec![vec![storage_entry(0), storage_entry(1)]],
        }
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, ty: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    view_dimension: wgpu::TextureViewDimension,
    filterable: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: crate::texture::FUSED_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D3,
        },
        count: None,
    }
}

/// Triangle lists, counter-clockwise front faces, no culling.
#[must_use]
pub fn primitive_state() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        ..Default::default()
    }
}

/// A compiled shader module with its layouts.
pub struct Shader {
    kind: ShaderKind,
    module: wgpu::ShaderModule,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
}

impl Shader {
    /// Compiles `kind` and creates its layouts.
    ///
    /// WGSL validation errors are captured with an error scope and returned as
    /// [`RenderError::ShaderCompilationFailed`].
    pub async fn load(device: &wgpu::Device, kind: ShaderKind) -> RenderResult<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.label()),
            source: wgpu::ShaderSource::Wgsl(kind.source().into()),
        });
        if let Some(error) = device.pop_error_scope().await {
            return Err(RenderError::ShaderCompilationFailed(format!(
                "{}: {error}",
                kind.label()
            )));
        }

        let bind_group_layouts: Vec<wgpu::BindGroupLayout> = kind
            .bind_group_layout_entries()
            .iter()
            .enumerate()
            .map(|(group, entries)| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{} Bind Group Layout {group}", kind.label())),
                    entries,
                })
            })
            .collect();

        let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", kind.label())),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        log::debug!("loaded {}", kind.label());

        Ok(Self {
            kind,
            module,
            bind_group_layouts,
            pipeline_layout,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    #[must_use]
    pub fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }

    /// Layout of bind group `group`.
    ///
    /// # Panics
    ///
    /// Panics if the shader has no such group.
    #[must_use]
    pub fn bind_group_layout(&self, group: usize) -> &wgpu::BindGroupLayout {
        &self.bind_group_layouts[group]
    }

    #[must_use]
    pub fn bind_group_layouts(&self) -> &[wgpu::BindGroupLayout] {
        &self.bind_group_layouts
    }

    #[must_use]
    pub fn pipeline_layout(&self) -> &wgpu::PipelineLayout {
        &self.pipeline_layout
    }

    #[must_use]
    pub fn vertex_state(&self) -> wgpu::VertexState<'_> {
        wgpu::VertexState {
            module: &self.module,
            entry_point: self.kind.vertex_entry(),
            buffers: self.kind.vertex_buffer_layouts(),
            compilation_options: Default::default(),
        }
    }

    #[must_use]
    pub fn fragment_state<'a>(
        &'a self,
        targets: &'a [Option<wgpu::ColorTargetState>],
    ) -> wgpu::FragmentState<'a> {
        wgpu::FragmentState {
            module: &self.module,
            entry_point: self.kind.fragment_entry(),
            targets,
            compilation_options: Default::default(),
        }
    }

    /// Creates the compute pipeline of a compute kind.
    #[must_use]
    pub fn create_compute_pipeline(&self, device: &wgpu::Device) -> wgpu::ComputePipeline {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(self.kind.label()),
            layout: Some(&self.pipeline_layout),
            module: &self.module,
            entry_point: self.kind.compute_entry(),
            compilation_options: Default::default(),
            cache: None,
        })
    }
}

/// Mesh group 0: {0 transforms}.
pub fn create_mesh_bind_group(
    device: &wgpu::Device,
    shader: &Shader,
    transforms: &wgpu::Buffer,
) -> wgpu::BindGroup {
    debug_assert_eq!(shader.kind, ShaderKind::Mesh);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Mesh Bind Group"),
        layout: shader.bind_group_layout(0),
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: transforms.as_entire_binding(),
        }],
    })
}

/// Ray-march group 0: {0 transforms, 1 sampler, 2 volume, 3 params}.
pub fn create_ray_march_bind_group(
    device: &wgpu::Device,
    shader: &Shader,
    transforms: &wgpu::Buffer,
    sampler: &wgpu::Sampler,
    volume_view: &wgpu::TextureView,
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    debug_assert_eq!(shader.kind, ShaderKind::RayMarchVolume);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Ray March Bind Group"),
        layout: shader.bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: transforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(volume_view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: params.as_entire_binding(),
            },
        ],
    })
}

/// Resources of the path-trace bind group, in binding order.
pub struct PathTraceBindings<'a> {
    pub camera: &'a wgpu::Buffer,
    pub lights: &'a wgpu::Buffer,
    pub params: &'a wgpu::Buffer,
    pub channels: &'a wgpu::Buffer,
    pub composite: &'a wgpu::Buffer,
    pub linear_sampler: &'a wgpu::Sampler,
    pub volume_view: &'a wgpu::TextureView,
    pub nearest_sampler: &'a wgpu::Sampler,
    pub lut_view: &'a wgpu::TextureView,
    pub previous_view: &'a wgpu::TextureView,
}

/// Path-trace group 0: bindings 0 through 9.
pub fn create_path_trace_bind_group(
    device: &wgpu::Device,
    shader: &Shader,
    b: &PathTraceBindings<'_>,
) -> wgpu::BindGroup {
    debug_assert_eq!(shader.kind, ShaderKind::PathTraceVolume);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Path Trace Bind Group"),
        layout: shader.bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: b.camera.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: b.lights.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: b.params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: b.channels.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: b.composite.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::Sampler(b.linear_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: wgpu::BindingResource::TextureView(b.volume_view),
            },
            wgpu::BindGroupEntry {
                binding: 7,
                resource: wgpu::BindingResource::Sampler(b.nearest_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 8,
                resource: wgpu::BindingResource::TextureView(b.lut_view),
            },
            wgpu::BindGroupEntry {
                binding: 9,
                resource: wgpu::BindingResource::TextureView(b.previous_view),
            },
        ],
    })
}

/// Tonemap group 0: {0 exposure, 1 linear sampler, 2 screen composite}.
pub fn create_tonemap_bind_group(
    device: &wgpu::Device,
    shader: &Shader,
    exposure: &wgpu::Buffer,
    sampler: &wgpu::Sampler,
    composite_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    debug_assert_eq!(shader.kind, ShaderKind::Tonemap);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Tonemap Bind Group"),
        layout: shader.bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: exposure.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(composite_view),
            },
        ],
    })
}

/// Fuse group 0: {0 output storage, 1 previous fused}.
pub fn create_fuse_output_bind_group(
    device: &wgpu::Device,
    shader: &Shader,
    output_view: &wgpu::TextureView,
    previous_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    debug_assert_eq!(shader.kind, ShaderKind::Fuse);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Fuse Output Bind Group"),
        layout: shader.bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(output_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(previous_view),
            },
        ],
    })
}

/// Fuse group 1: {0 channel texture, 1 LUT buffer}.
pub fn create_fuse_channel_bind_group(
    device: &wgpu::Device,
    shader: &Shader,
    channel_view: &wgpu::TextureView,
    lut_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    debug_assert_eq!(shader.kind, ShaderKind::Fuse);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Fuse Channel Bind Group"),
        layout: shader.bind_group_layout(1),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(channel_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lut_buffer.as_entire_binding(),
            },
        ],
    })
}

/// Clear-fuse group 0: {0 ping storage, 1 pong storage}.
pub fn create_clear_fuse_bind_group(
    device: &wgpu::Device,
    shader: &Shader,
    ping_view: &wgpu::TextureView,
    pong_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    debug_assert_eq!(shader.kind, ShaderKind::ClearFuse);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Clear Fuse Bind Group"),
        layout: shader.bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(ping_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(pong_view),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_points() {
        assert_eq!(ShaderKind::Fuse.compute_entry(), Some("main"));
        assert_eq!(ShaderKind::Fuse.vertex_entry(), None);
        assert_eq!(ShaderKind::Tonemap.vertex_entry(), Some("vs_main"));
        assert_eq!(ShaderKind::Mesh.compute_entry(), None);
    }

    #[test]
    fn test_vertex_layouts() {
        assert_eq!(ShaderKind::Mesh.vertex_buffer_layouts().len(), 2);
        assert_eq!(ShaderKind::RayMarchVolume.vertex_buffer_layouts().len(), 1);
        assert_eq!(ShaderKind::RayMarchVolume.vertex_buffer_layouts()[0].array_stride, 12);
        assert!(ShaderKind::ClearFuse.vertex_buffer_layouts().is_empty());
    }

    #[test]
    fn test_path_trace_binding_indices() {
        let groups = ShaderKind::PathTraceVolume.bind_group_layout_entries();
        assert_eq!(groups.len(), 1);
        let bindings: Vec<u32> = groups[0].iter().map(|e| e.binding).collect();
        assert_eq!(bindings, (0..10).collect::<Vec<_>>());
        assert!(matches!(
            groups[0][7].ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
        ));
    }

    #[test]
    fn test_fuse_has_two_groups() {
        let groups = ShaderKind::Fuse.bind_group_layout_entries();
        assert_eq!(groups.len(), 2);
        assert!(matches!(
            groups[0][0].ty,
            wgpu::BindingType::StorageTexture { .. }
        ));
    }

    #[test]
    fn test_sources_declare_entry_points() {
        for kind in ShaderKind::ALL {
            let src = kind.source();
            if let Some(entry) = kind.compute_entry() {
                assert!(src.contains(&format!("fn {entry}(")), "{kind:?}");
            }
            if let Some(entry) = kind.vertex_entry() {
                assert!(src.contains(&format!("fn {entry}(")), "{kind:?}");
            }
        }
    }
}
