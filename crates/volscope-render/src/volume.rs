//! GPU resources of a multi-channel volume.
//!
//! A [`Volume`] owns one [`VolumeData`] per channel (voxel bytes, histogram,
//! `r8unorm` texture, lookup table buffer and texture), the cube proxy geometry
//! and the fused ping-pong pair written by [`crate::fusion::FusionPipeline`].

use glam::{Mat4, Vec3};
use volscope_core::{Histogram, Lut, VolscopeError, DEFAULT_PERCENTILE_MAX, DEFAULT_PERCENTILE_MIN};

use crate::buffer::{create_index_buffer, create_lut_buffer, create_vertex_buffer};
use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::fusion::{FusedSlot, FusionPipeline};
use crate::geometry::{CUBE_INDEX_COUNT, CUBE_INDICES, CUBE_POSITIONS};
use crate::shader::{
    create_clear_fuse_bind_group, create_fuse_channel_bind_group, create_fuse_output_bind_group,
};
use crate::texture::{
    check_row_alignment, create_channel_texture, create_fused_texture, create_lut_texture,
};

/// One channel: immutable voxels plus the lookup table that colors them.
pub struct VolumeData {
    data: Vec<u8>,
    shape: [usize; 3],
    histogram: Histogram,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    lut: Lut,
    lut_buffer: wgpu::Buffer,
    lut_texture: wgpu::Texture,
}

impl VolumeData {
    /// Raw voxels, x fastest, then y, then z.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Grid shape as `[z, y, x]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[must_use]
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// The lookup table currently on the GPU.
    #[must_use]
    pub fn lut(&self) -> &Lut {
        &self.lut
    }

    /// 256 `vec4<f32>` entries; also the copy source for LUT texture rows.
    #[must_use]
    pub fn lut_buffer(&self) -> &wgpu::Buffer {
        &self.lut_buffer
    }

    /// 256 x 1 `rgba32float` copy of the lookup table.
    #[must_use]
    pub fn lut_texture(&self) -> &wgpu::Texture {
        &self.lut_texture
    }

    fn upload_lut(&mut self, queue: &wgpu::Queue, lut: Lut) {
        let rgba = lut.to_float_rgba();
        queue.write_buffer(&self.lut_buffer, 0, bytemuck::cast_slice(&rgba));
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.lut_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&rgba),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(LUT_ROW_BYTES),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: LUT_WIDTH,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.lut = lut;
    }
}

const LUT_WIDTH: u32 = volscope_core::LUT_ENTRIES as u32;
/// Bytes in one float RGBA LUT row.
pub const LUT_ROW_BYTES: u32 = LUT_WIDTH * 16;

/// Bind groups of the fuse and clear-fuse passes for one volume.
pub(crate) struct FuseBindings {
    /// One group per channel: channel texture and LUT buffer.
    pub channel_groups: Vec<wgpu::BindGroup>,
    /// Indexed by the slot being read: reading primary writes secondary and vice versa.
    pub output_groups: [wgpu::BindGroup; 2],
    pub clear_group: wgpu::BindGroup,
}

/// A multi-channel volume centered at the origin.
pub struct Volume {
    physical_dims: Vec3,
    pixel_dims: [u32; 3],
    channels: Vec<VolumeData>,
    position_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    fused: [wgpu::Texture; 2],
    fused_views: [wgpu::TextureView; 2],
    pub(crate) fuse_bindings: Option<FuseBindings>,
    pub(crate) last_fused: Option<FusedSlot>,
}

impl Volume {
    /// Creates an empty volume.
    ///
    /// `physical_dims` is the world-space extent and `pixel_dims` the voxel
    /// count, both in x, y, z order. Every component must be positive.
    pub fn new(ctx: &GpuContext, physical_dims: [f32; 3], pixel_dims: [u32; 3]) -> RenderResult<Self> {
        if physical_dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(VolscopeError::InvalidDimensions(physical_dims).into());
        }
        if pixel_dims.contains(&0) {
            let dims = pixel_dims.map(|d| d as f32);
            return Err(VolscopeError::InvalidDimensions(dims).into());
        }

        let device = &ctx.device;
        let position_buffer =
            create_vertex_buffer(device, &CUBE_POSITIONS, Some("Volume Cube Positions"));
        let index_buffer = create_index_buffer(device, &CUBE_INDICES, Some("Volume Cube Indices"));

        let ping = create_fused_texture(device, pixel_dims, "volume fused texture rgba8unorm ping");
        let pong = create_fused_texture(device, pixel_dims, "volume fused texture rgba8unorm pong");
        let fused_views = [
            ping.create_view(&wgpu::TextureViewDescriptor::default()),
            pong.create_view(&wgpu::TextureViewDescriptor::default()),
        ];

        log::debug!("created volume {pixel_dims:?} voxels, {physical_dims:?} physical");

        Ok(Self {
            physical_dims: Vec3::from(physical_dims),
            pixel_dims,
            channels: Vec::new(),
            position_buffer,
            index_buffer,
            fused: [ping, pong],
            fused_views,
            fuse_bindings: None,
            last_fused: None,
        })
    }

    /// Adds a channel of `shape = [z, y, x]` voxels and returns its index.
    ///
    /// The channel starts with the default percentile lookup table. A row
    /// stride that is not a multiple of the copy alignment is logged and the
    /// upload proceeds.
    pub fn add_channel(&mut self, ctx: &GpuContext, data: &[u8], shape: [usize; 3]) -> RenderResult<usize> {
        let [z, y, x] = shape;
        let expected = z * y * x;
        if data.len() != expected {
            return Err(VolscopeError::SizeMismatch {
                expected,
                actual: data.len(),
            }
            .into());
        }
        let [px, py, pz] = self.pixel_dims.map(|d| d as usize);
        if [z, y, x] != [pz, py, px] {
            return Err(VolscopeError::SizeMismatch {
                expected: px * py * pz,
                actual: expected,
            }
            .into());
        }

        if let Err(e) = check_row_alignment(self.pixel_dims[0]) {
            log::warn!("channel upload: {e}");
        }

        let index = self.channels.len();
        let label = format!("volume channel {index}");
        let texture = create_channel_texture(&ctx.device, &ctx.queue, data, self.pixel_dims, &label);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let histogram = Histogram::new(data);
        let lut = histogram.lut_percentiles(DEFAULT_PERCENTILE_MIN, DEFAULT_PERCENTILE_MAX);
        let lut_buffer = create_lut_buffer(&ctx.device, &lut.to_float_rgba(), Some(&format!("{label} lut")));
        let lut_texture = create_lut_texture(&ctx.device, 1, &format!("{label} lut texture"));

        let mut channel = VolumeData {
            data: data.to_vec(),
            shape,
            histogram,
            texture,
            view,
            lut: Lut::default(),
            lut_buffer,
            lut_texture,
        };
        channel.upload_lut(&ctx.queue, lut);
        self.channels.push(channel);
        // channel bind groups are per channel, so the set must be rebuilt
        self.fuse_bindings = None;

        log::info!(
            "added channel {index} ({x}x{y}x{z}), data range {}..{}",
            self.channels[index].histogram.data_min(),
            self.channels[index].histogram.data_max()
        );
        Ok(index)
    }

    /// Resets every channel to its default percentile lookup table and builds
    /// the fuse bind groups.
    pub fn setup_channel_luts(&mut self, ctx: &GpuContext, fusion: &FusionPipeline) {
        for channel in &mut self.channels {
            let lut = channel
                .histogram
                .lut_percentiles(DEFAULT_PERCENTILE_MIN, DEFAULT_PERCENTILE_MAX);
            channel.upload_lut(&ctx.queue, lut);
        }
        self.build_fuse_bindings(&ctx.device, fusion);
    }

    /// Builds the fuse bind groups if a channel was added since the last build.
    pub fn ensure_fuse_bindings(&mut self, device: &wgpu::Device, fusion: &FusionPipeline) {
        if self.fuse_bindings.is_none() {
            self.build_fuse_bindings(device, fusion);
        }
    }

    fn build_fuse_bindings(&mut self, device: &wgpu::Device, fusion: &FusionPipeline) {
        let fuse = fusion.fuse_shader();
        let channel_groups = self
            .channels
            .iter()
            .map(|c| create_fuse_channel_bind_group(device, fuse, &c.view, &c.lut_buffer))
            .collect();
        let [primary, secondary] = &self.fused_views;
        let output_groups = [
            create_fuse_output_bind_group(device, fuse, secondary, primary),
            create_fuse_output_bind_group(device, fuse, primary, secondary),
        ];
        let clear_group = create_clear_fuse_bind_group(device, fusion.clear_shader(), primary, secondary);
        self.fuse_bindings = Some(FuseBindings {
            channel_groups,
            output_groups,
            clear_group,
        });
    }

    /// Rewrites `channel`'s lookup table in place from a percentile window and tint.
    pub fn update_lut(
        &mut self,
        ctx: &GpuContext,
        channel: usize,
        imin: f32,
        imax: f32,
        rgb: [f32; 3],
    ) -> RenderResult<()> {
        let data = self.channel(channel)?;
        let lut = data.histogram.lut_percentiles(imin, imax).tinted(rgb);
        self.set_lut(ctx, channel, lut)
    }

    /// Uploads an arbitrary lookup table for `channel` without reallocating.
    pub fn set_lut(&mut self, ctx: &GpuContext, channel: usize, lut: Lut) -> RenderResult<()> {
        let count = self.channels.len();
        let data = self
            .channels
            .get_mut(channel)
            .ok_or(VolscopeError::ChannelOutOfRange {
                index: channel,
                count,
            })?;
        data.upload_lut(&ctx.queue, lut);
        Ok(())
    }

    /// World-space extent, x, y, z.
    #[must_use]
    pub fn physical_dims(&self) -> Vec3 {
        self.physical_dims
    }

    /// Voxel counts, x, y, z.
    #[must_use]
    pub fn pixel_dims(&self) -> [u32; 3] {
        self.pixel_dims
    }

    /// Scales the unit cube proxy to the volume's aspect ratio, longest side 1.
    #[must_use]
    pub fn normalized_transform(&self) -> Mat4 {
        Mat4::from_scale(self.physical_dims / self.physical_dims.max_element())
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn channels(&self) -> &[VolumeData] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> RenderResult<&VolumeData> {
        self.channels.get(index).ok_or_else(|| {
            VolscopeError::ChannelOutOfRange {
                index,
                count: self.channels.len(),
            }
            .into()
        })
    }

    #[must_use]
    pub fn position_buffer(&self) -> &wgpu::Buffer {
        &self.position_buffer
    }

    #[must_use]
    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    #[must_use]
    pub fn index_format(&self) -> wgpu::IndexFormat {
        wgpu::IndexFormat::Uint16
    }

    #[must_use]
    pub fn index_count(&self) -> u32 {
        CUBE_INDEX_COUNT
    }

    #[must_use]
    pub fn fused_texture(&self, slot: FusedSlot) -> &wgpu::Texture {
        &self.fused[slot.index()]
    }

    #[must_use]
    pub fn fused_view(&self, slot: FusedSlot) -> &wgpu::TextureView {
        &self.fused_views[slot.index()]
    }

    /// Slot holding the result of the most recent fuse, if any.
    #[must_use]
    pub fn last_fused_slot(&self) -> Option<FusedSlot> {
        self.last_fused
    }

    /// Interleaves up to four channels into one RGBA8 buffer, channel `k` of
    /// `indices` going to component `k`.
    #[must_use]
    pub fn interleave_channels(&self, indices: &[usize]) -> Vec<u8> {
        let voxels = self.pixel_dims.iter().map(|&d| d as usize).product::<usize>();
        let mut packed = vec![0u8; voxels * 4];
        for (component, &index) in indices.iter().take(4).enumerate() {
            let Some(channel) = self.channels.get(index) else {
                continue;
            };
            for (j, &value) in channel.data.iter().enumerate() {
                packed[j * 4 + component] = value;
            }
        }
        packed
    }
}
