//! Compute passes that combine enabled channels into one RGBA volume.
//!
//! A clear dispatch zeroes both fused textures, then one accumulate dispatch
//! per enabled channel reads one texture of the pair and writes the other. The
//! first enabled channel reads [`FusedSlot::Primary`], so after `n` channels
//! the result sits in [`FusedSlot::for_enabled_count`]`(n)`.

use volscope_core::{enabled_channels, ChannelState};

use crate::error::RenderResult;
use crate::shader::{Shader, ShaderKind};
use crate::volume::Volume;

/// Threads per fuse workgroup.
pub const FUSE_WORKGROUP_SIZE: [u32; 3] = [8, 8, 1];

/// Workgroups needed to cover a grid of `[x, y, z]` voxels.
#[must_use]
pub fn dispatch_grid([x, y, z]: [u32; 3]) -> [u32; 3] {
    [
        x.div_ceil(FUSE_WORKGROUP_SIZE[0]),
        y.div_ceil(FUSE_WORKGROUP_SIZE[1]),
        z.div_ceil(FUSE_WORKGROUP_SIZE[2]),
    ]
}

/// One texture of the fused ping-pong pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FusedSlot {
    /// Read by the first accumulate pass; holds the result for an even count.
    Primary,
    /// Holds the result for an odd count.
    Secondary,
}

impl FusedSlot {
    /// Slot holding the result after `enabled` accumulate passes.
    #[must_use]
    pub fn for_enabled_count(enabled: usize) -> Self {
        if enabled % 2 == 0 {
            Self::Primary
        } else {
            Self::Secondary
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }

    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// What one [`FusionPipeline::fuse`] call encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseOutcome {
    /// Texture holding the fused result.
    pub slot: FusedSlot,
    /// Channels accumulated, in order.
    pub enabled_channels: Vec<usize>,
    pub clear_dispatches: u32,
    pub accumulate_dispatches: u32,
}

/// Clear and accumulate compute pipelines.
pub struct FusionPipeline {
    clear_shader: Shader,
    fuse_shader: Shader,
    clear_pipeline: wgpu::ComputePipeline,
    fuse_pipeline: wgpu::ComputePipeline,
}

impl FusionPipeline {
    pub async fn new(device: &wgpu::Device) -> RenderResult<Self> {
        let clear_shader = Shader::load(device, ShaderKind::ClearFuse).await?;
        let fuse_shader = Shader::load(device, ShaderKind::Fuse).await?;
        let clear_pipeline = clear_shader.create_compute_pipeline(device);
        let fuse_pipeline = fuse_shader.create_compute_pipeline(device);
        Ok(Self {
            clear_shader,
            fuse_shader,
            clear_pipeline,
            fuse_pipeline,
        })
    }

    #[must_use]
    pub fn fuse_shader(&self) -> &Shader {
        &self.fuse_shader
    }

    #[must_use]
    pub fn clear_shader(&self) -> &Shader {
        &self.clear_shader
    }

    /// Encodes the clear pass and one accumulate pass per enabled channel.
    ///
    /// Only the first four enabled channels that exist in `volume` take part.
    /// The chosen slot is also recorded on the volume.
    pub fn fuse(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        volume: &mut Volume,
        states: &[ChannelState],
    ) -> FuseOutcome {
        volume.ensure_fuse_bindings(device, self);
        let channels: Vec<usize> = enabled_channels(states)
            .into_iter()
            .filter(|&i| i < volume.channel_count())
            .collect();
        let [gx, gy, gz] = dispatch_grid(volume.pixel_dims());

        let mut clear_dispatches = 0;
        let mut accumulate_dispatches = 0;
        if let Some(bindings) = volume.fuse_bindings.as_ref() {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Fuse Pass"),
                timestamp_writes: None,
            });

            pass.set_pipeline(&self.clear_pipeline);
            pass.set_bind_group(0, &bindings.clear_group, &[]);
            pass.dispatch_workgroups(gx, gy, gz);
            clear_dispatches += 1;

            pass.set_pipeline(&self.fuse_pipeline);
            let mut read = FusedSlot::Primary;
            for &channel in &channels {
                pass.set_bind_group(0, &bindings.output_groups[read.index()], &[]);
                pass.set_bind_group(1, &bindings.channel_groups[channel], &[]);
                pass.dispatch_workgroups(gx, gy, gz);
                accumulate_dispatches += 1;
                read = read.other();
            }
        }

        let slot = FusedSlot::for_enabled_count(channels.len());
        volume.last_fused = Some(slot);
        log::debug!(
            "fused channels {channels:?} into {slot:?} ({clear_dispatches} clear, {accumulate_dispatches} accumulate dispatches)"
        );

        FuseOutcome {
            slot,
            enabled_channels: channels,
            clear_dispatches,
            accumulate_dispatches,
        }
    }
}
