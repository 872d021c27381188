//! Progressive path tracing with a tonemap resolve.
//!
//! One [`PathTraceRenderer::render`] call runs these steps in order:
//! 1. reallocate the float targets if the output size changed
//! 2. pack up to four enabled channels into the combined RGBA volume
//! 3. copy each enabled channel's lookup table into its row of the LUT texture
//! 4. advance the progressive counters, then flush dirty uniform blocks
//! 5. trace one sample per pixel into the path-trace target, blending with the
//!    previous screen composite
//! 6. copy the path-trace target into the screen composite
//! 7. tonemap the screen composite into the output
//!
//! The copy in step 6 must follow the trace in step 5, since the trace reads
//! the composite as the previous frame.

use glam::Mat4;
use volscope_core::{enabled_channels, ObjectId, PathTraceSettings, MAX_FUSED_CHANNELS};

use crate::buffer::{
    create_index_buffer, create_uniform_array_buffer, create_uniform_buffer, create_vertex_buffer,
};
use crate::camera::Camera;
use crate::context::GpuContext;
use crate::error::{RenderError, RenderResult};
use crate::geometry::{QUAD_INDEX_COUNT, QUAD_INDICES, QUAD_POSITIONS};
use crate::progressive::{DirtySet, FrameSync, ProgressiveState, UniformSlot};
use crate::pt_uniforms::{
    CameraUniforms, ChannelsUniforms, ExposureUniforms, GlobalParamsUniforms, LightDesc,
    LightUniforms, ProgressiveUniforms,
};
use crate::render_target::RenderTarget;
use crate::scene::{Scene, SceneObject, SceneVolume};
use crate::shader::{
    create_path_trace_bind_group, create_tonemap_bind_group, primitive_state, PathTraceBindings,
    Shader, ShaderKind,
};
use crate::texture::{
    create_combined_volume_texture, create_float_target, create_linear_sampler, create_lut_texture,
    create_nearest_sampler, write_volume,
};
use crate::volume::LUT_ROW_BYTES;

/// Rows of the shared LUT texture, one per compositing slot.
const LUT_ROWS: u32 = MAX_FUSED_CHANNELS as u32;
const LUT_WIDTH: u32 = volscope_core::LUT_ENTRIES as u32;

/// Accumulation textures sized to the output.
struct FloatTargets {
    size: (u32, u32),
    path_trace: wgpu::Texture,
    path_trace_view: wgpu::TextureView,
    screen: wgpu::Texture,
    screen_view: wgpu::TextureView,
}

impl FloatTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let path_trace = create_float_target(
            device,
            width,
            height,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            "path trace target",
        );
        let screen = create_float_target(
            device,
            width,
            height,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            "screen composite target",
        );
        Self {
            size: (width, height),
            path_trace_view: path_trace.create_view(&wgpu::TextureViewDescriptor::default()),
            path_trace,
            screen_view: screen.create_view(&wgpu::TextureViewDescriptor::default()),
            screen,
        }
    }
}

/// The volume object the tracer samples.
struct BoundVolume {
    id: ObjectId,
    pixel_dims: [u32; 3],
    transform: Mat4,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

/// Uniform buffers and their CPU copies.
struct Uniforms {
    camera: CameraUniforms,
    lights: [LightUniforms; 2],
    params: GlobalParamsUniforms,
    channels: ChannelsUniforms,
    composite: ProgressiveUniforms,
    exposure: ExposureUniforms,
    camera_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    channels_buffer: wgpu::Buffer,
    composite_buffer: wgpu::Buffer,
    exposure_buffer: wgpu::Buffer,
}

impl Uniforms {
    fn new(device: &wgpu::Device, settings: &PathTraceSettings, lights: &[LightDesc; 2]) -> Self {
        let camera: CameraUniforms = bytemuck::Zeroable::zeroed();
        let lights = lights.map(|d| LightUniforms::make_light(&d));
        let mut params = GlobalParamsUniforms::default();
        params.apply_settings(settings);
        let channels = ChannelsUniforms::placeholder();
        let composite = ProgressiveUniforms::default();
        let exposure = ExposureUniforms::from_slider(settings.exposure_slider);

        Self {
            camera_buffer: create_uniform_buffer(device, &camera, Some("Path Trace Camera")),
            lights_buffer: create_uniform_array_buffer(device, &lights, Some("Path Trace Lights")),
            params_buffer: create_uniform_buffer(device, &params, Some("Path Trace Params")),
            channels_buffer: create_uniform_buffer(device, &channels, Some("Path Trace Channels")),
            composite_buffer: create_uniform_buffer(device, &composite, Some("Path Trace Composite")),
            exposure_buffer: create_uniform_buffer(device, &exposure, Some("Tonemap Exposure")),
            camera,
            lights,
            params,
            channels,
            composite,
            exposure,
        }
    }

    fn write(&self, queue: &wgpu::Queue, slot: UniformSlot) {
        match slot {
            UniformSlot::Composite => {
                queue.write_buffer(&self.composite_buffer, 0, bytemuck::bytes_of(&self.composite));
            }
            UniformSlot::Lights => {
                // light 1 lands at offset 192, right after light 0
                queue.write_buffer(&self.lights_buffer, 0, bytemuck::cast_slice(&self.lights));
            }
            UniformSlot::RenderParams => {
                queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.params));
            }
            UniformSlot::Camera => {
                queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&self.camera));
            }
            UniformSlot::Channels => {
                queue.write_buffer(&self.channels_buffer, 0, bytemuck::bytes_of(&self.channels));
            }
            UniformSlot::Exposure => {
                queue.write_buffer(&self.exposure_buffer, 0, bytemuck::bytes_of(&self.exposure));
            }
        }
    }
}

/// Progressive path-trace volume renderer.
pub struct PathTraceRenderer {
    path_trace_shader: Shader,
    tonemap_shader: Shader,
    path_trace_pipeline: wgpu::RenderPipeline,
    tonemap_pipeline: wgpu::RenderPipeline,
    quad_positions: wgpu::Buffer,
    quad_indices: wgpu::Buffer,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    lut_texture: wgpu::Texture,
    lut_view: wgpu::TextureView,
    targets: FloatTargets,
    tonemap_bind_group: wgpu::BindGroup,
    uniforms: Uniforms,
    settings: PathTraceSettings,
    light_descs: [LightDesc; 2],
    dirty: DirtySet,
    progressive: ProgressiveState,
    last_sync: Option<FrameSync>,
    camera_generation: Option<u64>,
    bound: Option<BoundVolume>,
}

impl PathTraceRenderer {
    /// Compiles both shaders and allocates `width` x `height` accumulation targets.
    pub async fn new(
        ctx: &GpuContext,
        output_format: wgpu::TextureFormat,
        (width, height): (u32, u32),
    ) -> RenderResult<Self> {
        let device = &ctx.device;
        let path_trace_shader = Shader::load(device, ShaderKind::PathTraceVolume).await?;
        let tonemap_shader = Shader::load(device, ShaderKind::Tonemap).await?;

        let path_trace_pipeline = fullscreen_pipeline(
            device,
            &path_trace_shader,
            crate::texture::FLOAT_FORMAT,
            "Path Trace Pipeline",
        );
        let tonemap_pipeline =
            fullscreen_pipeline(device, &tonemap_shader, output_format, "Tonemap Pipeline");

        let settings = PathTraceSettings::default();
        let light_descs = [LightDesc::area(), LightDesc::sky()];
        let uniforms = Uniforms::new(device, &settings, &light_descs);
        let linear_sampler = create_linear_sampler(device);
        let nearest_sampler = create_nearest_sampler(device);
        let lut_texture = create_lut_texture(device, LUT_ROWS, "path trace lut texture");
        let lut_view = lut_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let targets = FloatTargets::new(device, width, height);
        let tonemap_bind_group = create_tonemap_bind_group(
            device,
            &tonemap_shader,
            &uniforms.exposure_buffer,
            &linear_sampler,
            &targets.screen_view,
        );

        log::info!("path trace renderer ready ({width}x{height}, output {output_format:?})");

        Ok(Self {
            path_trace_shader,
            tonemap_shader,
            path_trace_pipeline,
            tonemap_pipeline,
            quad_positions: create_vertex_buffer(device, &QUAD_POSITIONS, Some("Fullscreen Quad Positions")),
            quad_indices: create_index_buffer(device, &QUAD_INDICES, Some("Fullscreen Quad Indices")),
            linear_sampler,
            nearest_sampler,
            lut_texture,
            lut_view,
            targets,
            tonemap_bind_group,
            uniforms,
            settings,
            light_descs,
            dirty: DirtySet::all(),
            progressive: ProgressiveState::default(),
            last_sync: None,
            camera_generation: None,
            bound: None,
        })
    }

    /// Binds the volume of `object` for tracing.
    ///
    /// Creates the combined RGBA volume texture, rebuilds the bind group and
    /// recomputes the march parameters. Accumulation restarts.
    pub fn set_volume(&mut self, ctx: &GpuContext, object: &SceneObject) -> RenderResult<()> {
        let scene_volume = object.as_volume().ok_or(RenderError::NoVolume)?;
        let volume = &scene_volume.volume;
        let pixel_dims = volume.pixel_dims();
        let physical = volume.physical_dims();
        let enabled = traced_channels(scene_volume);

        let texture = create_combined_volume_texture(&ctx.device, pixel_dims);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.create_volume_bind_group(&ctx.device, &view);

        self.uniforms.params = GlobalParamsUniforms::for_volume(
            physical / physical.max_element(),
            pixel_dims,
            enabled.len(),
            &self.settings,
        );
        self.dirty.mark(UniformSlot::RenderParams);
        self.dirty.mark(UniformSlot::Camera);
        self.bound = Some(BoundVolume {
            id: object.id,
            pixel_dims,
            transform: object.transform,
            texture,
            view,
            bind_group,
        });
        log::info!("path tracer bound to object {} ({pixel_dims:?} voxels)", object.id);
        Ok(())
    }

    /// Id of the bound volume object.
    #[must_use]
    pub fn bound_volume(&self) -> Option<ObjectId> {
        self.bound.as_ref().map(|b| b.id)
    }

    fn create_volume_bind_group(&self, device: &wgpu::Device, volume_view: &wgpu::TextureView) -> wgpu::BindGroup {
        let u = &self.uniforms;
        create_path_trace_bind_group(
            device,
            &self.path_trace_shader,
            &PathTraceBindings {
                camera: &u.camera_buffer,
                lights: &u.lights_buffer,
                params: &u.params_buffer,
                channels: &u.channels_buffer,
                composite: &u.composite_buffer,
                linear_sampler: &self.linear_sampler,
                volume_view,
                nearest_sampler: &self.nearest_sampler,
                lut_view: &self.lut_view,
                previous_view: &self.targets.screen_view,
            },
        )
    }

    /// Renders one progressive frame of the bound volume into `target`.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        target: &dyn RenderTarget,
        camera: &Camera,
        scene: &mut Scene,
    ) -> RenderResult<()> {
        ctx.check_device()?;
        let device = &ctx.device;
        self.check_resize(device, target.width(), target.height());

        let bound_id = self.bound.as_ref().map(|b| b.id).ok_or(RenderError::NoVolume)?;
        let object = scene.get_mut(bound_id).ok_or(RenderError::NoVolume)?;
        let transform = object.transform;
        let scene_volume = object.as_volume_mut().ok_or(RenderError::NoVolume)?;
        if scene_volume.apply_channel_states(ctx)? > 0 {
            // a new transfer function restarts accumulation
            self.dirty.mark(UniformSlot::Camera);
        }
        let scene_volume: &SceneVolume = scene_volume;
        let enabled = traced_channels(scene_volume);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Path Trace Encoder"),
        });

        self.combine_channels(ctx, scene_volume, &enabled);
        self.update_luts(&mut encoder, scene_volume, &enabled);
        self.update_camera(camera, transform);

        let sync = FrameSync::begin(&mut self.dirty, &mut self.progressive);
        self.uniforms.composite = composite_uniforms(self.progressive, self.targets.size);
        for slot in sync.slots() {
            self.uniforms.write(&ctx.queue, slot);
        }
        self.last_sync = Some(sync);

        let Some(bound) = self.bound.as_ref() else {
            return Err(RenderError::NoVolume);
        };
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Path Trace Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.path_trace_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        // the shader blends with the previous frame itself
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.path_trace_pipeline);
            pass.set_bind_group(0, &bound.bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad_positions.slice(..));
            pass.set_index_buffer(self.quad_indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDEX_COUNT, 0, 0..1);
        }

        let (width, height) = self.targets.size;
        encoder.copy_texture_to_texture(
            self.targets.path_trace.as_image_copy(),
            self.targets.screen.as_image_copy(),
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tonemap Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color_view()?,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.tonemap_pipeline);
            pass.set_bind_group(0, &self.tonemap_bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad_positions.slice(..));
            pass.set_index_buffer(self.quad_indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDEX_COUNT, 0, 0..1);
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        log::trace!(
            "path trace frame {} (sample {})",
            self.progressive.frame_counter,
            self.progressive.sample_counter
        );
        Ok(())
    }

    /// Reallocates the float targets and every bind group that views them.
    fn check_resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.targets.size == (width.max(1), height.max(1)) {
            return;
        }
        self.targets = FloatTargets::new(device, width, height);
        self.tonemap_bind_group = create_tonemap_bind_group(
            device,
            &self.tonemap_shader,
            &self.uniforms.exposure_buffer,
            &self.linear_sampler,
            &self.targets.screen_view,
        );
        if let Some(bound) = self.bound.take() {
            let bind_group = self.create_volume_bind_group(device, &bound.view);
            self.bound = Some(BoundVolume { bind_group, ..bound });
        }
        // the pixel step of the camera block depends on the size
        self.dirty.mark(UniformSlot::Camera);
        log::debug!("path trace targets resized to {width}x{height}");
    }

    /// Packs the enabled channels into the combined volume texture.
    fn combine_channels(&self, ctx: &GpuContext, scene_volume: &SceneVolume, enabled: &[usize]) {
        let Some(bound) = self.bound.as_ref() else {
            return;
        };
        if bound.pixel_dims != scene_volume.volume.pixel_dims() {
            log::warn!("bound volume changed shape; call set_volume again");
            return;
        }
        let packed = scene_volume.volume.interleave_channels(enabled);
        write_volume(&ctx.queue, &bound.texture, &packed, bound.pixel_dims, 4);
    }

    /// Copies each enabled channel's lookup table into row `i` of the LUT texture.
    #[allow(clippy::float_cmp)]
    fn update_luts(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        scene_volume: &SceneVolume,
        enabled: &[usize],
    ) {
        let mut rows = 0u32;
        for (row, &index) in enabled.iter().enumerate() {
            let Ok(channel) = scene_volume.volume.channel(index) else {
                continue;
            };
            let y = row as u32;
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: channel.lut_buffer(),
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(LUT_ROW_BYTES),
                        rows_per_image: Some(1),
                    },
                },
                wgpu::TexelCopyTextureInfo {
                    texture: &self.lut_texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y, z: 0 },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: LUT_WIDTH,
                    height: 1,
                    depth_or_array_layers: 1,
                },
            );
            rows += 1;
        }

        // per-slot materials stay at their fixed values whatever the channel
        self.uniforms.channels = ChannelsUniforms::placeholder();
        let n_channels = rows as f32;
        if self.uniforms.params.n_channels != n_channels {
            self.uniforms.params.n_channels = n_channels;
            self.dirty.mark(UniformSlot::RenderParams);
        }
    }

    /// Rebuilds the camera block when the camera or the volume placement changed.
    fn update_camera(&mut self, camera: &Camera, transform: Mat4) {
        let transform_changed = self.bound.as_ref().is_some_and(|b| b.transform != transform);
        if let Some(bound) = self.bound.as_mut() {
            bound.transform = transform;
        }
        let camera_changed = self.camera_generation != Some(camera.generation());
        if !(camera_changed || transform_changed || self.dirty.contains(UniformSlot::Camera)) {
            return;
        }
        self.camera_generation = Some(camera.generation());
        let (width, height) = self.targets.size;
        self.uniforms.camera = CameraUniforms::from_camera(
            camera,
            camera.ray_projection_or_default(),
            transform.inverse(),
            width,
            height,
        );
        self.dirty.mark(UniformSlot::Camera);
    }

    /// Sets the tonemap exposure slider, in `0..=1`.
    pub fn set_exposure_slider(&mut self, slider: f32) {
        self.settings.exposure_slider = slider;
        self.uniforms.exposure = ExposureUniforms::from_slider(slider);
        self.dirty.mark(UniformSlot::Exposure);
    }

    pub fn set_density_scale(&mut self, density_scale: f32) {
        self.settings.density_scale = density_scale;
        self.uniforms.params.density_scale = density_scale;
        self.dirty.mark(UniformSlot::RenderParams);
    }

    /// Replaces light `index` (0 area, 1 sky). Other indices are ignored.
    pub fn set_light(&mut self, index: usize, desc: LightDesc) {
        let Some(slot) = self.light_descs.get_mut(index) else {
            log::warn!("ignoring light {index}: only two lights exist");
            return;
        };
        *slot = desc;
        self.uniforms.lights[index] = LightUniforms::make_light(&desc);
        self.dirty.mark(UniformSlot::Lights);
    }

    /// Applies every tunable of `settings`.
    pub fn set_settings(&mut self, settings: &PathTraceSettings) {
        self.uniforms.params.apply_settings(settings);
        self.uniforms.exposure = ExposureUniforms::from_slider(settings.exposure_slider);
        self.settings = settings.clone();
        self.dirty.mark(UniformSlot::RenderParams);
        self.dirty.mark(UniformSlot::Exposure);
    }

    /// Restarts accumulation on the next frame.
    pub fn reset_accumulation(&mut self) {
        self.dirty.mark(UniformSlot::Camera);
    }

    #[must_use]
    pub fn settings(&self) -> &PathTraceSettings {
        &self.settings
    }

    #[must_use]
    pub fn light(&self, index: usize) -> Option<&LightDesc> {
        self.light_descs.get(index)
    }

    #[must_use]
    pub fn params(&self) -> &GlobalParamsUniforms {
        &self.uniforms.params
    }

    #[must_use]
    pub fn frame_counter(&self) -> u32 {
        self.progressive.frame_counter
    }

    #[must_use]
    pub fn sample_counter(&self) -> u32 {
        self.progressive.sample_counter
    }

    /// True if `slot` will be uploaded on the next frame.
    #[must_use]
    pub fn is_dirty(&self, slot: UniformSlot) -> bool {
        self.dirty.contains(slot)
    }

    /// Slots uploaded by the most recent frame.
    #[must_use]
    pub fn last_uploads(&self) -> Vec<UniformSlot> {
        self.last_sync.map(|s| s.slots().collect()).unwrap_or_default()
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.targets.size
    }
}

fn composite_uniforms(progressive: ProgressiveState, (width, height): (u32, u32)) -> ProgressiveUniforms {
    ProgressiveUniforms {
        frame_counter: progressive.frame_counter as f32,
        sample_counter: progressive.sample_counter as f32,
        resolution: [width as f32, height as f32],
    }
}

/// First four enabled channels that exist in the volume.
fn traced_channels(scene_volume: &SceneVolume) -> Vec<usize> {
    let count = scene_volume.volume.channel_count();
    let mut enabled = enabled_channels(&scene_volume.channel_states);
    enabled.retain(|&i| i < count);
    enabled.truncate(MAX_FUSED_CHANNELS);
    enabled
}

/// A fullscreen-quad pipeline without depth.
fn fullscreen_pipeline(
    device: &wgpu::Device,
    shader: &Shader,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    let targets = [Some(wgpu::ColorTargetState {
        format,
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
    })];
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(shader.pipeline_layout()),
        vertex: shader.vertex_state(),
        fragment: Some(shader.fragment_state(&targets)),
        primitive: primitive_state(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
