//! GPU integration tests.
//!
//! These need a GPU adapter (real or software fallback) and fail without one.
//! On machines without a GPU they can be skipped with `cargo test -- --skip gpu_`.

use glam::{Mat4, Vec3};
use volscope_core::{ChannelState, PowerPreference, VolumeRenderSettings};
use volscope_render::*;

fn gpu() -> GpuContext {
    pollster::block_on(GpuContext::new_headless(PowerPreference::LowPower))
        .unwrap_or_else(|e| panic!("no GPU adapter ({e}); skip with `cargo test -- --skip gpu_`"))
}

fn center_pixel(ctx: &GpuContext, target: &OffscreenTarget) -> [u8; 4] {
    let pixels = pollster::block_on(target.get_pixels(ctx)).unwrap();
    let (w, h) = (target.width() as usize, target.height() as usize);
    let i = ((h / 2) * w + w / 2) * 4;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

/// A `n^3` grid with 255 inside a centered sphere of radius `n/3`, 0 outside.
fn sphere(n: usize) -> Vec<u8> {
    let c = (n as f32 - 1.0) / 2.0;
    let r = n as f32 / 3.0;
    let mut data = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let d = Vec3::new(x as f32 - c, y as f32 - c, z as f32 - c).length();
                data.push(if d <= r { 255 } else { 0 });
            }
        }
    }
    data
}

fn volume_with_channels(ctx: &GpuContext, n: u32, channels: usize) -> Volume {
    let mut volume = Volume::new(ctx, [1.0; 3], [n; 3]).unwrap();
    let side = n as usize;
    for i in 0..channels {
        let data = vec![(i as u8 + 1) * 40; side * side * side];
        volume.add_channel(ctx, &data, [side; 3]).unwrap();
    }
    volume
}

#[test]
fn gpu_all_shaders_load() {
    let ctx = gpu();
    for kind in ShaderKind::ALL {
        let shader = pollster::block_on(Shader::load(&ctx.device, kind));
        assert!(shader.is_ok(), "{kind:?}: {:?}", shader.err());
    }
}

#[test]
fn gpu_volume_rejects_bad_input() {
    let ctx = gpu();
    assert!(Volume::new(&ctx, [1.0, 0.0, 1.0], [4; 3]).is_err());
    assert!(Volume::new(&ctx, [1.0; 3], [4, 4, 0]).is_err());

    let mut volume = Volume::new(&ctx, [1.0; 3], [4; 3]).unwrap();
    let err = volume.add_channel(&ctx, &[0; 10], [4, 4, 4]).unwrap_err();
    assert!(matches!(
        err,
        RenderError::Core(volscope_core::VolscopeError::SizeMismatch { expected: 64, actual: 10 })
    ));
    assert!(volume.add_channel(&ctx, &[0; 32], [2, 4, 4]).is_err());
    assert!(volume.update_lut(&ctx, 0, 0.5, 0.98, [1.0; 3]).is_err());
}

#[test]
fn gpu_all_zero_channel_histogram() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [4; 3]).unwrap();
    let index = volume.add_channel(&ctx, &[0; 64], [4, 4, 4]).unwrap();
    let h = volume.channel(index).unwrap().histogram();
    assert_eq!(h.data_min(), 255);
    assert_eq!(h.data_max(), 0);
    let full = h.lut_full_range();
    assert_eq!(full.control_points.len(), 2);
    assert_eq!(full.control_points[0].x, 0.0);
    assert_eq!(full.control_points[0].opacity, 0.0);
    assert_eq!(full.control_points[1].x, 255.0);
    assert_eq!(full.control_points[1].opacity, 1.0);
}

#[test]
fn gpu_update_lut_replaces_table() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [32; 3]).unwrap();
    volume.add_channel(&ctx, &sphere(32), [32; 3]).unwrap();
    volume.update_lut(&ctx, 0, 0.0, 1.0, [1.0, 0.0, 0.0]).unwrap();
    let lut = volume.channel(0).unwrap().lut();
    assert_eq!(lut.rgba(255)[1], 0, "green removed by the red tint");
    assert!(volume.update_lut(&ctx, 1, 0.0, 1.0, [1.0; 3]).is_err());
}

#[test]
fn gpu_fusion_parity() {
    let ctx = gpu();
    let fusion = pollster::block_on(FusionPipeline::new(&ctx.device)).unwrap();
    let mut volume = volume_with_channels(&ctx, 8, 4);

    for n in 0..=4 {
        let states: Vec<ChannelState> = (0..4)
            .map(|i| ChannelState::for_index(i).with_enabled(i < n))
            .collect();
        let mut encoder = ctx.device.create_command_encoder(&Default::default());
        let outcome = fusion.fuse(&ctx.device, &mut encoder, &mut volume, &states);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let expected = if n % 2 == 0 {
            FusedSlot::Primary
        } else {
            FusedSlot::Secondary
        };
        assert_eq!(outcome.slot, expected, "{n} enabled channels");
        assert_eq!(outcome.enabled_channels, (0..n).collect::<Vec<_>>());
        assert_eq!(outcome.clear_dispatches, 1);
        assert_eq!(outcome.accumulate_dispatches as usize, n);
        assert_eq!(volume.last_fused_slot(), Some(expected));
    }
    ctx.wait_idle().unwrap();
}

#[test]
fn gpu_fuse_two_channels() {
    let ctx = gpu();
    let fusion = pollster::block_on(FusionPipeline::new(&ctx.device)).unwrap();
    let mut volume = volume_with_channels(&ctx, 8, 2);
    volume.setup_channel_luts(&ctx, &fusion);

    let states = ChannelState::default_for_count(2);
    let mut encoder = ctx.device.create_command_encoder(&Default::default());
    let outcome = fusion.fuse(&ctx.device, &mut encoder, &mut volume, &states);
    ctx.queue.submit(std::iter::once(encoder.finish()));

    assert_eq!(outcome.slot, FusedSlot::Primary);
    assert_eq!(outcome.accumulate_dispatches, 2);
    assert_eq!(outcome.clear_dispatches, 1);
}

#[test]
fn gpu_fusion_truncates_to_four_channels() {
    let ctx = gpu();
    let fusion = pollster::block_on(FusionPipeline::new(&ctx.device)).unwrap();
    let mut volume = volume_with_channels(&ctx, 8, 5);

    let states = vec![ChannelState::default(); 5];
    let mut encoder = ctx.device.create_command_encoder(&Default::default());
    let outcome = fusion.fuse(&ctx.device, &mut encoder, &mut volume, &states);
    ctx.queue.submit(std::iter::once(encoder.finish()));

    assert_eq!(outcome.enabled_channels, vec![0, 1, 2, 3]);
    assert_eq!(outcome.slot, FusedSlot::Primary);
}

#[test]
fn gpu_ray_march_draws_sphere() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [32; 3]).unwrap();
    volume.add_channel(&ctx, &sphere(32), [32; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);

    let target = OffscreenTarget::new(&ctx.device, 64, 64);
    let camera = Camera::new(1.0);
    let mut renderer = pollster::block_on(RayMarchRenderer::new(&ctx, OFFSCREEN_FORMAT)).unwrap();
    renderer
        .render(&ctx, &target, &camera, &mut scene, &VolumeRenderSettings::default())
        .unwrap();
    assert_eq!(renderer.bound_source(id), Some(FusedSlot::Secondary));
    assert_eq!(renderer.cached_objects(), 1);

    let pixels = pollster::block_on(target.get_pixels(&ctx)).unwrap();
    assert_eq!(pixels.len(), 64 * 64 * 4);
    let center = ((32 * 64 + 32) * 4) as usize;
    assert!(pixels[center] > 0, "center pixel {:?}", &pixels[center..center + 4]);
    assert_eq!(&pixels[0..4], &[0, 0, 0, 255], "corner keeps the clear color");

    // a second frame reuses the cached bind group
    renderer
        .render(&ctx, &target, &camera, &mut scene, &VolumeRenderSettings::default())
        .unwrap();
    assert_eq!(renderer.cached_objects(), 1);
    renderer.forget(id);
    assert_eq!(renderer.cached_objects(), 0);
}

#[test]
fn gpu_ray_march_fuses_multichannel_volume() {
    let ctx = gpu();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume_with_channels(&ctx, 8, 3), Mat4::IDENTITY);
    let target = OffscreenTarget::new(&ctx.device, 32, 32);
    let camera = Camera::new(1.0);
    let mut renderer = pollster::block_on(RayMarchRenderer::new(&ctx, OFFSCREEN_FORMAT)).unwrap();

    renderer
        .render(&ctx, &target, &camera, &mut scene, &VolumeRenderSettings::default())
        .unwrap();
    assert_eq!(renderer.bound_source(id), Some(FusedSlot::Secondary));

    // disabling a channel flips the parity and rebinds
    let object = scene.get_mut(id).unwrap();
    object.as_volume_mut().unwrap().set_channel_enabled(2, false);
    renderer
        .render(&ctx, &target, &camera, &mut scene, &VolumeRenderSettings::default())
        .unwrap();
    assert_eq!(renderer.bound_source(id), Some(FusedSlot::Primary));
}

#[test]
fn gpu_ray_march_single_channel_follows_view_state() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [32; 3]).unwrap();
    volume.add_channel(&ctx, &sphere(32), [32; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);
    let target = OffscreenTarget::new(&ctx.device, 64, 64);
    let camera = Camera::new(1.0);
    let settings = VolumeRenderSettings::default();
    let mut renderer = pollster::block_on(RayMarchRenderer::new(&ctx, OFFSCREEN_FORMAT)).unwrap();

    // channel 0 defaults to the magenta palette entry
    renderer.render(&ctx, &target, &camera, &mut scene, &settings).unwrap();
    let px = center_pixel(&ctx, &target);
    assert!(px[0] > 0 && px[2] > 0, "magenta sphere, got {px:?}");
    assert_eq!(px[1], 0);

    // a LUT uploaded between frames shows up in the next one
    let scene_volume = scene.get_mut(id).unwrap().as_volume_mut().unwrap();
    scene_volume.volume.update_lut(&ctx, 0, 0.0, 1.0, [0.0, 1.0, 0.0]).unwrap();
    renderer.render(&ctx, &target, &camera, &mut scene, &settings).unwrap();
    let px = center_pixel(&ctx, &target);
    assert!(px[1] > 0, "green sphere, got {px:?}");
    assert_eq!((px[0], px[2]), (0, 0));

    // so does an edited channel color
    let scene_volume = scene.get_mut(id).unwrap().as_volume_mut().unwrap();
    scene_volume.channel_states[0].color = [1.0, 0.0, 0.0];
    renderer.render(&ctx, &target, &camera, &mut scene, &settings).unwrap();
    let px = center_pixel(&ctx, &target);
    assert!(px[0] > 0, "red sphere, got {px:?}");
    assert_eq!((px[1], px[2]), (0, 0));

    // and disabling the only channel leaves the clear color
    scene.get_mut(id).unwrap().as_volume_mut().unwrap().set_channel_enabled(0, false);
    renderer.render(&ctx, &target, &camera, &mut scene, &settings).unwrap();
    assert_eq!(renderer.bound_source(id), Some(FusedSlot::Primary));
    assert_eq!(center_pixel(&ctx, &target), [0, 0, 0, 255]);
}

#[test]
fn gpu_channel_state_edits_rebuild_only_changed_luts() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [16; 3]).unwrap();
    let ramp: Vec<u8> = (0..16 * 16 * 16).map(|i| (i % 256) as u8).collect();
    volume.add_channel(&ctx, &ramp, [16; 3]).unwrap();
    volume.add_channel(&ctx, &ramp, [16; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);
    let scene_volume = scene.get_mut(id).unwrap().as_volume_mut().unwrap();

    assert_eq!(scene_volume.apply_channel_states(&ctx).unwrap(), 2);
    assert_eq!(scene_volume.apply_channel_states(&ctx).unwrap(), 0);
    let default_alpha = scene_volume.volume.channel(0).unwrap().lut().rgba(200)[3];
    assert!(default_alpha > 0 && default_alpha < 255, "inside the default ramp");

    scene_volume.channel_states[0].window = (0.0, 0.5);
    scene_volume.set_channel_enabled(1, false);
    assert_eq!(scene_volume.apply_channel_states(&ctx).unwrap(), 1);
    assert_eq!(scene_volume.volume.channel(0).unwrap().lut().rgba(200)[3], 255);
    assert_eq!(scene_volume.volume.channel(1).unwrap().lut().rgba(200)[3], default_alpha);
}

#[test]
fn gpu_path_trace_progressive_counters() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [16; 3]).unwrap();
    volume.add_channel(&ctx, &sphere(16), [16; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);

    let target = OffscreenTarget::new(&ctx.device, 32, 32);
    let mut renderer =
        pollster::block_on(PathTraceRenderer::new(&ctx, OFFSCREEN_FORMAT, (32, 32))).unwrap();
    renderer.set_volume(&ctx, scene.get(id).unwrap()).unwrap();
    let mut camera = Camera::new(1.0);

    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    assert_eq!(renderer.frame_counter(), 0);
    assert_eq!(renderer.sample_counter(), 0);
    assert_eq!(renderer.last_uploads().len(), UniformSlot::ALL.len());
    assert!(!renderer.is_dirty(UniformSlot::Camera));

    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    assert_eq!(renderer.frame_counter(), 1);
    assert_eq!(renderer.sample_counter(), 1);
    assert_eq!(renderer.last_uploads(), vec![UniformSlot::Composite]);

    camera.orbit(0.2, 0.0);
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    assert_eq!(renderer.frame_counter(), 0);
    assert_eq!(renderer.sample_counter(), 0);
}

#[test]
fn gpu_path_trace_setters_mark_only_their_block() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [8; 3]).unwrap();
    volume.add_channel(&ctx, &vec![128; 512], [8; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);
    let target = OffscreenTarget::new(&ctx.device, 16, 16);
    let mut renderer =
        pollster::block_on(PathTraceRenderer::new(&ctx, OFFSCREEN_FORMAT, (16, 16))).unwrap();
    renderer.set_volume(&ctx, scene.get(id).unwrap()).unwrap();
    let camera = Camera::new(1.0);
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();

    renderer.set_exposure_slider(0.5);
    assert!(renderer.is_dirty(UniformSlot::Exposure));
    assert!(!renderer.is_dirty(UniformSlot::RenderParams));
    renderer.set_density_scale(10.0);
    assert!(renderer.is_dirty(UniformSlot::RenderParams));
    assert!(!renderer.is_dirty(UniformSlot::Lights));
    renderer.set_light(0, LightDesc::area());
    assert!(renderer.is_dirty(UniformSlot::Lights));
    assert!(!renderer.is_dirty(UniformSlot::Camera));

    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    // only camera changes restart accumulation
    assert_eq!(renderer.frame_counter(), 1);
    assert_eq!(renderer.params().density_scale, 10.0);
}

#[test]
fn gpu_path_trace_resize() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [16; 3]).unwrap();
    volume.add_channel(&ctx, &sphere(16), [16; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);

    let mut target = OffscreenTarget::new(&ctx.device, 32, 32);
    let mut renderer =
        pollster::block_on(PathTraceRenderer::new(&ctx, OFFSCREEN_FORMAT, (32, 32))).unwrap();
    renderer.set_volume(&ctx, scene.get(id).unwrap()).unwrap();
    let camera = Camera::new(1.0);
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    assert_eq!(renderer.frame_counter(), 1);

    target.set_size(&ctx.device, 48, 40);
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    assert_eq!(renderer.size(), (48, 40));
    assert_eq!(renderer.frame_counter(), 0);

    let pixels = pollster::block_on(target.get_pixels(&ctx)).unwrap();
    assert_eq!(pixels.len(), 48 * 40 * 4);
    assert!(pixels.chunks(4).all(|px| px[3] == 255), "tonemap writes opaque pixels");
}

#[test]
fn gpu_path_trace_applies_channel_states() {
    let ctx = gpu();
    let mut volume = Volume::new(&ctx, [1.0; 3], [16; 3]).unwrap();
    volume.add_channel(&ctx, &sphere(16), [16; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);
    let target = OffscreenTarget::new(&ctx.device, 16, 16);
    let mut renderer =
        pollster::block_on(PathTraceRenderer::new(&ctx, OFFSCREEN_FORMAT, (16, 16))).unwrap();
    renderer.set_volume(&ctx, scene.get(id).unwrap()).unwrap();
    let camera = Camera::new(1.0);
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    assert_eq!(renderer.frame_counter(), 1);

    let lut = |scene: &Scene| {
        let volume = &scene.get(id).unwrap().as_volume().unwrap().volume;
        volume.channel(0).unwrap().lut().rgba(255)
    };
    assert_eq!(lut(&scene)[..3], [255, 0, 255]);

    // a recolored channel reaches the LUT and restarts accumulation
    let scene_volume = scene.get_mut(id).unwrap().as_volume_mut().unwrap();
    scene_volume.channel_states[0].color = [0.0, 1.0, 0.0];
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    assert_eq!(lut(&scene)[..3], [0, 255, 0]);
    assert_eq!(renderer.frame_counter(), 0);

    // a channel loaded after the volume was placed gets a state and is traced
    let scene_volume = scene.get_mut(id).unwrap().as_volume_mut().unwrap();
    scene_volume.volume.add_channel(&ctx, &sphere(16), [16; 3]).unwrap();
    renderer.render(&ctx, &target, &camera, &mut scene).unwrap();
    let scene_volume = scene.get(id).unwrap().as_volume().unwrap();
    assert_eq!(scene_volume.channel_states.len(), 2);
    assert_eq!(renderer.params().n_channels, 2.0);
}

#[test]
fn gpu_wait_idle_succeeds_on_live_device() {
    let ctx = gpu();
    let target = OffscreenTarget::new(&ctx.device, 4, 4);
    ctx.queue.submit(std::iter::empty());
    ctx.wait_idle().unwrap();
    assert_eq!(pollster::block_on(target.get_pixels(&ctx)).unwrap().len(), 4 * 4 * 4);
}

#[test]
fn gpu_path_trace_requires_volume() {
    let ctx = gpu();
    let mut scene = Scene::new();
    let target = OffscreenTarget::new(&ctx.device, 8, 8);
    let mut renderer =
        pollster::block_on(PathTraceRenderer::new(&ctx, OFFSCREEN_FORMAT, (8, 8))).unwrap();
    let err = renderer
        .render(&ctx, &target, &Camera::new(1.0), &mut scene)
        .unwrap_err();
    assert!(matches!(err, RenderError::NoVolume));
}

#[test]
fn gpu_mesh_renderer_composites_over_volume_pass() {
    let ctx = gpu();
    let mut scene = Scene::new();
    let mesh = cube_mesh(&ctx.device, [1.0, 0.0, 0.0, 1.0]).unwrap();
    let id = scene.add_mesh(mesh, Mat4::from_scale(Vec3::splat(0.5)));
    let target = OffscreenTarget::new(&ctx.device, 32, 32);
    let camera = Camera::new(1.0);

    let mut volumes = pollster::block_on(RayMarchRenderer::new(&ctx, OFFSCREEN_FORMAT)).unwrap();
    let mut meshes = pollster::block_on(MeshRenderer::new(&ctx, OFFSCREEN_FORMAT)).unwrap();
    volumes
        .render(&ctx, &target, &camera, &mut scene, &VolumeRenderSettings::default())
        .unwrap();
    meshes.render(&ctx, &target, &camera, &scene).unwrap();
    assert_eq!(meshes.cached_objects(), 1);

    let pixels = pollster::block_on(target.get_pixels(&ctx)).unwrap();
    let center = ((16 * 32 + 16) * 4) as usize;
    assert_eq!(&pixels[center..center + 4], &[255, 0, 0, 255]);
    meshes.forget(id);
    assert_eq!(meshes.cached_objects(), 0);
}

#[test]
fn gpu_mesh_rejects_mismatched_colors() {
    let ctx = gpu();
    let err = Mesh::new(&ctx.device, &[[0.0; 3]; 3], &[[1.0; 4]; 2], &[0, 1, 2]);
    assert!(err.is_err());
    let err = Mesh::with_color(&ctx.device, &[[0.0; 3]; 3], [1.0; 4], &[0, 1, 3]);
    assert!(err.is_err());
}
