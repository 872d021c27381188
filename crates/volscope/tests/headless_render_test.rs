//! Headless rendering integration tests.
//!
//! These need a GPU adapter (real or software fallback) and fail without one.
//! On machines without a GPU they can be skipped with `cargo test -- --skip headless`.

use volscope::*;

fn graphics() -> Graphics {
    Graphics::init_headless_blocking(PowerPreference::LowPower)
        .unwrap_or_else(|e| panic!("no GPU adapter ({e}); skip with `cargo test -- --skip headless`"))
}

/// Checks that a pixel buffer is neither all black nor a single color.
fn has_nontrivial_content(pixels: &[u8], width: u32, height: u32) -> bool {
    let total = (width * height) as usize;
    assert_eq!(pixels.len(), total * 4, "pixel buffer size mismatch");

    let all_black = pixels.chunks(4).all(|px| px[0] == 0 && px[1] == 0 && px[2] == 0);
    let first = &pixels[0..4];
    let all_uniform = pixels.chunks(4).all(|px| px == first);

    !all_black && !all_uniform
}

/// A cube of side `n` holding a centered ball of intensity `value`.
fn ball(n: u32, value: u8) -> Vec<u8> {
    let c = (n as f32 - 1.0) / 2.0;
    let r = n as f32 / 3.0;
    let mut data = Vec::new();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let d = Vec3::new(x as f32 - c, y as f32 - c, z as f32 - c).length();
                data.push(if d <= r { value } else { 0 });
            }
        }
    }
    data
}

#[test]
fn test_init_logging_is_idempotent() {
    init_logging();
    init_logging();
}

#[test]
fn headless_create_volume_validates_size() {
    let graphics = graphics();
    assert!(graphics.create_volume(&[0; 7], [2, 2, 2], [1.0; 3]).is_err());
    let volume = graphics.create_volume(&[9; 24], [4, 3, 2], [4.0, 3.0, 2.0]).unwrap();
    assert_eq!(volume.channel_count(), 1);
    assert_eq!(volume.channel(0).unwrap().shape(), [2, 3, 4]);
    assert_eq!(volume.pixel_dims(), [4, 3, 2]);
}

#[test]
fn headless_empty_scene_is_background() {
    let graphics = graphics();
    let mut scene = Scene::new();
    let options = ViewerOptions::default()
        .with_size(40, 30)
        .with_volume_settings(VolumeRenderSettings::default());
    let pixels = render_to_image(&graphics, &mut scene, &Camera::new(1.0), &options).unwrap();
    assert_eq!(pixels.len(), 40 * 30 * 4);
    assert!(pixels.chunks(4).all(|px| px == [0, 0, 0, 255]));
}

#[test]
fn headless_ray_march_render_has_content() {
    let graphics = graphics();
    let volume = graphics.create_volume(&ball(32, 255), [32; 3], [1.0; 3]).unwrap();
    let mut scene = Scene::new();
    scene.add_volume(volume, Mat4::IDENTITY);

    let options = ViewerOptions::default().with_size(96, 64);
    let pixels = render_to_image(&graphics, &mut scene, &Camera::new(1.0), &options).unwrap();
    assert!(has_nontrivial_content(&pixels, 96, 64));
}

#[test]
fn headless_multichannel_render_has_content() {
    let graphics = graphics();
    let mut volume = graphics.create_empty_volume([16; 3], [1.0; 3]).unwrap();
    let ctx = graphics.context();
    volume.add_channel(ctx, &ball(16, 200), [16; 3]).unwrap();
    volume.add_channel(ctx, &ball(16, 90), [16; 3]).unwrap();
    let mut scene = Scene::new();
    let id = scene.add_volume(volume, Mat4::IDENTITY);
    let scene_volume = scene.get_mut(id).unwrap().as_volume_mut().unwrap();
    scene_volume.channel_states[1] = ChannelState::for_index(1)
        .with_color([0.0, 1.0, 0.0])
        .with_window(0.0, 1.0);

    let options = ViewerOptions::default().with_size(64, 64);
    let pixels = render_to_image(&graphics, &mut scene, &Camera::new(1.0), &options).unwrap();
    assert!(has_nontrivial_content(&pixels, 64, 64));
}

#[test]
fn headless_path_trace_requires_a_volume() {
    let graphics = graphics();
    let mut scene = Scene::new();
    let options = ViewerOptions::default()
        .with_size(16, 16)
        .with_renderer(RendererKind::PathTrace);
    let err = render_to_image(&graphics, &mut scene, &Camera::new(1.0), &options).unwrap_err();
    assert!(matches!(err, RenderError::NoVolume));
}

#[test]
fn headless_path_trace_render_to_file() {
    let graphics = graphics();
    let volume = graphics.create_volume(&ball(16, 255), [16; 3], [1.0; 3]).unwrap();
    let mut scene = Scene::new();
    scene.add_volume(volume, Mat4::IDENTITY);

    let options = ViewerOptions::default()
        .with_size(32, 24)
        .with_renderer(RendererKind::PathTrace);
    let path = std::env::temp_dir().join(format!("volscope_pt_{}.png", std::process::id()));
    render_to_file(&path, &graphics, &mut scene, &Camera::new(1.0), &options).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    let _ = std::fs::remove_file(&path);
}
