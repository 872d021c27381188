//! Interactive viewer for a synthetic three-channel volume.
//!
//! Drag with the left mouse button to orbit, scroll to zoom, press `P` to
//! switch between the ray marcher and the path tracer, and `Escape` to quit.
//! An optional first argument names a JSON `ViewerOptions` file.
//!
//! Run with: `cargo run --example volume_viewer -- [options.json]`

use std::sync::Arc;

use glam::{Mat4, Vec3};
use volscope::{
    init_logging, Camera, Graphics, PathTraceRenderer, RayMarchRenderer, RenderTarget,
    RendererKind, Scene, SurfaceTarget, ViewerOptions, Volume,
};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const SIZE: u32 = 64;

/// Three overlapping shapes, one per channel: a ball, a shell and a slab.
fn synthetic_channels() -> [Vec<u8>; 3] {
    let n = SIZE as usize;
    let c = (SIZE as f32 - 1.0) / 2.0;
    let mut ball = Vec::with_capacity(n * n * n);
    let mut shell = Vec::with_capacity(n * n * n);
    let mut slab = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let p = Vec3::new(x as f32 - c, y as f32 - c, z as f32 - c);
                let d = p.length() / c;
                ball.push(if d < 0.45 { (255.0 * (1.0 - d)) as u8 } else { 0 });
                shell.push(if (0.6..0.75).contains(&d) { 180 } else { 0 });
                slab.push(if p.y.abs() < 4.0 && d < 0.95 { 120 } else { 0 });
            }
        }
    }
    [ball, shell, slab]
}

struct Viewer {
    options: ViewerOptions,
    window: Option<Arc<Window>>,
    graphics: Option<Graphics>,
    target: Option<SurfaceTarget>,
    ray_march: Option<RayMarchRenderer>,
    path_trace: Option<PathTraceRenderer>,
    scene: Scene,
    camera: Camera,
    renderer: RendererKind,
    dragging: bool,
    mouse: (f64, f64),
}

impl Viewer {
    fn new(options: ViewerOptions) -> Self {
        let renderer = options.renderer;
        Self {
            options,
            window: None,
            graphics: None,
            target: None,
            ray_march: None,
            path_trace: None,
            scene: Scene::new(),
            camera: Camera::new(1.0),
            renderer,
            dragging: false,
            mouse: (0.0, 0.0),
        }
    }

    fn build_scene(&mut self, graphics: &Graphics) -> volscope::RenderResult<()> {
        let ctx = graphics.context();
        let mut volume: Volume = graphics.create_empty_volume([SIZE; 3], [1.0, 1.0, 1.0])?;
        for data in &synthetic_channels() {
            volume.add_channel(ctx, data, [SIZE as usize; 3])?;
        }
        let id = self.scene.add_volume(volume, Mat4::IDENTITY);
        // palette tints come with the default states; widen every window
        if let Some(scene_volume) = self.scene.get_mut(id).and_then(|o| o.as_volume_mut()) {
            for state in &mut scene_volume.channel_states {
                state.window = (0.1, 0.99);
            }
        }
        self.camera.look_at_box(Vec3::splat(-0.5), Vec3::splat(0.5));
        Ok(())
    }

    fn render(&mut self) {
        let (Some(graphics), Some(target)) = (&self.graphics, &mut self.target) else {
            return;
        };
        let ctx = graphics.context();
        if let Err(e) = target.swap(ctx) {
            log::warn!("skipping frame: {e}");
            return;
        }

        let result = match self.renderer {
            RendererKind::RayMarch => self.ray_march.as_mut().map(|r| {
                r.render(ctx, &*target, &self.camera, &mut self.scene, &self.options.volume)
            }),
            RendererKind::PathTrace => self
                .path_trace
                .as_mut()
                .map(|r| r.render(ctx, &*target, &self.camera, &mut self.scene)),
        };
        if let Some(Err(e)) = result {
            log::error!("render failed: {e}");
        }
        target.present();
    }

    fn toggle_renderer(&mut self) {
        self.renderer = match self.renderer {
            RendererKind::RayMarch => RendererKind::PathTrace,
            RendererKind::PathTrace => RendererKind::RayMarch,
        };
        if let Some(renderer) = &mut self.path_trace {
            renderer.reset_accumulation();
        }
        log::info!("switched to {:?}", self.renderer);
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.options.title.clone())
            .with_inner_size(LogicalSize::new(self.options.width, self.options.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .expect("failed to create window"),
        );

        let (graphics, target) = Graphics::init_blocking(window.clone(), self.options.power_preference)
            .expect("failed to initialize graphics");
        self.build_scene(&graphics).expect("failed to build the demo volume");

        let format = target.color_format();
        let (width, height) = (target.width(), target.height());
        self.camera.set_aspect_ratio(width as f32 / height as f32);

        let mut ray_march = graphics
            .create_ray_march_renderer(format)
            .expect("failed to create ray marcher");
        ray_march.set_clear_color(self.options.background_color);

        let mut path_trace = graphics
            .create_path_trace_renderer(format, width, height)
            .expect("failed to create path tracer");
        path_trace.set_settings(&self.options.path_trace);
        if let Some(object) = self.scene.first_volume() {
            path_trace
                .set_volume(graphics.context(), object)
                .expect("failed to bind the volume");
        }

        self.ray_march = Some(ray_march);
        self.path_trace = Some(path_trace);
        self.graphics = Some(graphics);
        self.target = Some(target);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let (Some(graphics), Some(target)) = (&self.graphics, &mut self.target) {
                    target.resize(graphics.context(), size.width, size.height);
                }
                if size.height > 0 {
                    self.camera
                        .set_aspect_ratio(size.width as f32 / size.height as f32);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = state == ElementState::Pressed;
            }
            WindowEvent::CursorMoved { position, .. } => {
                let dx = position.x - self.mouse.0;
                let dy = position.y - self.mouse.1;
                self.mouse = (position.x, position.y);
                if self.dragging {
                    self.camera.orbit(dx as f32 * 0.01, dy as f32 * 0.01);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 * 0.02,
                };
                self.camera.zoom(scroll * 0.1);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::KeyP) => self.toggle_renderer(),
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

fn main() {
    init_logging();

    let options = match std::env::args().nth(1) {
        Some(path) => ViewerOptions::load(&path).unwrap_or_else(|e| {
            log::warn!("could not read {path}: {e}; using defaults");
            ViewerOptions::default()
        }),
        None => ViewerOptions::default(),
    };

    let event_loop = EventLoop::new().expect("failed to create event loop");
    let mut viewer = Viewer::new(options);
    event_loop.run_app(&mut viewer).expect("event loop error");
}
