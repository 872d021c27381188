//! Uniform block layouts of the path-trace and tonemap shaders.
//!
//! Every struct is a positional float block. Field order and padding match the
//! WGSL declarations in `shaders/ptvolume.wgsl` and `shaders/tonemap.wgsl`, so
//! the sizes asserted in the tests below must not change.

use glam::{Mat4, Vec3};
use volscope_core::PathTraceSettings;

use crate::camera::{Camera, RayProjection};

/// Largest slider value used by [`exposure_from_slider`].
pub const MAX_EXPOSURE_SLIDER: f32 = 0.99999;

/// Area light.
pub const LIGHT_TYPE_AREA: u32 = 0;
/// Spherical sky light.
pub const LIGHT_TYPE_SKY: u32 = 1;

/// Camera basis and screen rectangle in the volume's local frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub from: [f32; 3],
    pub _pad0: f32,
    pub u: [f32; 3],
    pub _pad1: f32,
    pub v: [f32; 3],
    pub _pad2: f32,
    pub n: [f32; 3],
    pub _pad3: f32,
    /// Left, right, top, bottom of the view plane at unit distance.
    pub screen: [f32; 4],
    /// View-plane step per pixel along x and y.
    pub inv_screen: [f32; 2],
    pub _pad4: [f32; 2],
    pub focal_distance: f32,
    pub aperture_size: f32,
    pub is_perspective: f32,
    pub _pad5: f32,
}

/// Orthonormal camera frame: `n` looks from the eye toward the target.
#[must_use]
pub fn camera_basis(direction: Vec3, up: Vec3) -> (Vec3, Vec3, Vec3) {
    let n = direction.normalize_or_zero();
    let u = n.cross(up).normalize_or_zero();
    let v = u.cross(n).normalize_or_zero();
    (n, u, v)
}

impl CameraUniforms {
    /// Builds the camera block for a `width` x `height` target.
    ///
    /// `world_to_object` maps world space into the volume's local frame; the
    /// eye position, view direction and up vector are all carried through it.
    #[must_use]
    pub fn from_camera(
        camera: &Camera,
        projection: RayProjection,
        world_to_object: Mat4,
        width: u32,
        height: u32,
    ) -> Self {
        let from = world_to_object.transform_point3(camera.position());
        let direction = world_to_object.transform_vector3(camera.target() - camera.position());
        let up = world_to_object.transform_vector3(camera.up());
        let (n, u, v) = camera_basis(direction, up);

        let (scale, is_perspective) = match projection {
            RayProjection::Perspective { fov } => ((0.5 * fov).tan(), 1.0),
            RayProjection::Orthographic { scale } => (scale, 0.0),
        };
        let aspect = camera.aspect();
        // pixel row 0 sits at +scale
        let screen = [-scale * aspect, scale * aspect, scale, -scale];
        let inv_screen = [
            (screen[1] - screen[0]) / width.max(1) as f32,
            (screen[3] - screen[2]) / height.max(1) as f32,
        ];

        Self {
            from: from.to_array(),
            u: u.to_array(),
            v: v.to_array(),
            n: n.to_array(),
            screen,
            inv_screen,
            focal_distance: camera.focal_distance(),
            aperture_size: camera.aperture_size(),
            is_perspective,
            ..bytemuck::Zeroable::zeroed()
        }
    }
}

/// Parameters of one light, as given by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDesc {
    /// [`LIGHT_TYPE_AREA`] or [`LIGHT_TYPE_SKY`].
    pub light_type: u32,
    /// Azimuth in radians.
    pub theta: f32,
    /// Polar angle in radians.
    pub phi: f32,
    pub width: f32,
    pub height: f32,
    pub distance: f32,
    pub sky_radius: f32,
    pub target: Vec3,
}

impl LightDesc {
    /// The default area light, ten units above the origin.
    #[must_use]
    pub fn area() -> Self {
        Self {
            light_type: LIGHT_TYPE_AREA,
            theta: 0.0,
            phi: std::f32::consts::FRAC_PI_2,
            width: 1.0,
            height: 1.0,
            distance: 10.0,
            sky_radius: 1000.0,
            target: Vec3::ZERO,
        }
    }

    /// The default sky light.
    #[must_use]
    pub fn sky() -> Self {
        Self {
            light_type: LIGHT_TYPE_SKY,
            ..Self::area()
        }
    }
}

/// One light source.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniforms {
    pub theta: f32,
    pub phi: f32,
    pub width: f32,
    pub half_width: f32,
    pub height: f32,
    pub half_height: f32,
    pub distance: f32,
    pub sky_radius: f32,
    pub area: f32,
    pub area_pdf: f32,
    pub light_type: f32,
    pub _pad0: f32,
    pub position: [f32; 3],
    pub _pad1: f32,
    pub target: [f32; 3],
    pub _pad2: f32,
    pub n: [f32; 3],
    pub _pad3: f32,
    pub u: [f32; 3],
    pub _pad4: f32,
    pub v: [f32; 3],
    pub _pad5: f32,
    pub color: [f32; 3],
    pub _pad6: f32,
    pub color_top: [f32; 3],
    pub _pad7: f32,
    pub color_middle: [f32; 3],
    pub _pad8: f32,
    pub color_bottom: [f32; 3],
    pub _pad9: f32,
}

/// Light frame for a forward direction `n`, switching the up reference to +X
/// when `n` is parallel to +Y.
#[must_use]
pub fn light_basis(n: Vec3) -> (Vec3, Vec3) {
    let reference = if n.y.abs() == 1.0 { Vec3::X } else { Vec3::Y };
    let u = n.cross(reference).normalize_or_zero();
    let v = n.cross(u).normalize_or_zero();
    (u, v)
}

impl LightUniforms {
    /// Places a light on a sphere of radius `distance` and points it at its target.
    ///
    /// Sky lights ignore `desc.target` and aim one unit along +Z from their position.
    #[must_use]
    pub fn make_light(desc: &LightDesc) -> Self {
        let (sin_phi, cos_phi) = desc.phi.sin_cos();
        let (sin_theta, cos_theta) = desc.theta.sin_cos();
        let position = desc.distance * Vec3::new(sin_phi * sin_theta, sin_phi * cos_theta, cos_phi);

        let (target, area) = if desc.light_type == LIGHT_TYPE_SKY {
            (
                position + Vec3::Z,
                4.0 * std::f32::consts::PI * desc.sky_radius * desc.sky_radius,
            )
        } else {
            (desc.target, desc.width * desc.height)
        };

        let n = (target - position).normalize_or_zero();
        let (u, v) = light_basis(n);
        let white = [1.0; 3];

        Self {
            theta: desc.theta,
            phi: desc.phi,
            width: desc.width,
            half_width: 0.5 * desc.width,
            height: desc.height,
            half_height: 0.5 * desc.height,
            distance: desc.distance,
            sky_radius: desc.sky_radius,
            area,
            area_pdf: if area > 0.0 { 1.0 / area } else { 0.0 },
            light_type: desc.light_type as f32,
            position: position.to_array(),
            target: target.to_array(),
            n: n.to_array(),
            u: u.to_array(),
            v: v.to_array(),
            color: white,
            color_top: white,
            color_middle: white,
            color_bottom: white,
            ..bytemuck::Zeroable::zeroed()
        }
    }
}

/// Global march parameters derived from the bound volume.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalParamsUniforms {
    pub clipped_aabb_min: [f32; 3],
    pub _pad0: f32,
    pub clipped_aabb_max: [f32; 3],
    pub density_scale: f32,
    pub step_size: f32,
    pub step_size_shadow: f32,
    pub _pad1: [f32; 2],
    pub inv_aabb_size: [f32; 3],
    pub n_channels: f32,
    pub shading_type: f32,
    pub _pad2: [f32; 3],
    pub gradient_delta_x: [f32; 3],
    pub _pad3: f32,
    pub gradient_delta_y: [f32; 3],
    pub _pad4: f32,
    pub gradient_delta_z: [f32; 3],
    pub inv_gradient_delta: f32,
    pub gradient_factor: f32,
    pub show_lights: f32,
    pub _pad5: [f32; 2],
}

impl GlobalParamsUniforms {
    /// Computes the parameters for a volume centered at the origin.
    ///
    /// `physical_dims` and `pixel_dims` are in x, y, z order.
    #[must_use]
    pub fn for_volume(
        physical_dims: Vec3,
        pixel_dims: [u32; 3],
        n_channels: usize,
        settings: &PathTraceSettings,
    ) -> Self {
        let largest = pixel_dims.iter().copied().max().unwrap_or(1).max(1);
        let gradient_delta = 1.0 / largest as f32;
        let half = 0.5 * physical_dims;

        Self {
            clipped_aabb_min: (-half).to_array(),
            clipped_aabb_max: half.to_array(),
            density_scale: settings.density_scale,
            step_size: gradient_delta * settings.step_size_multiplier,
            step_size_shadow: gradient_delta * settings.shadow_step_size_multiplier,
            inv_aabb_size: physical_dims.recip().to_array(),
            n_channels: n_channels.min(volscope_core::MAX_FUSED_CHANNELS) as f32,
            shading_type: settings.shading_type as f32,
            gradient_delta_x: [gradient_delta, 0.0, 0.0],
            gradient_delta_y: [0.0, gradient_delta, 0.0],
            gradient_delta_z: [0.0, 0.0, gradient_delta],
            inv_gradient_delta: 1.0 / gradient_delta,
            gradient_factor: settings.gradient_factor,
            show_lights: if settings.show_lights { 1.0 } else { 0.0 },
            ..bytemuck::Zeroable::zeroed()
        }
    }

    /// Applies the user-tunable part of `settings`, keeping the volume geometry.
    pub fn apply_settings(&mut self, settings: &PathTraceSettings) {
        let gradient_delta = 1.0 / self.inv_gradient_delta;
        self.density_scale = settings.density_scale;
        self.step_size = gradient_delta * settings.step_size_multiplier;
        self.step_size_shadow = gradient_delta * settings.shadow_step_size_multiplier;
        self.shading_type = settings.shading_type as f32;
        self.gradient_factor = settings.gradient_factor;
        self.show_lights = if settings.show_lights { 1.0 } else { 0.0 };
    }
}

impl Default for GlobalParamsUniforms {
    fn default() -> Self {
        Self::for_volume(Vec3::ONE, [1, 1, 1], 0, &PathTraceSettings::default())
    }
}

/// Optical properties of up to four channel slots.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ChannelsUniforms {
    pub intensity_max: [f32; 4],
    pub intensity_min: [f32; 4],
    pub opacity: [f32; 4],
    pub emissive: [[f32; 4]; 4],
    pub diffuse: [[f32; 4]; 4],
    pub specular: [[f32; 4]; 4],
    pub roughness: [f32; 4],
}

impl ChannelsUniforms {
    /// The fixed per-slot material: red, green, blue and white diffuse, no
    /// emission, black specular, zero roughness.
    ///
    /// Slots are assigned these values whatever the channel data or tint.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            intensity_max: [1.0; 4],
            intensity_min: [0.0; 4],
            opacity: [1.0; 4],
            emissive: [[0.0; 4]; 4],
            diffuse: [
                [1.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 1.0],
                [0.0, 0.0, 1.0, 1.0],
                [1.0, 1.0, 1.0, 1.0],
            ],
            specular: [[0.0, 0.0, 0.0, 1.0]; 4],
            roughness: [0.0; 4],
        }
    }
}

impl Default for ChannelsUniforms {
    fn default() -> Self {
        Self::placeholder()
    }
}

/// Progressive accumulation counters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProgressiveUniforms {
    pub frame_counter: f32,
    pub sample_counter: f32,
    pub resolution: [f32; 2],
}

/// Tonemap exposure.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ExposureUniforms {
    pub exposure: f32,
    pub _pad: [f32; 3],
}

impl ExposureUniforms {
    #[must_use]
    pub fn from_slider(slider: f32) -> Self {
        Self {
            exposure: exposure_from_slider(slider),
            _pad: [0.0; 3],
        }
    }
}

/// Maps a `0..=1` slider to an exposure in `0..~1e5`.
#[must_use]
pub fn exposure_from_slider(slider: f32) -> f32 {
    let e = slider.min(MAX_EXPOSURE_SLIDER);
    1.0 / (1.0 - e) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_block_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 112);
        assert_eq!(std::mem::size_of::<LightUniforms>(), 192);
        assert_eq!(std::mem::size_of::<GlobalParamsUniforms>(), 144);
        assert_eq!(std::mem::size_of::<ChannelsUniforms>(), 256);
        assert_eq!(std::mem::size_of::<ProgressiveUniforms>(), 16);
        assert_eq!(std::mem::size_of::<ExposureUniforms>(), 16);
    }

    /// Float index of the first slot holding `marker`.
    fn slot_of<T: bytemuck::Pod>(block: &T, marker: f32) -> usize {
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(block));
        floats.iter().position(|&f| f == marker).unwrap()
    }

    #[test]
    fn test_field_offsets() {
        let camera = CameraUniforms {
            screen: [7.0, 0.0, 0.0, 0.0],
            inv_screen: [8.0, 0.0],
            focal_distance: 9.0,
            ..bytemuck::Zeroable::zeroed()
        };
        assert_eq!(slot_of(&camera, 7.0) * 4, 64);
        assert_eq!(slot_of(&camera, 8.0) * 4, 80);
        assert_eq!(slot_of(&camera, 9.0) * 4, 96);

        let light = LightUniforms {
            position: [7.0, 0.0, 0.0],
            color_bottom: [8.0, 0.0, 0.0],
            ..bytemuck::Zeroable::zeroed()
        };
        assert_eq!(slot_of(&light, 7.0) * 4, 48);
        assert_eq!(slot_of(&light, 8.0) * 4, 176);

        let params = GlobalParamsUniforms {
            density_scale: 7.0,
            n_channels: 8.0,
            inv_gradient_delta: 9.0,
            ..bytemuck::Zeroable::zeroed()
        };
        assert_eq!(slot_of(&params, 7.0) * 4, 28);
        assert_eq!(slot_of(&params, 8.0) * 4, 60);
        assert_eq!(slot_of(&params, 9.0) * 4, 124);

        let channels = ChannelsUniforms {
            roughness: [7.0; 4],
            ..bytemuck::Zeroable::zeroed()
        };
        assert_eq!(slot_of(&channels, 7.0) * 4, 240);
    }

    #[test]
    fn test_exposure_clamp() {
        let at_limit = exposure_from_slider(MAX_EXPOSURE_SLIDER);
        assert_eq!(exposure_from_slider(1.0), at_limit);
        assert_eq!(exposure_from_slider(5.0), at_limit);
        assert!(at_limit.is_finite());
        assert_eq!(exposure_from_slider(0.0), 0.0);
        assert!((exposure_from_slider(0.75) - 3.0).abs() < 1e-5);
        assert!((exposure_from_slider(0.5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_basis_default_view() {
        let camera = Camera::new(1.0);
        let uniforms = CameraUniforms::from_camera(
            &camera,
            camera.ray_projection_or_default(),
            Mat4::IDENTITY,
            100,
            50,
        );
        assert!(approx(Vec3::from(uniforms.n), Vec3::NEG_Z));
        assert!(approx(Vec3::from(uniforms.u), Vec3::X));
        assert!(approx(Vec3::from(uniforms.v), Vec3::Y));
        assert_eq!(uniforms.from, [0.0, 0.0, 2.0]);
        assert_eq!(uniforms.is_perspective, 1.0);

        let s = (0.5 * camera.fov()).tan();
        assert!((uniforms.screen[1] - s).abs() < 1e-6);
        assert!((uniforms.screen[2] - s).abs() < 1e-6);
        assert!((uniforms.inv_screen[0] - 2.0 * s / 100.0).abs() < 1e-6);
        assert!((uniforms.inv_screen[1] + 2.0 * s / 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_in_object_space() {
        let camera = Camera::new(1.0);
        let object = Mat4::from_translation(Vec3::new(0.0, 0.0, 1.0));
        let uniforms = CameraUniforms::from_camera(
            &camera,
            RayProjection::Orthographic { scale: 2.0 },
            object.inverse(),
            10,
            10,
        );
        assert!(approx(Vec3::from(uniforms.from), Vec3::new(0.0, 0.0, 1.0)));
        assert!(approx(Vec3::from(uniforms.n), Vec3::NEG_Z));
        assert_eq!(uniforms.is_perspective, 0.0);
        assert_eq!(uniforms.screen, [-2.0, 2.0, 2.0, -2.0]);
    }

    #[test]
    fn test_light_basis_singularity() {
        let (u, v) = light_basis(Vec3::Y);
        assert!(u.length() > 0.99);
        assert!(v.length() > 0.99);
        assert!(approx(u, Vec3::NEG_Z));

        let (u, v) = light_basis(Vec3::NEG_Y);
        assert!(u.length() > 0.99 && v.length() > 0.99);
    }

    #[test]
    fn test_sky_light_targets_plus_z() {
        let light = LightUniforms::make_light(&LightDesc::sky());
        let p = Vec3::from(light.position);
        assert!(approx(Vec3::from(light.target), p + Vec3::Z));
        assert!(approx(Vec3::from(light.n), Vec3::Z));
        let expected_area = 4.0 * std::f32::consts::PI * 1000.0 * 1000.0;
        assert!((light.area - expected_area).abs() / expected_area < 1e-6);
        assert_eq!(light.light_type, 1.0);
    }

    #[test]
    fn test_area_light_uses_height() {
        let desc = LightDesc {
            width: 2.0,
            height: 3.0,
            ..LightDesc::area()
        };
        let light = LightUniforms::make_light(&desc);
        assert_eq!(light.height, 3.0);
        assert_eq!(light.half_height, 1.5);
        assert_eq!(light.area, 6.0);
        assert!((light.area_pdf - 1.0 / 6.0).abs() < 1e-7);
        // the default light sits on +Y looking at the origin
        assert!((light.position[1] - 10.0).abs() < 1e-4);
        assert!(light.n[1] < -0.999);
        assert_eq!(light.color, [1.0; 3]);
    }

    #[test]
    fn test_global_params_for_volume() {
        let params = GlobalParamsUniforms::for_volume(
            Vec3::new(2.0, 1.0, 0.5),
            [64, 32, 16],
            6,
            &PathTraceSettings::default(),
        );
        assert_eq!(params.clipped_aabb_min, [-1.0, -0.5, -0.25]);
        assert_eq!(params.clipped_aabb_max, [1.0, 0.5, 0.25]);
        assert_eq!(params.inv_aabb_size, [0.5, 1.0, 2.0]);
        assert_eq!(params.step_size, 1.0 / 64.0);
        assert_eq!(params.inv_gradient_delta, 64.0);
        assert_eq!(params.gradient_delta_y, [0.0, 1.0 / 64.0, 0.0]);
        assert_eq!(params.n_channels, 4.0);
        assert_eq!(params.density_scale, 30.5);
        assert_eq!(params.gradient_factor, 0.5);
    }

    #[test]
    fn test_apply_settings_keeps_geometry() {
        let mut params = GlobalParamsUniforms::for_volume(
            Vec3::ONE,
            [10, 20, 40],
            2,
            &PathTraceSettings::default(),
        );
        let settings = PathTraceSettings {
            density_scale: 5.0,
            step_size_multiplier: 2.0,
            show_lights: true,
            ..PathTraceSettings::default()
        };
        params.apply_settings(&settings);
        assert_eq!(params.density_scale, 5.0);
        assert!((params.step_size - 2.0 / 40.0).abs() < 1e-7);
        assert_eq!(params.show_lights, 1.0);
        assert_eq!(params.n_channels, 2.0);
    }

    #[test]
    fn test_placeholder_channels() {
        let c = ChannelsUniforms::placeholder();
        assert_eq!(c.diffuse[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(c.diffuse[3], [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(c.specular[2], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(c.opacity, [1.0; 4]);
    }
}
