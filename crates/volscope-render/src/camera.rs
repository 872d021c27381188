//! Camera and view management.
//!
//! Matrices are recomputed lazily after a pose or projection change. Every change
//! also bumps [`Camera::generation`], which renderers compare against the value
//! they last saw to decide whether progressive accumulation must restart.

use std::cell::Cell;

use glam::{Mat4, Vec3};

use crate::error::{RenderError, RenderResult};

/// Camera projection mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ProjectionMode {
    /// Perspective projection.
    #[default]
    Perspective,
    /// Orthographic projection.
    Orthographic,
    /// Arbitrary projection matrix. The volume renderers cannot build rays for it.
    Custom(Mat4),
}

/// Projection description needed to generate primary rays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayProjection {
    /// Pinhole camera with vertical field of view in radians.
    Perspective { fov: f32 },
    /// Parallel rays over a view plane of half-height `scale`.
    Orthographic { scale: f32 },
}

/// A 3D camera for viewing the scene.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov: f32,
    aspect_ratio: f32,
    near: f32,
    far: f32,
    projection_mode: ProjectionMode,
    ortho_scale: f32,
    focal_distance: f32,
    aperture_size: f32,
    generation: u64,
    view_cache: Cell<Option<Mat4>>,
    projection_cache: Cell<Option<Mat4>>,
}

impl Camera {
    /// Creates a new camera with default settings.
    #[must_use]
    pub fn new(aspect_ratio: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4,
            aspect_ratio,
            near: 0.01,
            far: 100.0,
            projection_mode: ProjectionMode::Perspective,
            ortho_scale: 1.0,
            focal_distance: 0.0,
            aperture_size: 0.0,
            generation: 0,
            view_cache: Cell::new(None),
            projection_cache: Cell::new(None),
        }
    }

    fn touch_view(&mut self) {
        self.generation += 1;
        self.view_cache.set(None);
    }

    fn touch_projection(&mut self) {
        self.generation += 1;
        self.projection_cache.set(None);
    }

    /// Returns a counter that changes on every pose or projection change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Camera position in world space.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Point the camera is looking at.
    #[must_use]
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Up vector.
    #[must_use]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Vertical field of view in radians.
    #[must_use]
    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// Aspect ratio (width / height).
    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.aspect_ratio
    }

    /// Near clipping plane.
    #[must_use]
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Far clipping plane.
    #[must_use]
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Orthographic half-height.
    #[must_use]
    pub fn ortho_scale(&self) -> f32 {
        self.ortho_scale
    }

    /// Focus distance for depth of field. Zero disables it.
    #[must_use]
    pub fn focal_distance(&self) -> f32 {
        self.focal_distance
    }

    /// Lens aperture for depth of field. Zero disables it.
    #[must_use]
    pub fn aperture_size(&self) -> f32 {
        self.aperture_size
    }

    /// Projection mode.
    #[must_use]
    pub fn projection_mode(&self) -> ProjectionMode {
        self.projection_mode
    }

    /// Returns true for a perspective camera.
    #[must_use]
    pub fn is_perspective(&self) -> bool {
        matches!(self.projection_mode, ProjectionMode::Perspective)
    }

    /// Returns true for an orthographic camera.
    #[must_use]
    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection_mode, ProjectionMode::Orthographic)
    }

    /// Sets the position.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.touch_view();
    }

    /// Sets the look-at target.
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.touch_view();
    }

    /// Sets the up vector.
    pub fn set_up(&mut self, up: Vec3) {
        self.up = up;
        self.touch_view();
    }

    /// Sets the aspect ratio.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.touch_projection();
    }

    /// Switches to a perspective projection.
    pub fn set_perspective(&mut self, aspect_ratio: f32, fov: f32, near: f32, far: f32) {
        self.aspect_ratio = aspect_ratio;
        self.fov = fov.clamp(0.1, std::f32::consts::PI - 0.1);
        self.near = near.max(0.001);
        self.far = far.max(self.near + 0.1);
        self.projection_mode = ProjectionMode::Perspective;
        self.touch_projection();
    }

    /// Switches to an orthographic projection with half-height `scale`.
    pub fn set_orthographic(&mut self, scale: f32) {
        self.ortho_scale = scale.max(0.01);
        self.projection_mode = ProjectionMode::Orthographic;
        self.touch_projection();
    }

    /// Uses an arbitrary projection matrix.
    pub fn set_custom_projection(&mut self, projection: Mat4) {
        self.projection_mode = ProjectionMode::Custom(projection);
        self.touch_projection();
    }

    /// Sets depth-of-field parameters.
    pub fn set_lens(&mut self, focal_distance: f32, aperture_size: f32) {
        self.focal_distance = focal_distance.max(0.0);
        self.aperture_size = aperture_size.max(0.0);
        self.touch_projection();
    }

    /// Returns the view matrix.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        if let Some(m) = self.view_cache.get() {
            return m;
        }
        let m = Mat4::look_at_rh(self.position, self.target, self.up);
        self.view_cache.set(Some(m));
        m
    }

    /// Returns the projection matrix.
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        if let Some(m) = self.projection_cache.get() {
            return m;
        }
        let m = match self.projection_mode {
            ProjectionMode::Perspective => {
                Mat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let half_height = self.ortho_scale;
                let half_width = half_height * self.aspect_ratio;
                let depth = ((self.position - self.target).length() + self.far)
                    .max(self.ortho_scale * 100.0);
                Mat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    -depth,
                    depth,
                )
            }
            ProjectionMode::Custom(m) => m,
        };
        self.projection_cache.set(Some(m));
        m
    }

    /// Returns the combined view-projection matrix.
    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Returns how primary rays are generated, or an error for custom projections.
    pub fn ray_projection(&self) -> RenderResult<RayProjection> {
        match self.projection_mode {
            ProjectionMode::Perspective => Ok(RayProjection::Perspective { fov: self.fov }),
            ProjectionMode::Orthographic => Ok(RayProjection::Orthographic {
                scale: self.ortho_scale,
            }),
            ProjectionMode::Custom(_) => Err(RenderError::UnsupportedCamera(
                "custom projection matrix".to_string(),
            )),
        }
    }

    /// Like [`Self::ray_projection`] but logs and falls back to this camera's
    /// field of view as a perspective projection.
    #[must_use]
    pub fn ray_projection_or_default(&self) -> RayProjection {
        self.ray_projection().unwrap_or_else(|e| {
            log::warn!("{e}; rendering with a perspective projection");
            RayProjection::Perspective { fov: self.fov }
        })
    }

    /// Returns the camera's forward direction.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Returns the camera's right direction.
    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    /// Orbits the camera around the target.
    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        let offset = self.position - self.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        theta -= delta_x;
        phi = (phi - delta_y).clamp(0.01, std::f32::consts::PI - 0.01);

        self.position = self.target
            + Vec3::new(
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
                radius * phi.sin() * theta.cos(),
            );
        self.touch_view();
    }

    /// Zooms the camera (moves toward/away from target for perspective,
    /// adjusts the ortho scale otherwise).
    pub fn zoom(&mut self, delta: f32) {
        if self.is_orthographic() {
            let zoom_factor = 1.0 - delta * 0.4;
            self.ortho_scale = (self.ortho_scale * zoom_factor).clamp(0.01, 1000.0);
            self.touch_projection();
        } else {
            let direction = self.forward();
            let distance = (self.position - self.target).length();
            let new_distance = (distance - delta).max(0.1);
            self.position = self.target - direction * new_distance;
            self.touch_view();
        }
    }

    /// Frames an axis-aligned box.
    pub fn look_at_box(&mut self, min: Vec3, max: Vec3) {
        let center = (min + max) * 0.5;
        let size = (max - min).length();
        let extents = max - min;

        self.target = center;
        self.position = center + Vec3::new(0.0, 0.0, size * 1.5);
        self.near = size * 0.001;
        self.far = size * 100.0;
        self.ortho_scale = (extents.y.max(extents.x / self.aspect_ratio) * 0.6).max(0.1);
        self.touch_view();
        self.touch_projection();
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(16.0 / 9.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_mode_perspective() {
        let camera = Camera::new(1.0);
        let proj = camera.projection_matrix();
        assert!(proj.w_axis.z != 0.0);
        assert!(camera.is_perspective());
    }

    #[test]
    fn test_projection_mode_orthographic() {
        let mut camera = Camera::new(1.0);
        camera.set_orthographic(5.0);
        let proj = camera.projection_matrix();
        assert!((proj.w_axis.w - 1.0).abs() < 0.001);
        assert!(camera.is_orthographic());
    }

    #[test]
    fn test_cached_matrices_refresh_after_change() {
        let mut camera = Camera::new(1.0);
        let before = camera.view_matrix();
        assert_eq!(camera.view_matrix(), before);
        camera.set_position(Vec3::new(3.0, 0.0, 0.0));
        assert_ne!(camera.view_matrix(), before);
    }

    #[test]
    fn test_generation_bumps_on_change() {
        let mut camera = Camera::new(1.0);
        let g0 = camera.generation();
        let _ = camera.view_matrix();
        assert_eq!(camera.generation(), g0);
        camera.orbit(0.1, 0.0);
        assert!(camera.generation() > g0);
        let g1 = camera.generation();
        camera.set_aspect_ratio(2.0);
        assert!(camera.generation() > g1);
    }

    #[test]
    fn test_custom_projection_is_unsupported_for_rays() {
        let mut camera = Camera::new(1.0);
        camera.set_custom_projection(Mat4::IDENTITY);
        assert!(matches!(
            camera.ray_projection(),
            Err(RenderError::UnsupportedCamera(_))
        ));
        assert_eq!(
            camera.ray_projection_or_default(),
            RayProjection::Perspective { fov: camera.fov() }
        );
        assert_eq!(camera.projection_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_zoom_perspective() {
        let mut camera = Camera::new(1.0);
        camera.set_position(Vec3::new(0.0, 0.0, 10.0));
        camera.zoom(2.0);
        assert!((camera.position().z - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_zoom_orthographic() {
        let mut camera = Camera::new(1.0);
        camera.set_orthographic(1.0);
        camera.zoom(1.0);
        assert!((camera.ortho_scale() - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_orbit_keeps_radius() {
        let mut camera = Camera::new(1.0);
        camera.set_position(Vec3::new(0.0, 0.0, 4.0));
        camera.orbit(0.7, 0.3);
        assert!(((camera.position() - camera.target()).length() - 4.0).abs() < 1e-4);
    }
}
