//! Configuration records read by the renderers and the viewer.
//!
//! Values are passed through to shaders without validation: an inverted gamma
//! range or a negative density is rendered as given.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Parameters of the ray-march renderer, tuned from a settings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeRenderSettings {
    /// Overall brightness multiplier.
    pub brightness: f32,
    /// Opacity scale applied per sample.
    pub density: f32,
    /// Lower intensity bound of the transfer curve.
    pub gamma_min: f32,
    /// Upper intensity bound of the transfer curve.
    pub gamma_max: f32,
    /// Exponent of the transfer curve.
    pub gamma_scale: f32,
    /// Alpha of masked-out voxels.
    pub mask_alpha: f32,
    /// Maximum-intensity projection instead of compositing.
    pub max_project: bool,
    /// Clip box minimum in normalized volume space.
    pub clip_min: Vec3,
    /// Clip box maximum in normalized volume space.
    pub clip_max: Vec3,
    /// Slab thickness used by orthographic views.
    pub ortho_thickness: f32,
    /// Ray step budget.
    pub max_steps: u32,
}

impl Default for VolumeRenderSettings {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            density: 1.0,
            gamma_min: 0.0,
            gamma_max: 1.0,
            gamma_scale: 1.0,
            mask_alpha: 1.0,
            max_project: false,
            clip_min: Vec3::splat(-0.5),
            clip_max: Vec3::splat(0.5),
            ortho_thickness: 1.0,
            max_steps: 256,
        }
    }
}

/// Parameters of the path-trace renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathTraceSettings {
    /// Extinction scale of the medium.
    pub density_scale: f32,
    /// Blend between surface-like and volumetric shading.
    pub gradient_factor: f32,
    /// Primary step as a multiple of one voxel.
    pub step_size_multiplier: f32,
    /// Shadow-ray step as a multiple of one voxel.
    pub shadow_step_size_multiplier: f32,
    /// Shading model selector.
    pub shading_type: u32,
    /// Exposure slider in `0..=1`.
    pub exposure_slider: f32,
    /// Draw the light sources.
    pub show_lights: bool,
}

impl Default for PathTraceSettings {
    fn default() -> Self {
        Self {
            density_scale: 30.5,
            gradient_factor: 0.5,
            step_size_multiplier: 1.0,
            shadow_step_size_multiplier: 1.0,
            shading_type: 0,
            exposure_slider: 0.75,
            show_lights: false,
        }
    }
}

/// Which volume renderer a viewer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RendererKind {
    /// Single pass ray marching through a cube proxy.
    #[default]
    RayMarch,
    /// Progressive path tracing with tone mapping.
    PathTrace,
}

/// Preferred GPU class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PowerPreference {
    /// Integrated GPU when available.
    LowPower,
    /// Discrete GPU when available.
    #[default]
    HighPerformance,
}

/// Viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerOptions {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Clear color.
    pub background_color: Vec3,
    /// Renderer to start with.
    pub renderer: RendererKind,
    /// GPU preference.
    pub power_preference: PowerPreference,
    /// Ray-march parameters.
    pub volume: VolumeRenderSettings,
    /// Path-trace parameters.
    pub path_trace: PathTraceSettings,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            title: "volscope".to_string(),
            width: 1280,
            height: 720,
            background_color: Vec3::ZERO,
            renderer: RendererKind::RayMarch,
            power_preference: PowerPreference::HighPerformance,
            volume: VolumeRenderSettings::default(),
            path_trace: PathTraceSettings::default(),
        }
    }
}

impl ViewerOptions {
    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loaded viewer options from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Writes options to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Sets the window title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the initial window size.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: RendererKind) -> Self {
        self.renderer = renderer;
        self
    }

    /// Sets the ray-march parameters.
    #[must_use]
    pub fn with_volume_settings(mut self, volume: VolumeRenderSettings) -> Self {
        self.volume = volume;
        self
    }

    /// Sets the path-trace parameters.
    #[must_use]
    pub fn with_path_trace_settings(mut self, path_trace: PathTraceSettings) -> Self {
        self.path_trace = path_trace;
        self
    }
}
