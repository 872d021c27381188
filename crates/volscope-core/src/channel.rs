//! Per-use rendering state of a volume channel.

use serde::{Deserialize, Serialize};

use crate::colors::color_by_index;
use crate::histogram::{DEFAULT_PERCENTILE_MAX, DEFAULT_PERCENTILE_MIN};

/// Maximum number of channels composited into one RGBA volume.
pub const MAX_FUSED_CHANNELS: usize = 4;

/// How one channel of a volume is shown in a particular scene.
///
/// Kept outside the volume so the same data can be viewed with different
/// channel configurations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    /// Whether the channel contributes to the composite.
    pub enabled: bool,
    /// RGB tint in `0..=1`.
    pub color: [f32; 3],
    /// Intensity window as cumulative percentiles `(imin, imax)`.
    pub window: (f32, f32),
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            enabled: true,
            color: [1.0, 1.0, 1.0],
            window: (DEFAULT_PERCENTILE_MIN, DEFAULT_PERCENTILE_MAX),
        }
    }
}

impl ChannelState {
    /// Creates an enabled state tinted with the categorical color for `index`.
    #[must_use]
    pub fn for_index(index: usize) -> Self {
        let rgb = color_by_index(index);
        Self {
            color: rgb.map(|c| f32::from(c) / 255.0),
            ..Self::default()
        }
    }

    /// Default states for `count` channels; only the first four start enabled.
    #[must_use]
    pub fn default_for_count(count: usize) -> Vec<Self> {
        (0..count)
            .map(|i| Self {
                enabled: i < MAX_FUSED_CHANNELS,
                ..Self::for_index(i)
            })
            .collect()
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the tint.
    #[must_use]
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Sets the percentile window.
    #[must_use]
    pub fn with_window(mut self, imin: f32, imax: f32) -> Self {
        self.window = (imin, imax);
        self
    }
}

/// Indices of enabled channels in ascending order, truncated to [`MAX_FUSED_CHANNELS`].
#[must_use]
pub fn enabled_channels(states: &[ChannelState]) -> Vec<usize> {
    states
        .iter()
        .enumerate()
        .filter(|(_, s)| s.enabled)
        .map(|(i, _)| i)
        .take(MAX_FUSED_CHANNELS)
        .collect()
}
