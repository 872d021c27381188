//! Lookup tables mapping 8-bit intensity to RGBA, and their control-point form.

use serde::{Deserialize, Serialize};

/// Number of entries in a lookup table.
pub const LUT_ENTRIES: usize = 256;

/// Length in bytes of an RGBA8 lookup table.
pub const LUT_ARRAY_LENGTH: usize = LUT_ENTRIES * 4;

/// An editable anchor of a piecewise-linear transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Intensity position in `0..=255`. May be fractional.
    pub x: f32,
    /// Opacity in `0..=1`.
    pub opacity: f32,
    /// RGB color, each component in `0..=255`.
    pub color: [u8; 3],
}

impl ControlPoint {
    /// Creates a white control point.
    #[must_use]
    pub fn white(x: f32, opacity: f32) -> Self {
        Self {
            x,
            opacity,
            color: [255, 255, 255],
        }
    }

    /// Creates a control point with an explicit color.
    #[must_use]
    pub fn new(x: f32, opacity: f32, color: [u8; 3]) -> Self {
        Self { x, opacity, color }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_rgba(self) -> [f32; 4] {
        [
            f32::from(self.color[0]),
            f32::from(self.color[1]),
            f32::from(self.color[2]),
            (self.opacity * 255.0).floor(),
        ]
    }
}

/// A 256-entry RGBA8 lookup table together with the control points that describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct Lut {
    /// Interleaved RGBA bytes, `LUT_ARRAY_LENGTH` long.
    pub lut: [u8; LUT_ARRAY_LENGTH],
    /// Control points sorted ascending by `x`.
    pub control_points: Vec<ControlPoint>,
}

impl Default for Lut {
    fn default() -> Self {
        Self {
            lut: [0; LUT_ARRAY_LENGTH],
            control_points: Vec::new(),
        }
    }
}

/// Linear interpolation as `a * (xmax - xmin) + xmin`.
pub(crate) fn lerp(xmin: f32, xmax: f32, a: f32) -> f32 {
    a * (xmax - xmin) + xmin
}

/// Converts to a byte the way a typed-array store does: truncate toward zero, saturate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn to_byte(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.clamp(0.0, 255.0) as u8
    }
}

impl Lut {
    /// Returns the RGBA entry for intensity `x`.
    #[must_use]
    pub fn rgba(&self, x: u8) -> [u8; 4] {
        let i = usize::from(x) * 4;
        [self.lut[i], self.lut[i + 1], self.lut[i + 2], self.lut[i + 3]]
    }

    /// Returns the alpha entry for intensity `x`.
    #[must_use]
    pub fn alpha(&self, x: u8) -> u8 {
        self.lut[usize::from(x) * 4 + 3]
    }

    pub(crate) fn set(&mut self, x: usize, rgba: [u8; 4]) {
        self.lut[x * 4..x * 4 + 4].copy_from_slice(&rgba);
    }

    /// Widens every byte to a float in `0..=1`, as consumed by shaders.
    #[must_use]
    pub fn to_float_rgba(&self) -> Vec<[f32; 4]> {
        self.lut
            .chunks_exact(4)
            .map(|c| {
                [
                    f32::from(c[0]) / 255.0,
                    f32::from(c[1]) / 255.0,
                    f32::from(c[2]) / 255.0,
                    f32::from(c[3]) / 255.0,
                ]
            })
            .collect()
    }

    /// Multiplies the RGB components of every entry (and control point) by `tint` in `0..=1`.
    #[must_use]
    pub fn tinted(mut self, tint: [f32; 3]) -> Self {
        for entry in self.lut.chunks_exact_mut(4) {
            for (c, t) in entry.iter_mut().zip(tint) {
                *c = to_byte(f32::from(*c) * t);
            }
        }
        for cp in &mut self.control_points {
            for (c, t) in cp.color.iter_mut().zip(tint) {
                *c = to_byte(f32::from(*c) * t);
            }
        }
        self
    }

    /// Builds a table by linear interpolation between sorted control points.
    ///
    /// An empty list yields an all-zero table. A single point is held flat from its
    /// `x` to 255. Entries below the first point stay zero and the last point is held
    /// to 255 when the list ends early.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn from_control_points(mut control_points: Vec<ControlPoint>) -> Self {
        let mut out = Self::default();
        if control_points.is_empty() {
            return out;
        }

        control_points.sort_by(|a, b| a.x.total_cmp(&b.x));

        let first_x = control_points[0].x.ceil().max(0.0);
        if first_x > 255.0 {
            out.control_points = control_points;
            return out;
        }
        let start = first_x as usize;

        if control_points.len() == 1 {
            let rgba = control_points[0].to_rgba().map(to_byte);
            for x in start..LUT_ENTRIES {
                out.set(x, rgba);
            }
            out.control_points = control_points;
            return out;
        }

        let mut c0 = control_points[0];
        let mut c1 = control_points[1];
        let mut next = 1;
        for x in start..LUT_ENTRIES {
            let xf = x as f32;
            while xf > c1.x {
                c0 = c1;
                next += 1;
                c1 = match control_points.get(next) {
                    Some(cp) => *cp,
                    None => ControlPoint { x: 255.0, ..c1 },
                };
            }
            let a = if (c1.x - c0.x).abs() <= f32::EPSILON {
                1.0
            } else {
                (xf - c0.x) / (c1.x - c0.x)
            };
            let (rgba0, rgba1) = (c0.to_rgba(), c1.to_rgba());
            out.set(
                x,
                [
                    to_byte(lerp(rgba0[0], rgba1[0], a)),
                    to_byte(lerp(rgba0[1], rgba1[1], a)),
                    to_byte(lerp(rgba0[2], rgba1[2], a)),
                    to_byte(lerp(rgba0[3], rgba1[3], a)),
                ],
            );
        }
        out.control_points = control_points;
        out
    }
}
