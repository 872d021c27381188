//! Categorical colors for channels and label volumes.

/// Leading colors of the categorical palette.
const PALETTE: [[u8; 3]; 12] = [
    [255, 0, 255],
    [255, 255, 255],
    [0, 255, 255],
    [255, 255, 0],
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 128, 0],
    [128, 0, 255],
    [0, 255, 128],
    [255, 0, 128],
    [128, 255, 0],
];

const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;

/// Returns a distinct RGB color for `index`.
///
/// The first entries come from a fixed palette; later indices walk the hue circle
/// by the golden ratio so neighbouring labels stay distinguishable.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn color_by_index(index: usize) -> [u8; 3] {
    if let Some(c) = PALETTE.get(index) {
        return *c;
    }
    let hue = ((index - PALETTE.len()) as f32 * GOLDEN_RATIO_CONJUGATE).fract();
    hsv_to_rgb(hue, 0.85, 1.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h6 = h * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}
