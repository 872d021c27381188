//! Proxy geometry: the volume bounding cube and the fullscreen quad.

/// Number of indices of the cube proxy (12 triangles).
pub const CUBE_INDEX_COUNT: u32 = 36;

/// Number of indices of the fullscreen quad (2 triangles).
pub const QUAD_INDEX_COUNT: u32 = 6;

/// Unit cube centered on the origin, front face at +Z.
pub const CUBE_POSITIONS: [[f32; 3]; 8] = [
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
];

/// Front, right, back, left, bottom, top.
pub const CUBE_INDICES: [u16; 36] = [
    0, 1, 2, 2, 3, 0, //
    1, 5, 6, 6, 2, 1, //
    7, 6, 5, 5, 4, 7, //
    4, 0, 3, 3, 7, 4, //
    4, 5, 1, 1, 0, 4, //
    3, 2, 6, 6, 7, 3,
];

/// Clip-space quad covering the viewport.
pub const QUAD_POSITIONS: [[f32; 3]; 4] = [
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
];

/// Counter-clockwise quad triangles.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Cube corners scaled to `dimensions` and offset by `center`.
#[must_use]
pub fn cube_positions(dimensions: [f32; 3], center: [f32; 3]) -> [[f32; 3]; 8] {
    CUBE_POSITIONS.map(|p| {
        [
            center[0] + p[0] * dimensions[0],
            center[1] + p[1] * dimensions[1],
            center[2] + p[2] * dimensions[2],
        ]
    })
}
