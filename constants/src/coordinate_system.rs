/// Mining convention: the grid origin sits on the surface and depth index `k`
/// grows downward, so world Z decreases as `k` increases.
pub const DEPTH_SIGN: f64 = -1.0;

/// Bumped whenever the cell-centre formula changes. Persisted caches written
/// under a different version are discarded at startup.
pub const COORDINATE_CONVENTION_VERSION: u32 = 2;

/// Centre of cell `index` along one axis.
pub fn cell_centre(origin: f64, cell_size: f64, index: u32) -> f64 {
    origin + (index as f64 + 0.5) * cell_size
}

/// Centre of cell `(i, j, k)` in world space.
pub fn cell_centre_3d(origin: [f64; 3], cell_size: [f64; 3], index: [u32; 3]) -> [f64; 3] {
    [
        cell_centre(origin[0], cell_size[0], index[0]),
        cell_centre(origin[1], cell_size[1], index[1]),
        origin[2] + DEPTH_SIGN * (index[2] as f64 + 0.5) * cell_size[2],
    ]
}
