//! C1: grid index & kernel utilities.
//!
//! Linearises 3D indices on the velocity (MAC, node-centered) and scalar
//! (cell-centered) grids, maps world space to grid space, and evaluates the
//! separable tent kernel used by P2G/G2P.

use cgmath::{Point3, Vector3};

/// The three grid axis counts. The scalar grid has `nx * ny * nz` cells; the
/// velocity (MAC) grid has `(nx+1) * (ny+1) * (nz+1)` nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDims {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl GridDims {
    pub fn new(nx: u32, ny: u32, nz: u32) -> Self {
        GridDims { nx, ny, nz }
    }

    pub fn scalar_len(&self) -> usize {
        (self.nx as usize) * (self.ny as usize) * (self.nz as usize)
    }

    pub fn velocity_len(&self) -> usize {
        ((self.nx + 1) as usize) * ((self.ny + 1) as usize) * ((self.nz + 1) as usize)
    }

    /// Clamps (not wraps) a cell coordinate to the valid scalar-grid range.
    pub fn clamp_cell(&self, i: i32, j: i32, k: i32) -> (u32, u32, u32) {
        (
            i.clamp(0, self.nx as i32 - 1) as u32,
            j.clamp(0, self.ny as i32 - 1) as u32,
            k.clamp(0, self.nz as i32 - 1) as u32,
        )
    }

    /// Clamps a node coordinate to the valid velocity-grid range.
    pub fn clamp_node(&self, i: i32, j: i32, k: i32) -> (u32, u32, u32) {
        (
            i.clamp(0, self.nx as i32) as u32,
            j.clamp(0, self.ny as i32) as u32,
            k.clamp(0, self.nz as i32) as u32,
        )
    }

    /// Row-major scalar index, x fastest. Out-of-range coordinates are
    /// clamped to the nearest in-range cell.
    pub fn scalar_index(&self, i: i32, j: i32, k: i32) -> usize {
        let (i, j, k) = self.clamp_cell(i, j, k);
        (i as usize) + (j as usize) * (self.nx as usize) + (k as usize) * (self.nx as usize) * (self.ny as usize)
    }

    /// Inverse of `scalar_index` for an in-range flat index.
    pub fn scalar_coords(&self, idx: usize) -> (i32, i32, i32) {
        let nx = self.nx as usize;
        let ny = self.ny as usize;
        let i = idx % nx;
        let j = (idx / nx) % ny;
        let k = idx / (nx * ny);
        (i as i32, j as i32, k as i32)
    }

    /// Row-major velocity-node index, x fastest, stride `(nx+1)*(ny+1)`
    /// between z-slabs. Out-of-range coordinates are clamped.
    pub fn velocity_index(&self, i: i32, j: i32, k: i32) -> usize {
        let (i, j, k) = self.clamp_node(i, j, k);
        let sx = self.nx as usize + 1;
        let sy = self.ny as usize + 1;
        (i as usize) + (j as usize) * sx + (k as usize) * sx * sy
    }

    pub fn velocity_coords(&self, idx: usize) -> (i32, i32, i32) {
        let sx = self.nx as usize + 1;
        let sy = self.ny as usize + 1;
        let i = idx % sx;
        let j = (idx / sx) % sy;
        let k = idx / (sx * sy);
        (i as i32, j as i32, k as i32)
    }
}

/// Maps a world-space position into grid space: `g = (p - originMin) * (N / extent)`.
pub fn world_to_grid(p: Point3<f32>, origin_min: Point3<f32>, extent: Vector3<f32>, dims: GridDims) -> Point3<f32> {
    Point3::new(
        (p.x - origin_min.x) * (dims.nx as f32 / extent.x),
        (p.y - origin_min.y) * (dims.ny as f32 / extent.y),
        (p.z - origin_min.z) * (dims.nz as f32 / extent.z),
    )
}

/// Inverse of `world_to_grid`, used by the scatter kernel to recover world
/// positions for force/impulse evaluation at staggered sample points.
pub fn grid_to_world(g: Point3<f32>, origin_min: Point3<f32>, extent: Vector3<f32>, dims: GridDims) -> Point3<f32> {
    Point3::new(
        g.x * (extent.x / dims.nx as f32) + origin_min.x,
        g.y * (extent.y / dims.ny as f32) + origin_min.y,
        g.z * (extent.z / dims.nz as f32) + origin_min.z,
    )
}

/// 1D hat function: `h(r) = max(0, 1 - |r|)` for `|r| <= 1`.
pub fn hat(r: f32) -> f32 {
    (1.0 - r.abs()).max(0.0)
}

/// Separable tent kernel: the product of three 1D hat functions evaluated on
/// the signed distance between a particle's grid-space position and a
/// sample location.
pub fn tent_kernel(delta: Vector3<f32>) -> f32 {
    hat(delta.x) * hat(delta.y) * hat(delta.z)
}

/// World-space position of the staggered sample location for velocity
/// component `axis` (0=Vx, 1=Vy, 2=Vz) at node `(i, j, k)`, used to evaluate
/// spatially-varying forces (e.g. the mouse-ray impulse) at the exact point
/// each component is stored.
pub fn staggered_world_pos(origin_min: Point3<f32>, extent: Vector3<f32>, dims: GridDims, i: i32, j: i32, k: i32, axis: usize) -> Point3<f32> {
    let (ox, oy, oz) = match axis {
        0 => (0.0, 0.5, 0.5),
        1 => (0.5, 0.0, 0.5),
        2 => (0.5, 0.5, 0.0),
        _ => unreachable!("axis must be 0, 1 or 2"),
    };
    grid_to_world(Point3::new(i as f32 + ox, j as f32 + oy, k as f32 + oz), origin_min, extent, dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_index_roundtrip() {
        let dims = GridDims::new(4, 5, 6);
        for k in 0..dims.nz as i32 {
            for j in 0..dims.ny as i32 {
                for i in 0..dims.nx as i32 {
                    let idx = dims.scalar_index(i, j, k);
                    assert_eq!(dims.scalar_coords(idx), (i, j, k));
                }
            }
        }
    }

    #[test]
    fn velocity_index_roundtrip() {
        let dims = GridDims::new(4, 5, 6);
        for k in 0..=dims.nz as i32 {
            for j in 0..=dims.ny as i32 {
                for i in 0..=dims.nx as i32 {
                    let idx = dims.velocity_index(i, j, k);
                    assert_eq!(dims.velocity_coords(idx), (i, j, k));
                }
            }
        }
    }

    #[test]
    fn out_of_range_clamps() {
        let dims = GridDims::new(4, 4, 4);
        assert_eq!(dims.scalar_index(-1, 0, 0), dims.scalar_index(0, 0, 0));
        assert_eq!(dims.scalar_index(100, 0, 0), dims.scalar_index(3, 0, 0));
    }

    #[test]
    fn tent_kernel_is_one_at_zero_and_zero_past_unit_distance() {
        assert_eq!(tent_kernel(Vector3::new(0.0, 0.0, 0.0)), 1.0);
        assert_eq!(tent_kernel(Vector3::new(1.5, 0.0, 0.0)), 0.0);
        assert!((tent_kernel(Vector3::new(0.5, 0.0, 0.0)) - 0.5).abs() < 1e-6);
    }
}
