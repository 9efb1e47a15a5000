//! Eulerian grid state: the MAC velocity grid (working + original snapshot)
//! and the cell-centered scalar grid (marker, pressure, divergence).

use crate::grid::GridDims;
use cgmath::Vector3;
use rand::{Rng, SeedableRng};

/// One MAC node: the three staggered velocity components plus a scalar
/// density weight carried in the fourth lane. The weight is sampled at the
/// node's own corner position, not a trilinear cell-centre average (spec's
/// resolved open question); `density_at` below reads it as such.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VelocityNode {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub w: f32,
}

/// The MAC velocity grid: `(nx+1) * (ny+1) * (nz+1)` nodes.
#[derive(Clone)]
pub struct VelocityField {
    dims: GridDims,
    nodes: Vec<VelocityNode>,
}

impl VelocityField {
    pub fn new(dims: GridDims) -> Self {
        VelocityField {
            dims,
            nodes: vec![VelocityNode::default(); dims.velocity_len()],
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn clear(&mut self) {
        for n in self.nodes.iter_mut() {
            *n = VelocityNode::default();
        }
    }

    pub fn nodes(&self) -> &[VelocityNode] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [VelocityNode] {
        &mut self.nodes
    }

    pub fn node(&self, i: i32, j: i32, k: i32) -> VelocityNode {
        self.nodes[self.dims.velocity_index(i, j, k)]
    }

    pub fn vx(&self, i: i32, j: i32, k: i32) -> f32 {
        self.node(i, j, k).vx
    }

    pub fn vy(&self, i: i32, j: i32, k: i32) -> f32 {
        self.node(i, j, k).vy
    }

    pub fn vz(&self, i: i32, j: i32, k: i32) -> f32 {
        self.node(i, j, k).vz
    }

    /// The scalar density weight, stored at the node exactly covering each
    /// cell's origin corner, rather than a trilinear cell-centre average.
    pub fn density_at(&self, i: i32, j: i32, k: i32) -> f32 {
        self.node(i, j, k).w
    }

    pub fn set_vx(&mut self, i: i32, j: i32, k: i32, v: f32) {
        let idx = self.dims.velocity_index(i, j, k);
        self.nodes[idx].vx = v;
    }

    pub fn set_vy(&mut self, i: i32, j: i32, k: i32, v: f32) {
        let idx = self.dims.velocity_index(i, j, k);
        self.nodes[idx].vy = v;
    }

    pub fn set_vz(&mut self, i: i32, j: i32, k: i32, v: f32) {
        let idx = self.dims.velocity_index(i, j, k);
        self.nodes[idx].vz = v;
    }

    /// Bitwise equality between two fields, used to check the post-C6
    /// snapshot invariant.
    pub fn bitwise_eq(&self, other: &VelocityField) -> bool {
        self.nodes == other.nodes
    }
}

/// A fluid/air tag per scalar cell. Stored as a plain enum rather than a
/// raw 0/1 integer so a future solid-obstacle variant cannot silently
/// collide with the current encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Air,
    Fluid,
}

impl Default for Marker {
    fn default() -> Self {
        Marker::Air
    }
}

/// The cell-centered scalar grid: marker, pressure and divergence over
/// `nx * ny * nz` cells.
#[derive(Clone)]
pub struct ScalarField {
    dims: GridDims,
    pub marker: Vec<Marker>,
    pub pressure: Vec<f32>,
    pub divergence: Vec<f32>,
}

impl ScalarField {
    pub fn new(dims: GridDims) -> Self {
        let len = dims.scalar_len();
        ScalarField {
            dims,
            marker: vec![Marker::Air; len],
            pressure: vec![0.0; len],
            divergence: vec![0.0; len],
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn clear(&mut self) {
        for m in self.marker.iter_mut() {
            *m = Marker::Air;
        }
        for p in self.pressure.iter_mut() {
            *p = 0.0;
        }
        for d in self.divergence.iter_mut() {
            *d = 0.0;
        }
    }

    pub fn is_fluid(&self, i: i32, j: i32, k: i32) -> bool {
        self.marker[self.dims.scalar_index(i, j, k)] == Marker::Fluid
    }

    /// Pressure at `(i, j, k)`, with out-of-range coordinates clamped to the
    /// nearest in-range cell (C1), and implicitly 0 for air cells since C10
    /// never writes a non-zero pressure there.
    pub fn pressure_at(&self, i: i32, j: i32, k: i32) -> f32 {
        self.pressure[self.dims.scalar_index(i, j, k)]
    }
}

/// The fixed-length, immutable table of unit vectors sampled for per-frame
/// turbulent jitter.
pub struct RandomDirTable {
    dirs: Vec<Vector3<f32>>,
}

impl RandomDirTable {
    pub fn new(len: usize, seed: u64) -> Self {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
        let mut dirs = Vec::with_capacity(len);
        for _ in 0..len {
            // Rejection-sample a unit vector from the cube to avoid the
            // polar bias of naive spherical-coordinate sampling.
            loop {
                let v = Vector3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
                let len_sq: f32 = v.x * v.x + v.y * v.y + v.z * v.z;
                if len_sq > 1e-6 && len_sq <= 1.0 {
                    dirs.push(v / len_sq.sqrt());
                    break;
                }
            }
        }
        RandomDirTable { dirs }
    }

    pub fn sample(&self, index: usize) -> Vector3<f32> {
        self.dirs[index % self.dirs.len()]
    }
}
