//! C3 (clear), C4 (particle→grid transfer), C5 (cell marking) and C6
//! (normalisation & snapshot).

use crate::fields::{Marker, ScalarField, VelocityField};
use crate::fixed_point::{VelocityAccumulator, WeightAccumulator};
use crate::grid::{self, GridDims};
use crate::particles::ParticleSet;
use cgmath::{Point3, Vector3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU8, Ordering};

/// The atomic scatter target for C4, sized like the velocity grid. Kept
/// separate from `VelocityField` since it is only ever touched during the
/// P2G scatter and the subsequent normalisation read — carrying it as part
/// of the public grid state would let callers observe half-scaled
/// fixed-point values between steps.
pub struct ScatterBuffer {
    weights: Vec<WeightAccumulator>,
    velocities: Vec<VelocityAccumulator>,
}

impl ScatterBuffer {
    /// `scale` is the fixed-point factor (spec section 4.2/9) floats are
    /// multiplied by before truncation to the backing `AtomicI32`s.
    pub fn new(dims: GridDims, scale: f32) -> Self {
        let len = dims.velocity_len();
        ScatterBuffer {
            weights: (0..len).map(|_| WeightAccumulator::new(scale)).collect(),
            velocities: (0..len).map(|_| VelocityAccumulator::new(scale)).collect(),
        }
    }

    pub fn clear(&self) {
        self.weights.par_iter().for_each(|w| w.clear());
        self.velocities.par_iter().for_each(|v| v.clear());
    }
}

/// C3: zero the atomic accumulators, the velocity grid, and the scalar
/// arrays. Pressure is always reset from scratch; no warm-start carry-over
/// between frames.
pub fn clear(velocity: &mut VelocityField, scalar: &mut ScalarField, scatter: &ScatterBuffer, marker_atomics: &MarkerAtomics) {
    velocity.clear();
    scalar.clear();
    scatter.clear();
    marker_atomics.clear();
}

/// Atomic backing store for C5's marker write. Any number of particles can
/// land in the same cell in the same frame, so concurrent writers all store
/// the same `Fluid` tag; safe Rust has no non-atomic shared-mutable-write
/// primitive for that, so an `AtomicU8` per cell is used instead. The result
/// is race-free and order-independent regardless of writer count.
pub struct MarkerAtomics {
    cells: Vec<AtomicU8>,
}

const AIR: u8 = 0;
const FLUID: u8 = 1;

impl MarkerAtomics {
    pub fn new(dims: GridDims) -> Self {
        MarkerAtomics {
            cells: (0..dims.scalar_len()).map(|_| AtomicU8::new(AIR)).collect(),
        }
    }

    pub fn clear(&self) {
        self.cells.par_iter().for_each(|c| c.store(AIR, Ordering::Relaxed));
    }

    fn mark_fluid(&self, idx: usize) {
        self.cells[idx].store(FLUID, Ordering::Relaxed);
    }

    /// Copies the atomic tags into the scalar grid's `Marker` array.
    pub fn write_into(&self, scalar: &mut ScalarField) {
        scalar
            .marker
            .par_iter_mut()
            .zip(self.cells.par_iter())
            .for_each(|(m, c)| *m = if c.load(Ordering::Relaxed) == FLUID { Marker::Fluid } else { Marker::Air });
    }
}

/// C4: splat each particle's velocity to the eight surrounding MAC nodes
/// with staggered per-component weights, plus C5's cell marking, done in
/// the same particle sweep since both only read particle position.
pub fn splat(
    particles: &ParticleSet,
    origin_min: Point3<f32>,
    extent: Vector3<f32>,
    dims: GridDims,
    scatter: &ScatterBuffer,
    marker: &MarkerAtomics,
) {
    particles.particles().par_iter().for_each(|p| {
        let pos = p.pos();
        let vel = p.vel();
        let g = grid::world_to_grid(pos, origin_min, extent, dims);

        let (mi, mj, mk) = dims.clamp_cell(g.x.floor() as i32, g.y.floor() as i32, g.z.floor() as i32);
        marker.mark_fluid(dims.scalar_index(mi as i32, mj as i32, mk as i32));

        let i0 = g.x.floor() as i32;
        let j0 = g.y.floor() as i32;
        let k0 = g.z.floor() as i32;

        for dk in 0..2 {
            for dj in 0..2 {
                for di in 0..2 {
                    let ni = i0 + di;
                    let nj = j0 + dj;
                    let nk = k0 + dk;
                    if ni < 0 || nj < 0 || nk < 0 || ni > dims.nx as i32 || nj > dims.ny as i32 || nk > dims.nz as i32 {
                        continue;
                    }

                    let wx = grid::tent_kernel(g - Vector3::new(ni as f32, nj as f32 + 0.5, nk as f32 + 0.5));
                    let wy = grid::tent_kernel(g - Vector3::new(ni as f32 + 0.5, nj as f32, nk as f32 + 0.5));
                    let wz = grid::tent_kernel(g - Vector3::new(ni as f32 + 0.5, nj as f32 + 0.5, nk as f32));
                    let ws = grid::tent_kernel(g - Vector3::new(ni as f32 + 0.5, nj as f32 + 0.5, nk as f32 + 0.5));

                    let idx = dims.velocity_index(ni, nj, nk);
                    scatter.weights[idx].add(wx, wy, wz, ws);
                    scatter.velocities[idx].add(Vector3::new(vel.x * wx, vel.y * wy, vel.z * wz));
                }
            }
        }
    });
}

/// C6: divide weighted sums by total weight and snapshot the result into
/// `original`. Nodes with zero weight retain zero velocity.
pub fn normalize_and_snapshot(scatter: &ScatterBuffer, working: &mut VelocityField, original: &mut VelocityField) {
    let dims = working.dims();
    working
        .nodes_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, node)| {
            let (wx, wy, wz, ws) = scatter.weights[idx].load();
            let v = scatter.velocities[idx].load();
            node.vx = if wx != 0.0 { v.x / wx } else { 0.0 };
            node.vy = if wy != 0.0 { v.y / wy } else { 0.0 };
            node.vz = if wz != 0.0 { v.z / wz } else { 0.0 };
            node.w = ws;
        });
    let dims2 = original.dims();
    debug_assert_eq!(dims.velocity_len(), dims2.velocity_len());
    original.nodes_mut().copy_from_slice(working.nodes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::{Particle, ParticleSet};

    fn single_particle_set(pos: Point3<f32>, vel: Vector3<f32>) -> ParticleSet {
        ParticleSet::from_vec(vec![Particle { position: [pos.x, pos.y, pos.z], velocity: [vel.x, vel.y, vel.z] }])
    }

    #[test]
    fn snapshot_equals_working_field_bitwise() {
        let dims = GridDims::new(4, 4, 4);
        let set = single_particle_set(Point3::new(2.0, 2.0, 2.0), Vector3::new(1.0, 0.0, 0.0));
        let scatter = ScatterBuffer::new(dims, 10_000.0);
        let marker = MarkerAtomics::new(dims);
        splat(&set, Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0), dims, &scatter, &marker);

        let mut working = VelocityField::new(dims);
        let mut original = VelocityField::new(dims);
        normalize_and_snapshot(&scatter, &mut working, &mut original);

        assert!(working.bitwise_eq(&original));
    }

    #[test]
    fn clear_is_idempotent() {
        let dims = GridDims::new(4, 4, 4);
        let mut velocity = VelocityField::new(dims);
        let mut scalar = ScalarField::new(dims);
        let scatter = ScatterBuffer::new(dims, 10_000.0);
        let marker = MarkerAtomics::new(dims);
        clear(&mut velocity, &mut scalar, &scatter, &marker);
        clear(&mut velocity, &mut scalar, &scatter, &marker);
        assert_eq!(velocity.vx(1, 1, 1), 0.0);
        assert!(!scalar.is_fluid(1, 1, 1));
    }
}
