//! The Lagrangian particle set and its seeded spawn logic.

use cgmath::{Point3, Vector3};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One particle: world-space position and velocity. No padding lane is
/// carried since nothing here round-trips through a GPU vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
}

impl Particle {
    pub fn pos(&self) -> Point3<f32> {
        Point3::new(self.position[0], self.position[1], self.position[2])
    }

    pub fn vel(&self) -> Vector3<f32> {
        Vector3::new(self.velocity[0], self.velocity[1], self.velocity[2])
    }

    pub fn set_pos(&mut self, p: Point3<f32>) {
        self.position = [p.x, p.y, p.z];
    }

    pub fn set_vel(&mut self, v: Vector3<f32>) {
        self.velocity = [v.x, v.y, v.z];
    }
}

/// An axis-aligned spawn box with a target fill fraction, sampled on a
/// jittered stratified grid.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SpawnBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
    pub fill_fraction: f32,
}

/// The number of stratified sub-cells sampled per unit grid cell.
const PARTICLES_PER_GRID_CELL: u32 = 8;

pub struct ParticleSet {
    particles: Vec<Particle>,
}

impl ParticleSet {
    /// Empty set, used when the requested particle count is zero.
    pub fn empty() -> Self {
        ParticleSet { particles: Vec::new() }
    }

    /// Wraps an explicit particle vector, used by tests that need exact
    /// control over initial positions/velocities rather than seeded spawn.
    pub fn from_vec(particles: Vec<Particle>) -> Self {
        ParticleSet { particles }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.particles.iter().map(|p| p.position).collect()
    }

    pub fn velocities(&self) -> Vec<[f32; 3]> {
        self.particles.iter().map(|p| p.velocity).collect()
    }

    /// Seeds exactly `count` particles by stratified-jitter sampling across
    /// `boxes`, distributing `count` proportionally to each box's weighted
    /// volume (volume * fill_fraction), mirroring `HybridFluid::add_fluid_cube`'s
    /// per-cell-cube-of-8 jittered placement generalized to an arbitrary total.
    pub fn seeded(boxes: &[SpawnBox], count: u32, seed: u64) -> Self {
        if count == 0 || boxes.is_empty() {
            return ParticleSet::empty();
        }

        let weights: Vec<f32> = boxes
            .iter()
            .map(|b| {
                let extent = b.max - b.min;
                (extent.x * extent.y * extent.z).max(0.0) * b.fill_fraction.max(0.0)
            })
            .collect();
        let total_weight: f32 = weights.iter().sum();

        let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
        let mut particles = Vec::with_capacity(count as usize);

        for (b, w) in boxes.iter().zip(weights.iter()) {
            let share = if total_weight > 0.0 { w / total_weight } else { 1.0 / boxes.len() as f32 };
            let box_count = ((count as f32) * share).round() as u32;
            spawn_in_box(b, box_count, &mut rng, &mut particles);
        }

        // Rounding may leave us a few particles short of `count`; top up from
        // the largest box rather than leaving a caller-visible shortfall.
        let biggest = weights
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        while particles.len() < count as usize {
            spawn_in_box(&boxes[biggest], 1, &mut rng, &mut particles);
        }
        particles.truncate(count as usize);

        ParticleSet { particles }
    }
}

fn spawn_in_box(b: &SpawnBox, n: u32, rng: &mut rand::rngs::SmallRng, out: &mut Vec<Particle>) {
    if n == 0 {
        return;
    }
    let extent = b.max - b.min;
    // Choose a roughly cube-shaped stratification grid so jitter cells stay
    // isotropic, then oversample and randomly keep exactly `n` of them.
    let per_axis = ((n as f32 / PARTICLES_PER_GRID_CELL as f32).cbrt().ceil() as u32).max(1);
    let cell = Vector3::new(extent.x / per_axis as f32, extent.y / per_axis as f32, extent.z / per_axis as f32);

    let mut candidates = Vec::with_capacity((per_axis * per_axis * per_axis) as usize);
    for k in 0..per_axis {
        for j in 0..per_axis {
            for i in 0..per_axis {
                let base = Point3::new(
                    b.min.x + i as f32 * cell.x,
                    b.min.y + j as f32 * cell.y,
                    b.min.z + k as f32 * cell.z,
                );
                let jitter = Vector3::new(rng.gen_range(0.0..cell.x), rng.gen_range(0.0..cell.y), rng.gen_range(0.0..cell.z));
                candidates.push(base + jitter);
            }
        }
    }

    // Stable order, just shuffled enough to avoid a directional bias when
    // truncating to `n`.
    for i in (1..candidates.len()).rev() {
        let j = rng.gen_range(0..=i);
        candidates.swap(i, j);
    }
    candidates.truncate(n as usize);

    for pos in candidates {
        out.push(Particle {
            position: [pos.x, pos.y, pos.z],
            velocity: [0.0, 0.0, 0.0],
        });
    }
}
