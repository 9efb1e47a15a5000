//! `FlipSolver`: owns every buffer and orchestrates the twelve-stage
//! per-frame pipeline behind `reset`/`step`.

use crate::boundary;
use crate::config::{SolverConfig, StepInputs, StepReport};
use crate::error::{SolverError, SolverResult};
use crate::fields::{RandomDirTable, ScalarField, VelocityField};
use crate::forces;
use crate::particles::ParticleSet;
use crate::pressure;
use crate::transfer::{self, MarkerAtomics, ScatterBuffer};

/// The number of turbulent directions kept in the random table; large
/// enough that `(particle_index + frame_number) mod N` does not repeat
/// within the particle counts this crate is exercised at.
const RANDOM_DIR_TABLE_LEN: usize = 4096;

/// Per-entity byte costs used by [`estimate_byte_budget`] below. These track
/// the actual backing types (`VelocityNode`, `Particle`, the fixed-point
/// accumulators, ...) loosely rather than exactly down to padding, which is
/// fine for a pre-flight capacity probe.
const VELOCITY_NODE_BYTES: u128 = 16; // 4 x f32
const SCATTER_NODE_BYTES: u128 = 4 * 4 + 3 * 4; // WeightAccumulator + VelocityAccumulator, 4 x i32 + 3 x i32
const MARKER_ATOMIC_BYTES: u128 = 1;
const SCALAR_CELL_BYTES: u128 = 1 + 4 + 4; // marker + pressure + divergence
const PARTICLE_BYTES: u128 = 24; // position + velocity, 6 x f32

/// Estimates the total heap footprint of a [`FlipSolver`]'s buffers for the
/// given config, in bytes. Returns `None` if the estimate itself overflows
/// addressable memory (`usize`), which is treated as an allocation failure
/// rather than panicking on the multiply.
fn estimate_byte_budget(config: &SolverConfig) -> Option<usize> {
    let nx = config.nx as u128;
    let ny = config.ny as u128;
    let nz = config.nz as u128;
    let velocity_len = (nx + 1) * (ny + 1) * (nz + 1);
    let scalar_len = nx * ny * nz;
    let particle_count = config.particle_count as u128;

    let total = velocity_len * VELOCITY_NODE_BYTES * 2 // working + original fields
        + velocity_len * SCATTER_NODE_BYTES
        + velocity_len * MARKER_ATOMIC_BYTES
        + scalar_len * SCALAR_CELL_BYTES
        + particle_count * PARTICLE_BYTES;

    usize::try_from(total).ok()
}

/// Probes whether `total_bytes` can plausibly be reserved before any buffer
/// is actually constructed, so a config whose grid/particle count is within
/// the `ConfigurationError` bounds but still too large for this machine's
/// address space surfaces `ResourceAllocationError` instead of aborting
/// mid-allocation.
fn check_allocatable(total_bytes: usize) -> SolverResult<()> {
    let mut probe: Vec<u8> = Vec::new();
    probe.try_reserve_exact(total_bytes).map_err(|err| {
        SolverError::ResourceAllocation(format!("failed to reserve {total_bytes} bytes for solver buffers: {err}"))
    })
}

pub struct FlipSolver {
    config: SolverConfig,
    particles: ParticleSet,
    working: VelocityField,
    original: VelocityField,
    scalar: ScalarField,
    scatter: ScatterBuffer,
    marker_atomics: MarkerAtomics,
    random_dirs: RandomDirTable,
    last_frame_number: Option<u64>,
}

impl FlipSolver {
    /// Destroys any existing state and creates fresh particle and grid
    /// buffers.
    pub fn reset(config: SolverConfig) -> SolverResult<Self> {
        config.validate()?;

        let total_bytes = estimate_byte_budget(&config)
            .ok_or_else(|| SolverError::ResourceAllocation("buffer size estimate overflows addressable memory".into()))?;
        check_allocatable(total_bytes)?;

        let dims = crate::grid::GridDims::new(config.nx, config.ny, config.nz);
        let particles = ParticleSet::seeded(&config.spawn, config.particle_count, config.seed);

        log::info!(
            "resetting flip solver: grid {}x{}x{}, {} particles, scheme {:?}",
            config.nx,
            config.ny,
            config.nz,
            particles.len(),
            config.solver_scheme
        );

        Ok(FlipSolver {
            working: VelocityField::new(dims),
            original: VelocityField::new(dims),
            scalar: ScalarField::new(dims),
            scatter: ScatterBuffer::new(dims, config.scale),
            marker_atomics: MarkerAtomics::new(dims),
            random_dirs: RandomDirTable::new(RANDOM_DIR_TABLE_LEN, config.seed),
            particles,
            last_frame_number: None,
            config,
        })
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32, inputs: StepInputs) -> SolverResult<StepReport> {
        if dt <= 0.0 {
            return Err(SolverError::InvalidInput("dt must be positive".into()));
        }
        if let Some(mouse) = inputs.mouse {
            let dir = cgmath::Vector3::new(mouse.direction[0], mouse.direction[1], mouse.direction[2]);
            let len = (dir.x * dir.x + dir.y * dir.y + dir.z * dir.z).sqrt();
            if (len - 1.0).abs() > 1e-3 {
                return Err(SolverError::InvalidInput("mouse direction must be unit length".into()));
            }
        }
        if let Some(last) = self.last_frame_number {
            if inputs.frame_number < last {
                return Err(SolverError::InvalidInput("frame number must not decrease".into()));
            }
        }
        self.last_frame_number = Some(inputs.frame_number);

        let origin_min = self.config.origin_min();
        let extent = self.config.extent();

        log::trace!("clear");
        transfer::clear(&mut self.working, &mut self.scalar, &self.scatter, &self.marker_atomics);

        log::trace!("transfer particle velocity to grid");
        transfer::splat(&self.particles, origin_min, extent, self.working.dims(), &self.scatter, &self.marker_atomics);
        self.marker_atomics.write_into(&mut self.scalar);

        log::trace!("normalize and snapshot velocity grid");
        transfer::normalize_and_snapshot(&self.scatter, &mut self.working, &mut self.original);

        log::trace!("apply forces");
        forces::apply(&mut self.working, origin_min, extent, self.config.gravity, inputs.mouse, self.config.mouse_radius, dt);

        log::trace!("enforce boundary (post-forces)");
        boundary::enforce(&mut self.working);

        log::trace!("compute divergence");
        pressure::divergence(&self.working, &mut self.scalar, self.config.width, self.config.height, self.config.depth, self.config.target_density);

        log::trace!("pressure solve");
        pressure::solve(&mut self.scalar, self.config.width, self.config.height, self.config.depth, self.config.solver_iterations, self.config.solver_scheme);

        log::trace!("pressure projection");
        pressure::project(&mut self.working, &self.scalar, self.config.width, self.config.height, self.config.depth);

        log::trace!("enforce boundary (post-projection)");
        boundary::enforce(&mut self.working);

        log::trace!("advect particles");
        let unstable = crate::advect::advect(
            &mut self.particles,
            &self.working,
            &self.original,
            origin_min,
            extent,
            self.config.fluidity,
            self.config.turbulence,
            &self.random_dirs,
            inputs.frame_number,
            dt,
        );

        if unstable {
            log::warn!("numerical instability detected at C12 clamp; dt may be too large or iterations too few");
        }

        Ok(StepReport { numerical_instability: unstable })
    }

    pub fn particle_positions(&self) -> Vec<[f32; 3]> {
        self.particles.positions()
    }

    pub fn particle_velocities(&self) -> Vec<[f32; 3]> {
        self.particles.velocities()
    }

    pub fn working_velocity_field(&self) -> &VelocityField {
        &self.working
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn scalar_field(&self) -> &ScalarField {
        &self.scalar
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PressureScheme;
    use crate::particles::SpawnBox;
    use cgmath::Point3;

    fn small_config(particle_count: u32) -> SolverConfig {
        SolverConfig {
            nx: 4,
            ny: 4,
            nz: 4,
            width: 4.0,
            height: 4.0,
            depth: 4.0,
            particle_count,
            spawn: vec![SpawnBox { min: Point3::new(-1.0, 0.5, -1.0), max: Point3::new(1.0, 2.5, 1.0), fill_fraction: 0.5 }],
            solver_iterations: 10,
            solver_scheme: PressureScheme::Jacobi,
            fluidity: 0.99,
            target_density: 1.0,
            gravity: 9.8,
            turbulence: 0.0,
            mouse_radius: 1.0,
            scale: 10000.0,
            seed: 1,
        }
    }

    #[test]
    fn reset_rejects_zero_grid_axis() {
        let mut config = small_config(0);
        config.nx = 0;
        assert!(matches!(FlipSolver::reset(config), Err(SolverError::Configuration(_))));
    }

    #[test]
    fn reset_surfaces_resource_allocation_error_when_buffer_estimate_overflows() {
        // Each axis individually passes the >= 1 `ConfigurationError` check,
        // but the resulting node count overflows `usize`'s addressable
        // range once multiplied out, which must surface as
        // `ResourceAllocationError` rather than panicking mid-allocation.
        let mut config = small_config(0);
        config.nx = u32::MAX;
        config.ny = u32::MAX;
        config.nz = u32::MAX;
        assert!(matches!(FlipSolver::reset(config), Err(SolverError::ResourceAllocation(_))));
    }

    #[test]
    fn step_rejects_non_positive_dt() {
        let mut solver = FlipSolver::reset(small_config(0)).unwrap();
        let err = solver.step(0.0, StepInputs::default()).unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput(_)));
    }

    #[test]
    fn step_rejects_decreasing_frame_number() {
        let mut solver = FlipSolver::reset(small_config(0)).unwrap();
        solver.step(1.0 / 60.0, StepInputs { mouse: None, frame_number: 5 }).unwrap();
        let err = solver.step(1.0 / 60.0, StepInputs { mouse: None, frame_number: 4 }).unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput(_)));
    }

    #[test]
    fn zero_particles_step_leaves_scalar_grid_untouched() {
        // Gravity (C7) always acts on every velocity node regardless of
        // particle count, so only the particle-driven arrays — marker,
        // pressure, divergence — are expected to stay at their cleared
        // defaults when there is nothing to transfer.
        let mut solver = FlipSolver::reset(small_config(0)).unwrap();
        solver.step(1.0 / 60.0, StepInputs::default()).unwrap();
        assert!(solver.scalar.marker.iter().all(|m| *m == crate::fields::Marker::Air));
        assert!(solver.scalar.pressure.iter().all(|p| *p == 0.0));
        assert!(solver.scalar.divergence.iter().all(|d| *d == 0.0));
        assert_eq!(solver.particle_count(), 0);
    }

    #[test]
    fn single_particle_run_keeps_position_inside_domain() {
        let mut solver = FlipSolver::reset(small_config(200)).unwrap();
        for frame in 0..10u64 {
            solver.step(1.0 / 60.0, StepInputs { mouse: None, frame_number: frame }).unwrap();
        }
        for pos in solver.particle_positions() {
            assert!(pos[0] >= -2.0 && pos[0] <= 2.0);
            assert!(pos[1] >= 0.0 && pos[1] <= 4.0);
            assert!(pos[2] >= -2.0 && pos[2] <= 2.0);
        }
    }
}
