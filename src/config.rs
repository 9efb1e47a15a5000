//! The flat runtime configuration record.

use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::particles::SpawnBox;

/// Pressure solve scheme; both share the same air-cell mask and Dirichlet
/// boundary treatment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureScheme {
    Jacobi,
    RedBlack,
}

impl Default for PressureScheme {
    fn default() -> Self {
        PressureScheme::Jacobi
    }
}

/// Reset-time configuration. All fields are recognized options; there is
/// no implicit global state outside of this record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverConfig {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,

    pub width: f32,
    pub height: f32,
    pub depth: f32,

    pub particle_count: u32,
    pub spawn: Vec<SpawnBox>,

    pub solver_iterations: u32,
    pub solver_scheme: PressureScheme,

    pub fluidity: f32,
    pub target_density: f32,
    pub gravity: f32,
    pub turbulence: f32,

    pub mouse_radius: f32,
    pub scale: f32,

    /// Seed for the stratified-jitter particle spawn and the
    /// random-direction table; kept explicit rather than time-based so
    /// runs and tests are reproducible.
    pub seed: u64,
}

impl SolverConfig {
    pub fn origin_min(&self) -> Point3<f32> {
        Point3::new(-self.width * 0.5, 0.0, -self.depth * 0.5)
    }

    pub fn extent(&self) -> Vector3<f32> {
        Vector3::new(self.width, self.height, self.depth)
    }

    pub fn validate(&self) -> Result<(), crate::error::SolverError> {
        use crate::error::SolverError;
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(SolverError::Configuration("grid resolution must be >= 1 on every axis".into()));
        }
        if self.width <= 0.0 || self.height <= 0.0 || self.depth <= 0.0 {
            return Err(SolverError::Configuration("domain extent must be positive on every axis".into()));
        }
        if !(0.0..=1.0).contains(&self.fluidity) {
            return Err(SolverError::Configuration("fluidity must lie in [0, 1]".into()));
        }
        if self.target_density <= 0.0 {
            return Err(SolverError::Configuration("target density must be positive".into()));
        }
        if self.turbulence < 0.0 {
            return Err(SolverError::Configuration("turbulence magnitude must be non-negative".into()));
        }
        if self.scale <= 0.0 {
            return Err(SolverError::Configuration("fixed-point scale factor must be positive".into()));
        }
        const MAX_PARTICLES: u32 = 50_000_000;
        if self.particle_count > MAX_PARTICLES {
            return Err(SolverError::Configuration(format!(
                "particle count {} exceeds supported capacity {}",
                self.particle_count, MAX_PARTICLES
            )));
        }
        Ok(())
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            nx: 32,
            ny: 16,
            nz: 16,
            width: 24.0,
            height: 10.0,
            depth: 15.0,
            particle_count: 0,
            spawn: Vec::new(),
            solver_iterations: 50,
            solver_scheme: PressureScheme::Jacobi,
            fluidity: 0.99,
            target_density: 1.0,
            gravity: 9.81,
            turbulence: 0.0,
            mouse_radius: 2.0,
            scale: 10000.0,
            seed: 0,
        }
    }
}

/// An optional world-space mouse ray plus the impulse velocity it carries.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MouseInput {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    pub velocity: [f32; 3],
}

/// Per-step inputs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepInputs {
    pub mouse: Option<MouseInput>,
    pub frame_number: u64,
}

/// Out-of-band report returned from `step`, carrying the soft
/// `NumericalInstability` warning.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    pub numerical_instability: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;

    #[test]
    fn non_positive_scale_is_rejected() {
        let mut config = SolverConfig::default();
        config.scale = 0.0;
        assert!(matches!(config.validate(), Err(SolverError::Configuration(_))));

        config.scale = -10_000.0;
        assert!(matches!(config.validate(), Err(SolverError::Configuration(_))));
    }
}
