//! C12: grid→particle transfer (PIC/FLIP blend) and RK2 advection with
//! bounded turbulence.

use crate::fields::{RandomDirTable, VelocityField};
use crate::grid::{self, GridDims};
use crate::particles::ParticleSet;
use cgmath::{InnerSpace, Point3, Vector3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Particle positions are kept `margin` world units inside the domain
/// bounds after clamping, so a particle resting on the floor never sits
/// exactly on the boundary.
const BOUNDARY_MARGIN: f32 = 0.01;

/// How far outside the domain a particle must land pre-clamp, as a
/// fraction of the relevant axis extent, to count as the soft
/// `NumericalInstability` warning.
const INSTABILITY_FRACTION: f32 = 0.10;

/// Trilinear sample of one staggered velocity component at `pos`. `axis`
/// selects which component (0=Vx, 1=Vy, 2=Vz), which also selects the
/// half-cell offset subtracted before interpolation.
fn sample_component(field: &VelocityField, origin_min: Point3<f32>, extent: Vector3<f32>, pos: Point3<f32>, axis: usize) -> f32 {
    let dims = field.dims();
    let g = grid::world_to_grid(pos, origin_min, extent, dims);
    let offset = match axis {
        0 => Vector3::new(0.0, -0.5, -0.5),
        1 => Vector3::new(-0.5, 0.0, -0.5),
        2 => Vector3::new(-0.5, -0.5, 0.0),
        _ => unreachable!("axis must be 0, 1 or 2"),
    };
    let gs = g + offset;
    let i0 = gs.x.floor() as i32;
    let j0 = gs.y.floor() as i32;
    let k0 = gs.z.floor() as i32;
    let fx = gs.x - i0 as f32;
    let fy = gs.y - j0 as f32;
    let fz = gs.z - k0 as f32;

    let component = |node: crate::fields::VelocityNode| match axis {
        0 => node.vx,
        1 => node.vy,
        2 => node.vz,
        _ => unreachable!(),
    };

    let mut sum = 0.0;
    for dk in 0..2 {
        for dj in 0..2 {
            for di in 0..2 {
                let wx = if di == 0 { 1.0 - fx } else { fx };
                let wy = if dj == 0 { 1.0 - fy } else { fy };
                let wz = if dk == 0 { 1.0 - fz } else { fz };
                let (ci, cj, ck) = dims.clamp_node(i0 + di, j0 + dj, k0 + dk);
                sum += wx * wy * wz * component(field.node(ci as i32, cj as i32, ck as i32));
            }
        }
    }
    sum
}

fn sample_velocity(field: &VelocityField, origin_min: Point3<f32>, extent: Vector3<f32>, pos: Point3<f32>) -> Vector3<f32> {
    Vector3::new(
        sample_component(field, origin_min, extent, pos, 0),
        sample_component(field, origin_min, extent, pos, 1),
        sample_component(field, origin_min, extent, pos, 2),
    )
}

#[allow(clippy::too_many_arguments)]
pub fn advect(
    particles: &mut ParticleSet,
    working: &VelocityField,
    original: &VelocityField,
    origin_min: Point3<f32>,
    extent: Vector3<f32>,
    fluidity: f32,
    turbulence: f32,
    random_dirs: &RandomDirTable,
    frame_number: u64,
    dt: f32,
) -> bool {
    let instability = AtomicBool::new(false);
    let n = particles.len();

    particles.particles_mut().par_iter_mut().enumerate().for_each(|(index, p)| {
        let pos = p.pos();
        let v_old = p.vel();

        let v_grid_new = sample_velocity(working, origin_min, extent, pos);
        let v_grid_old = sample_velocity(original, origin_min, extent, pos);

        let v_pic = v_grid_new;
        let v_flip = v_old + (v_grid_new - v_grid_old);
        let v_new = v_pic * (1.0 - fluidity) + v_flip * fluidity;
        p.set_vel(v_new);

        let step1 = sample_velocity(working, origin_min, extent, pos) * (dt * 0.5);
        let mid = pos + step1;
        let step2 = sample_velocity(working, origin_min, extent, mid) * dt;
        let mut new_pos = pos + step2;

        if turbulence > 0.0 {
            let dir_index = (index as u64 + frame_number) as usize % n.max(1);
            let dir = random_dirs.sample(dir_index);
            let speed = sample_velocity(working, origin_min, extent, new_pos).magnitude();
            new_pos += dir * (turbulence * speed * dt);
        }

        let over_x = (new_pos.x - origin_min.x < -extent.x * INSTABILITY_FRACTION) || (new_pos.x - origin_min.x > extent.x * (1.0 + INSTABILITY_FRACTION));
        let over_y = (new_pos.y - origin_min.y < -extent.y * INSTABILITY_FRACTION) || (new_pos.y - origin_min.y > extent.y * (1.0 + INSTABILITY_FRACTION));
        let over_z = (new_pos.z - origin_min.z < -extent.z * INSTABILITY_FRACTION) || (new_pos.z - origin_min.z > extent.z * (1.0 + INSTABILITY_FRACTION));
        if over_x || over_y || over_z {
            instability.store(true, Ordering::Relaxed);
        }

        new_pos.x = new_pos.x.clamp(origin_min.x + BOUNDARY_MARGIN, origin_min.x + extent.x - BOUNDARY_MARGIN);
        new_pos.y = new_pos.y.clamp(origin_min.y + BOUNDARY_MARGIN, origin_min.y + extent.y - BOUNDARY_MARGIN);
        new_pos.z = new_pos.z.clamp(origin_min.z + BOUNDARY_MARGIN, origin_min.z + extent.z - BOUNDARY_MARGIN);
        p.set_pos(new_pos);
    });

    instability.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::Particle;

    #[test]
    fn zero_particles_is_a_no_op() {
        let dims = GridDims::new(4, 4, 4);
        let working = VelocityField::new(dims);
        let original = VelocityField::new(dims);
        let mut particles = ParticleSet::empty();
        let dirs = RandomDirTable::new(16, 1);
        let unstable = advect(
            &mut particles,
            &working,
            &original,
            Point3::new(0.0, 0.0, 0.0),
            Vector3::new(4.0, 4.0, 4.0),
            0.99,
            0.0,
            &dirs,
            0,
            1.0 / 60.0,
        );
        assert!(!unstable);
        assert!(particles.is_empty());
    }

    #[test]
    fn floor_particle_with_zero_velocity_stays_clamped() {
        let dims = GridDims::new(4, 4, 4);
        let origin_min = Point3::new(0.0, 0.0, 0.0);
        let extent = Vector3::new(4.0, 4.0, 4.0);
        let working = VelocityField::new(dims);
        let original = VelocityField::new(dims);
        let mut particles = ParticleSet::from_vec(vec![Particle { position: [0.01, 0.01, 0.01], velocity: [0.0, 0.0, 0.0] }]);
        let dirs = RandomDirTable::new(16, 1);
        advect(&mut particles, &working, &original, origin_min, extent, 0.99, 0.0, &dirs, 0, 1.0 / 60.0);
        let pos = particles.particles()[0].pos();
        assert!((pos.x - 0.01).abs() < 1e-4);
        assert!((pos.y - 0.01).abs() < 1e-4);
        assert!((pos.z - 0.01).abs() < 1e-4);
    }

    #[test]
    fn fluidity_zero_on_resting_field_keeps_zero_velocity() {
        let dims = GridDims::new(4, 4, 4);
        let origin_min = Point3::new(0.0, 0.0, 0.0);
        let extent = Vector3::new(4.0, 4.0, 4.0);
        let working = VelocityField::new(dims);
        let original = VelocityField::new(dims);
        let mut particles = ParticleSet::from_vec(vec![Particle { position: [2.0, 2.0, 2.0], velocity: [0.0, 0.0, 0.0] }]);
        let dirs = RandomDirTable::new(16, 1);
        advect(&mut particles, &working, &original, origin_min, extent, 0.0, 0.0, &dirs, 0, 1.0 / 60.0);
        assert_eq!(particles.particles()[0].vel(), Vector3::new(0.0, 0.0, 0.0));
    }
}
