//! C7: external forces — gravity and the optional mouse-ray impulse.

use crate::config::MouseInput;
use crate::grid::{self, GridDims};
use crate::fields::VelocityField;
use cgmath::{InnerSpace, Point3, Vector3};
use rayon::prelude::*;

/// Smoothstep between edges `e0` and `e1`, clamped outside the interval.
fn smoothstep(e0: f32, e1: f32, x: f32) -> f32 {
    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Perpendicular distance from `point` to the infinite ray through `origin`
/// with (assumed unit) `direction`.
fn distance_to_ray(point: Point3<f32>, origin: Point3<f32>, direction: Vector3<f32>) -> f32 {
    let to_point = point - origin;
    let along = to_point.dot(direction);
    let closest = to_point - direction * along;
    closest.magnitude()
}

/// Applies gravity (always) and the mouse-ray impulse (if `mouse` is
/// present) to every node of the working velocity field.
#[allow(clippy::too_many_arguments)]
pub fn apply(
    field: &mut VelocityField,
    origin_min: Point3<f32>,
    extent: Vector3<f32>,
    gravity: f32,
    mouse: Option<MouseInput>,
    mouse_radius: f32,
    dt: f32,
) {
    let dims = field.dims();
    let sx = dims.nx as i32 + 1;
    let sy = dims.ny as i32 + 1;

    let mouse_origin = mouse.map(|m| Point3::new(m.origin[0], m.origin[1], m.origin[2]));
    let mouse_dir = mouse.map(|m| Vector3::new(m.direction[0], m.direction[1], m.direction[2]));
    let mouse_vel = mouse.map(|m| Vector3::new(m.velocity[0], m.velocity[1], m.velocity[2]));
    let framerate_factor = 3.0 * smoothstep(0.0, 1.0 / 200.0, dt);

    field.nodes_mut().par_iter_mut().enumerate().for_each(|(idx, node)| {
        node.vy -= gravity * dt;

        if let (Some(origin), Some(dir), Some(vel)) = (mouse_origin, mouse_dir, mouse_vel) {
            let i = (idx as i32) % sx;
            let j = ((idx as i32) / sx) % sy;
            let k = (idx as i32) / (sx * sy);

            let px = grid::staggered_world_pos(origin_min, extent, dims, i, j, k, 0);
            let py = grid::staggered_world_pos(origin_min, extent, dims, i, j, k, 1);
            let pz = grid::staggered_world_pos(origin_min, extent, dims, i, j, k, 2);

            let kx = smoothstep(1.0, 0.9, distance_to_ray(px, origin, dir) / mouse_radius);
            let ky = smoothstep(1.0, 0.9, distance_to_ray(py, origin, dir) / mouse_radius);
            let kz = smoothstep(1.0, 0.9, distance_to_ray(pz, origin, dir) / mouse_radius);

            node.vx += vel.x * kx * framerate_factor;
            node.vy += vel.y * ky * framerate_factor;
            node.vz += vel.z * kz * framerate_factor;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_decrements_vy_by_g_dt() {
        let dims = GridDims::new(4, 4, 4);
        let mut field = VelocityField::new(dims);
        apply(&mut field, Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0), 9.8, None, 2.0, 1.0 / 60.0);
        for n in field.nodes() {
            assert!((n.vy - (-9.8 / 60.0)).abs() < 1e-5);
        }
    }

    #[test]
    fn no_mouse_leaves_xz_untouched() {
        let dims = GridDims::new(4, 4, 4);
        let mut field = VelocityField::new(dims);
        apply(&mut field, Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0), 0.0, None, 2.0, 1.0 / 60.0);
        for n in field.nodes() {
            assert_eq!(n.vx, 0.0);
            assert_eq!(n.vz, 0.0);
        }
    }

    #[test]
    fn mouse_impulse_is_strongest_at_ray_center() {
        let dims = GridDims::new(8, 8, 8);
        let origin_min = Point3::new(-4.0, 0.0, -4.0);
        let extent = Vector3::new(8.0, 8.0, 8.0);
        let mut field = VelocityField::new(dims);
        let mouse = MouseInput { origin: [0.0, 4.0, 0.0], direction: [0.0, -1.0, 0.0], velocity: [0.0, -20.0, 0.0] };
        apply(&mut field, origin_min, extent, 0.0, Some(mouse), 2.0, 1.0 / 60.0);
        let center = field.vy(4, 4, 4);
        let edge = field.vy(0, 4, 0);
        assert!(center < edge);
    }
}
