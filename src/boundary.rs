//! C8: free-slip wall enforcement, run twice per step (after C7 and after
//! C11).

use crate::fields::VelocityField;
use crate::grid::GridDims;
use rayon::prelude::*;

/// Zeroes the wall-normal velocity component at every boundary node of the
/// MAC grid, except the +y face, where outflow is permitted: the normal
/// component is clamped to `min(current, 0)` instead of zeroed. Tangential
/// components are left untouched: each face only ever clamps the one
/// staggered component normal to it.
pub fn enforce(field: &mut VelocityField) {
    let dims = field.dims();

    enforce_axis(field, dims, 0, |i, _j, _k| i == 0 || i == dims.nx as i32, false);
    enforce_axis(field, dims, 1, |_i, j, _k| j == 0, false);
    enforce_axis(field, dims, 1, |_i, j, _k| j == dims.ny as i32, true);
    enforce_axis(field, dims, 2, |_i, _j, k| k == 0 || k == dims.nz as i32, false);
}

/// Applies the wall condition to one velocity component (`axis` 0=Vx,
/// 1=Vy, 2=Vz) at every node for which `on_wall` is true. `outflow_only`
/// selects the +y-face relaxation (clamp to non-positive instead of zero).
fn enforce_axis(field: &mut VelocityField, dims: GridDims, axis: usize, on_wall: impl Fn(i32, i32, i32) -> bool + Sync, outflow_only: bool) {
    let sx = dims.nx as i32 + 1;
    let sy = dims.ny as i32 + 1;
    let nodes = field.nodes_mut();

    nodes.par_iter_mut().enumerate().for_each(|(idx, node)| {
        let i = (idx as i32) % sx;
        let j = ((idx as i32) / sx) % sy;
        let k = (idx as i32) / (sx * sy);
        if !on_wall(i, j, k) {
            return;
        }
        let component = match axis {
            0 => &mut node.vx,
            1 => &mut node.vy,
            2 => &mut node.vz,
            _ => unreachable!("axis must be 0, 1 or 2"),
        };
        if outflow_only {
            *component = component.min(0.0);
        } else {
            *component = 0.0;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_top_walls_are_exactly_zero() {
        let dims = GridDims::new(4, 4, 4);
        let mut field = VelocityField::new(dims);
        for n in field.nodes_mut().iter_mut() {
            n.vx = 5.0;
            n.vy = 5.0;
            n.vz = 5.0;
        }
        enforce(&mut field);
        assert_eq!(field.vx(0, 1, 1), 0.0);
        assert_eq!(field.vx(4, 1, 1), 0.0);
        assert_eq!(field.vz(1, 1, 0), 0.0);
        assert_eq!(field.vz(1, 1, 4), 0.0);
        assert_eq!(field.vy(1, 0, 1), 0.0);
    }

    #[test]
    fn top_wall_permits_outflow_only() {
        let dims = GridDims::new(4, 4, 4);
        let mut field = VelocityField::new(dims);
        field.set_vy(1, 4, 1, 3.0);
        enforce(&mut field);
        assert!(field.vy(1, 4, 1) <= 0.0);

        let mut field2 = VelocityField::new(dims);
        field2.set_vy(1, 4, 1, -3.0);
        enforce(&mut field2);
        assert_eq!(field2.vy(1, 4, 1), -3.0);
    }

    #[test]
    fn interior_nodes_are_untouched() {
        let dims = GridDims::new(4, 4, 4);
        let mut field = VelocityField::new(dims);
        field.set_vx(2, 2, 2, 7.0);
        enforce(&mut field);
        assert_eq!(field.vx(2, 2, 2), 7.0);
    }
}
