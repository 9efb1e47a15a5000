//! C2: fixed-point atomic accumulator.
//!
//! Native float atomics are not portable across CPU targets any more than
//! they are across GPU shader dialects, so this uses a fixed-point
//! scheme instead: floats are scaled by a per-solver `scale` factor,
//! truncated to a signed integer, and summed with `AtomicI32::fetch_add`.
//! Readers reverse the scaling. `scale` is threaded in from
//! [`crate::config::SolverConfig`] rather than hardcoded, per spec section 9
//! ("scale factor ... supplied per Reset; none are implicit globals").
//! Overflow is avoided by construction: per-frame per-node sums stay far
//! below `i32::MAX / scale` for any particle count this solver is sized for.

use cgmath::Vector3;
use std::sync::atomic::{AtomicI32, Ordering};

fn encode(v: f32, scale: f32) -> i32 {
    (v * scale) as i32
}

fn decode(v: i32, scale: f32) -> f32 {
    v as f32 / scale
}

/// Accumulates the per-component P2G kernel weights (`wx, wy, wz`) plus the
/// scalar density weight (`ws`) for one velocity-grid node.
pub struct WeightAccumulator {
    scale: f32,
    wx: AtomicI32,
    wy: AtomicI32,
    wz: AtomicI32,
    ws: AtomicI32,
}

impl WeightAccumulator {
    pub fn new(scale: f32) -> Self {
        WeightAccumulator { scale, wx: AtomicI32::new(0), wy: AtomicI32::new(0), wz: AtomicI32::new(0), ws: AtomicI32::new(0) }
    }

    pub fn add(&self, wx: f32, wy: f32, wz: f32, ws: f32) {
        if wx != 0.0 {
            self.wx.fetch_add(encode(wx, self.scale), Ordering::Relaxed);
        }
        if wy != 0.0 {
            self.wy.fetch_add(encode(wy, self.scale), Ordering::Relaxed);
        }
        if wz != 0.0 {
            self.wz.fetch_add(encode(wz, self.scale), Ordering::Relaxed);
        }
        if ws != 0.0 {
            self.ws.fetch_add(encode(ws, self.scale), Ordering::Relaxed);
        }
    }

    pub fn load(&self) -> (f32, f32, f32, f32) {
        (
            decode(self.wx.load(Ordering::Relaxed), self.scale),
            decode(self.wy.load(Ordering::Relaxed), self.scale),
            decode(self.wz.load(Ordering::Relaxed), self.scale),
            decode(self.ws.load(Ordering::Relaxed), self.scale),
        )
    }

    pub fn clear(&self) {
        self.wx.store(0, Ordering::Relaxed);
        self.wy.store(0, Ordering::Relaxed);
        self.wz.store(0, Ordering::Relaxed);
        self.ws.store(0, Ordering::Relaxed);
    }
}

/// Accumulates the weighted velocity sums (`vx*wx, vy*wy, vz*wz`) for one
/// velocity-grid node.
pub struct VelocityAccumulator {
    scale: f32,
    vx: AtomicI32,
    vy: AtomicI32,
    vz: AtomicI32,
}

impl VelocityAccumulator {
    pub fn new(scale: f32) -> Self {
        VelocityAccumulator { scale, vx: AtomicI32::new(0), vy: AtomicI32::new(0), vz: AtomicI32::new(0) }
    }

    pub fn add(&self, weighted: Vector3<f32>) {
        if weighted.x != 0.0 {
            self.vx.fetch_add(encode(weighted.x, self.scale), Ordering::Relaxed);
        }
        if weighted.y != 0.0 {
            self.vy.fetch_add(encode(weighted.y, self.scale), Ordering::Relaxed);
        }
        if weighted.z != 0.0 {
            self.vz.fetch_add(encode(weighted.z, self.scale), Ordering::Relaxed);
        }
    }

    pub fn load(&self) -> Vector3<f32> {
        Vector3::new(
            decode(self.vx.load(Ordering::Relaxed), self.scale),
            decode(self.vy.load(Ordering::Relaxed), self.scale),
            decode(self.vz.load(Ordering::Relaxed), self.scale),
        )
    }

    pub fn clear(&self) {
        self.vx.store(0, Ordering::Relaxed);
        self.vy.store(0, Ordering::Relaxed);
        self.vz.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_adds_sum_deterministically_modulo_rounding() {
        let acc = WeightAccumulator::new(10_000.0);
        (0..10_000).into_par_iter().for_each(|_| acc.add(0.001, 0.002, 0.0, 1.0));
        let (wx, _, _, ws) = acc.load();
        assert!((wx - 10.0).abs() < 0.1);
        assert!((ws - 10_000.0).abs() < 1e-3);
    }

    #[test]
    fn scale_is_threaded_from_construction_not_a_hardcoded_global() {
        let coarse = WeightAccumulator::new(10.0);
        let fine = WeightAccumulator::new(10_000.0);
        coarse.add(0.12345, 0.0, 0.0, 0.0);
        fine.add(0.12345, 0.0, 0.0, 0.0);
        let (coarse_wx, ..) = coarse.load();
        let (fine_wx, ..) = fine.load();
        // A coarser scale truncates more of the fractional part, so the two
        // readers of the same input diverge once decoded.
        assert!((coarse_wx - fine_wx).abs() > 1e-3);
    }
}
