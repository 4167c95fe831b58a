// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The read-only lateral/vertical grid types the core computes over.
//!
//! This module owns the *shape* of an earth model — a lateral grid of
//! reflector stacks, each reflector carrying a two-way time, a depth, and
//! above/below elastic parameters — not parsing one out of an
//! Eclipse/SEG-Y/STORM file. Callers construct something implementing
//! [`EarthModel`] however they like and hand this crate a reference.

use crate::constants::MASKED_SENTINEL;

/// A lateral grid of reflector stacks.
///
/// `vp`/`vs`/`rho` carry one more sample than `twt`/`z` per pillar
/// (`nzrefl + 1` values, indices `0..=nzrefl`): reflector `k`'s contrast is
/// formed from elastic samples `k` (above) and `k + 1` (below).
pub trait EarthModel: Sync {
    fn nx(&self) -> usize;
    fn ny(&self) -> usize;
    /// Number of reflectors per pillar.
    fn nzrefl(&self) -> usize;

    /// Two-way time (ms) to reflector `k`, or [`MASKED_SENTINEL`] at `k
    /// == 0` if the pillar is outside the model (Testable Property 1).
    fn twt(&self, i: usize, j: usize, k: usize) -> f64;
    /// Depth (m) of reflector `k`.
    fn z(&self, i: usize, j: usize, k: usize) -> f64;

    /// P-wave velocity (m/s) sample `k` (`0..=nzrefl`).
    fn vp(&self, i: usize, j: usize, k: usize) -> f64;
    /// S-wave velocity (m/s) sample `k` (`0..=nzrefl`).
    fn vs(&self, i: usize, j: usize, k: usize) -> f64;
    /// Density (kg/m^3) sample `k` (`0..=nzrefl`).
    fn rho(&self, i: usize, j: usize, k: usize) -> f64;

    /// The lateral (x, y) position of a pillar's cell center.
    fn cell_center_xy(&self, i: usize, j: usize) -> (f64, f64);
}

/// A laterally-varying surface (top time, base depth, …), addressable by
/// (x, y) rather than by grid index. Returns `None` where the surface is
/// missing (outside its own footprint).
pub trait Surface: Sync {
    fn z_at(&self, x: f64, y: f64) -> Option<f64>;
}

/// A regularly-sampled axis: `start + step * k` for `k` in `0..len`.
#[derive(Debug, Clone, Copy)]
pub struct RegularAxis {
    pub start: f64,
    pub step: f64,
    pub len: usize,
}

impl RegularAxis {
    pub fn new(start: f64, step: f64, len: usize) -> Self {
        RegularAxis { start, step, len }
    }

    /// All sample abscissae, `start + step * k`.
    pub fn values(&self) -> Vec<f64> {
        (0..self.len).map(|k| self.start + self.step * k as f64).collect()
    }

    /// Sample centers offset by half a step, `start + step * (k + 0.5)`,
    /// matching the way the regular time axis is centered on each
    /// convolution output sample.
    pub fn sample_centers(&self) -> Vec<f64> {
        (0..self.len)
            .map(|k| self.start + self.step * (k as f64 + 0.5))
            .collect()
    }
}

/// Whether a pillar's reflector stack is masked out: either its top
/// two-way time is the missing-value sentinel, or every elastic sample is
/// indistinguishable from the background constants (Testable Property 1).
pub fn is_masked(model: &dyn EarthModel, i: usize, j: usize, const_vp: f64, const_vs: f64, const_rho: f64) -> bool {
    if model.twt(i, j, 0) == MASKED_SENTINEL {
        return true;
    }
    let nk = model.nzrefl() + 1;
    for k in 1..nk.saturating_sub(1) {
        if model.vp(i, j, k) != const_vp
            || model.vs(i, j, k) != const_vs
            || model.rho(i, j, k) != const_rho
        {
            return false;
        }
    }
    true
}

/// A dense, in-memory [`EarthModel`] built directly from `ndarray` arrays;
/// mainly useful for tests and small synthetic models.
pub struct ArrayEarthModel {
    nx: usize,
    ny: usize,
    nzrefl: usize,
    twt: ndarray::Array3<f64>,
    z: ndarray::Array3<f64>,
    vp: ndarray::Array3<f64>,
    vs: ndarray::Array3<f64>,
    rho: ndarray::Array3<f64>,
    dx: f64,
    dy: f64,
}

impl ArrayEarthModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        twt: ndarray::Array3<f64>,
        z: ndarray::Array3<f64>,
        vp: ndarray::Array3<f64>,
        vs: ndarray::Array3<f64>,
        rho: ndarray::Array3<f64>,
        dx: f64,
        dy: f64,
    ) -> Self {
        let (nx, ny, nzrefl) = twt.dim();
        assert_eq!(vp.dim(), (nx, ny, nzrefl + 1));
        ArrayEarthModel {
            nx,
            ny,
            nzrefl,
            twt,
            z,
            vp,
            vs,
            rho,
            dx,
            dy,
        }
    }
}

impl EarthModel for ArrayEarthModel {
    fn nx(&self) -> usize {
        self.nx
    }
    fn ny(&self) -> usize {
        self.ny
    }
    fn nzrefl(&self) -> usize {
        self.nzrefl
    }
    fn twt(&self, i: usize, j: usize, k: usize) -> f64 {
        self.twt[(i, j, k)]
    }
    fn z(&self, i: usize, j: usize, k: usize) -> f64 {
        self.z[(i, j, k)]
    }
    fn vp(&self, i: usize, j: usize, k: usize) -> f64 {
        self.vp[(i, j, k)]
    }
    fn vs(&self, i: usize, j: usize, k: usize) -> f64 {
        self.vs[(i, j, k)]
    }
    fn rho(&self, i: usize, j: usize, k: usize) -> f64 {
        self.rho[(i, j, k)]
    }
    fn cell_center_xy(&self, i: usize, j: usize) -> (f64, f64) {
        ((i as f64 + 0.5) * self.dx, (j as f64 + 0.5) * self.dy)
    }
}
