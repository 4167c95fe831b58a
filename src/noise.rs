// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gaussian reflectivity noise (§4.8), seeded per lateral cell.
//!
//! Never touches a process-global RNG: [`cell_rng`] reseeds a fresh
//! `ChaCha8Rng` from `user_seed + i + nx * j` for every cell, so a
//! parallelised sweep (§5) is bit-identical to a sequential one regardless
//! of thread scheduling.

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// A deterministic per-cell RNG: `user_seed + i + nx * j`, matching the
/// seeding scheme named in §4.8 and §9.
pub fn cell_rng(user_seed: u64, i: usize, j: usize, nx: usize) -> ChaCha8Rng {
    let seed = user_seed.wrapping_add(i as u64).wrapping_add((nx as u64).wrapping_mul(j as u64));
    rand::SeedableRng::seed_from_u64(seed)
}

/// Add independent `N(0, std_dev^2)` noise to every entry of `refl`
/// in-place, one draw per (reflector, column) entry.
pub fn add_gaussian_noise(refl: &mut Array2<f64>, std_dev: f64, rng: &mut ChaCha8Rng) {
    if std_dev <= 0.0 {
        return;
    }
    let normal = Normal::new(0.0, std_dev).expect("std_dev already validated positive");
    refl.mapv_inplace(|v| v + normal.sample(rng));
}

/// Draw the same noise a caller would add via [`add_gaussian_noise`], but
/// return it as a standalone array instead of mutating `refl` — used when
/// both the pre-noise and post-noise reflectivity must be kept (§4.8,
/// "store the pre-noise zero-offset reflectivities in a first grid and the
/// post-noise in a second grid").
pub fn noisy_copy(refl: ArrayView2<f64>, std_dev: f64, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let mut out = refl.to_owned();
    add_gaussian_noise(&mut out, std_dev, rng);
    out
}
