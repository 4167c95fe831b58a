// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Vrms, incidence angle, slant time, and the per-offset sample window.

use crate::axis::linear_interp1d;

/// Root-mean-square velocity at each reflector, from Dix's formula applied
/// to interval velocities and interval two-way times.
///
/// `twt` is the cumulative two-way time to each reflector (ms);
/// `interval_velocity[k]` is the interval velocity (m/s) of the layer
/// between reflector `k - 1` and reflector `k` (with an implicit reflector
/// `-1` at `t = 0`).
pub fn vrms_at_reflectors(twt: &[f64], interval_velocity: &[f64]) -> Vec<f64> {
    let mut vrms = vec![0.0; twt.len()];
    let mut cumulative = 0.0;
    let mut prev_twt = 0.0;
    for k in 0..twt.len() {
        let dtwt = twt[k] - prev_twt;
        cumulative += interval_velocity[k] * interval_velocity[k] * dtwt;
        vrms[k] = if twt[k] > 0.0 {
            (cumulative / twt[k]).sqrt()
        } else {
            0.0
        };
        prev_twt = twt[k];
    }
    vrms
}

/// Vrms resampled onto the regular `t0` axis: the cumulative
/// `vrms(k)^2 * twt(k)` quantity is linearly interpolated onto `t0`, then
/// divided back out, rather than interpolating Vrms itself.
pub fn vrms_regular(twt: &[f64], vrms: &[f64], t0: &[f64]) -> Vec<f64> {
    let cumulative: Vec<f64> = vrms.iter().zip(twt).map(|(v, t)| v * v * t).collect();
    let cumulative_reg = linear_interp1d(twt, &cumulative, t0);
    cumulative_reg
        .iter()
        .zip(t0)
        .map(|(c, t)| if *t > 0.0 { (c / t).sqrt() } else { 0.0 })
        .collect()
}

/// Incidence angle (radians) for reflector `k` at offset `h` (m), two-way
/// time `twt` (ms) and root-mean-square velocity `vrms` (m/s).
pub fn incidence_angle(offset: f64, vrms: f64, twt: f64) -> f64 {
    (offset / (vrms * twt / 1000.0)).atan()
}

/// Slant (non-zero-offset) two-way travel time (ms) for reflector `k` at
/// offset `h`, given its zero-offset two-way time and root-mean-square
/// velocity.
pub fn slant_time(offset: f64, vrms: f64, twt: f64) -> f64 {
    (twt * twt + 1_000_000.0 * (offset * offset) / (vrms * vrms)).sqrt()
}

/// Bracket the `t0` sample indices a given offset's slant-time curve could
/// possibly land a nonzero contribution in, from the minimum and maximum
/// over reflectors of the slant time evaluated with the *regular*-axis
/// Vrms (i.e. the offset's own `twtx_reg` column).
///
/// Returns `(n_min, n_max)` with `0 <= n_min <= n_max < t0.len()`.
pub fn sample_window(twtx_reg_column: &[f64], t0: &[f64]) -> (usize, usize) {
    let min_t = twtx_reg_column
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let max_t = twtx_reg_column
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);

    let n_min = t0.iter().position(|&t| t >= min_t).unwrap_or(0);
    let n_max = t0
        .iter()
        .rposition(|&t| t <= max_t)
        .unwrap_or(t0.len() - 1);
    (n_min, n_max.max(n_min))
}
