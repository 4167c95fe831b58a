// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Linearized Zoeppritz reflection coefficients.
//!
//! [`AngleConstants::compute`] precomputes the angle-dependent trig weights
//! for a given incidence angle once; [`reflection`] then combines those
//! weights with the six contrast/mean elastic inputs for a given reflector,
//! for either the PP or the PS (converted-wave) mode. Splitting the two
//! steps avoids recomputing `sin`/`tan` once per reflector per cell, the way
//! the source calls `ComputeConstants(theta)` once per (reflector, offset)
//! pair and `GetReflection(...)` per reflector.

/// Which reflection coefficient to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    /// P-to-P (non-converted) reflection.
    Pp,
    /// P-to-S (converted) reflection.
    Ps,
}

/// Precomputed, angle-only weights shared by both modes.
#[derive(Debug, Clone, Copy)]
pub struct AngleConstants {
    sin_theta: f64,
    cos_theta: f64,
    sin2: f64,
    tan2: f64,
}

impl AngleConstants {
    pub fn compute(theta: f64) -> Self {
        let sin_theta = theta.sin();
        let cos_theta = theta.cos();
        AngleConstants {
            sin_theta,
            cos_theta,
            sin2: sin_theta * sin_theta,
            tan2: theta.tan() * theta.tan(),
        }
    }
}

/// Combine the precomputed angle weights with the six contrast/mean elastic
/// inputs for one reflector to produce a single reflection coefficient.
///
/// `diff_x = x_below - x_above`, `mean_x = (x_below + x_above) / 2`.
#[allow(clippy::too_many_arguments)]
pub fn reflection(
    mode: Mode,
    c: &AngleConstants,
    diff_vp: f64,
    mean_vp: f64,
    diff_rho: f64,
    mean_rho: f64,
    diff_vs: f64,
    mean_vs: f64,
) -> f64 {
    if mean_vp == 0.0 {
        return 0.0;
    }
    let k = if mean_vp != 0.0 {
        (mean_vs / mean_vp).powi(2)
    } else {
        0.0
    };

    match mode {
        // Aki & Richards (1980) weak-contrast linearized approximation.
        Mode::Pp => {
            let a_rho = 0.5 * (1.0 - 4.0 * k * c.sin2);
            let b_vp = 0.5 * (1.0 + c.tan2);
            let c_vs = -4.0 * k * c.sin2;
            b_vp * safe_ratio(diff_vp, mean_vp)
                + a_rho * safe_ratio(diff_rho, mean_rho)
                + c_vs * safe_ratio(diff_vs, mean_vs)
        }
        // Small-angle linearized converted-wave approximation: vanishes at
        // normal incidence and grows with sin(theta)/cos(theta).
        Mode::Ps => {
            let weight = c.sin_theta / c.cos_theta.max(f64::EPSILON);
            let bracket =
                safe_ratio(diff_rho, mean_rho) + 2.0 * safe_ratio(diff_vs, mean_vs) * (1.0 - 2.0 * k * c.sin2);
            -0.5 * weight * bracket
        }
    }
}

fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
