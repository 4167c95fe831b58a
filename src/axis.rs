// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Time/depth/shifted-time axis conversion and the shared interpolation
//! helpers it (and [`crate::nmo`]) are built on.
//!
//! Both [`linear_interp1d`] and [`spline_interp1d`] first drop any abscissa
//! that repeats its immediate predecessor, keeping only the first of each
//! run (Testable Property 6) — two-way time and depth grids generated from
//! a constant-velocity or zero-thickness interval produce exactly-equal
//! consecutive samples, which would otherwise make the interpolant
//! ill-posed.

use ndarray::{Array2, ArrayView2};

/// Drop any `x_in[i]` equal to the immediately preceding kept abscissa,
/// carrying its paired `y_in[i]` along. Mirrors the deduplication every
/// interpolation entry point in the source performs before handing its
/// inputs to the underlying interpolator.
fn dedup_abscissae(x_in: &[f64], y_in: &[f64]) -> (Vec<f64>, Vec<f64>) {
    if x_in.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let mut xs = Vec::with_capacity(x_in.len());
    let mut ys = Vec::with_capacity(y_in.len());
    xs.push(x_in[0]);
    ys.push(y_in[0]);
    for i in 1..x_in.len() {
        if x_in[i] != x_in[i - 1] {
            xs.push(x_in[i]);
            ys.push(y_in[i]);
        }
    }
    (xs, ys)
}

/// Piecewise-linear interpolation of `(x_in, y_in)` at `x_out`, clamping to
/// the boundary value outside `[x_in[0], x_in[last]]`.
pub fn linear_interp1d(x_in: &[f64], y_in: &[f64], x_out: &[f64]) -> Vec<f64> {
    let (xs, ys) = dedup_abscissae(x_in, y_in);
    if xs.is_empty() {
        return vec![0.0; x_out.len()];
    }
    if xs.len() == 1 {
        return vec![ys[0]; x_out.len()];
    }

    x_out
        .iter()
        .map(|&x| {
            if x <= xs[0] {
                return ys[0];
            }
            if x >= *xs.last().unwrap() {
                return *ys.last().unwrap();
            }
            let i = match xs.binary_search_by(|probe| probe.partial_cmp(&x).unwrap()) {
                Ok(i) => return ys[i],
                Err(i) => i,
            };
            let a = (xs[i] - x) / (xs[i] - xs[i - 1]);
            a * ys[i - 1] + (1.0 - a) * ys[i]
        })
        .collect()
}

/// Natural cubic spline interpolation of `(x_in, y_in)` at `x_out`,
/// returning `extrap_value` for any `x_out` outside `[x_in[0], x_in[last]]`.
pub fn spline_interp1d(x_in: &[f64], y_in: &[f64], x_out: &[f64], extrap_value: f64) -> Vec<f64> {
    let (xs, ys) = dedup_abscissae(x_in, y_in);
    if xs.len() < 2 {
        return vec![extrap_value; x_out.len()];
    }

    let second_derivatives = natural_cubic_spline_second_derivatives(&xs, &ys);

    x_out
        .iter()
        .map(|&x| {
            if x < xs[0] || x > *xs.last().unwrap() {
                return extrap_value;
            }
            evaluate_cubic_spline(&xs, &ys, &second_derivatives, x)
        })
        .collect()
}

/// Tridiagonal (Thomas algorithm) solve for a natural cubic spline's second
/// derivatives at each knot.
fn natural_cubic_spline_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut y2 = vec![0.0; n];
    if n < 3 {
        return y2;
    }
    let mut u = vec![0.0; n];

    for i in 1..n - 1 {
        let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
        let p = sig * y2[i - 1] + 2.0;
        y2[i] = (sig - 1.0) / p;
        let d = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]) - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
        u[i] = (6.0 * d / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
    }

    for i in (0..n - 1).rev() {
        y2[i] = y2[i] * y2[i + 1] + u[i];
    }
    y2
}

fn evaluate_cubic_spline(xs: &[f64], ys: &[f64], y2: &[f64], x: f64) -> f64 {
    let n = xs.len();
    let mut lo = 0usize;
    let mut hi = n - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if xs[mid] > x {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let h = xs[hi] - xs[lo];
    if h == 0.0 {
        return ys[lo];
    }
    let a = (xs[hi] - x) / h;
    let b = (x - xs[lo]) / h;
    a * ys[lo]
        + b * ys[hi]
        + ((a.powi(3) - a) * y2[lo] + (b.powi(3) - b) * y2[hi]) * (h * h) / 6.0
}

/// Piecewise-linear inversion of a monotonic `(zvec, tvec)` pair: find the
/// time corresponding to depth `z`.
pub fn find_t_from_z(z: f64, zvec: &[f64], tvec: &[f64]) -> f64 {
    let mut i = 0;
    while i < zvec.len() - 1 && z > zvec[i] {
        i += 1;
    }
    if i > 0 {
        let a = (zvec[i] - z) / (zvec[i] - zvec[i - 1]);
        a * tvec[i - 1] + (1.0 - a) * tvec[i]
    } else {
        tvec[0]
    }
}

/// Prepend `(twt=0, z=0)` and append an extrapolated closing point below
/// the deepest reflector, giving the depth-axis converter a pair of
/// (depth, time) points that safely bracket the whole model.
pub fn extrapolate_z_and_twt(
    twt_vec: &[f64],
    z_vec: &[f64],
    z_bot: f64,
    const_vp: f64,
) -> (Vec<f64>, Vec<f64>) {
    let nzrefl = twt_vec.len();
    let mut z_out = vec![0.0; nzrefl + 2];
    let mut t_out = vec![0.0; nzrefl + 2];

    for k in 0..nzrefl {
        t_out[k + 1] = twt_vec[k];
        z_out[k + 1] = z_vec[k];
    }
    z_out[nzrefl + 1] = z_bot;
    t_out[nzrefl + 1] = t_out[nzrefl]
        + crate::constants::DEPTH_EXTRAPOLATION_TWT_FACTOR * (z_out[nzrefl + 1] - z_out[nzrefl])
            / const_vp;

    (z_out, t_out)
}

/// Resample a cell's NMO-corrected time-axis trace onto the depth axis.
///
/// `twt_vec`/`zgrid_vec` are the (already extrapolated) depth-vs-time pair
/// for this cell; `twt_0` is the regular time axis the `seismic` cube is
/// sampled on; `z_0` is the regular output depth axis; only the first
/// `max_sample` rows of `seismic` carry real (non-zero-padded) samples.
pub fn convert_seis(
    twt_vec: &[f64],
    twt_0: &[f64],
    zgrid_vec: &[f64],
    z_0: &[f64],
    seismic: ArrayView2<f64>,
    max_sample: usize,
) -> Array2<f64> {
    let nk = z_0.len();
    let noff = seismic.ncols();
    let mut out = Array2::zeros((nk, noff));

    let mut zt_reg = linear_interp1d(twt_vec, zgrid_vec, twt_0);
    zt_reg.truncate(max_sample);

    for off in 0..noff {
        let seismic_vec: Vec<f64> = (0..max_sample).map(|k| seismic[(k, off)]).collect();
        let converted = spline_interp1d(&zt_reg, &seismic_vec, z_0, 0.0);
        for k in 0..nk {
            out[(k, off)] = converted[k];
        }
    }
    out
}
