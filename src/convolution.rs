// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The trace synthesis kernel: convolving per-reflector reflection
//! coefficients, arriving at per-sample times, with a wavelet.
//!
//! The same kernel serves both the NMO path (`arrival` is `twtx`, varying
//! per offset column) and the non-NMO path (`arrival` is `twt`, broadcast
//! identically across angle columns; `refl` varies per angle instead).

use ndarray::{Array2, ArrayView2};

use crate::wavelet::Wavelet;

/// Convolve a cell's reflectivity series with `wavelet`, producing one
/// output sample per entry of `out_times` for each column of `refl`.
///
/// `refl` and `arrival` are `(n_reflectors, n_columns)`; `out_times` has
/// length `n_samples` and is shared by every column. When `window` is
/// `Some((n_min, n_max))`, output sample `k` in column `c` is forced to
/// zero unless `n_min[c] < k < n_max[c]` (Testable Property 2); `None`
/// disables windowing (used by the non-NMO angle path, where the wavelet's
/// own support is the only restriction).
pub fn convolve(
    refl: ArrayView2<f64>,
    arrival: ArrayView2<f64>,
    wavelet: &Wavelet,
    wavelet_scale: f64,
    out_times: &[f64],
    window: Option<(&[usize], &[usize])>,
) -> Array2<f64> {
    let nzrefl = refl.nrows();
    let ncols = refl.ncols();
    let nt = out_times.len();
    let half_width = wavelet.half_width();

    let mut out = Array2::zeros((nt, ncols));
    for col in 0..ncols {
        let bracket = window.map(|(lo, hi)| (lo[col], hi[col]));
        for k in 0..nt {
            if let Some((n_min, n_max)) = bracket {
                if !(k > n_min && k < n_max) {
                    continue;
                }
            }
            let t = out_times[k];
            let mut seis = 0.0;
            for kk in 0..nzrefl {
                let dt = arrival[(kk, col)] - t;
                if dt.abs() < half_width {
                    seis += refl[(kk, col)] * wavelet_scale * wavelet.evaluate(dt);
                }
            }
            out[(k, col)] = seis;
        }
    }
    out
}
