// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Normal moveout (NMO) correction.

use ndarray::{Array2, ArrayView2};

use crate::axis::spline_interp1d;

/// NMO-correct a cell's per-offset time-domain traces.
///
/// `t_in` is the regular zero-offset time axis `data_in` is sampled on.
/// `t_out(k, off)` is the slant time (`twtx`) each output sample `k` should
/// be pulled from, per offset. Only samples within `[n_min[off], n_max[off]]`
/// of `data_in` are used as interpolation sources, and output samples are
/// only produced while `t_out` is known to stay within that source range
/// (the slant-time curve isn't necessarily monotonic beyond it).
///
/// Returns the corrected traces and `max_sample`, the largest number of
/// in-range output samples produced for any offset — the caller uses this
/// to know how many rows of the result carry real (non-zero-padded) data.
pub fn nmo_correct(
    t_in: &[f64],
    data_in: ArrayView2<f64>,
    t_out: ArrayView2<f64>,
    n_min: &[usize],
    n_max: &[usize],
) -> (Array2<f64>, usize) {
    let nt = data_in.nrows();
    let noff = data_in.ncols();
    let mut data_out = Array2::zeros((nt, noff));
    let mut max_sample = 0usize;

    for off in 0..noff {
        let lo = n_min[off];
        let hi = n_max[off];
        let window_len = hi - lo + 1;

        let data_vec_in: Vec<f64> = (lo..=hi).map(|k| data_in[(k, off)]).collect();
        let t_vec_in: Vec<f64> = (lo..=hi).map(|k| t_in[k]).collect();

        let mut inside = false;
        let mut index = 0usize;
        let mut t_vec_out: Vec<f64> = Vec::with_capacity(nt);
        for k in 0..nt {
            let t = t_out[(k, off)];
            t_vec_out.push(t);
            if !inside && t > t_vec_in[0] && t < t_vec_in[window_len - 1] {
                inside = true;
            }
            index += 1;
            if inside && t > t_vec_in[window_len - 1] {
                break;
            }
        }
        t_vec_out.truncate(index);

        let data_vec_out = spline_interp1d(&t_vec_in, &data_vec_in, &t_vec_out, 0.0);
        for k in 0..index {
            data_out[(k, off)] = data_vec_out[k];
        }
        // Samples at or beyond `index` are already zero from `Array2::zeros`.

        if index > max_sample {
            max_sample = index;
        }
    }

    (data_out, max_sample)
}
