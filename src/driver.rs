// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The generation driver (§4.8): walks the lateral (i, j) grid, orchestrates
//! the per-cell pipeline (§4.3–§4.7), and hands the result to a
//! [`crate::sink::TraceSink`].
//!
//! Two lateral traversal modes are supported, matching §4.8: plain
//! `(i, j)` index iteration, or an inline/crossline sweep resolved through
//! a caller-supplied [`LateralGeometry`]. Both reduce to the same list of
//! `(i, j)` pairs before the per-cell pipeline runs, so the traversal mode
//! only changes which cells are visited, never how a cell is processed.

use std::{path::PathBuf, sync::Mutex};

use cfg_if::cfg_if;
use itertools::izip;
use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView2};

use crate::{
    axis::{convert_seis, extrapolate_z_and_twt, find_t_from_z},
    config::GenerationConfig,
    convolution::convolve,
    error::SeisForwardError,
    grid::{is_masked, EarthModel, RegularAxis, Surface},
    moveout::{incidence_angle, sample_window, slant_time, vrms_at_reflectors, vrms_regular},
    noise::{add_gaussian_noise, cell_rng, noisy_copy},
    nmo::nmo_correct,
    progress::lateral_sweep_bar,
    wavelet::Wavelet,
    zoeppritz::{reflection, AngleConstants},
};

/// Resolves an inline/crossline pair to a lateral grid index, the
/// collaborator §4.8's "inline/crossline mode" delegates to. Implementing
/// this against a real survey geometry (UTM transform, trace-header
/// lookup, …) is external to this crate (§1 Non-goal); callers that only
/// need index-mode traversal never need to provide one.
pub trait LateralGeometry: Sync {
    /// The (x, y) position of an inline/crossline pair, or `None` if it
    /// falls outside the survey footprint.
    fn resolve(&self, inline: i32, crossline: i32) -> Option<(usize, usize)>;
}

/// Which lateral cells a sweep visits (§4.8).
pub enum Traversal<'g> {
    /// `i in [0, nx)`, `j in [0, ny)`.
    Index,
    /// `il in [il_min, il_max]` step `il_step`, `xl in [xl_min, xl_max]`
    /// step `xl_step`, resolved to `(i, j)` via `geometry`.
    InlineCrossline {
        il_min: i32,
        il_max: i32,
        il_step: i32,
        xl_min: i32,
        xl_max: i32,
        xl_step: i32,
        geometry: &'g dyn LateralGeometry,
    },
}

impl<'g> Traversal<'g> {
    /// Resolve this traversal mode to a concrete, order-preserving list of
    /// `(i, j)` lateral cells.
    pub fn cells(&self, nx: usize, ny: usize) -> Vec<(usize, usize)> {
        match self {
            Traversal::Index => {
                let mut out = Vec::with_capacity(nx * ny);
                for i in 0..nx {
                    for j in 0..ny {
                        out.push((i, j));
                    }
                }
                out
            }
            Traversal::InlineCrossline {
                il_min,
                il_max,
                il_step,
                xl_min,
                xl_max,
                xl_step,
                geometry,
            } => {
                let mut out = Vec::new();
                let mut il = *il_min;
                while il <= *il_max {
                    let mut xl = *xl_min;
                    while xl <= *xl_max {
                        if let Some((i, j)) = geometry.resolve(il, xl) {
                            out.push((i, j));
                        }
                        xl += *xl_step;
                    }
                    il += *il_step;
                }
                out
            }
        }
    }
}

/// Per-cell record of whether a pillar was masked, kept for diagnostics
/// and for exercising Testable Property 1 end-to-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellOutcome {
    pub i: usize,
    pub j: usize,
    pub masked: bool,
}

/// One vertical-axis output, either held entirely in memory or spilled to
/// the file-backed overflow path (§4.8 "Memory-budget decision").
pub enum AxisOutput {
    InMemory(Vec<Array3<f64>>),
    FileBacked(Vec<std::path::PathBuf>),
}

/// The result of a full lateral sweep: one [`AxisOutput`] per requested
/// vertical axis, plus a per-cell masked/unmasked record.
#[derive(Default)]
pub struct GenerationOutcome {
    pub time: Option<AxisOutput>,
    pub depth: Option<AxisOutput>,
    pub timeshift: Option<AxisOutput>,
    /// Zero-offset reflectivity before noise injection, one `(nx, ny,
    /// nzrefl)` cube, present when `config.output_reflections` is set.
    pub pre_noise_reflectivity: Option<Array3<f64>>,
    /// Zero-offset reflectivity after noise injection, present when both
    /// `config.output_reflections` and `config.noise.white_noise` are set.
    pub post_noise_reflectivity: Option<Array3<f64>>,
    pub cells: Vec<CellOutcome>,
}

/// Everything the driver needs to synthesize one cell's traces, gathered
/// so `generate` doesn't carry a dozen positional parameters.
pub struct GenerationRequest<'a> {
    pub model: &'a dyn EarthModel,
    pub wavelet: &'a Wavelet,
    pub config: &'a GenerationConfig,
    /// Background Vp/Vs/density used both for the masked-pillar test
    /// (§4.8) and the depth-axis bottom extrapolation (§4.5).
    pub const_vp: f64,
    pub const_vs: f64,
    pub const_rho: f64,
    /// Offsets (m) for the NMO path; angle values (degrees) for the
    /// angle-indexed (non-NMO) path. Exactly one of these is consulted,
    /// selected by `config.nmo_correct` (§3 "Offset set").
    pub offsets_m: &'a [f64],
    pub angles_deg: &'a [f64],
    pub t0: &'a RegularAxis,
    pub z0: Option<&'a RegularAxis>,
    /// Base/bottom surface, used for the depth-axis extrapolation (§4.5).
    pub bottom_surface: Option<&'a dyn Surface>,
    /// User-supplied TWT-shift grid driving the shifted-time axis (§4.5,
    /// §6 `twt_file`): one shifted-time value per reflector per pillar,
    /// reusing the `EarthModel`-shaped grid abstraction at the same
    /// reflector count as `model` (§4.7, "playing the role of z_vec").
    pub twt_shift: Option<&'a dyn EarthModel>,
    pub seed: u64,
    pub quiet_progress: bool,
}

/// One column of reflectivity/arrival-time state per lateral cell, shared
/// by both the NMO and angle-indexed paths.
struct CellGeometry {
    twt_vec: Vec<f64>,
    z_vec: Vec<f64>,
    diff_vp: Vec<f64>,
    mean_vp: Vec<f64>,
    diff_vs: Vec<f64>,
    mean_vs: Vec<f64>,
    diff_rho: Vec<f64>,
    mean_rho: Vec<f64>,
}

fn cell_geometry(model: &dyn EarthModel, i: usize, j: usize) -> CellGeometry {
    let nzrefl = model.nzrefl();
    let twt_vec: Vec<f64> = (0..nzrefl).map(|k| model.twt(i, j, k)).collect();
    let z_vec: Vec<f64> = (0..nzrefl).map(|k| model.z(i, j, k)).collect();
    let vp_above: Vec<f64> = (0..nzrefl).map(|k| model.vp(i, j, k)).collect();
    let vp_below: Vec<f64> = (0..nzrefl).map(|k| model.vp(i, j, k + 1)).collect();
    let vs_above: Vec<f64> = (0..nzrefl).map(|k| model.vs(i, j, k)).collect();
    let vs_below: Vec<f64> = (0..nzrefl).map(|k| model.vs(i, j, k + 1)).collect();
    let rho_above: Vec<f64> = (0..nzrefl).map(|k| model.rho(i, j, k)).collect();
    let rho_below: Vec<f64> = (0..nzrefl).map(|k| model.rho(i, j, k + 1)).collect();

    let mut diff_vp = Vec::with_capacity(nzrefl);
    let mut mean_vp = Vec::with_capacity(nzrefl);
    let mut diff_vs = Vec::with_capacity(nzrefl);
    let mut mean_vs = Vec::with_capacity(nzrefl);
    let mut diff_rho = Vec::with_capacity(nzrefl);
    let mut mean_rho = Vec::with_capacity(nzrefl);

    for (&a_vp, &b_vp, &a_vs, &b_vs, &a_rho, &b_rho) in izip!(&vp_above, &vp_below, &vs_above, &vs_below, &rho_above, &rho_below) {
        diff_vp.push(b_vp - a_vp);
        mean_vp.push(0.5 * (b_vp + a_vp));
        diff_vs.push(b_vs - a_vs);
        mean_vs.push(0.5 * (b_vs + a_vs));
        diff_rho.push(b_rho - a_rho);
        mean_rho.push(0.5 * (b_rho + a_rho));
    }

    CellGeometry {
        twt_vec,
        z_vec,
        diff_vp,
        mean_vp,
        diff_vs,
        mean_vs,
        diff_rho,
        mean_rho,
    }
}

/// Reflection coefficients for every reflector at a single incidence
/// angle, given this cell's precomputed contrast/mean arrays.
fn reflectivity_column(geom: &CellGeometry, mode: crate::zoeppritz::Mode, theta: f64) -> Vec<f64> {
    let constants = AngleConstants::compute(theta);
    (0..geom.twt_vec.len())
        .map(|k| {
            reflection(
                mode,
                &constants,
                geom.diff_vp[k],
                geom.mean_vp[k],
                geom.diff_rho[k],
                geom.mean_rho[k],
                geom.diff_vs[k],
                geom.mean_vs[k],
            )
        })
        .collect()
}

/// One cell's full pipeline output: per-axis `(nt_or_nz, n_columns)`
/// traces, ready to hand to a [`crate::sink::TraceSink`] column by column.
struct CellTraces {
    time: Option<Array2<f64>>,
    depth: Option<Array2<f64>>,
    timeshift: Option<Array2<f64>>,
    /// Zero-offset reflectivity, pre- and post-noise (§4.8, NMO path only).
    pre_noise_reflectivity: Option<Vec<f64>>,
    post_noise_reflectivity: Option<Vec<f64>>,
}

/// Re-derive a trace at every sample of an output axis by inverting each
/// axis value to an arrival time (`find_t_from_z`, via `(from_vec, to_vec)`)
/// and re-summing the wavelet-weighted reflectivity series at that time —
/// the non-NMO depth/shifted-time path's counterpart to `convert_seis`,
/// which instead resamples an already-synthesized time trace.
#[allow(clippy::too_many_arguments)]
fn reconvolve_at_axis(
    axis_values: &[f64],
    from_vec: &[f64],
    to_vec: &[f64],
    refl: ArrayView2<f64>,
    arrival: ArrayView2<f64>,
    wavelet: &Wavelet,
    wavelet_scale: f64,
) -> Array2<f64> {
    let out_times: Vec<f64> = axis_values.iter().map(|&v| find_t_from_z(v, from_vec, to_vec)).collect();
    convolve(refl, arrival, wavelet, wavelet_scale, &out_times, None)
}

fn process_cell(req: &GenerationRequest, i: usize, j: usize) -> CellTraces {
    let t0_centers = req.t0.sample_centers();
    let t0_values = req.t0.values();
    let geom = cell_geometry(req.model, i, j);
    let nzrefl = geom.twt_vec.len();

    let (seis_time, max_sample, reference_twt_vec, angle_refl, pre_noise_reflectivity, post_noise_reflectivity) = if req.config.nmo_correct {
        let noff = req.offsets_m.len();
        let vrms = vrms_at_reflectors(&geom.twt_vec, &geom.mean_vp);
        let vrms_reg = vrms_regular(&geom.twt_vec, &vrms, &t0_centers);

        let mut refl = Array2::zeros((nzrefl, noff));
        let mut twtx = Array2::zeros((nzrefl, noff));
        let mut twtx_reg = Array2::zeros((t0_centers.len(), noff));
        let mut n_min = vec![0usize; noff];
        let mut n_max = vec![0usize; noff];

        for (o, &h) in req.offsets_m.iter().enumerate() {
            for k in 0..nzrefl {
                let theta = incidence_angle(h, vrms[k], geom.twt_vec[k]);
                let constants = AngleConstants::compute(theta);
                refl[(k, o)] = reflection(
                    req.config.reflection_mode,
                    &constants,
                    geom.diff_vp[k],
                    geom.mean_vp[k],
                    geom.diff_rho[k],
                    geom.mean_rho[k],
                    geom.diff_vs[k],
                    geom.mean_vs[k],
                );
                twtx[(k, o)] = slant_time(h, vrms[k], geom.twt_vec[k]);
            }
            for (k, &t) in t0_centers.iter().enumerate() {
                twtx_reg[(k, o)] = slant_time(h, vrms_reg[k], t);
            }
            let column: Vec<f64> = (0..t0_centers.len()).map(|k| twtx_reg[(k, o)]).collect();
            let (lo, hi) = sample_window(&column, &t0_centers);
            n_min[o] = lo;
            n_max[o] = hi;
        }

        // Zero-offset reflectivity (column 0), kept pre- and post-noise when
        // requested (§4.8: "store the pre-noise zero-offset reflectivities
        // in a first grid and the post-noise in a second grid").
        let pre_noise_reflectivity = req
            .config
            .output_reflections
            .then(|| (0..nzrefl).map(|k| refl[(k, 0)]).collect());

        let (refl, post_noise_reflectivity) = if req.config.noise.white_noise {
            let mut rng = cell_rng(req.seed, i, j, req.model.nx());
            let noised = noisy_copy(refl.view(), req.config.noise.std_dev, &mut rng);
            let post = req
                .config
                .output_reflections
                .then(|| (0..nzrefl).map(|k| noised[(k, 0)]).collect());
            (noised, post)
        } else {
            (refl, None)
        };

        let convolved = convolve(
            refl.view(),
            twtx.view(),
            req.wavelet,
            req.config.wavelet_scale,
            &t0_centers,
            Some((&n_min, &n_max)),
        );
        let (corrected, max_sample) = nmo_correct(&t0_centers, convolved.view(), twtx_reg.view(), &n_min, &n_max);
        (corrected, max_sample, geom.twt_vec.clone(), None, pre_noise_reflectivity, post_noise_reflectivity)
    } else {
        let refl_rows: Vec<Vec<f64>> = req
            .angles_deg
            .iter()
            .map(|&deg| reflectivity_column(&geom, req.config.reflection_mode, deg.to_radians()))
            .collect();
        let mut refl = Array2::zeros((nzrefl, req.angles_deg.len()));
        for (a, col) in refl_rows.iter().enumerate() {
            for (k, &v) in col.iter().enumerate() {
                refl[(k, a)] = v;
            }
        }

        if req.config.noise.white_noise {
            let mut rng = cell_rng(req.seed, i, j, req.model.nx());
            add_gaussian_noise(&mut refl, req.config.noise.std_dev, &mut rng);
        }

        let mut arrival = Array2::zeros((nzrefl, req.angles_deg.len()));
        for a in 0..req.angles_deg.len() {
            for k in 0..nzrefl {
                arrival[(k, a)] = geom.twt_vec[k];
            }
        }

        let convolved = convolve(refl.view(), arrival.view(), req.wavelet, req.config.wavelet_scale, &t0_centers, None);
        let nt = convolved.nrows();
        (convolved, nt, geom.twt_vec.clone(), Some((refl, arrival)), None, None)
    };

    // The NMO path resamples the already-synthesized `seis_time` trace onto
    // the depth/shifted-time axes (`convert_seis`). The non-NMO/angle-indexed
    // path instead re-convolves from scratch at each output sample, inverting
    // the axis value to an arrival time via `find_t_from_z` — it never had a
    // regular time-axis trace to resample in the first place.
    let depth = req.z0.and_then(|z0| {
        req.bottom_surface.map(|bottom| {
            let (x, y) = req.model.cell_center_xy(i, j);
            let z_bot = bottom.z_at(x, y).unwrap_or(*geom.z_vec.last().unwrap_or(&0.0));
            let (z_out, t_out) = extrapolate_z_and_twt(&reference_twt_vec, &geom.z_vec, z_bot, req.const_vp);
            let z0_values = z0.values();
            if let Some((refl, arrival)) = &angle_refl {
                reconvolve_at_axis(&z0_values, &z_out, &t_out, refl.view(), arrival.view(), req.wavelet, req.config.wavelet_scale)
            } else {
                convert_seis(&t_out, &t0_values, &z_out, &z0_values, seis_time.view(), max_sample)
            }
        })
    });

    let timeshift = if req.config.twt_file {
        req.twt_shift.map(|shift| {
            if let Some((refl, arrival)) = &angle_refl {
                // Prepend (twt_shift=0, twt=0) only — unlike the depth table,
                // the shifted-time table never gets an extrapolated bottom
                // point (matches the already-recorded decision that the
                // timeshift axis does not extrapolate).
                let mut shift_vec = vec![0.0; nzrefl + 1];
                let mut twt_table = vec![0.0; nzrefl + 1];
                for k in 0..nzrefl {
                    shift_vec[k + 1] = shift.twt(i, j, k);
                    twt_table[k + 1] = geom.twt_vec[k];
                }
                reconvolve_at_axis(&t0_values, &shift_vec, &twt_table, refl.view(), arrival.view(), req.wavelet, req.config.wavelet_scale)
            } else {
                // One shifted-time value per reflector, matching
                // `geom.twt_vec`'s reflector count (§4.7: the shift table
                // plays the role of `z_vec` in the depth converter, over the
                // same reflector stack).
                let shift_vec: Vec<f64> = (0..nzrefl).map(|k| shift.twt(i, j, k)).collect();
                convert_seis(&reference_twt_vec, &t0_values, &shift_vec, &t0_values, seis_time.view(), max_sample)
            }
        })
    } else {
        None
    };

    CellTraces {
        time: if req.config.output_axes.time { Some(seis_time) } else { None },
        depth: if req.config.output_axes.depth { depth } else { None },
        timeshift: if req.config.output_axes.timeshift { timeshift } else { None },
        pre_noise_reflectivity,
        post_noise_reflectivity,
    }
}

fn zero_traces(req: &GenerationRequest, n_cols_time: usize, n_cols_depth: usize) -> CellTraces {
    let nt = req.t0.len;
    let nz = req.z0.map(|z0| z0.len).unwrap_or(0);
    CellTraces {
        time: if req.config.output_axes.time {
            Some(Array2::zeros((nt, n_cols_time)))
        } else {
            None
        },
        depth: if req.config.output_axes.depth && req.z0.is_some() {
            Some(Array2::zeros((nz, n_cols_depth)))
        } else {
            None
        },
        timeshift: if req.config.output_axes.timeshift {
            Some(Array2::zeros((nt, n_cols_time)))
        } else {
            None
        },
        pre_noise_reflectivity: req.config.output_reflections.then(|| vec![0.0; req.model.nzrefl()]),
        post_noise_reflectivity: (req.config.output_reflections && req.config.noise.white_noise)
            .then(|| vec![0.0; req.model.nzrefl()]),
    }
}

/// Rough working-set byte estimate per §4.8's memory-budget formula,
/// `nx*ny*(nzrefl*(2+ntheta) + nz*ntheta*depth_out + nt*ntheta*time_out +
/// nz/2)`, each term counted as an `f64`.
fn estimate_bytes(req: &GenerationRequest, n_columns: usize) -> u64 {
    let nx = req.model.nx() as u64;
    let ny = req.model.ny() as u64;
    let nzrefl = req.model.nzrefl() as u64;
    let ntheta = n_columns as u64;
    let nt = req.t0.len as u64;
    let nz = req.z0.map(|a| a.len as u64).unwrap_or(0);
    let depth_out = if req.config.output_axes.depth { 1 } else { 0 };
    let time_out = if req.config.output_axes.time { 1 } else { 0 };

    let per_cell = nzrefl * (2 + ntheta) + nz * ntheta * depth_out + nt * ntheta * time_out + nz / 2;
    nx * ny * per_cell * std::mem::size_of::<f64>() as u64
}

/// Arithmetic mean across the angle/offset axis of a per-angle cube,
/// matching the source's `writeSeismicStackTime`/`...Depth`/
/// `...Timeshift` (§4.8 "Stacking").
pub fn stack_mean(cubes: &[Array3<f64>]) -> Array3<f64> {
    let dim = cubes[0].raw_dim();
    let mut out = Array3::zeros(dim);
    for cube in cubes {
        out += cube;
    }
    out.mapv_inplace(|v| v / cubes.len() as f64);
    out
}

/// Walk the lateral grid, driving the §4.3–§4.7 pipeline per cell and
/// collecting the result into in-memory cubes or, once the memory-budget
/// estimate (§4.8) exceeds `config.memory_limit`, a file-backed overflow
/// stream per axis.
pub fn generate(req: &GenerationRequest, traversal: &Traversal, overflow_dir: &std::path::Path) -> Result<GenerationOutcome, SeisForwardError> {
    let n_columns = if req.config.nmo_correct { req.offsets_m.len() } else { req.angles_deg.len() };
    req.config.validate(
        req.offsets_m.len().max(req.angles_deg.len()),
        req.model.nx(),
        req.model.ny(),
        req.twt_shift.map(|g| (g.nx(), g.ny())),
    )?;

    let cells = traversal.cells(req.model.nx(), req.model.ny());
    let nx = req.model.nx();
    let ny = req.model.ny();
    let nt = req.t0.len;
    let nz = req.z0.map(|a| a.len).unwrap_or(0);

    let bytes = estimate_bytes(req, n_columns);
    let file_backed = bytes > req.config.memory_limit;
    if file_backed {
        info!(
            "Estimated working set of {bytes} bytes exceeds memory_limit of {}; switching to the file-backed overflow path",
            req.config.memory_limit
        );
    } else {
        debug!("Estimated working set of {bytes} bytes fits under memory_limit of {}", req.config.memory_limit);
    }

    let mut time_cubes: Option<Vec<Array3<f64>>> = (req.config.output_axes.time && !file_backed)
        .then(|| (0..n_columns).map(|_| Array3::zeros((nx, ny, nt))).collect());
    let mut depth_cubes: Option<Vec<Array3<f64>>> = if req.config.output_axes.depth && req.z0.is_some() && !file_backed {
        Some((0..n_columns).map(|_| Array3::zeros((nx, ny, nz))).collect())
    } else {
        None
    };
    let mut timeshift_cubes: Option<Vec<Array3<f64>>> = (req.config.output_axes.timeshift && !file_backed)
        .then(|| (0..n_columns).map(|_| Array3::zeros((nx, ny, nt))).collect());

    let nzrefl = req.model.nzrefl();
    let mut pre_noise_cube: Option<Array3<f64>> = req.config.output_reflections.then(|| Array3::zeros((nx, ny, nzrefl)));
    let mut post_noise_cube: Option<Array3<f64>> = (req.config.output_reflections && req.config.noise.white_noise)
        .then(|| Array3::zeros((nx, ny, nzrefl)));

    let mut time_sink = if file_backed && req.config.output_axes.time {
        Some(crate::sink::RawStreamSink::create(overflow_dir, "time", n_columns)?)
    } else {
        None
    };
    let mut depth_sink = if file_backed && req.config.output_axes.depth && req.z0.is_some() {
        Some(crate::sink::RawStreamSink::create(overflow_dir, "depth", n_columns)?)
    } else {
        None
    };
    let mut timeshift_sink = if file_backed && req.config.output_axes.timeshift {
        Some(crate::sink::RawStreamSink::create(overflow_dir, "timeshift", n_columns)?)
    } else {
        None
    };

    // Arm a cleanup guard over each overflow stream before the sweep starts:
    // if the loop below returns early via `?`, the partially-written files
    // are removed on drop instead of left behind. Defused once the sweep
    // finishes without error, just before the final re-read.
    let time_guard = overflow_guard(&time_sink);
    let depth_guard = overflow_guard(&depth_sink);
    let timeshift_guard = overflow_guard(&timeshift_sink);

    let bar = lateral_sweep_bar(cells.len() as u64, req.quiet_progress);
    let bar = Mutex::new(bar);

    let mut outcomes = Vec::with_capacity(cells.len());

    // The sequential and `rayon`-parallel branches share the exact same
    // per-cell body; only how cells are dispatched differs (§5).
    cfg_if! {
        if #[cfg(feature = "parallel")] {
            use rayon::prelude::*;
            let results: Vec<(usize, usize, bool, CellTraces)> = cells
                .par_iter()
                .map(|&(i, j)| {
                    let masked = is_masked(req.model, i, j, req.const_vp, req.const_vs, req.const_rho);
                    let traces = if masked {
                        zero_traces(req, n_columns, n_columns)
                    } else {
                        process_cell(req, i, j)
                    };
                    bar.lock().unwrap().inc(1);
                    (i, j, masked, traces)
                })
                .collect();
        } else {
            let results: Vec<(usize, usize, bool, CellTraces)> = cells
                .iter()
                .map(|&(i, j)| {
                    let masked = is_masked(req.model, i, j, req.const_vp, req.const_vs, req.const_rho);
                    let traces = if masked {
                        zero_traces(req, n_columns, n_columns)
                    } else {
                        process_cell(req, i, j)
                    };
                    bar.lock().unwrap().inc(1);
                    (i, j, masked, traces)
                })
                .collect();
        }
    }
    bar.lock().unwrap().finish_and_clear();

    for (i, j, masked, traces) in results {
        outcomes.push(CellOutcome { i, j, masked });

        if let Some(time) = &traces.time {
            write_axis_column(time, i, j, n_columns, time_cubes.as_mut(), time_sink.as_mut())?;
        }
        if let Some(depth) = &traces.depth {
            write_axis_column(depth, i, j, n_columns, depth_cubes.as_mut(), depth_sink.as_mut())?;
        }
        if let Some(timeshift) = &traces.timeshift {
            write_axis_column(timeshift, i, j, n_columns, timeshift_cubes.as_mut(), timeshift_sink.as_mut())?;
        }
        if let (Some(pre), Some(cube)) = (&traces.pre_noise_reflectivity, pre_noise_cube.as_mut()) {
            cube.slice_mut(ndarray::s![i, j, ..]).assign(&ndarray::ArrayView1::from(pre.as_slice()));
        }
        if let (Some(post), Some(cube)) = (&traces.post_noise_reflectivity, post_noise_cube.as_mut()) {
            cube.slice_mut(ndarray::s![i, j, ..]).assign(&ndarray::ArrayView1::from(post.as_slice()));
        }
    }

    let masked_count = outcomes.iter().filter(|c| c.masked).count();
    debug!("{masked_count}/{} lateral cells were masked (outside the model or background-only)", outcomes.len());

    // The sweep finished without error: disarm the cleanup guards so the
    // overflow files survive for `finish_axis`'s re-read.
    if let Some(g) = time_guard {
        scopeguard::ScopeGuard::into_inner(g);
    }
    if let Some(g) = depth_guard {
        scopeguard::ScopeGuard::into_inner(g);
    }
    if let Some(g) = timeshift_guard {
        scopeguard::ScopeGuard::into_inner(g);
    }

    let time = finish_axis(time_cubes, time_sink, nx, ny, nt)?;
    let depth = finish_axis(depth_cubes, depth_sink, nx, ny, nz)?;
    let timeshift = finish_axis(timeshift_cubes, timeshift_sink, nx, ny, nt)?;

    Ok(GenerationOutcome {
        time,
        depth,
        timeshift,
        pre_noise_reflectivity: pre_noise_cube,
        post_noise_reflectivity: post_noise_cube,
        cells: outcomes,
    })
}

/// See the comment at its call site in [`generate`]: removes `sink`'s
/// overflow files on drop unless defused first.
fn overflow_guard(
    sink: &Option<crate::sink::RawStreamSink>,
) -> Option<scopeguard::ScopeGuard<Vec<PathBuf>, impl FnOnce(Vec<PathBuf>)>> {
    sink.as_ref().map(|s| {
        let paths = s.paths().to_vec();
        scopeguard::guard(paths, |paths| {
            for path in paths {
                let _ = std::fs::remove_file(path);
            }
        })
    })
}

fn write_axis_column(
    trace: &Array2<f64>,
    i: usize,
    j: usize,
    n_columns: usize,
    cubes: Option<&mut Vec<Array3<f64>>>,
    sink: Option<&mut crate::sink::RawStreamSink>,
) -> Result<(), SeisForwardError> {
    use crate::sink::TraceSink;
    if let Some(cubes) = cubes {
        for a in 0..n_columns {
            cubes[a].slice_mut(ndarray::s![i, j, ..]).assign(&trace.column(a));
        }
    } else if let Some(sink) = sink {
        for a in 0..n_columns {
            sink.write_trace(i, j, a, trace.column(a))?;
        }
    }
    Ok(())
}

fn finish_axis(
    cubes: Option<Vec<Array3<f64>>>,
    sink: Option<crate::sink::RawStreamSink>,
    nx: usize,
    ny: usize,
    nk: usize,
) -> Result<Option<AxisOutput>, SeisForwardError> {
    if let Some(sink) = sink {
        let paths = sink.finish()?;
        let _ = (nx, ny, nk);
        Ok(Some(AxisOutput::FileBacked(paths)))
    } else {
        Ok(cubes.map(AxisOutput::InMemory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AxisOutputFlags, GenerationConfig},
        grid::ArrayEarthModel,
        zoeppritz::Mode,
    };
    use ndarray::Array3;

    fn one_reflector_model(twt: f64, vp_above: f64, vp_below: f64) -> ArrayEarthModel {
        let twt_arr = Array3::from_elem((1, 1, 1), twt);
        let z_arr = Array3::from_elem((1, 1, 1), twt * 1.5);
        let mut vp = Array3::from_elem((1, 1, 2), vp_above);
        vp[(0, 0, 1)] = vp_below;
        let vs = Array3::from_elem((1, 1, 2), 1500.0);
        let rho = Array3::from_elem((1, 1, 2), 2200.0);
        ArrayEarthModel::new(twt_arr, z_arr, vp, vs, rho, 25.0, 25.0)
    }

    #[test]
    fn masked_pillar_yields_an_all_zero_trace() {
        let twt = Array3::from_shape_fn((2, 1, 1), |(i, _, _)| if i == 0 { crate::constants::MASKED_SENTINEL } else { 1000.0 });
        let z = Array3::from_elem((2, 1, 1), 1500.0);
        let vp = Array3::from_elem((2, 1, 2), 2000.0);
        let vs = Array3::from_elem((2, 1, 2), 1500.0);
        let rho = Array3::from_elem((2, 1, 2), 2200.0);
        let model = crate::grid::ArrayEarthModel::new(twt, z, vp, vs, rho, 25.0, 25.0);

        let wavelet = Wavelet::from_ricker(25.0);
        let config = GenerationConfig {
            nmo_correct: false,
            reflection_mode: Mode::Pp,
            output_axes: AxisOutputFlags {
                time: true,
                depth: false,
                timeshift: false,
            },
            ..GenerationConfig::default()
        };
        let t0 = RegularAxis::new(0.0, 2.0, 64);
        let angles = [0.0];
        let req = GenerationRequest {
            model: &model,
            wavelet: &wavelet,
            config: &config,
            const_vp: 2000.0,
            const_vs: 1500.0,
            const_rho: 2200.0,
            offsets_m: &[],
            angles_deg: &angles,
            t0: &t0,
            z0: None,
            bottom_surface: None,
            twt_shift: None,
            seed: 0,
            quiet_progress: true,
        };

        let outcome = generate(&req, &Traversal::Index, std::path::Path::new(".")).unwrap();
        let time = match outcome.time.unwrap() {
            AxisOutput::InMemory(cubes) => cubes,
            AxisOutput::FileBacked(_) => panic!("expected in-memory output for a tiny model"),
        };
        for k in 0..t0.len {
            assert_eq!(time[0][(0, 0, k)], 0.0);
        }
        assert!(outcome.cells.iter().any(|c| c.i == 0 && c.masked));
        assert!(outcome.cells.iter().any(|c| c.i == 1 && !c.masked));
    }

    #[test]
    fn ricker_point_reflector_peaks_at_its_arrival_time() {
        let model = one_reflector_model(1000.0, 1900.0, 2100.0);
        let wavelet = Wavelet::from_ricker(25.0);
        let config = GenerationConfig {
            nmo_correct: false,
            reflection_mode: Mode::Pp,
            output_axes: AxisOutputFlags {
                time: true,
                depth: false,
                timeshift: false,
            },
            wavelet_scale: 1.0,
            ..GenerationConfig::default()
        };
        let t0 = RegularAxis::new(0.0, 2.0, 512);
        let angles = [0.0];
        let req = GenerationRequest {
            model: &model,
            wavelet: &wavelet,
            config: &config,
            const_vp: 2000.0,
            const_vs: 1500.0,
            const_rho: 2200.0,
            offsets_m: &[],
            angles_deg: &angles,
            t0: &t0,
            z0: None,
            bottom_surface: None,
            twt_shift: None,
            seed: 0,
            quiet_progress: true,
        };

        let traces = process_cell(&req, 0, 0);
        let time = traces.time.unwrap();
        let t0_centers = t0.sample_centers();
        let (peak_k, _) = t0_centers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (**a - 1000.0).abs().partial_cmp(&(**b - 1000.0).abs()).unwrap())
            .unwrap();
        let peak = time.column(0)[peak_k];
        assert!(peak.abs() > 0.05, "expected a sizeable peak near t=1000ms, got {peak}");
    }

    /// §4.8: with `output_reflections` set, the zero-offset reflectivity is
    /// captured before noise is added, and again after, in two separate
    /// grids.
    #[test]
    fn output_reflections_captures_pre_and_post_noise_zero_offset() {
        let model = one_reflector_model(1000.0, 1900.0, 2100.0);
        let wavelet = Wavelet::from_ricker(25.0);
        let config = GenerationConfig {
            nmo_correct: true,
            reflection_mode: Mode::Pp,
            output_reflections: true,
            noise: crate::config::NoiseConfig {
                white_noise: true,
                std_dev: 0.05,
                seed: 11,
            },
            output_axes: AxisOutputFlags {
                time: true,
                depth: false,
                timeshift: false,
            },
            ..GenerationConfig::default()
        };
        let t0 = RegularAxis::new(0.0, 2.0, 512);
        let offsets = [0.0, 200.0];
        let req = GenerationRequest {
            model: &model,
            wavelet: &wavelet,
            config: &config,
            const_vp: 2000.0,
            const_vs: 1500.0,
            const_rho: 2200.0,
            offsets_m: &offsets,
            angles_deg: &[],
            t0: &t0,
            z0: None,
            bottom_surface: None,
            twt_shift: None,
            seed: 3,
            quiet_progress: true,
        };

        let outcome = generate(&req, &Traversal::Index, std::path::Path::new(".")).unwrap();
        let pre = outcome.pre_noise_reflectivity.expect("pre-noise grid requested");
        let post = outcome.post_noise_reflectivity.expect("post-noise grid requested since white_noise is set");
        assert_ne!(pre[(0, 0, 0)], post[(0, 0, 0)], "noise should have perturbed the zero-offset reflectivity");
        assert_ne!(pre[(0, 0, 0)], 0.0, "the reflector contrast is non-zero");
    }
}
