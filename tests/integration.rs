// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests exercising the whole `driver::generate` pipeline
//! against a tiny synthetic earth model, rather than one component at a
//! time.

use approx::assert_abs_diff_eq;
use ndarray::Array3;

use seis_forward::config::{AxisOutputFlags, GenerationConfig};
use seis_forward::driver::{generate, stack_mean, AxisOutput, GenerationRequest, Traversal};
use seis_forward::grid::{ArrayEarthModel, EarthModel, RegularAxis, Surface};
use seis_forward::sink::reread_and_delete;
use seis_forward::wavelet::Wavelet;
use seis_forward::zoeppritz::Mode;

/// A flat bottom surface at a fixed depth, for exercising the depth-axis
/// extrapolation without a real base-of-model grid.
struct FlatSurface(f64);

impl Surface for FlatSurface {
    fn z_at(&self, _x: f64, _y: f64) -> Option<f64> {
        Some(self.0)
    }
}

fn two_by_two_model() -> ArrayEarthModel {
    // Two reflectors, a mild Vp/density contrast at each, identical across
    // all four lateral cells so every cell produces the same trace.
    let twt = Array3::from_shape_fn((2, 2, 2), |(_, _, k)| (k + 1) as f64 * 500.0);
    let z = Array3::from_shape_fn((2, 2, 2), |(_, _, k)| (k + 1) as f64 * 750.0);
    let vp = Array3::from_shape_fn((2, 2, 3), |(_, _, k)| 2000.0 + k as f64 * 150.0);
    let vs = Array3::from_elem((2, 2, 3), 1200.0);
    let rho = Array3::from_shape_fn((2, 2, 3), |(_, _, k)| 2100.0 + k as f64 * 50.0);
    ArrayEarthModel::new(twt, z, vp, vs, rho, 25.0, 25.0)
}

fn base_request<'a>(
    model: &'a ArrayEarthModel,
    wavelet: &'a Wavelet,
    config: &'a GenerationConfig,
    angles: &'a [f64],
    t0: &'a RegularAxis,
) -> GenerationRequest<'a> {
    GenerationRequest {
        model,
        wavelet,
        config,
        const_vp: 2000.0,
        const_vs: 1200.0,
        const_rho: 2100.0,
        offsets_m: &[],
        angles_deg: angles,
        t0,
        z0: None,
        bottom_surface: None,
        twt_shift: None,
        seed: 7,
        quiet_progress: true,
    }
}

fn in_memory_time_cubes(outcome: seis_forward::driver::GenerationOutcome) -> Vec<Array3<f64>> {
    match outcome.time.expect("time axis was requested") {
        AxisOutput::InMemory(cubes) => cubes,
        AxisOutput::FileBacked(_) => panic!("expected the in-memory path for this memory_limit"),
    }
}

fn in_memory_depth_cubes(outcome: seis_forward::driver::GenerationOutcome) -> Vec<Array3<f64>> {
    match outcome.depth.expect("depth axis was requested") {
        AxisOutput::InMemory(cubes) => cubes,
        AxisOutput::FileBacked(_) => panic!("expected the in-memory path for this memory_limit"),
    }
}

/// Testable Property 5 / scenario S4: the stack output equals the
/// arithmetic mean of the per-angle cubes at every (i, j, k).
#[test]
fn angle_stack_equals_arithmetic_mean_of_per_angle_cubes() {
    let model = two_by_two_model();
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
    let angles = [0.0, 10.0, 20.0];
    let t0 = RegularAxis::new(0.0, 2.0, 600);
    let req = base_request(&model, &wavelet, &config, &angles, &t0);

    let outcome = generate(&req, &Traversal::Index, std::path::Path::new(".")).unwrap();
    let cubes = in_memory_time_cubes(outcome);
    assert_eq!(cubes.len(), angles.len());

    let stack = stack_mean(&cubes);
    for i in 0..2 {
        for j in 0..2 {
            for k in 0..t0.len {
                let mean: f64 = cubes.iter().map(|c| c[(i, j, k)]).sum::<f64>() / cubes.len() as f64;
                assert_abs_diff_eq!(stack[(i, j, k)], mean, epsilon = 1e-12);
            }
        }
    }
}

/// Testable Property 7 / scenario S5: the outputs produced by the
/// in-memory and file-backed code paths are bit-identical (to float
/// round-trip precision) for the same inputs and seeds.
#[test]
fn file_backed_path_matches_in_memory_path() {
    let model = two_by_two_model();
    let wavelet = Wavelet::from_ricker(25.0);
    let angles = [0.0, 15.0];
    let t0 = RegularAxis::new(0.0, 4.0, 128);

    let small_limit_config = GenerationConfig {
        nmo_correct: false,
        reflection_mode: Mode::Pp,
        memory_limit: 1,
        output_axes: AxisOutputFlags {
            time: true,
            depth: false,
            timeshift: false,
        },
        ..GenerationConfig::default()
    };
    let large_limit_config = GenerationConfig {
        memory_limit: u64::MAX,
        ..small_limit_config.clone()
    };

    let overflow_dir = tempfile::tempdir().unwrap();

    let req_memory = base_request(&model, &wavelet, &large_limit_config, &angles, &t0);
    let outcome_memory = generate(&req_memory, &Traversal::Index, overflow_dir.path()).unwrap();
    let memory_cubes = in_memory_time_cubes(outcome_memory);

    let req_file = base_request(&model, &wavelet, &small_limit_config, &angles, &t0);
    let outcome_file = generate(&req_file, &Traversal::Index, overflow_dir.path()).unwrap();
    let file_paths = match outcome_file.time.expect("time axis was requested") {
        AxisOutput::FileBacked(paths) => paths,
        AxisOutput::InMemory(_) => panic!("expected the file-backed path once memory_limit is tiny"),
    };
    assert_eq!(file_paths.len(), angles.len());

    for (a, path) in file_paths.iter().enumerate() {
        let cube = reread_and_delete(path, model.nx(), model.ny(), t0.len).unwrap();
        assert!(!path.exists(), "overflow file should be deleted after re-read");
        for i in 0..model.nx() {
            for j in 0..model.ny() {
                for k in 0..t0.len {
                    // Stored as f32 in the overflow stream, so compare at
                    // f32 precision rather than full f64.
                    assert_abs_diff_eq!(
                        cube[(i, j, k)] as f32,
                        memory_cubes[a][(i, j, k)] as f32,
                        epsilon = 1e-6
                    );
                }
            }
        }
    }
}

/// Scenario S2: a masked pillar produces an all-zero trace on every
/// requested axis, end to end through `generate`.
#[test]
fn masked_pillar_is_zero_on_every_requested_axis() {
    let mut twt = Array3::from_shape_fn((2, 1, 2), |(_, _, k)| (k + 1) as f64 * 400.0);
    twt[(0, 0, 0)] = -999.0;
    let z = Array3::from_shape_fn((2, 1, 2), |(_, _, k)| (k + 1) as f64 * 600.0);
    let vp = Array3::from_elem((2, 1, 3), 2000.0);
    let vs = Array3::from_elem((2, 1, 3), 1200.0);
    let rho = Array3::from_elem((2, 1, 3), 2100.0);
    let model = ArrayEarthModel::new(twt, z, vp, vs, rho, 25.0, 25.0);

    let wavelet = Wavelet::from_ricker(25.0);
    let config = GenerationConfig {
        output_axes: AxisOutputFlags {
            time: true,
            depth: false,
            timeshift: false,
        },
        ..GenerationConfig::default()
    };
    let angles = [0.0];
    let t0 = RegularAxis::new(0.0, 2.0, 64);
    let req = base_request(&model, &wavelet, &config, &angles, &t0);

    let outcome = generate(&req, &Traversal::Index, std::path::Path::new(".")).unwrap();
    let cubes = in_memory_time_cubes(outcome);
    for k in 0..t0.len {
        assert_abs_diff_eq!(cubes[0][(0, 0, k)], 0.0, epsilon = 1e-12);
    }
    assert!(outcome.cells.iter().any(|c| c.i == 0 && c.j == 0 && c.masked));
    assert!(outcome.cells.iter().any(|c| c.i == 1 && c.j == 0 && !c.masked));
}

/// The non-NMO depth path (`nmo_correct: false`, the default) re-convolves
/// directly at each depth sample rather than resampling a time-domain
/// trace; a single point reflector should still produce a depth trace
/// that peaks at its own depth.
#[test]
fn non_nmo_depth_path_peaks_at_reflector_depth() {
    let twt = Array3::from_elem((1, 1, 1), 1000.0);
    let z = Array3::from_elem((1, 1, 1), 1500.0);
    let mut vp = Array3::from_elem((1, 1, 2), 1900.0);
    vp[(0, 0, 1)] = 2100.0;
    let vs = Array3::from_elem((1, 1, 2), 1200.0);
    let rho = Array3::from_elem((1, 1, 2), 2200.0);
    let model = ArrayEarthModel::new(twt, z, vp, vs, rho, 25.0, 25.0);

    let wavelet = Wavelet::from_ricker(25.0);
    let config = GenerationConfig {
        nmo_correct: false,
        reflection_mode: Mode::Pp,
        output_axes: AxisOutputFlags {
            time: false,
            depth: true,
            timeshift: false,
        },
        wavelet_scale: 1.0,
        ..GenerationConfig::default()
    };
    let angles = [0.0];
    let t0 = RegularAxis::new(0.0, 2.0, 1024);
    let z0 = RegularAxis::new(0.0, 5.0, 600);
    let bottom = FlatSurface(3000.0);

    let mut req = base_request(&model, &wavelet, &config, &angles, &t0);
    req.z0 = Some(&z0);
    req.bottom_surface = Some(&bottom);

    let outcome = generate(&req, &Traversal::Index, std::path::Path::new(".")).unwrap();
    let depth_cubes = in_memory_depth_cubes(outcome);

    let z_values = z0.values();
    let (peak_k, _) = z_values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (**a - 1500.0_f64).abs().partial_cmp(&(**b - 1500.0_f64).abs()).unwrap())
        .unwrap();
    let peak = depth_cubes[0][(0, 0, peak_k)];
    assert!(peak.abs() > 0.05, "expected a sizeable peak near z=1500m, got {peak}");
}
