// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The §6 "Configuration surface" as plain, serde-friendly data.
//!
//! Parsing these out of a CLI or a config file is left to the caller (§1
//! Non-goal); this module only owns the shape of the knobs the generation
//! driver reads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::zoeppritz::Mode as ZoeppritzMode;

/// Errors arising from an invalid combination of configuration fields.
/// Fatal per §7 kind 1: the caller should print `self` and exit non-zero.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("nmo_correct is set but no offsets were supplied")]
    NmoWithoutOffsets,

    #[error("the TWT-shift grid is {got_nx}x{got_ny} but the earth model is {want_nx}x{want_ny}")]
    TwtShiftGridMismatch {
        got_nx: usize,
        got_ny: usize,
        want_nx: usize,
        want_ny: usize,
    },

    #[error("white_noise is enabled but std_dev is not positive ({std_dev})")]
    NonPositiveStdDev { std_dev: f64 },

    #[error("memory_limit must be positive")]
    NonPositiveMemoryLimit,
}

/// Per-axis output toggles, shared by the SEG-Y and STORM writer flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisOutputFlags {
    pub time: bool,
    pub depth: bool,
    pub timeshift: bool,
}

impl Default for AxisOutputFlags {
    fn default() -> Self {
        AxisOutputFlags {
            time: true,
            depth: false,
            timeshift: false,
        }
    }
}

/// Whether to write per-angle/per-offset cubes, a stack, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFlags {
    pub per_angle: bool,
    pub stack: bool,
}

impl Default for StackFlags {
    fn default() -> Self {
        StackFlags {
            per_angle: true,
            stack: false,
        }
    }
}

/// SEG-Y geometry parameters (§6 "segy geometry"). Only used by a caller's
/// SEG-Y writer; this crate never writes SEG-Y itself, but carries the
/// parameters so a generated cube can be handed straight to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegyGeometry {
    pub inline_start: i32,
    pub inline_step: i32,
    pub xline_start: i32,
    pub xline_step: i32,
    /// +1 or -1; whether inline/crossline numbers increase with increasing
    /// (i, j) or decrease.
    pub direction: i32,
    /// Number of decimal digits of precision to retain when writing UTM
    /// coordinates into the SEG-Y trace headers.
    pub utm_precision: u32,
}

impl Default for SegyGeometry {
    fn default() -> Self {
        SegyGeometry {
            inline_start: 1,
            inline_step: 1,
            xline_start: 1,
            xline_step: 1,
            direction: 1,
            utm_precision: 2,
        }
    }
}

/// Gaussian reflectivity-noise parameters (§4.8, §9). The PRNG is never
/// shared process-wide: `driver` reseeds it per cell from
/// `seed + i + nx * j`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub white_noise: bool,
    pub std_dev: f64,
    pub seed: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            white_noise: false,
            std_dev: 0.0,
            seed: 0,
        }
    }
}

/// The full set of knobs the generation driver reads, corresponding 1:1 to
/// the §6 "Configuration surface" table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Select the NMO (offset-indexed) path instead of the angle-indexed
    /// stacked path.
    pub nmo_correct: bool,
    /// Which Zoeppritz mode to evaluate reflectivity with.
    pub reflection_mode: ZoeppritzMode,
    /// Enable the shifted-time axis, driven by an externally supplied
    /// TWT-shift grid.
    pub twt_file: bool,
    /// Byte threshold above which the driver switches to the file-backed
    /// overflow path (§4.8, §7 kind 5).
    pub memory_limit: u64,
    /// Gaussian reflectivity noise.
    pub noise: NoiseConfig,
    /// Keep the zero-offset reflectivity series in a dedicated grid (§4.8):
    /// pre-noise always, and a second post-noise grid when `noise.white_noise`
    /// is also set. NMO-path only, matching the source's
    /// `GetOutputReflections` flag.
    pub output_reflections: bool,
    /// Multiplicative amplitude scale applied inside the convolution.
    pub wavelet_scale: f64,
    /// Per-axis toggles for the time/depth/shifted-time outputs.
    pub output_axes: AxisOutputFlags,
    /// Whether to emit per-angle cubes, an angle/offset stack, or both.
    pub stack_flags: StackFlags,
    /// SEG-Y geometry, forwarded to the caller's writer untouched.
    pub segy_geometry: SegyGeometry,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            nmo_correct: false,
            reflection_mode: ZoeppritzMode::Pp,
            twt_file: false,
            memory_limit: 2 * 1024 * 1024 * 1024,
            noise: NoiseConfig::default(),
            output_reflections: false,
            wavelet_scale: 1.0,
            output_axes: AxisOutputFlags::default(),
            stack_flags: StackFlags::default(),
            segy_geometry: SegyGeometry::default(),
        }
    }
}

impl GenerationConfig {
    /// Validate field combinations that would otherwise surface as a
    /// confusing panic or silently-wrong output deep in the driver.
    pub fn validate(&self, noff: usize, model_nx: usize, model_ny: usize, twt_shift_dims: Option<(usize, usize)>) -> Result<(), ConfigError> {
        if self.nmo_correct && noff == 0 {
            return Err(ConfigError::NmoWithoutOffsets);
        }
        if self.noise.white_noise && self.noise.std_dev <= 0.0 {
            return Err(ConfigError::NonPositiveStdDev {
                std_dev: self.noise.std_dev,
            });
        }
        if self.memory_limit == 0 {
            return Err(ConfigError::NonPositiveMemoryLimit);
        }
        if self.twt_file {
            if let Some((got_nx, got_ny)) = twt_shift_dims {
                if got_nx != model_nx || got_ny != model_ny {
                    return Err(ConfigError::TwtShiftGridMismatch {
                        got_nx,
                        got_ny,
                        want_nx: model_nx,
                        want_ny: model_ny,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GenerationConfig::default();
        assert!(config.validate(1, 10, 10, None).is_ok());
    }

    #[test]
    fn nmo_without_offsets_is_rejected() {
        let config = GenerationConfig {
            nmo_correct: true,
            ..GenerationConfig::default()
        };
        assert!(matches!(
            config.validate(0, 10, 10, None),
            Err(ConfigError::NmoWithoutOffsets)
        ));
    }

    #[test]
    fn mismatched_twt_shift_grid_is_rejected() {
        let config = GenerationConfig {
            twt_file: true,
            ..GenerationConfig::default()
        };
        assert!(matches!(
            config.validate(1, 10, 10, Some((5, 5))),
            Err(ConfigError::TwtShiftGridMismatch { .. })
        ));
    }

    #[test]
    fn zero_std_dev_with_noise_enabled_is_rejected() {
        let config = GenerationConfig {
            noise: NoiseConfig {
                white_noise: true,
                std_dev: 0.0,
                seed: 1,
            },
            ..GenerationConfig::default()
        };
        assert!(matches!(
            config.validate(1, 10, 10, None),
            Err(ConfigError::NonPositiveStdDev { .. })
        ));
    }
}
