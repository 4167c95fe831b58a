// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision; this crate does as much of its
arithmetic as possible in double precision before a value is ever written
out to a lower-precision output format.
 */

pub use std::f64::consts::PI;

/// Sentinel written into a two-way-time/depth grid cell to mark it as
/// missing (outside the survey's top/bottom horizons, or never populated
/// by the earth-model loader).
pub const MASKED_SENTINEL: f64 = -999.0;

/// Conversion factor from seconds to the millisecond unit used throughout
/// the moveout/convolution geometry (two-way times and offsets are both
/// handled in milliseconds internally).
pub const SECONDS_TO_MS: f64 = 1000.0;

/// Multiplier used when extrapolating the last reflector's two-way time to
/// give the depth-axis converter a closing pair of (depth, time) points
/// below the deepest real reflector (see [`crate::axis::extrapolate_z_and_twt`]).
pub const DEPTH_EXTRAPOLATION_TWT_FACTOR: f64 = 2000.0;
