// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic seismic trace generation for layered 3D subsurface models.
//!
//! Given an earth model (a lateral grid of reflector stacks, each with a
//! two-way time, depth, and above/below elastic parameters), a wavelet, and
//! an offset or angle set, this crate synthesizes seismic traces by
//! convolving angle/offset-dependent Zoeppritz reflection coefficients with
//! the wavelet, optionally applying NMO correction, and resampling the
//! result onto depth and shifted-time axes.
//!
//! Reading earth models from Eclipse/SEG-Y/STORM files, encoding output
//! cubes back out, and command-line argument parsing are left to the
//! caller; see [`grid::EarthModel`] and [`sink::TraceSink`] for the
//! boundaries this crate expects a caller to implement.

pub mod axis;
pub mod config;
pub(crate) mod constants;
pub mod convolution;
pub mod driver;
pub mod error;
pub mod grid;
pub mod moveout;
pub mod nmo;
pub mod noise;
pub mod progress;
pub mod sink;
pub mod wavelet;
pub mod zoeppritz;

// Re-exports.
pub use config::GenerationConfig;
pub use driver::{generate, CellOutcome, GenerationOutcome};
pub use error::SeisForwardError;
pub use grid::{EarthModel, RegularAxis, Surface};
pub use sink::{CubeSink, RawStreamSink, TraceSink};
pub use wavelet::Wavelet;
pub use zoeppritz::Mode as ZoeppritzMode;
