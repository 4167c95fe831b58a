// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all seis-forward errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use crate::{config::ConfigError, sink::SinkError, wavelet::WaveletError};

/// The *only* publicly visible error from this crate.
#[derive(Error, Debug)]
pub enum SeisForwardError {
    /// An error constructing or evaluating a wavelet.
    #[error(transparent)]
    Wavelet(#[from] WaveletError),

    /// An invalid combination of configuration fields.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error writing to a trace sink.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A generic I/O error, surfaced without the crate getting in the way.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
