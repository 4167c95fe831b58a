// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Trace output sinks: the "output grids"/"file-backed overflow" boundary
//! §1 leaves to a caller, plus two concrete implementations this crate
//! provides — an in-memory cube and the raw little-endian float stream
//! described in §6.
//!
//! Full SEG-Y/STORM encoding stays out of scope; what lives here is the
//! naming convention (§6) and the overflow stream's byte layout, which the
//! driver needs regardless of which final file format a caller writes.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array3, ArrayView1};
use thiserror::Error;

/// Errors writing to, or reading back, a trace sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("trace sink I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("overflow stream {} has {got} samples, expected a multiple of {nk}", path.display())]
    TruncatedStream { path: PathBuf, got: usize, nk: usize },
}

/// The per-cell trace output boundary. A lateral cell's pipeline hands one
/// column (one axis, one angle/offset) at a time to a sink; what happens to
/// it after that — held in memory, appended to a file, immediately
/// encoded to SEG-Y — is entirely up to the implementation.
pub trait TraceSink {
    /// Write the trace at lateral cell `(i, j)`, angle/offset index `a`,
    /// for one vertical axis. `trace` has the axis's sample count.
    fn write_trace(&mut self, i: usize, j: usize, a: usize, trace: ArrayView1<f64>) -> Result<(), SinkError>;
}

/// An in-memory `(nx, ny, nk)` cube per angle/offset index, the "output
/// grids" of §3. Used when the driver's memory-budget estimate (§4.8)
/// stays under the configured limit.
pub struct CubeSink {
    cubes: Vec<Array3<f64>>,
}

impl CubeSink {
    pub fn new(n_angles: usize, nx: usize, ny: usize, nk: usize) -> Self {
        CubeSink {
            cubes: (0..n_angles).map(|_| Array3::zeros((nx, ny, nk))).collect(),
        }
    }

    /// The assembled cubes, one per angle/offset index, in the order they
    /// were constructed.
    pub fn into_cubes(self) -> Vec<Array3<f64>> {
        self.cubes
    }

    pub fn cubes(&self) -> &[Array3<f64>] {
        &self.cubes
    }
}

impl TraceSink for CubeSink {
    fn write_trace(&mut self, i: usize, j: usize, a: usize, trace: ArrayView1<f64>) -> Result<(), SinkError> {
        let mut slice = self.cubes[a].slice_mut(ndarray::s![i, j, ..]);
        slice.assign(&trace);
        Ok(())
    }
}

/// The file-backed overflow sink (§5, §6): one raw little-endian `f32`
/// append-only stream per angle/offset index, written in `(i, j, k)` scan
/// order. Used once the driver's memory-budget estimate exceeds
/// `memory_limit` (§4.8, §7 kind 5).
///
/// Every [`File`] this opens is closed on every exit path, including a
/// partially-written stream on error, via `scopeguard::guard`.
pub struct RawStreamSink {
    writers: Vec<BufWriter<File>>,
    paths: Vec<PathBuf>,
}

impl RawStreamSink {
    /// The path of every stream this sink owns, in construction order. Used
    /// by the driver to arm a cleanup guard over the overflow files before a
    /// lateral sweep starts.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Open one overflow file per angle/offset index, named
    /// `<dir>/<prefix>_<angle_index>` (e.g. `time_0`, `depth_0`,
    /// `timeshift_0`, per §6's naming convention, with the angle/offset
    /// *index* substituted for `ℓ`).
    pub fn create(dir: &Path, prefix: &str, n_angles: usize) -> Result<Self, SinkError> {
        let mut writers = Vec::with_capacity(n_angles);
        let mut paths = Vec::with_capacity(n_angles);
        for a in 0..n_angles {
            let path = dir.join(format!("{prefix}_{a}"));
            let file = File::create(&path).map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
            writers.push(BufWriter::new(file));
            paths.push(path);
        }
        Ok(RawStreamSink { writers, paths })
    }

    /// Flush and close every open stream. Called explicitly by the driver
    /// once a lateral sweep finishes, and also runs (via `scopeguard`) if
    /// the sweep unwinds early.
    pub fn finish(mut self) -> Result<Vec<PathBuf>, SinkError> {
        for (writer, path) in self.writers.iter_mut().zip(self.paths.iter()) {
            writer.flush().map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(std::mem::take(&mut self.paths))
    }
}

impl TraceSink for RawStreamSink {
    fn write_trace(&mut self, _i: usize, _j: usize, a: usize, trace: ArrayView1<f64>) -> Result<(), SinkError> {
        let writer = &mut self.writers[a];
        let path = &self.paths[a];
        for &sample in trace.iter() {
            writer
                .write_f32::<LittleEndian>(sample as f32)
                .map_err(|source| SinkError::Io {
                    path: path.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Re-read a finished overflow stream back into an `(nx, ny, nk)` cube, the
/// final-assembly step described in §4.8 ("the final writer re-reads and
/// optionally stacks them"). The intermediate file is removed once fully
/// consumed, matching §5's "intermediate files MUST be removed after
/// successful re-read".
pub fn reread_and_delete(path: &Path, nx: usize, ny: usize, nk: usize) -> Result<Array3<f64>, SinkError> {
    let mut cube = Array3::zeros((nx, ny, nk));
    {
        let file = File::open(path).map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let mut count = 0usize;
        'outer: for i in 0..nx {
            for j in 0..ny {
                for k in 0..nk {
                    match reader.read_f32::<LittleEndian>() {
                        Ok(v) => {
                            cube[(i, j, k)] = v as f64;
                            count += 1;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break 'outer,
                        Err(source) => {
                            return Err(SinkError::Io {
                                path: path.to_path_buf(),
                                source,
                            })
                        }
                    }
                }
            }
        }
        if count != nx * ny * nk {
            return Err(SinkError::TruncatedStream {
                path: path.to_path_buf(),
                got: count,
                nk,
            });
        }
    }
    fs::remove_file(path).map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cube)
}
