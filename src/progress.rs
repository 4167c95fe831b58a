// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A thin `indicatif` wrapper for the lateral-grid sweep, mirroring this
//! repo's model/simulate progress bars (`model_progress.inc(1)`). Purely
//! observational: never consulted by the numerics, and safe to call from
//! multiple `rayon` worker threads (§5, §9 "Progress printing").

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Build the lateral-sweep progress bar, one tick per `(i, j)` cell.
///
/// `quiet` mirrors this repo's `--no-progress-bars` switch: when set, the
/// bar is built with a hidden draw target so callers can still call
/// `.inc(1)` unconditionally without checking a flag at every call site.
pub fn lateral_sweep_bar(n_cells: u64, quiet: bool) -> ProgressBar {
    let bar = ProgressBar::new(n_cells).with_style(
        ProgressStyle::default_bar()
            .template("{msg}: [{wide_bar:.blue}] {pos}/{len} cells ({elapsed_precise}<{eta_precise})")
            .progress_chars("=> "),
    );
    bar.set_draw_target(if quiet {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stdout()
    });
    bar.set_message("Synthesizing traces");
    bar.tick();
    bar
}
