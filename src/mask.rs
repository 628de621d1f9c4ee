// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag-mask bookkeeping.
//!
//! Masks are `Array2<bool>` with axis 0 over frequency channels and axis 1
//! over timesteps; `true` means flagged. The helpers here summarise a mask
//! without changing it. Contamination counts deliberately ignore non-finite
//! amplitude samples: a NaN correlator output is neither good nor bad data
//! and must not skew a ratio.

use ndarray::prelude::*;
use num_traits::Float;

/// The number of flagged samples in a mask.
pub fn count_flagged(mask: ArrayView2<bool>) -> usize {
    mask.iter().filter(|&&f| f).count()
}

/// The fractional amount that each channel is flagged.
///
/// The returned vector has one element per frequency channel, each between 0
/// (0% flagged) and 1 (100% flagged). A zero-width mask yields zeros.
pub fn channel_occupancy(mask: ArrayView2<bool>) -> Vec<f64> {
    mask.axis_iter(Axis(0))
        .map(|channel| {
            if channel.is_empty() {
                0.0
            } else {
                let flagged = channel.iter().filter(|&&f| f).count();
                flagged as f64 / channel.len() as f64
            }
        })
        .collect()
}

/// Contamination counters for one time-frequency block: `(rfi, total)`,
/// where `total` is the number of finite amplitude samples and `rfi` the
/// number of those that are flagged.
///
/// The two grids must have the same shape; the caller guarantees this.
pub fn contamination_counts<F: Float>(
    amplitudes: ArrayView2<F>,
    mask: ArrayView2<bool>,
) -> (u64, u64) {
    debug_assert_eq!(amplitudes.dim(), mask.dim());

    let mut rfi = 0;
    let mut total = 0;
    for (&amp, &flagged) in amplitudes.iter().zip(mask.iter()) {
        if amp.is_finite() {
            total += 1;
            if flagged {
                rfi += 1;
            }
        }
    }
    (rfi, total)
}
