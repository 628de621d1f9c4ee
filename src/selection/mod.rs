// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cross-baseline outlier selection.
//!
//! Per-sample flagging has a ceiling: a baseline fed by a broken correlator
//! path, or one sitting next to a powerful transmitter, is contaminated in
//! a way no per-sample detector fully catches. This module aggregates one
//! contamination ratio per baseline across an entire observation and marks
//! whole baselines whose ratio is anomalous.
//!
//! "Anomalous" is relative to length: short baselines legitimately carry
//! more RFI than long ones (terrestrial interference decorrelates with
//! distance), so ratios are compared against a Gaussian-kernel regression
//! of ratio on log-length rather than a single cut. The fit is iterated:
//! marked baselines are removed, the curve re-fit, and baselines that were
//! only outliers because the curve was skewed by worse ones are re-admitted.
//!
//! Pipeline workers process baselines in parallel and call
//! [`BaselineSelector::add`] concurrently; the selector's collection is
//! mutex-guarded. [`BaselineSelector::search`] must run only after all adds
//! have completed (the caller provides that barrier), and it does not
//! mutate the accumulated state, so repeated searches agree.

mod error;
#[cfg(test)]
mod tests;

pub use error::SelectionError;

use std::collections::HashSet;
use std::sync::Mutex;

use itertools::{Either, Itertools};
use log::{debug, trace};
use ndarray::prelude::*;
use num_traits::Float;

use crate::mask::contamination_counts;
use crate::math::{log_gaussian_weight, trimmed_mean_and_std};

/// How many trimmed standard deviations a residual may sit from the trimmed
/// mean before the baseline is marked.
const DEFAULT_THRESHOLD: f64 = 3.5;

/// A contamination ratio above this is disqualifying regardless of the fit.
const DEFAULT_ABS_THRESHOLD: f64 = 0.8;

/// Kernel width of the log-length regression.
const DEFAULT_SMOOTHING_SIGMA: f64 = 0.6;

/// A baseline with this many samples and not a single flag is more likely a
/// dead correlator path reporting zeros than genuinely clean data.
const SUSPICIOUSLY_PERFECT_MIN_SAMPLES: u64 = 2500;

/// Fraction trimmed from each end of the residual distribution before
/// taking its mean and standard deviation.
const RESIDUAL_TRIM_FRACTION: f64 = 0.25;

/// The identity of one antenna pair.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub antenna1: usize,
    pub antenna2: usize,
    pub antenna1_name: String,
    pub antenna2_name: String,

    /// Physical baseline length \[metres\]. Zero for auto-correlations,
    /// which the selection ignores.
    pub length: f64,
}

/// One baseline's accumulated contamination over an observation. Created on
/// the first [`BaselineSelector::add`] for its antenna pair and only ever
/// grown by further adds.
#[derive(Debug, Clone)]
pub struct SingleBaselineInfo {
    pub baseline: Baseline,
    pub rfi_count: u64,
    pub total_count: u64,
}

impl SingleBaselineInfo {
    pub fn contamination_ratio(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.rfi_count as f64 / self.total_count as f64
        }
    }
}

/// Accumulates per-baseline contamination ratios and searches them for
/// whole-baseline outliers.
pub struct BaselineSelector {
    baselines: Mutex<Vec<SingleBaselineInfo>>,
    threshold: f64,
    abs_threshold: f64,
    smoothing_sigma: f64,
}

impl Default for BaselineSelector {
    fn default() -> BaselineSelector {
        BaselineSelector {
            baselines: Mutex::new(Vec::new()),
            threshold: DEFAULT_THRESHOLD,
            abs_threshold: DEFAULT_ABS_THRESHOLD,
            smoothing_sigma: DEFAULT_SMOOTHING_SIGMA,
        }
    }
}

impl BaselineSelector {
    pub fn new() -> BaselineSelector {
        BaselineSelector::default()
    }

    pub fn with_threshold(mut self, threshold: f64) -> BaselineSelector {
        self.threshold = threshold;
        self
    }

    pub fn with_abs_threshold(mut self, abs_threshold: f64) -> BaselineSelector {
        self.abs_threshold = abs_threshold;
        self
    }

    pub fn with_smoothing_sigma(mut self, smoothing_sigma: f64) -> BaselineSelector {
        self.smoothing_sigma = smoothing_sigma;
        self
    }

    /// Register one baseline's time-frequency block. Non-finite amplitude
    /// samples are excluded from both the numerator and the denominator of
    /// the contamination ratio. May be called from any number of threads;
    /// repeated calls for the same antenna pair accumulate.
    pub fn add<F: Float>(
        &self,
        baseline: Baseline,
        amplitudes: ArrayView2<F>,
        mask: ArrayView2<bool>,
    ) -> Result<(), SelectionError> {
        if amplitudes.dim() != mask.dim() {
            return Err(SelectionError::MismatchedDimensions {
                mask_dim: mask.dim(),
                amplitude_dim: amplitudes.dim(),
            });
        }
        let (rfi_count, total_count) = contamination_counts(amplitudes, mask);
        self.add_counts(baseline, rfi_count, total_count);
        Ok(())
    }

    /// [`BaselineSelector::add`] with the contamination counts already
    /// computed.
    pub fn add_counts(&self, baseline: Baseline, rfi_count: u64, total_count: u64) {
        let mut baselines = self.baselines.lock().unwrap();
        match baselines.iter_mut().find(|info| {
            info.baseline.antenna1 == baseline.antenna1
                && info.baseline.antenna2 == baseline.antenna2
        }) {
            Some(info) => {
                info.rfi_count += rfi_count;
                info.total_count += total_count;
            }
            None => baselines.push(SingleBaselineInfo {
                baseline,
                rfi_count,
                total_count,
            }),
        }
    }

    /// The number of registered baselines.
    pub fn len(&self) -> usize {
        self.baselines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.lock().unwrap().is_empty()
    }

    /// Search the accumulated baselines for whole-baseline outliers and
    /// return the marked-bad records.
    ///
    /// Call this once per observation, after every [`BaselineSelector::add`]
    /// has completed. The accumulated state is not modified: searching
    /// twice in a row returns the same marked set.
    pub fn search(&self) -> Vec<SingleBaselineInfo> {
        let all: Vec<SingleBaselineInfo> = self.baselines.lock().unwrap().clone();
        let num_cross = all.iter().filter(|b| b.baseline.length > 0.0).count();

        // Hard rejections don't need the fit at all. Auto-correlations have
        // no length-dependent expectation and are ignored outright.
        let (mut marked, mut working): (Vec<_>, Vec<_>) = all
            .into_iter()
            .filter(|b| b.baseline.length > 0.0)
            .partition_map(|b| {
                if self.hard_reject(&b) {
                    Either::Left(b)
                } else {
                    Either::Right(b)
                }
            });

        // Pairs marked at any point; once a pair has been marked and
        // re-admitted, marking it again is not progress, which keeps the
        // loop from oscillating.
        let mut ever_marked: HashSet<(usize, usize)> =
            marked.iter().map(antenna_pair).collect();

        loop {
            working.sort_by(|a, b| a.baseline.length.total_cmp(&b.baseline.length));
            if working.is_empty() {
                break;
            }

            let residuals: Vec<f64> = working
                .iter()
                .map(|b| {
                    self.smoothed_ratio(b.baseline.length, &working) - b.contamination_ratio()
                })
                .collect();
            let Some((mean, std)) = trimmed_mean_and_std(&residuals, RESIDUAL_TRIM_FRACTION)
            else {
                break;
            };
            let bound = self.threshold * std;

            // Re-admit marked baselines that the corrected curve now
            // accepts; they were likely marked while the curve was still
            // skewed by worse baselines.
            let (still_marked, readmitted): (Vec<_>, Vec<_>) =
                marked.into_iter().partition_map(|b| {
                    let residual =
                        self.smoothed_ratio(b.baseline.length, &working) - b.contamination_ratio();
                    if (residual - mean).abs() <= bound && !self.hard_reject(&b) {
                        Either::Right(b)
                    } else {
                        Either::Left(b)
                    }
                });
            marked = still_marked;

            // Mark this pass's outliers, judged against the curve the pass
            // computed (re-admissions join the fit from the next pass).
            let mut kept = Vec::with_capacity(working.len());
            let mut newly_marked = Vec::new();
            for (b, residual) in working.into_iter().zip(residuals) {
                if (residual - mean).abs() > bound || self.hard_reject(&b) {
                    newly_marked.push(b);
                } else {
                    kept.push(b);
                }
            }

            trace!(
                "baseline fit pass: mean residual {mean:.3e}, sigma {std:.3e}, \
                 {} newly marked, {} re-admitted",
                newly_marked.len(),
                readmitted.len()
            );

            let progress = newly_marked
                .iter()
                .map(antenna_pair)
                .filter(|pair| !ever_marked.contains(pair))
                .count();
            ever_marked.extend(newly_marked.iter().map(antenna_pair));
            marked.extend(newly_marked);
            working = kept;
            working.extend(readmitted);

            if progress == 0 {
                break;
            }
        }

        debug!(
            "baseline selection marked {} of {} cross-correlation baselines",
            marked.len(),
            num_cross
        );
        marked
    }

    fn hard_reject(&self, info: &SingleBaselineInfo) -> bool {
        info.contamination_ratio() > self.abs_threshold
            || (info.rfi_count == 0 && info.total_count >= SUSPICIOUSLY_PERFECT_MIN_SAMPLES)
    }

    /// The expected contamination ratio at `length`: a Gaussian-kernel
    /// regression in log-length space over the baselines still under
    /// consideration (self included).
    fn smoothed_ratio(&self, length: f64, working: &[SingleBaselineInfo]) -> f64 {
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for b in working {
            let w = log_gaussian_weight(b.baseline.length, length, self.smoothing_sigma);
            weighted += w * b.contamination_ratio();
            weight_sum += w;
        }
        if weight_sum > 0.0 {
            weighted / weight_sum
        } else {
            0.0
        }
    }
}

/// From the marked-bad baselines, infer antennas that are themselves bad:
/// any antenna referenced by more than `max_ratio` of the marked baselines.
/// Returns ascending antenna IDs.
pub fn imply_stations(marked: &[SingleBaselineInfo], max_ratio: f64) -> Vec<usize> {
    use std::collections::HashMap;

    if marked.is_empty() {
        return Vec::new();
    }

    let mut counts: HashMap<usize, usize> = HashMap::new();
    for info in marked {
        *counts.entry(info.baseline.antenna1).or_default() += 1;
        *counts.entry(info.baseline.antenna2).or_default() += 1;
    }

    let limit = max_ratio * marked.len() as f64;
    counts
        .into_iter()
        .filter(|&(_, count)| count as f64 > limit)
        .map(|(antenna, _)| antenna)
        .sorted_unstable()
        .collect()
}

fn antenna_pair(info: &SingleBaselineInfo) -> (usize, usize) {
    (info.baseline.antenna1, info.baseline.antenna2)
}
