// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag dilation: growing flagged samples to cover nearby contamination.
//!
//! Initial per-sample thresholding leaves RFI as sparse speckle: a
//! transmitter that corrupts 70% of the samples in some stretch of time
//! rarely trips the threshold on every single one. The operations here close
//! those gaps. [`density_time_flagger`] and [`density_frequency_flagger`]
//! are scale-invariant: they judge windows of every size from 2 samples up
//! to the full axis extent, so their effective aggressiveness adapts to the
//! size of the contaminated stretch instead of baking in one window size.
//! [`dilate_flags_horizontally`]/[`dilate_flags_vertically`] are the classic
//! fixed-radius morphological dilation, and [`line_remover`] is the blunt
//! final safety net that gives up on an entire timestep or channel.
//!
//! Every operation is monotone: flags are only ever set, never cleared. All
//! of them run in place on a caller-owned mask; rows (or columns) are
//! independent and are processed in parallel.


use log::trace;
use ndarray::prelude::*;
use rayon::prelude::*;

/// Grow flags along the time axis wherever the local flag density is too
/// high, at every scale up to the full time extent.
///
/// For each window width `w` (starting at 2 and growing by roughly 5% per
/// iteration), the axis is covered by complete non-overlapping windows, once
/// anchored at the low end and once at the high end so a dense stretch
/// straddling one tiling's boundary is still caught by the other. A window
/// qualifies when its flagged count strictly exceeds
/// `floor((1 - minimum_good_data_ratio) * w)`; qualifying windows become
/// fully flagged.
///
/// Rather than writing flags per width (which would re-flag large spans at
/// every scale), each qualifying window records a `+1`/`-1` interval mark in
/// a signed delta array, and a single prefix-sum pass at the end sets every
/// position with positive coverage. Counts are always taken from the input
/// mask, so flags produced at one scale never feed a larger one within the
/// same call.
pub fn density_time_flagger(mask: &mut Array2<bool>, minimum_good_data_ratio: f64) {
    debug_assert!((0.0..=1.0).contains(&minimum_good_data_ratio));
    mask.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|lane| density_dilate_lane(lane, minimum_good_data_ratio));
}

/// [`density_time_flagger`], along the frequency axis.
pub fn density_frequency_flagger(mask: &mut Array2<bool>, minimum_good_data_ratio: f64) {
    debug_assert!((0.0..=1.0).contains(&minimum_good_data_ratio));
    mask.axis_iter_mut(Axis(1))
        .into_par_iter()
        .for_each(|lane| density_dilate_lane(lane, minimum_good_data_ratio));
}

/// The per-lane multi-scale sweep behind the density flaggers.
///
/// The in-window count is maintained incrementally (one entering sample per
/// step), so each width costs O(lane length) and the whole sweep
/// O(length * number of widths).
fn density_dilate_lane(mut lane: ArrayViewMut1<bool>, minimum_good_data_ratio: f64) {
    let n = lane.len();
    if n < 2 {
        return;
    }

    let mut marks = vec![0_i32; n + 1];
    let mut w = 2;
    while w <= n {
        let max_bad = ((1.0 - minimum_good_data_ratio) * w as f64).floor() as i64;

        // Complete windows anchored at the low end, scanned left to right.
        let mut count = 0_i64;
        let mut start = 0;
        for x in 0..n {
            if lane[x] {
                count += 1;
            }
            if x + 1 - start == w {
                if count > max_bad {
                    marks[start] += 1;
                    marks[start + w] -= 1;
                }
                start = x + 1;
                count = 0;
            }
        }

        // Complete windows anchored at the high end, scanned right to left.
        let mut count = 0_i64;
        let mut end = n;
        for x in (0..n).rev() {
            if lane[x] {
                count += 1;
            }
            if end - x == w {
                if count > max_bad {
                    marks[x] += 1;
                    marks[x + w] -= 1;
                }
                end = x;
                count = 0;
            }
        }

        w += (w / 20).max(1);
    }

    // Realise the accumulated interval marks with one prefix-sum pass.
    let mut coverage = 0;
    for x in 0..n {
        coverage += marks[x];
        if coverage > 0 {
            lane[x] = true;
        }
    }
}

/// Fixed-radius dilation along the time axis: every sample within `radius`
/// of a flagged sample becomes flagged. The radius is clamped to the time
/// extent; radius 0 is a no-op.
pub fn dilate_flags_horizontally(mask: &mut Array2<bool>, radius: usize) {
    if radius == 0 {
        return;
    }
    let radius = radius.min(mask.ncols());
    mask.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|lane| dilate_lane(lane, radius));
}

/// Fixed-radius dilation along the frequency axis.
pub fn dilate_flags_vertically(mask: &mut Array2<bool>, radius: usize) {
    if radius == 0 {
        return;
    }
    let radius = radius.min(mask.nrows());
    mask.axis_iter_mut(Axis(1))
        .into_par_iter()
        .for_each(|lane| dilate_lane(lane, radius));
}

/// One forward and one backward scan with a distance-since-last-flag
/// counter, O(lane length) regardless of radius.
///
/// The forward pass only spreads flags to higher indices and the backward
/// pass only to lower ones, so samples set by one pass cannot cascade
/// through the other: every new flag is within `radius` of an input flag.
fn dilate_lane(mut lane: ArrayViewMut1<bool>, radius: usize) {
    let n = lane.len();

    let mut distance = n;
    for x in 0..n {
        if lane[x] {
            distance = 0;
        } else {
            distance = distance.saturating_add(1);
            if distance <= radius {
                lane[x] = true;
            }
        }
    }

    let mut distance = n;
    for x in (0..n).rev() {
        if lane[x] {
            distance = 0;
        } else {
            distance = distance.saturating_add(1);
            if distance <= radius {
                lane[x] = true;
            }
        }
    }
}

/// Exact 1D scale-invariant dilation: every window width from 2 to the
/// buffer length, O(n^2). Kept as the slow reference for
/// [`scale_inv_dilation_quick`].
pub fn scale_inv_dilation_full(data: &mut [bool], minimum_good_data_ratio: f64) {
    debug_assert!((0.0..=1.0).contains(&minimum_good_data_ratio));
    let n = data.len();
    if n < 2 {
        return;
    }

    let mut marks = vec![0_i32; n + 1];
    for w in 2..=n {
        sweep_slice_width(data, &mut marks, w, minimum_good_data_ratio);
    }
    integrate_slice_marks(data, &marks);
}

/// Approximate 1D scale-invariant dilation: geometric window widths
/// (5% growth tracked in a float accumulator), O(n log n).
///
/// On smoothly varying contamination this flags the same set as
/// [`scale_inv_dilation_full`]; pathological inputs may diverge where a
/// width skipped by the geometric schedule was the only qualifying one.
pub fn scale_inv_dilation_quick(data: &mut [bool], minimum_good_data_ratio: f64) {
    debug_assert!((0.0..=1.0).contains(&minimum_good_data_ratio));
    let n = data.len();
    if n < 2 {
        return;
    }

    let mut marks = vec![0_i32; n + 1];
    let mut width_f = 2.0_f64;
    let mut w = 2;
    while w <= n {
        sweep_slice_width(data, &mut marks, w, minimum_good_data_ratio);
        width_f *= 1.05;
        if (width_f as usize) <= w {
            width_f = (w + 1) as f64;
        }
        w = width_f as usize;
    }
    integrate_slice_marks(data, &marks);
}

/// One width of the 1D sweep: complete windows in both anchorings, interval
/// marks for qualifying windows.
fn sweep_slice_width(data: &[bool], marks: &mut [i32], w: usize, minimum_good_data_ratio: f64) {
    let n = data.len();
    let max_bad = ((1.0 - minimum_good_data_ratio) * w as f64).floor() as i64;

    let mut count = 0_i64;
    let mut start = 0;
    for (x, &flagged) in data.iter().enumerate() {
        if flagged {
            count += 1;
        }
        if x + 1 - start == w {
            if count > max_bad {
                marks[start] += 1;
                marks[start + w] -= 1;
            }
            start = x + 1;
            count = 0;
        }
    }

    let mut count = 0_i64;
    let mut end = n;
    for x in (0..n).rev() {
        if data[x] {
            count += 1;
        }
        if end - x == w {
            if count > max_bad {
                marks[x] += 1;
                marks[x + w] -= 1;
            }
            end = x;
            count = 0;
        }
    }
}

fn integrate_slice_marks(data: &mut [bool], marks: &[i32]) {
    let mut coverage = 0;
    for (x, flagged) in data.iter_mut().enumerate() {
        coverage += marks[x];
        if coverage > 0 {
            *flagged = true;
        }
    }
}

/// Suppress whole slices that are already too contaminated to be worth
/// keeping: any timestep (column) with more than `max_freq_contamination`
/// flagged channels is fully flagged, and any channel (row) with more than
/// `max_time_contamination` flagged timesteps likewise.
///
/// Both sets of counts are taken from the input mask before either
/// suppression is applied, so a suppressed column does not tip its rows over
/// the limit.
pub fn line_remover(
    mask: &mut Array2<bool>,
    max_time_contamination: usize,
    max_freq_contamination: usize,
) {
    let row_counts: Vec<usize> = mask
        .axis_iter(Axis(0))
        .map(|row| row.iter().filter(|&&f| f).count())
        .collect();
    let col_counts: Vec<usize> = mask
        .axis_iter(Axis(1))
        .map(|col| col.iter().filter(|&&f| f).count())
        .collect();

    for (y, &count) in row_counts.iter().enumerate() {
        if count > max_time_contamination {
            trace!("channel {y} has {count} flagged timesteps; removing the whole channel");
            mask.row_mut(y).fill(true);
        }
    }
    for (x, &count) in col_counts.iter().enumerate() {
        if count > max_freq_contamination {
            trace!("timestep {x} has {count} flagged channels; removing the whole timestep");
            mask.column_mut(x).fill(true);
        }
    }
}
