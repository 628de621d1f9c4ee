// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Segmentation and classification of flagged regions.
//!
//! A consolidated flag mask still mixes interference of very different
//! character: a transmitter occupying one channel for minutes (a horizontal
//! "line"), a lightning burst covering the whole band for one timestep
//! (vertical "broadband"), and shapeless blobs. The segmenters here label
//! connected regions of the mask so that each region can be classified and
//! measured separately.
//!
//! Plain connected-component labelling would merge a line and a broadband
//! burst into one region as soon as they touch. Both segmenters therefore
//! key the flood fill on run-length dominance: a pixel whose longest
//! vertical run of flags exceeds its longest horizontal run is
//! vertical-dominant, and the fill does not propagate between pixels of
//! opposite dominance. Fills use an explicit stack; components can span the
//! whole grid, which would overflow the call stack if the fill recursed.


mod segment;

pub use segment::{
    SegmentId, SegmentedImage, BLOB_SEGMENT, BROADBAND_SEGMENT, LINE_SEGMENT,
};
use segment::{collect_segment_info, SegmentInfo, FIRST_COMPONENT_SEGMENT};

use std::collections::HashMap;

use ndarray::prelude::*;
use ndarray::Zip;
use rayon::prelude::*;

use crate::dilation;

/// A segment is a line (or broadband burst) once its bounding box is more
/// than this many times longer than it is wide (or tall).
const CLASSIFY_ASPECT_RATIO: usize = 10;

/// Noise-absorption rule: the dominant segment must outweigh the absorbed
/// sliver by at least this pixel-count ratio.
const NOISE_COUNT_RATIO: usize = 20;

/// Noise-absorption rule: maximum bounding-box gap, in pixels, between the
/// dominant segment and the absorbed sliver.
const ADJACENCY_GAP: usize = 1;

/// Same-shape rule: widths/heights must agree within this fraction of the
/// larger, plus [`SHAPE_SIMILARITY_MARGIN`] pixels of slack.
const SHAPE_SIMILARITY_FRACTION: f64 = 0.25;
const SHAPE_SIMILARITY_MARGIN: f64 = 2.0;

/// Same-shape rule: maximum horizontal gap, as a multiple of the smaller
/// segment's pixel count.
const GAP_COUNT_FACTOR: usize = 32;

/// Tuning for the morphological operations. The defaults are what the
/// standard flagging sequence uses.
#[derive(Debug, Clone)]
pub struct Morphology {
    /// Fixed enlargement radius applied to the line-dominant class along
    /// the time axis before the three-class fill.
    h_line_enlarging: usize,

    /// Fixed enlargement radius applied to the broadband-dominant class
    /// along the frequency axis.
    v_line_enlarging: usize,

    /// Minimum good-data ratio handed to the density flaggers when
    /// consolidating each class along its dominant axis.
    density_enlarge_ratio: f64,
}

impl Default for Morphology {
    fn default() -> Morphology {
        Morphology {
            h_line_enlarging: 1,
            v_line_enlarging: 1,
            density_enlarge_ratio: 0.5,
        }
    }
}

/// Which enlarged class mask a pixel belongs to during the three-class
/// segmentation. `Buffer` pixels sit in both class masks; they join
/// whichever fill reaches them first and never determine a fill's polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunClass {
    Line,
    Buffer,
    Broadband,
}

impl Morphology {
    pub fn new() -> Morphology {
        Morphology::default()
    }

    pub fn with_line_enlarging(mut self, horizontal: usize, vertical: usize) -> Morphology {
        self.h_line_enlarging = horizontal;
        self.v_line_enlarging = vertical;
        self
    }

    pub fn with_density_enlarge_ratio(mut self, ratio: f64) -> Morphology {
        debug_assert!((0.0..=1.0).contains(&ratio));
        self.density_enlarge_ratio = ratio;
        self
    }

    /// Label each maximal same-dominance connected region of the mask with
    /// a unique segment ID.
    ///
    /// Every flagged pixel gets a signed "opening" value: the length of the
    /// longest horizontal run of flags through it, negated if the vertical
    /// run is strictly longer. The fill propagates between 4-connected
    /// flagged neighbours only when their openings have the same sign, with
    /// the seed pixel fixing the polarity, so touching regions of opposite
    /// character stay separate components.
    pub fn segment_by_max_length(&self, mask: ArrayView2<bool>) -> SegmentedImage {
        let (height, width) = mask.dim();
        let h_runs = horizontal_run_lengths(mask);
        let v_runs = vertical_run_lengths(mask);

        let mut opening = Array2::<i64>::zeros((height, width));
        for ((y, x), &flagged) in mask.indexed_iter() {
            if flagged {
                let h = h_runs[(y, x)] as i64;
                let v = v_runs[(y, x)] as i64;
                opening[(y, x)] = if v > h { -v } else { h };
            }
        }

        let mut segmented = SegmentedImage::zeros((height, width));
        let mut stack: Vec<(usize, usize)> = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if mask[(y, x)] && segmented.get(y, x) == 0 {
                    let id = segmented.new_segment_id();
                    fill_same_sign(mask, &opening, &mut segmented, &mut stack, (y, x), id);
                }
            }
        }
        segmented
    }

    /// Three-class segmentation: consolidate the line-dominant and
    /// broadband-dominant parts of the mask independently, then label each
    /// class's connected regions.
    ///
    /// Flagged pixels are split into a line-dominant class (horizontal run
    /// strictly longer than vertical) and a broadband-dominant class (the
    /// rest). Each class mask is enlarged along its own axis and
    /// density-consolidated, so sparse same-type flags fuse before
    /// labelling. Pixels landing in both enlarged masks form a buffer
    /// class. The fill runs per class over (x, y, class); it crosses into
    /// the opposite class only where the run lengths, recomputed on the
    /// consolidated mask, no longer favour that class's own axis; this
    /// relabels pixels whose dominance flipped at a merge boundary.
    pub fn segment_by_length_ratio(&self, mask: ArrayView2<bool>) -> SegmentedImage {
        let (height, width) = mask.dim();
        let h_runs = horizontal_run_lengths(mask);
        let v_runs = vertical_run_lengths(mask);

        let mut line_mask = Array2::from_elem((height, width), false);
        let mut broadband_mask = Array2::from_elem((height, width), false);
        for ((y, x), &flagged) in mask.indexed_iter() {
            if flagged {
                if h_runs[(y, x)] > v_runs[(y, x)] {
                    line_mask[(y, x)] = true;
                } else {
                    broadband_mask[(y, x)] = true;
                }
            }
        }

        dilation::dilate_flags_horizontally(&mut line_mask, self.h_line_enlarging);
        dilation::density_time_flagger(&mut line_mask, self.density_enlarge_ratio);
        dilation::dilate_flags_vertically(&mut broadband_mask, self.v_line_enlarging);
        dilation::density_frequency_flagger(&mut broadband_mask, self.density_enlarge_ratio);

        // Run lengths over the consolidated mask drive the cross-class
        // relabel rule below.
        let consolidated =
            Zip::from(&line_mask).and(&broadband_mask).map_collect(|&l, &b| l || b);
        let h_cons = horizontal_run_lengths(consolidated.view());
        let v_cons = vertical_run_lengths(consolidated.view());

        let mut segmented = SegmentedImage::zeros((height, width));
        let mut stack: Vec<(usize, usize)> = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let class = match pixel_class(line_mask[(y, x)], broadband_mask[(y, x)]) {
                    Some(class @ (RunClass::Line | RunClass::Broadband)) => class,
                    // Buffer pixels never seed a fill.
                    _ => continue,
                };
                if segmented.get(y, x) == 0 {
                    let id = segmented.new_segment_id();
                    fill_class(
                        &line_mask,
                        &broadband_mask,
                        &h_cons,
                        &v_cons,
                        &mut segmented,
                        &mut stack,
                        (y, x),
                        class,
                        id,
                    );
                }
            }
        }
        segmented
    }

    /// Merge every component into one of the three reserved classification
    /// IDs based on its bounding-box aspect ratio. A pure ID remap: no
    /// pixel gains or loses a label.
    pub fn classify(&self, segmented: &mut SegmentedImage) {
        let infos = collect_segment_info(segmented);
        let mut remap = HashMap::new();
        for info in &infos {
            if info.segment < FIRST_COMPONENT_SEGMENT {
                continue;
            }
            let class = if info.width() > CLASSIFY_ASPECT_RATIO * info.height() {
                LINE_SEGMENT
            } else if info.height() > CLASSIFY_ASPECT_RATIO * info.width() {
                BROADBAND_SEGMENT
            } else {
                BLOB_SEGMENT
            };
            remap.insert(info.segment, class);
        }
        segmented.relabel(&remap);
    }

    /// Merge segments that evidently belong to the same interference
    /// source, iterating until no pair merges.
    ///
    /// Two rules, first match wins for a given pair:
    ///
    /// - noise absorption: a segment at least [`NOISE_COUNT_RATIO`] times
    ///   larger absorbs a 1-pixel-thin sliver within [`ADJACENCY_GAP`] of
    ///   it (transmitter sidelobe speckle hugging the main detection). The
    ///   absorbed sliver is marked and never acts as a merge source again;
    /// - same shape, same channels: two segments with no vertical gap,
    ///   mean rows within half their summed heights, similar widths and
    ///   heights ([`SHAPE_SIMILARITY_FRACTION`] + margin) and a horizontal
    ///   gap under [`GAP_COUNT_FACTOR`] times the smaller pixel count (an
    ///   intermittent transmitter seen twice).
    ///
    /// Merging reassigns the segment IDs on the tracked records; the
    /// records themselves stay separate, so later pair tests still compare
    /// the original parts. Merges only ever reduce the number of distinct
    /// IDs, which is what guarantees the fixed point.
    pub fn cluster(&self, segmented: &mut SegmentedImage) {
        let mut infos = collect_segment_info(segmented);
        let original_ids: Vec<SegmentId> = infos.iter().map(|info| info.segment).collect();
        let mut consumed = vec![false; infos.len()];

        loop {
            let mut merged_any = false;
            for i in 0..infos.len() {
                for j in (i + 1)..infos.len() {
                    if consumed[i] || consumed[j] || infos[i].segment == infos[j].segment {
                        continue;
                    }
                    let Some(merge) = merge_decision(&infos[i], &infos[j]) else {
                        continue;
                    };
                    let (winner, loser) = if merge.keep_first { (i, j) } else { (j, i) };
                    let new_id = infos[winner].segment;
                    let old_id = infos[loser].segment;
                    for (info, c) in infos.iter_mut().zip(consumed.iter_mut()) {
                        if info.segment == old_id {
                            info.segment = new_id;
                            if merge.absorb {
                                *c = true;
                            }
                        }
                    }
                    merged_any = true;
                }
            }
            if !merged_any {
                break;
            }
        }

        let mut remap = HashMap::new();
        for (info, &original) in infos.iter().zip(&original_ids) {
            if info.segment != original {
                remap.insert(original, info.segment);
            }
        }
        segmented.relabel(&remap);
    }

    /// Drop every segment whose pixel count is `threshold_level` or less.
    pub fn remove_small_segments(&self, segmented: &mut SegmentedImage, threshold_level: usize) {
        let mut counts: HashMap<SegmentId, usize> = HashMap::new();
        for &id in segmented.data().iter() {
            if id != 0 {
                *counts.entry(id).or_default() += 1;
            }
        }

        let remap: HashMap<SegmentId, SegmentId> = counts
            .into_iter()
            .filter(|&(_, count)| count <= threshold_level)
            .map(|(id, _)| (id, 0))
            .collect();
        segmented.relabel(&remap);
    }
}

struct MergeOutcome {
    /// Keep the first segment's ID (otherwise the second's).
    keep_first: bool,
    /// Noise absorption: mark the losing segment so it cannot source
    /// another merge.
    absorb: bool,
}

fn merge_decision(a: &SegmentInfo, b: &SegmentInfo) -> Option<MergeOutcome> {
    let h_gap = box_gap(a.left, a.right, b.left, b.right);
    let v_gap = box_gap(a.top, a.bottom, b.top, b.bottom);

    if h_gap <= ADJACENCY_GAP && v_gap <= ADJACENCY_GAP {
        if a.count >= NOISE_COUNT_RATIO * b.count && (b.width() <= 1 || b.height() <= 1) {
            return Some(MergeOutcome { keep_first: true, absorb: true });
        }
        if b.count >= NOISE_COUNT_RATIO * a.count && (a.width() <= 1 || a.height() <= 1) {
            return Some(MergeOutcome { keep_first: false, absorb: true });
        }
    }

    let mean_row_distance = (a.mean_y() - b.mean_y()).abs();
    let width_difference = (a.width() as f64 - b.width() as f64).abs();
    let height_difference = (a.height() as f64 - b.height() as f64).abs();
    let max_width = a.width().max(b.width()) as f64;
    let max_height = a.height().max(b.height()) as f64;
    if v_gap == 0
        && mean_row_distance <= 0.5 * (a.height() + b.height()) as f64
        && width_difference <= SHAPE_SIMILARITY_FRACTION * max_width + SHAPE_SIMILARITY_MARGIN
        && height_difference <= SHAPE_SIMILARITY_FRACTION * max_height + SHAPE_SIMILARITY_MARGIN
        && h_gap < GAP_COUNT_FACTOR * a.count.min(b.count)
    {
        return Some(MergeOutcome { keep_first: a.count >= b.count, absorb: false });
    }

    None
}

/// Gap between two half-open intervals; 0 when they touch or overlap.
fn box_gap(a_lo: usize, a_hi: usize, b_lo: usize, b_hi: usize) -> usize {
    if a_hi <= b_lo {
        b_lo - a_hi
    } else if b_hi <= a_lo {
        a_lo - b_hi
    } else {
        0
    }
}

fn pixel_class(line: bool, broadband: bool) -> Option<RunClass> {
    match (line, broadband) {
        (true, true) => Some(RunClass::Buffer),
        (true, false) => Some(RunClass::Line),
        (false, true) => Some(RunClass::Broadband),
        (false, false) => None,
    }
}

fn neighbours4(
    y: usize,
    x: usize,
    height: usize,
    width: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let mut out = [(0, 0); 4];
    let mut n = 0;
    if x > 0 {
        out[n] = (y, x - 1);
        n += 1;
    }
    if x + 1 < width {
        out[n] = (y, x + 1);
        n += 1;
    }
    if y > 0 {
        out[n] = (y - 1, x);
        n += 1;
    }
    if y + 1 < height {
        out[n] = (y + 1, x);
        n += 1;
    }
    out.into_iter().take(n)
}

/// Stack-based 4-connected fill over flagged pixels whose signed opening
/// matches the seed's polarity.
fn fill_same_sign(
    mask: ArrayView2<bool>,
    opening: &Array2<i64>,
    segmented: &mut SegmentedImage,
    stack: &mut Vec<(usize, usize)>,
    seed: (usize, usize),
    id: SegmentId,
) {
    let (height, width) = mask.dim();
    let positive = opening[seed] > 0;

    segmented.set(seed.0, seed.1, id);
    stack.push(seed);
    while let Some((y, x)) = stack.pop() {
        for (ny, nx) in neighbours4(y, x, height, width) {
            if mask[(ny, nx)]
                && segmented.get(ny, nx) == 0
                && (opening[(ny, nx)] > 0) == positive
            {
                segmented.set(ny, nx, id);
                stack.push((ny, nx));
            }
        }
    }
}

/// Stack-based fill for one class of the three-class segmentation.
#[allow(clippy::too_many_arguments)]
fn fill_class(
    line_mask: &Array2<bool>,
    broadband_mask: &Array2<bool>,
    h_cons: &Array2<u32>,
    v_cons: &Array2<u32>,
    segmented: &mut SegmentedImage,
    stack: &mut Vec<(usize, usize)>,
    seed: (usize, usize),
    seed_class: RunClass,
    id: SegmentId,
) {
    let (height, width) = line_mask.dim();

    segmented.set(seed.0, seed.1, id);
    stack.push(seed);
    while let Some((y, x)) = stack.pop() {
        for (ny, nx) in neighbours4(y, x, height, width) {
            let Some(class) = pixel_class(line_mask[(ny, nx)], broadband_mask[(ny, nx)]) else {
                continue;
            };
            if segmented.get(ny, nx) == id {
                continue;
            }
            let unclaimed = segmented.get(ny, nx) == 0;
            let claim = if class == seed_class || class == RunClass::Buffer {
                unclaimed
            } else {
                // Opposite class: cross (possibly relabelling an earlier
                // segment's pixel) only where consolidated dominance no
                // longer favours that class's own axis.
                match seed_class {
                    RunClass::Line => v_cons[(ny, nx)] <= h_cons[(ny, nx)],
                    RunClass::Broadband => h_cons[(ny, nx)] <= v_cons[(ny, nx)],
                    RunClass::Buffer => unreachable!("buffer pixels never seed a fill"),
                }
            };
            if claim {
                segmented.set(ny, nx, id);
                stack.push((ny, nx));
            }
        }
    }
}

/// Per-pixel length of the maximal contiguous horizontal run of flags
/// containing it; 0 for unflagged pixels.
fn horizontal_run_lengths(mask: ArrayView2<bool>) -> Array2<u32> {
    let mut runs = Array2::<u32>::zeros(mask.dim());
    runs.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(mask.axis_iter(Axis(0)))
        .for_each(|(run_lane, mask_lane)| lane_run_lengths(mask_lane, run_lane));
    runs
}

/// Vertical counterpart of [`horizontal_run_lengths`].
fn vertical_run_lengths(mask: ArrayView2<bool>) -> Array2<u32> {
    let mut runs = Array2::<u32>::zeros(mask.dim());
    runs.axis_iter_mut(Axis(1))
        .into_par_iter()
        .zip(mask.axis_iter(Axis(1)))
        .for_each(|(run_lane, mask_lane)| lane_run_lengths(mask_lane, run_lane));
    runs
}

fn lane_run_lengths(mask_lane: ArrayView1<bool>, mut run_lane: ArrayViewMut1<u32>) {
    let n = mask_lane.len();
    let mut x = 0;
    while x < n {
        if mask_lane[x] {
            let start = x;
            while x < n && mask_lane[x] {
                x += 1;
            }
            let length = (x - start) as u32;
            for i in start..x {
                run_lane[i] = length;
            }
        } else {
            x += 1;
        }
    }
}
