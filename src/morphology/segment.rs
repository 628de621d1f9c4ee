// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The segmented image and per-segment summary records.

use std::collections::HashMap;

use ndarray::prelude::*;

/// A segment label. 0 is background; [`BROADBAND_SEGMENT`],
/// [`LINE_SEGMENT`] and [`BLOB_SEGMENT`] are the reserved classification
/// targets; real component IDs start above those.
pub type SegmentId = usize;

/// Interference covering many channels at once (vertically extended).
pub const BROADBAND_SEGMENT: SegmentId = 1;
/// Interference persisting in time at a fixed frequency (horizontally
/// extended).
pub const LINE_SEGMENT: SegmentId = 2;
/// Interference without a strongly preferred axis.
pub const BLOB_SEGMENT: SegmentId = 3;

/// The first ID handed out to a real connected component.
pub(crate) const FIRST_COMPONENT_SEGMENT: SegmentId = 4;

/// A grid of segment labels, co-indexed with the flag mask it was derived
/// from. Axis 0 is frequency, axis 1 is time.
#[derive(Debug, Clone)]
pub struct SegmentedImage {
    data: Array2<SegmentId>,
    next_id: SegmentId,
}

impl SegmentedImage {
    pub(crate) fn zeros(dim: (usize, usize)) -> SegmentedImage {
        SegmentedImage {
            data: Array2::from_elem(dim, 0),
            next_id: FIRST_COMPONENT_SEGMENT,
        }
    }

    /// (channels, timesteps).
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn get(&self, y: usize, x: usize) -> SegmentId {
        self.data[(y, x)]
    }

    pub(crate) fn set(&mut self, y: usize, x: usize, id: SegmentId) {
        self.data[(y, x)] = id;
    }

    pub fn data(&self) -> ArrayView2<SegmentId> {
        self.data.view()
    }

    /// Allocate a fresh component ID.
    pub(crate) fn new_segment_id(&mut self) -> SegmentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// The distinct non-background IDs present, ascending.
    pub fn distinct_segments(&self) -> Vec<SegmentId> {
        let mut ids: Vec<SegmentId> = self.data.iter().copied().filter(|&id| id != 0).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// The number of labelled (non-background) pixels.
    pub fn labelled_count(&self) -> usize {
        self.data.iter().filter(|&&id| id != 0).count()
    }

    /// Rewrite every ID through `map`; IDs absent from the map are left
    /// alone.
    pub(crate) fn relabel(&mut self, map: &HashMap<SegmentId, SegmentId>) {
        if map.is_empty() {
            return;
        }
        for id in self.data.iter_mut() {
            if let Some(&new_id) = map.get(id) {
                *id = new_id;
            }
        }
    }
}

/// Summary of one segment: bounding box (right/bottom exclusive), pixel
/// count and the row-coordinate sum behind its mean row. Built by one scan
/// over a segmented image and discarded after the morphological pass that
/// needed it.
#[derive(Debug, Clone)]
pub(crate) struct SegmentInfo {
    pub(crate) segment: SegmentId,
    pub(crate) left: usize,
    pub(crate) right: usize,
    pub(crate) top: usize,
    pub(crate) bottom: usize,
    pub(crate) count: usize,
    pub(crate) y_sum: usize,
}

impl SegmentInfo {
    fn new(segment: SegmentId, x: usize, y: usize) -> SegmentInfo {
        SegmentInfo {
            segment,
            left: x,
            right: x + 1,
            top: y,
            bottom: y + 1,
            count: 1,
            y_sum: y,
        }
    }

    fn include(&mut self, x: usize, y: usize) {
        self.left = self.left.min(x);
        self.right = self.right.max(x + 1);
        self.top = self.top.min(y);
        self.bottom = self.bottom.max(y + 1);
        self.count += 1;
        self.y_sum += y;
    }

    pub(crate) fn width(&self) -> usize {
        self.right - self.left
    }

    pub(crate) fn height(&self) -> usize {
        self.bottom - self.top
    }

    pub(crate) fn mean_y(&self) -> f64 {
        self.y_sum as f64 / self.count as f64
    }
}

/// One record per distinct non-background ID, ascending by ID.
pub(crate) fn collect_segment_info(image: &SegmentedImage) -> Vec<SegmentInfo> {
    let mut by_id: HashMap<SegmentId, SegmentInfo> = HashMap::new();
    for ((y, x), &id) in image.data().indexed_iter() {
        if id == 0 {
            continue;
        }
        by_id
            .entry(id)
            .and_modify(|info| info.include(x, y))
            .or_insert_with(|| SegmentInfo::new(id, x, y));
    }

    let mut infos: Vec<SegmentInfo> = by_id.into_values().collect();
    infos.sort_unstable_by_key(|info| info.segment);
    infos
}
