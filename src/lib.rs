// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Detection and curation of radio-frequency interference (RFI) flags in
interferometric observations.

This crate operates on dense time-frequency grids: an amplitude grid and a
co-indexed boolean flag mask, both `ndarray::Array2` with axis 0 running over
frequency channels and axis 1 over timesteps. Given a raw flag mask produced
by an upstream per-sample threshold, three subsystems turn it into final,
curated flags:

- [`dilation`] grows sparse flags into contiguous contaminated regions, at
  fixed radii and at scales adapted to the size of the region being judged;
- [`morphology`] labels connected regions of the mask, classifies them by
  shape (line / broadband / blob) and declumps them with merge heuristics;
- [`selection`] aggregates one contamination ratio per baseline across a
  whole observation and marks baselines whose contamination is anomalous for
  their physical length.

The crate has no I/O, CLI or wire surface of its own; callers own the grids
and the scheduling. All grid kernels are synchronous and infallible, and
independent grids may be processed from parallel workers without
coordination. The one piece of shared state, [`selection::BaselineSelector`],
is internally mutex-guarded so workers can feed it concurrently.
 */

pub mod dilation;
pub mod mask;
pub(crate) mod math;
pub mod morphology;
pub mod selection;

// Re-exports.
pub use morphology::{Morphology, SegmentedImage};
pub use selection::{Baseline, BaselineSelector, SingleBaselineInfo};
