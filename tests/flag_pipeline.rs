// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Drive the whole flag-curation flow the way a pipeline does: parallel
//! workers consolidate and segment their own baseline's flags and feed the
//! shared selector, then a single search decides which baselines are beyond
//! saving.

use ndarray::prelude::*;
use rayon::prelude::*;

use rfi_flagger::mask::channel_occupancy;
use rfi_flagger::morphology::{BLOB_SEGMENT, BROADBAND_SEGMENT, LINE_SEGMENT};
use rfi_flagger::{dilation, Baseline, BaselineSelector, Morphology};

const NUM_CHANNELS: usize = 32;
const NUM_TIMESTEPS: usize = 64;

struct SimulatedBaseline {
    antenna1: usize,
    antenna2: usize,
    length: f64,
    contaminated: bool,
    /// Extra isolated flags, to give each baseline a slightly different
    /// contamination ratio.
    extras: usize,
}

/// One baseline's amplitude grid and raw (pre-consolidation) flags.
fn simulated_block(sim: &SimulatedBaseline) -> (Array2<f32>, Array2<bool>) {
    let mut amplitudes = Array2::from_elem((NUM_CHANNELS, NUM_TIMESTEPS), 1.0_f32);
    // A couple of correlator dropouts; these must not count towards any
    // contamination ratio.
    amplitudes[(0, 0)] = f32::NAN;
    amplitudes[(NUM_CHANNELS - 1, NUM_TIMESTEPS - 1)] = f32::INFINITY;

    let mut mask = Array2::from_elem((NUM_CHANNELS, NUM_TIMESTEPS), false);
    if sim.contaminated {
        // Wideband contamination over the lower part of the band.
        for y in 0..13 {
            for x in 0..NUM_TIMESTEPS {
                mask[(y, x)] = true;
            }
        }
    } else {
        // A transmitter in channel 5, caught on every other timestep.
        for x in (0..60).step_by(2) {
            mask[(5, x)] = true;
        }
        // Scattered lone detections in channel 15.
        for j in 0..sim.extras {
            mask[(15, 4 * j + 2)] = true;
        }
    }
    (amplitudes, mask)
}

#[test]
fn test_flag_pipeline_marks_the_contaminated_baseline() {
    let sims: Vec<SimulatedBaseline> = (0..8)
        .map(|i| SimulatedBaseline {
            antenna1: i,
            antenna2: i + 1,
            length: 10.0 * f64::powi(2.0, i as i32),
            contaminated: i == 4,
            extras: i % 4,
        })
        .collect();

    let selector = BaselineSelector::new();
    let morphology = Morphology::new();

    sims.par_iter().for_each(|sim| {
        let (amplitudes, mut mask) = simulated_block(sim);

        // Consolidate the raw flags.
        dilation::density_time_flagger(&mut mask, 0.5);
        dilation::dilate_flags_horizontally(&mut mask, 1);

        // The transmitter channel must now be solidly flagged.
        if !sim.contaminated {
            let occupancy = channel_occupancy(mask.view());
            assert!(
                occupancy[5] > 0.8,
                "consolidation left channel 5 at occupancy {}",
                occupancy[5]
            );
        }

        // Segment and classify what was found.
        let mut segmented = morphology.segment_by_max_length(mask.view());
        morphology.cluster(&mut segmented);
        morphology.remove_small_segments(&mut segmented, 1);
        morphology.classify(&mut segmented);
        let classes = segmented.distinct_segments();
        assert!(!classes.is_empty());
        assert!(classes
            .iter()
            .all(|&id| [BROADBAND_SEGMENT, LINE_SEGMENT, BLOB_SEGMENT].contains(&id)));

        // Register the baseline's overall contamination.
        let baseline = Baseline {
            antenna1: sim.antenna1,
            antenna2: sim.antenna2,
            antenna1_name: format!("Tile{:03}", sim.antenna1),
            antenna2_name: format!("Tile{:03}", sim.antenna2),
            length: sim.length,
        };
        selector
            .add(baseline, amplitudes.view(), mask.view())
            .unwrap();
    });

    // All workers have finished; the observation-level decision runs once.
    assert_eq!(selector.len(), 8);
    let marked = selector.search();
    assert!(
        marked
            .iter()
            .any(|info| info.baseline.antenna1 == 4 && info.baseline.antenna2 == 5),
        "the contaminated baseline was not marked"
    );
    for info in &marked {
        assert!(info.total_count < (NUM_CHANNELS * NUM_TIMESTEPS) as u64);
    }
}
