// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use ndarray::prelude::*;

use super::*;

fn baseline(antenna1: usize, antenna2: usize, length: f64) -> Baseline {
    Baseline {
        antenna1,
        antenna2,
        antenna1_name: format!("Tile{antenna1:03}"),
        antenna2_name: format!("Tile{antenna2:03}"),
        length,
    }
}

#[test]
fn test_add_accumulates_per_antenna_pair() {
    let selector = BaselineSelector::new();
    selector.add_counts(baseline(0, 1, 100.0), 10, 1000);
    selector.add_counts(baseline(0, 2, 150.0), 20, 1000);
    selector.add_counts(baseline(0, 1, 100.0), 5, 500);

    assert_eq!(selector.len(), 2);
    let infos = selector.baselines.lock().unwrap();
    let first = infos
        .iter()
        .find(|info| info.baseline.antenna2 == 1)
        .unwrap();
    assert_eq!(first.rfi_count, 15);
    assert_eq!(first.total_count, 1500);
}

#[test]
fn test_add_rejects_mismatched_dimensions() {
    let selector = BaselineSelector::new();
    let amplitudes = Array2::<f32>::zeros((4, 6));
    let mask = Array2::from_elem((4, 5), false);
    let result = selector.add(baseline(0, 1, 100.0), amplitudes.view(), mask.view());
    assert!(matches!(
        result,
        Err(SelectionError::MismatchedDimensions { .. })
    ));
    assert!(selector.is_empty());
}

#[test]
fn test_add_skips_non_finite_amplitudes() {
    let selector = BaselineSelector::new();
    let mut amplitudes = Array2::from_elem((2, 2), 1.0_f64);
    amplitudes[(0, 0)] = f64::NAN;
    let mut mask = Array2::from_elem((2, 2), false);
    mask[(0, 0)] = true;
    mask[(0, 1)] = true;

    selector
        .add(baseline(3, 4, 120.0), amplitudes.view(), mask.view())
        .unwrap();
    let infos = selector.baselines.lock().unwrap();
    assert_eq!(infos[0].rfi_count, 1);
    assert_eq!(infos[0].total_count, 3);
}

#[test]
fn test_search_on_empty_selector() {
    let selector = BaselineSelector::new();
    assert!(selector.search().is_empty());
}

#[test]
fn test_search_marks_the_anomalous_baseline() {
    // Five baselines of increasing length; the fourth is an order of
    // magnitude more contaminated than its neighbours.
    let selector = BaselineSelector::new().with_threshold(2.0);
    selector.add_counts(baseline(0, 1, 10.0), 99, 10000);
    selector.add_counts(baseline(0, 2, 20.0), 101, 10000);
    selector.add_counts(baseline(1, 2, 40.0), 100, 10000);
    selector.add_counts(baseline(1, 3, 80.0), 5000, 10000);
    selector.add_counts(baseline(2, 3, 160.0), 100, 10000);

    let marked = selector.search();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0].baseline.antenna1, 1);
    assert_eq!(marked[0].baseline.antenna2, 3);
}

#[test]
fn test_search_is_a_fixed_point() {
    let selector = BaselineSelector::new().with_threshold(2.0);
    selector.add_counts(baseline(0, 1, 10.0), 99, 10000);
    selector.add_counts(baseline(0, 2, 20.0), 101, 10000);
    selector.add_counts(baseline(1, 2, 40.0), 100, 10000);
    selector.add_counts(baseline(1, 3, 80.0), 5000, 10000);
    selector.add_counts(baseline(2, 3, 160.0), 100, 10000);

    let first: Vec<(usize, usize)> = selector
        .search()
        .iter()
        .map(|info| (info.baseline.antenna1, info.baseline.antenna2))
        .collect();
    let second: Vec<(usize, usize)> = selector
        .search()
        .iter()
        .map(|info| (info.baseline.antenna1, info.baseline.antenna2))
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_search_hard_rejections() {
    let selector = BaselineSelector::new();
    // Over the absolute ratio threshold.
    selector.add_counts(baseline(0, 1, 70.0), 950, 1000);
    // Suspiciously perfect: plenty of samples, not one flag.
    selector.add_counts(baseline(0, 2, 130.0), 0, 3000);
    // Unremarkable baselines.
    selector.add_counts(baseline(1, 2, 50.0), 10, 1000);
    selector.add_counts(baseline(1, 3, 100.0), 12, 1000);
    selector.add_counts(baseline(2, 3, 200.0), 11, 1000);

    let marked = selector.search();
    let mut pairs: Vec<(usize, usize)> = marked
        .iter()
        .map(|info| (info.baseline.antenna1, info.baseline.antenna2))
        .collect();
    pairs.sort_unstable();
    assert_eq!(pairs, &[(0, 1), (0, 2)]);
}

#[test]
fn test_search_tolerates_few_flagless_samples() {
    // A flag-free baseline with too few samples to be suspicious.
    let selector = BaselineSelector::new();
    selector.add_counts(baseline(0, 1, 50.0), 0, 2000);
    selector.add_counts(baseline(0, 2, 100.0), 2, 2000);
    selector.add_counts(baseline(1, 2, 200.0), 1, 2000);

    assert!(selector.search().is_empty());
}

#[test]
fn test_search_ignores_autocorrelations() {
    let selector = BaselineSelector::new();
    // An auto-correlation, fully contaminated.
    selector.add_counts(baseline(5, 5, 0.0), 1000, 1000);
    assert!(selector.search().is_empty());

    selector.add_counts(baseline(0, 1, 50.0), 10, 1000);
    selector.add_counts(baseline(0, 2, 100.0), 11, 1000);
    let marked = selector.search();
    assert!(marked
        .iter()
        .all(|info| info.baseline.antenna1 != info.baseline.antenna2));
}

#[test]
fn test_concurrent_adds() {
    let selector = BaselineSelector::new();
    std::thread::scope(|scope| {
        for antenna1 in 0..4 {
            let selector = &selector;
            scope.spawn(move || {
                for antenna2 in (antenna1 + 1)..4 {
                    let length = 10.0 * (antenna1 + antenna2) as f64;
                    selector.add_counts(baseline(antenna1, antenna2, length), 10, 1000);
                    selector.add_counts(baseline(antenna1, antenna2, length), 10, 1000);
                }
            });
        }
    });

    assert_eq!(selector.len(), 6);
    let infos = selector.baselines.lock().unwrap();
    assert!(infos
        .iter()
        .all(|info| info.rfi_count == 20 && info.total_count == 2000));
}

#[test]
fn test_imply_stations() {
    let bad = |a1: usize, a2: usize| SingleBaselineInfo {
        baseline: baseline(a1, a2, 100.0),
        rfi_count: 900,
        total_count: 1000,
    };
    let marked = vec![bad(1, 5), bad(2, 5), bad(3, 5), bad(2, 7)];

    // Antenna 5 features in 3 of the 4 marked baselines.
    assert_eq!(imply_stations(&marked, 0.5), &[5]);
    assert!(imply_stations(&marked, 0.9).is_empty());
    assert!(imply_stations(&[], 0.5).is_empty());
}
