// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_trimmed_mean_and_std() {
    assert!(trimmed_mean_and_std(&[], 0.25).is_none());

    // A single value survives its own trim.
    let (mean, std) = trimmed_mean_and_std(&[3.0], 0.25).unwrap();
    assert_abs_diff_eq!(mean, 3.0);
    assert_abs_diff_eq!(std, 0.0);

    // With 25% trimmed from each end of 8 values, the 2 extremes on each
    // side are discarded; an enormous outlier leaves no trace.
    let values = [1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 3.0, 1e9];
    let (mean, std) = trimmed_mean_and_std(&values, 0.25).unwrap();
    assert_abs_diff_eq!(mean, 2.0);
    assert_abs_diff_eq!(std, 0.0);

    // Untrimmed, the same input is dominated by the outlier.
    let (mean, _) = trimmed_mean_and_std(&values, 0.0).unwrap();
    assert!(mean > 1e8);
}

#[test]
fn test_trimmed_std_of_spread_values() {
    // Middle half of [0, 1, 2, 3] is [1, 2]: mean 1.5, population std 0.5.
    let (mean, std) = trimmed_mean_and_std(&[0.0, 1.0, 2.0, 3.0], 0.25).unwrap();
    assert_abs_diff_eq!(mean, 1.5);
    assert_abs_diff_eq!(std, 0.5);
}

#[test]
fn test_log_gaussian_weight() {
    // Self-weight is always 1, regardless of scale.
    assert_abs_diff_eq!(log_gaussian_weight(100.0, 100.0, 0.6), 1.0);
    assert_abs_diff_eq!(log_gaussian_weight(5000.0, 5000.0, 0.6), 1.0);

    // Scale-free: equal length *ratios* give equal weights.
    let w_short = log_gaussian_weight(110.0, 100.0, 0.6);
    let w_long = log_gaussian_weight(1100.0, 1000.0, 0.6);
    assert_abs_diff_eq!(w_short, w_long, epsilon = 1e-12);

    // One sigma in log space.
    let w = log_gaussian_weight((1.0f64).exp(), 1.0, 1.0);
    assert_abs_diff_eq!(w, (-0.5f64).exp(), epsilon = 1e-12);

    // Weights fall off monotonically with separation.
    assert!(log_gaussian_weight(200.0, 100.0, 0.6) > log_gaussian_weight(400.0, 100.0, 0.6));
}
