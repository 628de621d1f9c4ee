// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust-statistics helpers for the baseline fit.

#[cfg(test)]
mod tests;

/// Mean and population standard deviation of `values` after discarding the
/// `trim_fraction` smallest and `trim_fraction` largest entries.
///
/// Trimming makes the estimate resistant to the very outliers the caller is
/// trying to detect. Returns `None` for an empty input; `trim_fraction` must
/// be below 0.5 so at least one value always survives the trim.
pub(crate) fn trimmed_mean_and_std(values: &[f64], trim_fraction: f64) -> Option<(f64, f64)> {
    debug_assert!((0.0..0.5).contains(&trim_fraction));
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let trim = (sorted.len() as f64 * trim_fraction).floor() as usize;
    let kept = &sorted[trim..sorted.len() - trim];

    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    let variance = kept.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / kept.len() as f64;
    Some((mean, variance.sqrt()))
}

/// Gaussian kernel weight between two baseline lengths, evaluated in
/// log-length space: `exp(-(ln L - ln L0)^2 / (2 sigma^2))`.
///
/// Working in log space makes the kernel width scale-free; a 100 m and a
/// 110 m baseline are as close as a 1 km and an 1.1 km one.
pub(crate) fn log_gaussian_weight(length: f64, about_length: f64, sigma: f64) -> f64 {
    let d = length.ln() - about_length.ln();
    (-d * d / (2.0 * sigma * sigma)).exp()
}
