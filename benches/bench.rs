// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::*;
use ndarray::Array2;

use rfi_flagger::{dilation, Morphology};

/// A deterministic speckle mask, about 6% flagged.
fn speckle_mask(channels: usize, timesteps: usize) -> Array2<bool> {
    let mut mask = Array2::from_elem((channels, timesteps), false);
    for ((y, x), flag) in mask.indexed_iter_mut() {
        if (y * 37 + x) % 17 == 0 {
            *flag = true;
        }
    }
    mask
}

fn flagging_kernels(c: &mut Criterion) {
    let mask = speckle_mask(256, 512);

    c.bench_function("density time flagger 256x512", |b| {
        b.iter(|| {
            let mut m = mask.clone();
            dilation::density_time_flagger(&mut m, 0.4);
            m
        })
    });

    let morphology = Morphology::new();
    c.bench_function("segment by max length 256x512", |b| {
        b.iter(|| morphology.segment_by_max_length(mask.view()))
    });
}

criterion_group!(benches, flagging_kernels);
criterion_main!(benches);
