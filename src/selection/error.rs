// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Flag mask dimensions {mask_dim:?} don't match amplitude grid dimensions {amplitude_dim:?}")]
    MismatchedDimensions {
        mask_dim: (usize, usize),
        amplitude_dim: (usize, usize),
    },
}
