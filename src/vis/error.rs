// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisError {
    #[error("Got {uvws} UVWs, but {antenna1} antenna1 values and {antenna2} antenna2 values")]
    RowCountMismatch {
        uvws: usize,
        antenna1: usize,
        antenna2: usize,
    },

    #[error("Visibility frequencies must be positive; got {0} Hz")]
    BadFreq(f64),

    #[error("At least 2 tiles are needed to form baselines; got {0}")]
    TooFewTiles(usize),

    #[error("The {name} cube has shape {got:?}, but {expected:?} was expected")]
    CubeShape {
        name: &'static str,
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("{name} has {got} elements, but there are {expected} rows")]
    RowArrayLength {
        name: &'static str,
        expected: usize,
        got: usize,
    },
}
