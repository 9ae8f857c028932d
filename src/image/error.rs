// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::ImagePol;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image axes must have an even number of pixels; got {0}")]
    OddSize(usize),

    #[error("Image axis of {size} pixels is too small; at least {min} are required")]
    TooSmall { size: usize, min: usize },

    #[error("Image cell sizes must be positive; got {cell_x} and {cell_y} radians")]
    BadCellSize { cell_x: f64, cell_y: f64 },

    #[error("Multi-channel images need a positive channel width; got {0} Hz")]
    BadChanWidth(f64),

    #[error("Image polarisation {0} was specified more than once")]
    DuplicatePol(ImagePol),

    #[error("Expected an image of shape {expected:?}, but got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize, usize),
        got: (usize, usize, usize, usize),
    },
}
