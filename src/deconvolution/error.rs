// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with deconvolution.

use thiserror::Error;

use crate::equation::EquationError;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("No usable CLEAN scales were supplied")]
    NoScales,

    #[error("Images to CLEAN must have even dimensions; got {0:?}")]
    OddShape((usize, usize)),

    #[error("Scale sizes must be non-negative; got {0} pixels")]
    NegativeScale(f64),

    #[error("The PSF has shape {psf:?}, but the image has shape {image:?}")]
    ShapeMismatch {
        psf: (usize, usize),
        image: (usize, usize),
    },

    #[error("The PSF peak ({0}) isn't positive")]
    PsfNotPositive(f64),

    #[error("The PSF convolved with scale {scale} pixels peaks at {peak}, which isn't positive")]
    ScalePsfNotPositive { scale: f64, peak: f64 },

    #[error("An image to clean must be set before cleaning")]
    NoDirtyImage,

    #[error("The CLEAN gain must be in (0, 1]; got {0}")]
    BadGain(f64),

    #[error("Couldn't fit a Gaussian to the PSF main lobe: {0}")]
    PsfFit(&'static str),

    #[error("The sky model must be solved before it can be restored")]
    NotSolved,

    #[error("Field {field} has images of shape {got:?}, but its geometry needs {expected:?}")]
    FieldShape {
        field: usize,
        expected: (usize, usize, usize, usize),
        got: (usize, usize, usize, usize),
    },

    #[error("The sky equation has {equation} fields, but the sky model has {model}")]
    FieldCount { equation: usize, model: usize },

    #[error(transparent)]
    Equation(#[from] EquationError),
}
