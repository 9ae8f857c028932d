// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with gridding and degridding.

use thiserror::Error;

use crate::{image::ImageError, vis::VisError};

#[derive(Error, Debug)]
pub enum ConvFuncError {
    #[error("At least one W plane is required")]
    NoWPlanes,

    #[error("The convolution function oversampling must be at least 1")]
    BadSampling,

    #[error("The maximum w must be positive when using W projection; got {0} wavelengths")]
    BadMaxW(f64),

    #[error("A {nx}x{ny} uv grid is too small for convolution functions with oversampling {sampling}")]
    GridTooSmall {
        nx: usize,
        ny: usize,
        sampling: usize,
    },

    #[error("The convolution function is zero everywhere")]
    ZeroKernel,

    #[error("The W = 0 convolution function has no support")]
    ZeroSupport,

    #[error("The W = 0 convolution function sums to {0}, which can't be normalised")]
    NonPositiveSum(f64),
}

#[derive(Error, Debug)]
pub enum GriddingError {
    #[error("Image padding must be at least 1; got {0}")]
    BadPadding(f64),

    #[error("The FT machine must be initialised for {expected} before {operation}")]
    WrongState {
        expected: &'static str,
        operation: &'static str,
    },

    #[error("None of the {0} visibility correlations can be gridded into the image polarisations")]
    NoPolarisationOverlap(usize),

    #[error(transparent)]
    ConvFunc(#[from] ConvFuncError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Vis(#[from] VisError),
}
