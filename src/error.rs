// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all hyperclean-related errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HyperCleanError {
    #[error("{0}")]
    Args(#[from] crate::args::ImagingArgsError),

    #[error("{0}")]
    Imaging(#[from] crate::params::ImagingError),

    #[error("{0}")]
    Gridding(#[from] crate::gridding::GriddingError),

    #[error("{0}")]
    Equation(#[from] crate::equation::EquationError),

    #[error("{0}")]
    Clean(#[from] crate::deconvolution::CleanError),

    #[error("{0}")]
    Fits(#[from] crate::io::fits::FitsError),

    #[error("{0}")]
    Vis(#[from] crate::vis::VisError),

    #[error("{0}")]
    Image(#[from] crate::image::ImageError),
}
