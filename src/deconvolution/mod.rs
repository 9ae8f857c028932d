// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multi-scale CLEAN deconvolution.
//!
//! [`MultiScaleCleaner`] runs the minor cycle on a single image plane, against
//! a fixed PSF. [`MfMsCleanImageSkyModel`] runs major cycles over any number
//! of fields, using a [`SkyEquation`](crate::equation::SkyEquation) to make
//! PSFs and residual images.

mod cleaner;
mod error;
mod psf;
mod scales;
mod sky_model;

pub use cleaner::{CleanControls, CleanResult, CleanStopReason, MultiScaleCleaner};
pub use error::CleanError;
pub use psf::{fit_gaussian_psf, gaussian_kernel, psf_sidelobe_level, CleanBeam};
pub use scales::default_scales;
pub use sky_model::{
    CleanSettings, FieldImages, MfMsCleanImageSkyModel, ResidualMode, SolveStopReason,
    SolveSummary,
};
