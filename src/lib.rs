// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
W-projection imaging and multi-scale CLEAN deconvolution for radio
interferometers.
 */

pub mod args;
pub mod constants;
pub mod deconvolution;
pub mod equation;
mod error;
pub mod gridding;
pub mod image;
pub mod io;
pub(crate) mod math;
pub mod model;
pub mod params;
pub(crate) mod printers;
pub(crate) mod unit_parsing;
pub mod vis;

#[cfg(test)]
mod tests;

// Re-exports.
pub use args::{ImagingArgs, ImagingArgsError};
pub use deconvolution::{
    CleanBeam, CleanSettings, FieldImages, MfMsCleanImageSkyModel, ResidualMode, SolveStopReason,
    SolveSummary,
};
pub use equation::{SkyEquation, VisSkyEquation};
pub use error::HyperCleanError;
pub use gridding::{FtMachine, WOnlyProjectFt, WProjectionSettings};
pub use image::{Correlation, ImageGeometry, ImagePol};
pub use params::{ImagingParams, ImagingProducts};
pub use printers::display_warnings;
pub use vis::{VisBuffer, VisColumn};
pub use unit_parsing::UnitParseError;

// External re-exports.
pub use marlu;
pub use ndarray;
