// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with parsing imaging arguments.

use std::path::PathBuf;

use thiserror::Error;

use crate::{io::fits::FitsError, unit_parsing::UnitParseError};

#[derive(Error, Debug)]
pub enum ImagingArgsError {
    #[error("{0}")]
    ArgFile(String),

    #[error("The image size must be specified")]
    NoImageSize,

    #[error("The image size must be one or two numbers, e.g. [256] or [256, 128]; got {0:?}")]
    BadImageSize(Vec<usize>),

    #[error("The image cell size must be specified")]
    NoCellSize,

    #[error("Couldn't parse the {arg}: {err}")]
    Unit {
        arg: &'static str,
        err: UnitParseError,
    },

    #[error("The {arg} must be [RA, Dec] in degrees; got {got:?}")]
    BadRaDec { arg: &'static str, got: Vec<f64> },

    #[error("Unrecognised image polarisation '{0}'")]
    UnknownPol(String),

    #[error("At least one image polarisation must be specified")]
    NoPols,

    #[error("Unrecognised spectral mode '{got}'; supported modes: {supported}")]
    UnknownSpectralMode { got: String, supported: String },

    #[error("The number of W planes must be at least 1")]
    ZeroWPlanes,

    #[error("The convolution function oversampling must be at least 1")]
    ZeroConvSampling,

    #[error("The padding factor must be at least 1; got {0}")]
    BadPadding(f64),

    #[error("The maximum W must be positive; got {0} wavelengths")]
    BadMaxW(f64),

    #[error("Unrecognised primary beam type '{got}'; supported types: {supported}")]
    UnknownBeamType { got: String, supported: String },

    #[error("A {beam} primary beam needs the {arg} argument")]
    MissingBeamArg {
        beam: &'static str,
        arg: &'static str,
    },

    #[error("The {arg} must be positive; got {value}")]
    NotPositive { arg: &'static str, value: f64 },

    #[error("CLEAN scale sizes can't be negative; got {0}")]
    NegativeScale(f64),

    #[error("The CLEAN gain must be in (0, 1]; got {0}")]
    BadGain(f64),

    #[error("The CLEAN threshold can't be negative; got {0} Jy")]
    NegativeThreshold(f64),

    #[error("The cycle max PSF fraction must be in (0, 1]; got {0}")]
    BadCycleMaxPsfFraction(f64),

    #[error("Unrecognised residual mode '{got}'; supported modes: {supported}")]
    UnknownResidualMode { got: String, supported: String },

    #[error("The maximum number of major cycles must be at least 1")]
    ZeroMajorCycles,

    #[error("Unrecognised output image '{got}'; supported outputs: {supported}")]
    UnknownOutput { got: String, supported: String },

    #[error("The '{0}' output needs a primary beam")]
    OutputNeedsBeam(String),

    #[error("The primary beam limit must be in (0, 1); got {0}")]
    BadPbLimit(f64),

    #[error("The {arg} image {file} has {got:?} pixels, but the image has {expected:?}")]
    ImageShape {
        arg: &'static str,
        file: PathBuf,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
