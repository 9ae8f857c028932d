// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. Gridding and deconvolution should do
as many calculations as possible in double precision before converting to a
lower precision, if it is ever required.
 */

pub use std::f64::consts::{FRAC_PI_2, LN_2, PI, TAU};

pub use marlu::constants::VEL_C;

/// The default amount of padding applied to each image axis before gridding.
pub const DEFAULT_PADDING: f64 = 1.2;

/// The default number of W planes. A single plane disables W projection.
pub const DEFAULT_NUM_W_PLANES: usize = 16;

/// The default oversampling factor of convolution functions.
pub const DEFAULT_CONV_SAMPLING: usize = 4;

/// Convolution functions are never computed on grids larger than this.
pub const MAX_CONV_SIZE: usize = 1024;

/// Convolution function values below this fraction of the peak are outside
/// the support.
pub const CONV_SUPPORT_CUTOFF: f64 = 1e-3;

/// The default maximum number of CLEAN components (over all major cycles).
pub const DEFAULT_NITER: usize = 1000;

/// The default CLEAN loop gain.
pub const DEFAULT_GAIN: f64 = 0.1;

/// The default global CLEAN threshold \[Jy\].
pub const DEFAULT_THRESHOLD: f64 = 0.0;

/// The default multiplier of the maximum PSF sidelobe used to derive the
/// threshold of each major cycle.
pub const DEFAULT_CYCLE_FACTOR: f64 = 1.5;

/// The fraction of the peak residual never exceeded by a cycle threshold.
pub const DEFAULT_CYCLE_MAX_PSF_FRACTION: f64 = 0.8;

/// The default bias against large scales.
pub const DEFAULT_SMALL_SCALE_BIAS: f64 = 0.6;

/// The default number of consecutive point-scale components that retires a
/// plane. 0 disables the check.
pub const DEFAULT_STOP_POINT_MODE: usize = 0;

/// The default maximum number of major cycles.
pub const DEFAULT_MAX_MAJOR_CYCLES: usize = 20;

/// The default scale sizes \[pixels\].
pub const DEFAULT_SCALES: [f64; 3] = [0.0, 3.0, 10.0];

/// A minor cycle is deemed to have diverged when its optimum component grows
/// beyond this multiple of the first component.
pub const MINOR_CYCLE_DIVERGENCE_FACTOR: f64 = 10.0;

/// A major cycle is deemed to have diverged when the peak residual is more
/// than this many times the previous peak.
pub const MAJOR_CYCLE_DIVERGENCE_FACTOR: f64 = 10.0;

/// A peak residual more than this many times the previous one only warrants
/// a warning.
pub const MAJOR_CYCLE_WARNING_FACTOR: f64 = 2.0;

/// Pixels of the PSF main lobe used when fitting the clean beam must be above
/// this fraction of the peak.
pub const PSF_FIT_CUTOFF: f64 = 0.35;

/// The default primary-beam level below which corrected images are blanked.
pub const DEFAULT_PB_LIMIT: f64 = 0.05;

/// The conversion factor between a Gaussian's standard deviation and its full
/// width at half maximum.
pub const FWHM_FACTOR: f64 = 2.354_820_045_030_949_3;

/// The first zero of the Bessel function J1 divided by pi, used for Airy
/// disks.
pub const AIRY_FIRST_NULL: f64 = 1.219_669_891_266_504_5;

/// The default growth factor of scale sizes when only the number of scales is
/// given \[pixels\].
pub const DEFAULT_SCALE_INCREMENT: f64 = 3.0;

/// Output images are written as `<prefix>_<product>.fits`.
pub const DEFAULT_OUTPUT_PREFIX: &str = "hyperclean";
