// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! User-facing imaging arguments.
//!
//! Everything here is unparsed; [`ImagingArgs::parse`] checks it and turns it
//! into [`ImagingParams`] that are ready to be used directly. All arguments may
//! also be given in a toml or json file; explicitly-set arguments override
//! those set in the file.

mod error;
#[cfg(test)]
mod tests;

pub use error::ImagingArgsError;

use std::{path::PathBuf, str::FromStr, sync::Arc};

use itertools::Itertools;
use log::debug;
use marlu::RADec;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use crate::{
    constants::*,
    deconvolution::{default_scales, CleanSettings, ResidualMode},
    gridding::{AiryBeam, GaussianBeam, PrimaryBeam, WProjectionSettings},
    image::ImagePol,
    io::fits::read_image,
    params::{ImageProduct, ImagingParams, SpectralMode},
    printers::{display_warnings, Warn},
    unit_parsing::{parse_angle, parse_flux_density, AngleFormat},
};

lazy_static::lazy_static! {
    static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    static ref SPECTRAL_MODES_COMMA_SEPARATED: String = SpectralMode::iter().join(", ");

    static ref BEAM_TYPES_COMMA_SEPARATED: String = BeamType::iter().join(", ");

    static ref RESIDUAL_MODES_COMMA_SEPARATED: String = ResidualMode::iter().join(", ");

    static ref OUTPUTS_COMMA_SEPARATED: String = ImageProduct::iter().join(", ");
}

#[derive(Debug, Display, EnumIter, EnumString)]
enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
enum BeamType {
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "gaussian")]
    Gaussian,
    #[strum(serialize = "airy")]
    Airy,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(ImagingArgsError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(ImagingArgsError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(ImagingArgsError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}",
                    $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED
                )))
            }
        }
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingArgs {
    /// A toml or json file containing any of these arguments.
    #[serde(skip)]
    pub args_file: Option<PathBuf>,

    #[serde(rename = "image")]
    pub image_args: ImageArgs,

    #[serde(rename = "gridding")]
    pub gridding_args: GriddingArgs,

    #[serde(rename = "deconvolution")]
    pub deconvolution_args: DeconvolutionArgs,

    #[serde(rename = "output")]
    pub output_args: OutputArgs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageArgs {
    /// The number of pixels on each side of the image. One number makes a
    /// square image; two are [x, y].
    pub size: Option<Vec<usize>>,

    /// The size of a pixel. Without a unit, arcseconds are assumed. One value
    /// applies to both axes.
    pub cell: Option<String>,

    /// The image centre [RA, Dec] in degrees. Default: the phase centre of the
    /// visibilities.
    pub phase_centre: Option<Vec<f64>>,

    /// The polarisations to image. Default: I.
    pub pols: Option<Vec<String>>,

    /// "mfs" or "cube". Default: mfs.
    pub spectral_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GriddingArgs {
    pub num_w_planes: Option<usize>,

    pub conv_sampling: Option<usize>,

    pub padding: Option<f64>,

    /// \[wavelengths\]
    pub max_w: Option<f64>,

    pub use_autos: bool,

    /// "none", "gaussian" or "airy". Default: none.
    pub beam_type: Option<String>,

    /// The full width at half maximum of a Gaussian beam. Without a unit,
    /// degrees are assumed.
    pub beam_fwhm: Option<String>,

    /// The frequency at which the Gaussian beam FWHM applies \[Hz\].
    pub beam_ref_freq: Option<f64>,

    /// The dish diameter of an Airy beam \[metres\].
    pub dish_diameter: Option<f64>,

    /// Where the primary beam points [RA, Dec] in degrees. Default: the image
    /// centre.
    pub pointing_centre: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionArgs {
    /// Scale sizes in pixels.
    pub scales: Option<Vec<f64>>,

    /// Generate this many scales rather than listing them.
    pub num_scales: Option<usize>,

    /// The size of the first generated scale \[pixels\].
    pub scale_increment: Option<f64>,

    pub niter: Option<usize>,

    pub gain: Option<f64>,

    /// Without a unit, Jy is assumed.
    pub threshold: Option<String>,

    pub cycle_factor: Option<f64>,

    pub cycle_max_psf_fraction: Option<f64>,

    pub small_scale_bias: Option<f64>,

    pub stop_large_scale_negative: bool,

    pub stop_point_mode: Option<usize>,

    /// "visibility" or "xfr". Default: visibility.
    pub residual_mode: Option<String>,

    pub max_major_cycles: Option<usize>,

    /// A FITS image; pixels above 0.5 may be cleaned. Only the first plane is
    /// used.
    pub mask: Option<PathBuf>,

    /// A FITS image to start deconvolving from.
    pub start_model: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputArgs {
    /// Images are written to `<prefix>_<product>.fits`.
    pub output_prefix: Option<PathBuf>,

    /// Which images to write. If only the prefix is given, the model,
    /// residual, PSF and restored images are written, plus the primary beam
    /// images when there's a beam.
    pub outputs: Option<Vec<String>>,

    pub pb_limit: Option<f64>,

    pub no_progress_bars: bool,
}

impl ImageArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            size: self.size.or(other.size),
            cell: self.cell.or(other.cell),
            phase_centre: self.phase_centre.or(other.phase_centre),
            pols: self.pols.or(other.pols),
            spectral_mode: self.spectral_mode.or(other.spectral_mode),
        }
    }
}

impl GriddingArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            num_w_planes: self.num_w_planes.or(other.num_w_planes),
            conv_sampling: self.conv_sampling.or(other.conv_sampling),
            padding: self.padding.or(other.padding),
            max_w: self.max_w.or(other.max_w),
            use_autos: self.use_autos || other.use_autos,
            beam_type: self.beam_type.or(other.beam_type),
            beam_fwhm: self.beam_fwhm.or(other.beam_fwhm),
            beam_ref_freq: self.beam_ref_freq.or(other.beam_ref_freq),
            dish_diameter: self.dish_diameter.or(other.dish_diameter),
            pointing_centre: self.pointing_centre.or(other.pointing_centre),
        }
    }
}

impl DeconvolutionArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            scales: self.scales.or(other.scales),
            num_scales: self.num_scales.or(other.num_scales),
            scale_increment: self.scale_increment.or(other.scale_increment),
            niter: self.niter.or(other.niter),
            gain: self.gain.or(other.gain),
            threshold: self.threshold.or(other.threshold),
            cycle_factor: self.cycle_factor.or(other.cycle_factor),
            cycle_max_psf_fraction: self
                .cycle_max_psf_fraction
                .or(other.cycle_max_psf_fraction),
            small_scale_bias: self.small_scale_bias.or(other.small_scale_bias),
            stop_large_scale_negative: self.stop_large_scale_negative
                || other.stop_large_scale_negative,
            stop_point_mode: self.stop_point_mode.or(other.stop_point_mode),
            residual_mode: self.residual_mode.or(other.residual_mode),
            max_major_cycles: self.max_major_cycles.or(other.max_major_cycles),
            mask: self.mask.or(other.mask),
            start_model: self.start_model.or(other.start_model),
        }
    }
}

impl OutputArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            output_prefix: self.output_prefix.or(other.output_prefix),
            outputs: self.outputs.or(other.outputs),
            pb_limit: self.pb_limit.or(other.pb_limit),
            no_progress_bars: self.no_progress_bars || other.no_progress_bars,
        }
    }
}

fn parse_radec(arg: &'static str, v: Vec<f64>) -> Result<RADec, ImagingArgsError> {
    match v.as_slice() {
        [ra, dec] if (-90.0..=90.0).contains(dec) => Ok(RADec::from_degrees(*ra, *dec)),
        _ => Err(ImagingArgsError::BadRaDec { arg, got: v }),
    }
}

fn check_positive(arg: &'static str, value: f64) -> Result<f64, ImagingArgsError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ImagingArgsError::NotPositive { arg, value })
    }
}

impl ImagingArgs {
    /// If an argument file was given, read it and fill in everything that
    /// wasn't set explicitly.
    pub fn merge(self) -> Result<ImagingArgs, ImagingArgsError> {
        debug!("Merging explicit arguments with the argument file");

        let explicit_args = self;

        if let Some(arg_file) = explicit_args.args_file {
            // Ensure all of the file args are accounted for by pattern
            // matching.
            let ImagingArgs {
                args_file: _,
                image_args,
                gridding_args,
                deconvolution_args,
                output_args,
            } = unpack_arg_file!(arg_file);

            Ok(ImagingArgs {
                args_file: None,
                image_args: explicit_args.image_args.merge(image_args),
                gridding_args: explicit_args.gridding_args.merge(gridding_args),
                deconvolution_args: explicit_args.deconvolution_args.merge(deconvolution_args),
                output_args: explicit_args.output_args.merge(output_args),
            })
        } else {
            Ok(explicit_args)
        }
    }

    /// Parse the arguments into parameters ready for imaging. Any argument
    /// file should already have been merged in.
    pub fn parse(self) -> Result<ImagingParams, ImagingArgsError> {
        debug!("{:#?}", self);

        let ImagingArgs {
            args_file: _,
            image_args,
            gridding_args,
            deconvolution_args,
            output_args,
        } = self;

        let (nx, ny, cell_x, cell_y, phase_centre, pols, spectral_mode) = image_args.parse()?;
        let (w_projection, beam, pointing_centre) = gridding_args.parse()?;
        let (clean, mask_file, start_model_file) = deconvolution_args.parse()?;

        let mask = match mask_file {
            Some(file) => {
                let image = read_image(&file)?;
                let (_, _, got_ny, got_nx) = image.dim();
                if (got_ny, got_nx) != (ny, nx) {
                    return Err(ImagingArgsError::ImageShape {
                        arg: "mask",
                        file,
                        expected: (ny, nx),
                        got: (got_ny, got_nx),
                    });
                }
                Some(image.slice(s![0, 0, .., ..]).to_owned())
            }
            None => None,
        };
        let start_model = match start_model_file {
            Some(file) => {
                let image = read_image(&file)?;
                let (_, _, got_ny, got_nx) = image.dim();
                if (got_ny, got_nx) != (ny, nx) {
                    return Err(ImagingArgsError::ImageShape {
                        arg: "starting model",
                        file,
                        expected: (ny, nx),
                        got: (got_ny, got_nx),
                    });
                }
                Some(image)
            }
            None => None,
        };

        let OutputArgs {
            output_prefix,
            outputs,
            pb_limit,
            no_progress_bars,
        } = output_args;
        let outputs = match outputs {
            Some(outputs) => outputs
                .into_iter()
                .map(|o| {
                    ImageProduct::from_str(&o.to_lowercase()).map_err(|_| {
                        ImagingArgsError::UnknownOutput {
                            got: o,
                            supported: OUTPUTS_COMMA_SEPARATED.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None if output_prefix.is_some() => ImageProduct::iter()
                .filter(|p| beam.is_some() || !p.needs_beam())
                .collect(),
            None => vec![],
        };
        if beam.is_none() {
            if let Some(p) = outputs.iter().find(|p| p.needs_beam()) {
                return Err(ImagingArgsError::OutputNeedsBeam(p.to_string()));
            }
        }
        let output_prefix = match output_prefix {
            Some(p) => Some(p),
            None if !outputs.is_empty() => Some(PathBuf::from(DEFAULT_OUTPUT_PREFIX)),
            None => None,
        };
        let pb_limit = pb_limit.unwrap_or(DEFAULT_PB_LIMIT);
        if !(pb_limit > 0.0 && pb_limit < 1.0) {
            return Err(ImagingArgsError::BadPbLimit(pb_limit));
        }

        let largest_scale = clean.scales.iter().copied().fold(0.0, f64::max);
        if 2.0 * largest_scale >= nx.min(ny) as f64 {
            format!(
                "The largest CLEAN scale ({largest_scale} pixels) is at least half the image size"
            )
            .warn();
        }

        display_warnings();

        Ok(ImagingParams {
            nx,
            ny,
            cell_x,
            cell_y,
            phase_centre,
            pols,
            spectral_mode,
            w_projection,
            beam,
            pointing_centre,
            clean,
            mask,
            start_model,
            output_prefix,
            outputs,
            pb_limit,
            draw_progress_bars: !no_progress_bars,
        })
    }
}

type ImageParts = (
    usize,
    usize,
    f64,
    f64,
    Option<RADec>,
    Vec1<ImagePol>,
    SpectralMode,
);

impl ImageArgs {
    fn parse(self) -> Result<ImageParts, ImagingArgsError> {
        let ImageArgs {
            size,
            cell,
            phase_centre,
            pols,
            spectral_mode,
        } = self;

        let (nx, ny) = match size.as_deref() {
            None => return Err(ImagingArgsError::NoImageSize),
            Some(&[n]) => (n, n),
            Some(&[nx, ny]) => (nx, ny),
            Some(other) => return Err(ImagingArgsError::BadImageSize(other.to_vec())),
        };

        let cell = cell.ok_or(ImagingArgsError::NoCellSize)?;
        let cell = parse_angle(&cell, AngleFormat::arcsec)
            .map_err(|err| ImagingArgsError::Unit { arg: "cell size", err })?;

        let phase_centre = phase_centre
            .map(|v| parse_radec("phase centre", v))
            .transpose()?;

        let pols = match pols {
            None => vec![ImagePol::I],
            Some(pols) => pols
                .into_iter()
                .map(|p| {
                    ImagePol::from_str(&p.to_uppercase())
                        .map_err(|_| ImagingArgsError::UnknownPol(p))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        let pols = Vec1::try_from_vec(pols).map_err(|_| ImagingArgsError::NoPols)?;

        let spectral_mode = match spectral_mode {
            None => SpectralMode::default(),
            Some(s) => SpectralMode::from_str(&s.to_lowercase()).map_err(|_| {
                ImagingArgsError::UnknownSpectralMode {
                    got: s,
                    supported: SPECTRAL_MODES_COMMA_SEPARATED.clone(),
                }
            })?,
        };

        Ok((nx, ny, cell, cell, phase_centre, pols, spectral_mode))
    }
}

impl GriddingArgs {
    #[allow(clippy::type_complexity)]
    fn parse(
        self,
    ) -> Result<
        (
            WProjectionSettings,
            Option<Arc<dyn PrimaryBeam>>,
            Option<RADec>,
        ),
        ImagingArgsError,
    > {
        let GriddingArgs {
            num_w_planes,
            conv_sampling,
            padding,
            max_w,
            use_autos,
            beam_type,
            beam_fwhm,
            beam_ref_freq,
            dish_diameter,
            pointing_centre,
        } = self;

        let num_w_planes = num_w_planes.unwrap_or(DEFAULT_NUM_W_PLANES);
        if num_w_planes == 0 {
            return Err(ImagingArgsError::ZeroWPlanes);
        }
        let conv_sampling = conv_sampling.unwrap_or(DEFAULT_CONV_SAMPLING);
        if conv_sampling == 0 {
            return Err(ImagingArgsError::ZeroConvSampling);
        }
        let padding = padding.unwrap_or(DEFAULT_PADDING);
        if !(padding >= 1.0) {
            return Err(ImagingArgsError::BadPadding(padding));
        }
        if let Some(max_w) = max_w {
            if !(max_w > 0.0) {
                return Err(ImagingArgsError::BadMaxW(max_w));
            }
        }
        let w_projection = WProjectionSettings {
            num_w_planes,
            conv_sampling,
            padding,
            max_w,
            use_autos,
        };

        let beam_type = match beam_type {
            None => BeamType::None,
            Some(s) => {
                BeamType::from_str(&s.to_lowercase()).map_err(|_| ImagingArgsError::UnknownBeamType {
                    got: s,
                    supported: BEAM_TYPES_COMMA_SEPARATED.clone(),
                })?
            }
        };
        if beam_type == BeamType::None && (beam_fwhm.is_some() || dish_diameter.is_some()) {
            "Primary beam parameters were given without a beam type; no beam will be used".warn();
        }
        let beam: Option<Arc<dyn PrimaryBeam>> = match beam_type {
            BeamType::None => None,
            BeamType::Gaussian => {
                let fwhm = beam_fwhm.ok_or(ImagingArgsError::MissingBeamArg {
                    beam: "Gaussian",
                    arg: "beam FWHM",
                })?;
                let fwhm_rad = parse_angle(&fwhm, AngleFormat::deg)
                    .map_err(|err| ImagingArgsError::Unit { arg: "beam FWHM", err })?;
                let fwhm_rad = check_positive("beam FWHM", fwhm_rad)?;
                let ref_freq_hz = beam_ref_freq.ok_or(ImagingArgsError::MissingBeamArg {
                    beam: "Gaussian",
                    arg: "beam reference frequency",
                })?;
                let ref_freq_hz = check_positive("beam reference frequency", ref_freq_hz)?;
                Some(Arc::new(GaussianBeam {
                    fwhm_rad,
                    ref_freq_hz,
                }))
            }
            BeamType::Airy => {
                let dish_diameter_m = dish_diameter.ok_or(ImagingArgsError::MissingBeamArg {
                    beam: "Airy",
                    arg: "dish diameter",
                })?;
                let dish_diameter_m = check_positive("dish diameter", dish_diameter_m)?;
                Some(Arc::new(AiryBeam { dish_diameter_m }))
            }
        };
        let pointing_centre = pointing_centre
            .map(|v| parse_radec("pointing centre", v))
            .transpose()?;

        Ok((w_projection, beam, pointing_centre))
    }
}

impl DeconvolutionArgs {
    fn parse(self) -> Result<(CleanSettings, Option<PathBuf>, Option<PathBuf>), ImagingArgsError> {
        let DeconvolutionArgs {
            scales,
            num_scales,
            scale_increment,
            niter,
            gain,
            threshold,
            cycle_factor,
            cycle_max_psf_fraction,
            small_scale_bias,
            stop_large_scale_negative,
            stop_point_mode,
            residual_mode,
            max_major_cycles,
            mask,
            start_model,
        } = self;

        let scales = match (scales, num_scales) {
            (Some(scales), num_scales) => {
                if num_scales.is_some() {
                    "Both scale sizes and a number of scales were given; using the scale sizes"
                        .warn();
                }
                scales
            }
            (None, Some(num_scales)) => default_scales(
                num_scales.max(1),
                scale_increment.unwrap_or(DEFAULT_SCALE_INCREMENT),
            ),
            (None, None) => DEFAULT_SCALES.to_vec(),
        };
        if let Some(s) = scales.iter().find(|s| **s < 0.0) {
            return Err(ImagingArgsError::NegativeScale(*s));
        }

        let gain = gain.unwrap_or(DEFAULT_GAIN);
        if !(gain > 0.0 && gain <= 1.0) {
            return Err(ImagingArgsError::BadGain(gain));
        }
        if gain > 0.5 {
            format!("A CLEAN gain of {gain} is unusually high").warn();
        }

        let threshold = match threshold {
            Some(t) => parse_flux_density(&t)
                .map_err(|err| ImagingArgsError::Unit { arg: "threshold", err })?,
            None => DEFAULT_THRESHOLD,
        };
        if threshold < 0.0 {
            return Err(ImagingArgsError::NegativeThreshold(threshold));
        }

        let cycle_max_psf_fraction =
            cycle_max_psf_fraction.unwrap_or(DEFAULT_CYCLE_MAX_PSF_FRACTION);
        if !(cycle_max_psf_fraction > 0.0 && cycle_max_psf_fraction <= 1.0) {
            return Err(ImagingArgsError::BadCycleMaxPsfFraction(
                cycle_max_psf_fraction,
            ));
        }
        if cycle_max_psf_fraction > 0.8 {
            format!(
                "The cycle max PSF fraction ({cycle_max_psf_fraction}) is capped at 0.8 when choosing cycle thresholds"
            )
            .warn();
        }

        let small_scale_bias = small_scale_bias.unwrap_or(DEFAULT_SMALL_SCALE_BIAS);
        if !(0.0..=1.0).contains(&small_scale_bias) {
            format!("A small scale bias of {small_scale_bias} is outside of [0, 1]").warn();
        }

        let residual_mode = match residual_mode {
            None => ResidualMode::default(),
            Some(s) => ResidualMode::from_str(&s.to_lowercase()).map_err(|_| {
                ImagingArgsError::UnknownResidualMode {
                    got: s,
                    supported: RESIDUAL_MODES_COMMA_SEPARATED.clone(),
                }
            })?,
        };

        let max_major_cycles = max_major_cycles.unwrap_or(DEFAULT_MAX_MAJOR_CYCLES);
        if max_major_cycles == 0 {
            return Err(ImagingArgsError::ZeroMajorCycles);
        }

        let clean = CleanSettings {
            scales,
            niter: niter.unwrap_or(DEFAULT_NITER),
            gain,
            threshold,
            cycle_factor: cycle_factor.unwrap_or(DEFAULT_CYCLE_FACTOR),
            cycle_max_psf_fraction,
            small_scale_bias,
            stop_large_scale_negative,
            stop_point_mode: stop_point_mode.unwrap_or(DEFAULT_STOP_POINT_MODE),
            residual_mode,
            max_major_cycles,
        };
        Ok((clean, mask, start_model))
    }
}
