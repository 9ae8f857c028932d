// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image and deconvolve visibilities.

use std::{path::PathBuf, sync::Arc};

use itertools::Itertools;
use log::{debug, info};
use marlu::RADec;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use vec1::{vec1, Vec1};

use crate::{
    deconvolution::{
        CleanBeam, CleanError, CleanSettings, FieldImages, MfMsCleanImageSkyModel, SolveSummary,
    },
    equation::{EquationError, VisSkyEquation},
    gridding::{
        apply_pb_correction, FtMachine, GriddingError, PointedBeam, PrimaryBeam, WOnlyProjectFt,
        WProjectionSettings,
    },
    image::{ImageError, ImageGeometry, ImagePol},
    io::fits::{write_image, FitsError},
    printers::InfoPrinter,
    vis::VisBuffer,
};

/// How visibility channels map onto image channels.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum SpectralMode {
    /// All channels go into a single image channel.
    #[default]
    #[strum(serialize = "mfs")]
    Mfs,

    /// Each distinct visibility frequency gets its own image channel.
    #[strum(serialize = "cube")]
    Cube,
}

/// The images an imaging run can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum ImageProduct {
    #[strum(serialize = "model")]
    Model,

    #[strum(serialize = "residual")]
    Residual,

    #[strum(serialize = "psf")]
    Psf,

    #[strum(serialize = "restored")]
    Restored,

    /// The primary beam.
    #[strum(serialize = "pb")]
    Pb,

    /// The restored image divided by the primary beam.
    #[strum(serialize = "pbcor")]
    PbCorrected,
}

impl ImageProduct {
    pub(crate) fn needs_beam(self) -> bool {
        matches!(self, ImageProduct::Pb | ImageProduct::PbCorrected)
    }

    fn bunit(self) -> &'static str {
        match self {
            ImageProduct::Model => "Jy/pixel",
            ImageProduct::Pb | ImageProduct::Psf => "",
            _ => "Jy/beam",
        }
    }
}

/// Parameters needed to image and deconvolve visibilities.
#[derive(Clone)]
pub struct ImagingParams {
    pub nx: usize,
    pub ny: usize,

    /// \[radians\]
    pub cell_x: f64,
    /// \[radians\]
    pub cell_y: f64,

    /// The image centre. If this isn't set, the phase centre of the first
    /// visibility buffer is used.
    pub phase_centre: Option<RADec>,

    pub pols: Vec1<ImagePol>,

    pub spectral_mode: SpectralMode,

    pub w_projection: WProjectionSettings,

    /// The primary beam, if one should be accounted for.
    pub beam: Option<Arc<dyn PrimaryBeam>>,

    /// Where the primary beam points. If this isn't set, the image centre is
    /// used.
    pub pointing_centre: Option<RADec>,

    pub clean: CleanSettings,

    /// Shaped `[y, x]`.
    pub mask: Option<Array2<f32>>,

    /// Shaped `[chan, pol, y, x]`.
    pub start_model: Option<Array4<f32>>,

    /// Images are written to `<prefix>_<product>.fits`. If this isn't set,
    /// nothing is written.
    pub output_prefix: Option<PathBuf>,

    pub outputs: Vec<ImageProduct>,

    /// Primary-beam corrected pixels are blanked where the beam is below this.
    pub pb_limit: f64,

    pub draw_progress_bars: bool,
}

/// Everything produced by an imaging run. Images are `[chan, pol, y, x]`.
pub struct ImagingProducts {
    pub geometry: ImageGeometry,
    pub model: Array4<f32>,
    pub residual: Array4<f32>,
    pub psf: Array4<f32>,
    pub restored: Array4<f32>,

    /// Shaped `[chan, y, x]`.
    pub pb: Option<Array3<f32>>,
    pub pb_corrected: Option<Array4<f32>>,

    pub beam: CleanBeam,
    pub summary: SolveSummary,

    /// The FITS files that were written.
    pub written: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("No visibilities were supplied")]
    NoVisibilities,

    #[error("The starting model has shape {got:?}, but the image has shape {expected:?}")]
    StartModelShape {
        expected: (usize, usize, usize, usize),
        got: (usize, usize, usize, usize),
    },

    #[error("The sky model has no restoring beam")]
    NoBeam,

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Gridding(#[from] GriddingError),

    #[error(transparent)]
    Equation(#[from] EquationError),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error(transparent)]
    Fits(#[from] FitsError),
}

/// The distinct frequencies of some visibilities, sorted.
fn distinct_freqs(vis: &[VisBuffer]) -> Vec<f64> {
    let mut freqs: Vec<f64> = vis
        .iter()
        .flat_map(|vb| vb.freqs_hz.iter().copied())
        .collect();
    freqs.sort_by(|a, b| a.total_cmp(b));
    freqs.dedup_by(|a, b| (*a - *b).abs() < 1e-3);
    freqs
}

impl ImagingParams {
    /// The geometry of the image made from `vis`.
    pub fn geometry(&self, vis: &[VisBuffer]) -> Result<ImageGeometry, ImagingError> {
        let first = vis.first().ok_or(ImagingError::NoVisibilities)?;
        let freqs = distinct_freqs(vis);
        let spacing = freqs
            .iter()
            .tuple_windows()
            .map(|(a, b)| b - a)
            .fold(f64::INFINITY, f64::min);
        let (image_freqs, chan_width) = match (self.spectral_mode, freqs.as_slice()) {
            (_, []) => return Err(ImagingError::NoVisibilities),
            (_, [f]) => (vec1![*f], 1.0),
            (SpectralMode::Mfs, [lowest, .., highest]) => {
                (vec1![0.5 * (lowest + highest)], highest - lowest + spacing)
            }
            (SpectralMode::Cube, all) => {
                let freqs =
                    Vec1::try_from_vec(all.to_vec()).map_err(|_| ImagingError::NoVisibilities)?;
                (freqs, spacing)
            }
        };
        Ok(ImageGeometry::new(
            self.nx,
            self.ny,
            self.cell_x,
            self.cell_y,
            self.phase_centre.unwrap_or(first.phase_centre),
            image_freqs,
            chan_width,
            self.pols.clone(),
        )?)
    }

    fn print_summary(&self, geometry: &ImageGeometry, num_rows: usize) {
        let mut printer = InfoPrinter::new("Imaging set up".into());
        printer.push_block(vec![
            format!(
                "Image: {}x{} pixels of {:.2}\" x {:.2}\"",
                geometry.nx,
                geometry.ny,
                geometry.cell_x.to_degrees() * 3600.0,
                geometry.cell_y.to_degrees() * 3600.0
            )
            .into(),
            format!(
                "Centre: RA {:.4}°, Dec {:.4}°",
                geometry.phase_centre.ra.to_degrees(),
                geometry.phase_centre.dec.to_degrees()
            )
            .into(),
            format!(
                "{} channel(s) ({}), polarisations {}",
                geometry.num_chans(),
                self.spectral_mode,
                geometry.pols.iter().join(", ")
            )
            .into(),
        ]);
        printer.push_line(
            format!(
                "{num_rows} visibility rows; {} W plane(s), oversampling {}, padding {}",
                self.w_projection.num_w_planes,
                self.w_projection.conv_sampling,
                self.w_projection.padding
            )
            .into(),
        );
        if let Some(beam) = &self.beam {
            printer.push_line(format!("Primary beam: {}", beam.name()).into());
        }
        printer.push_line(
            format!(
                "CLEAN: scales {:?} pixels, niter {}, gain {}, threshold {} Jy",
                self.clean.scales, self.clean.niter, self.clean.gain, self.clean.threshold
            )
            .into(),
        );
        printer.display();
    }

    /// Image, deconvolve and restore `vis`, then write the requested images.
    /// The model column of `vis` is left holding the final model prediction.
    pub fn run(&self, vis: &mut [VisBuffer]) -> Result<ImagingProducts, ImagingError> {
        let geometry = self.geometry(vis)?;
        self.print_summary(&geometry, vis.iter().map(|vb| vb.num_rows()).sum());

        let pointed_beam = self.beam.as_ref().map(|beam| PointedBeam {
            beam: Arc::clone(beam),
            pointing_centre: self.pointing_centre.unwrap_or(geometry.phase_centre),
        });
        let mut ftm = WOnlyProjectFt::new(geometry.clone(), self.w_projection.clone())?;
        if let Some(pointed_beam) = &pointed_beam {
            ftm = ftm.with_beam(pointed_beam.clone());
        }

        let mut field = FieldImages::new(geometry.clone());
        if let Some(mask) = &self.mask {
            field = field.with_mask(mask.clone());
        }
        if let Some(start_model) = &self.start_model {
            if start_model.dim() != geometry.shape() {
                return Err(ImagingError::StartModelShape {
                    expected: geometry.shape(),
                    got: start_model.dim(),
                });
            }
            field = field.with_model(start_model.clone());
        }

        let ftms: Vec<Box<dyn FtMachine>> = vec![Box::new(ftm)];
        let mut eq = VisSkyEquation::new(ftms, vis)?;
        let mut sky_model = MfMsCleanImageSkyModel::new(vec![field], self.clean.clone())
            .with_progress_bars(self.draw_progress_bars);
        let summary = sky_model.solve(&mut eq)?;
        let mut restored = sky_model.restore()?;
        let restored = restored.pop().ok_or(ImagingError::NoBeam)?;
        drop(eq);

        let field = sky_model
            .into_fields()
            .pop()
            .ok_or(ImagingError::NoBeam)?;
        let beam = field.beam.ok_or(ImagingError::NoBeam)?;
        info!(
            "Restoring beam: {:.2}\" x {:.2}\", PA {:.1}°",
            beam.major_rad.to_degrees() * 3600.0,
            beam.minor_rad.to_degrees() * 3600.0,
            beam.pa_rad.to_degrees()
        );

        let pb = pointed_beam.as_ref().map(|b| b.image(&geometry));
        let pb_corrected = pb.as_ref().map(|pb| {
            let mut corrected = restored.clone();
            apply_pb_correction(&mut corrected, pb.view(), self.pb_limit as f32);
            corrected
        });

        let mut products = ImagingProducts {
            geometry,
            model: field.model,
            residual: field.residual,
            psf: field.psf,
            restored,
            pb,
            pb_corrected,
            beam,
            summary,
            written: vec![],
        };
        if let Some(prefix) = &self.output_prefix {
            products.written = self.write_products(prefix, &products)?;
        }
        Ok(products)
    }

    fn write_products(
        &self,
        prefix: &std::path::Path,
        products: &ImagingProducts,
    ) -> Result<Vec<PathBuf>, ImagingError> {
        let geometry = &products.geometry;
        let pb_image = products.pb.as_ref().map(|pb| {
            Array4::from_shape_fn(geometry.shape(), |(c, _, y, x)| pb[(c, y, x)])
        });
        let mut written = Vec::with_capacity(self.outputs.len());
        for &product in self.outputs.iter().unique() {
            let (image, beam) = match product {
                ImageProduct::Model => (Some(&products.model), None),
                ImageProduct::Residual => (Some(&products.residual), Some(&products.beam)),
                ImageProduct::Psf => (Some(&products.psf), None),
                ImageProduct::Restored => (Some(&products.restored), Some(&products.beam)),
                ImageProduct::Pb => (pb_image.as_ref(), None),
                ImageProduct::PbCorrected => (products.pb_corrected.as_ref(), Some(&products.beam)),
            };
            let image = match image {
                Some(image) => image,
                None => {
                    debug!("Not writing the {product} image; there's no primary beam");
                    continue;
                }
            };
            let mut file_name = prefix.as_os_str().to_owned();
            file_name.push(format!("_{product}.fits"));
            let file = PathBuf::from(file_name);
            write_image(&file, image.view(), geometry, product.bunit(), beam)?;
            info!("Wrote {}", file.display());
            written.push(file);
        }
        Ok(written)
    }
}
