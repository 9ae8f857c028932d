// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image geometry and polarisation bookkeeping.
//!
//! Images are [`Array4<f32>`] shaped `[chan, pol, y, x]`. Pixel `(x, y)` sits
//! at direction cosines `l = -(x - nx/2) * cell_x`, `m = (y - ny/2) * cell_y`
//! relative to the phase centre, so RA increases to the left as in FITS.

mod error;

pub use error::ImageError;

use marlu::{c64, RADec, LMN};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

/// The smallest image axis we accept.
const MIN_IMAGE_SIZE: usize = 8;

/// The polarisation products that can be imaged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum ImagePol {
    I,
    Q,
    U,
    V,
    XX,
    XY,
    YX,
    YY,
    RR,
    LL,
}

/// The correlation products carried by visibilities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum Correlation {
    XX,
    XY,
    YX,
    YY,
    RR,
    RL,
    LR,
    LL,
}

impl ImagePol {
    /// If the correlation `corr` contributes to this image polarisation, the
    /// coefficient that turns an image-plane value into a correlation, e.g.
    /// XY = U + iV. Visibilities are gridded with the conjugate coefficient.
    pub fn coefficient(self, corr: Correlation) -> Option<c64> {
        use Correlation as C;
        use ImagePol as P;

        let one = c64::new(1.0, 0.0);
        let i = c64::new(0.0, 1.0);
        match (self, corr) {
            (P::I, C::XX | C::YY | C::RR | C::LL) => Some(one),
            (P::Q, C::XX | C::RL | C::LR) => Some(one),
            (P::Q, C::YY) => Some(-one),
            (P::U, C::XY | C::YX) => Some(one),
            (P::U, C::RL) => Some(i),
            (P::U, C::LR) => Some(-i),
            (P::V, C::XY) => Some(i),
            (P::V, C::YX) => Some(-i),
            (P::V, C::RR) => Some(one),
            (P::V, C::LL) => Some(-one),
            (P::XX, C::XX)
            | (P::XY, C::XY)
            | (P::YX, C::YX)
            | (P::YY, C::YY)
            | (P::RR, C::RR)
            | (P::LL, C::LL) => Some(one),
            _ => None,
        }
    }

    /// The FITS STOKES axis value.
    pub fn fits_code(self) -> i32 {
        match self {
            ImagePol::I => 1,
            ImagePol::Q => 2,
            ImagePol::U => 3,
            ImagePol::V => 4,
            ImagePol::RR => -1,
            ImagePol::LL => -2,
            ImagePol::XX => -5,
            ImagePol::YY => -6,
            ImagePol::XY => -7,
            ImagePol::YX => -8,
        }
    }
}

/// Which image plane(s) each correlation feeds, and with which coefficient.
/// Indexed by correlation.
pub type PolarisationMap = Vec<Vec<(usize, c64)>>;

/// Build a [`PolarisationMap`] from the correlations of some visibilities to
/// the polarisations of an image.
pub fn polarisation_map(corrs: &[Correlation], pols: &[ImagePol]) -> PolarisationMap {
    corrs
        .iter()
        .map(|&corr| {
            pols.iter()
                .enumerate()
                .filter_map(|(i_pol, pol)| pol.coefficient(corr).map(|coef| (i_pol, coef)))
                .collect()
        })
        .collect()
}

/// The size, resolution, pointing and spectral/polarisation layout of an
/// image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    pub nx: usize,
    pub ny: usize,

    /// The angular size of a pixel along x \[radians\].
    pub cell_x: f64,

    /// The angular size of a pixel along y \[radians\].
    pub cell_y: f64,

    pub phase_centre: RADec,

    /// The centre frequency of each image channel \[Hz\].
    pub freqs_hz: Vec1<f64>,

    /// The width of each image channel \[Hz\]. When there is a single image
    /// channel, every visibility channel is gridded into it regardless of
    /// this width.
    pub chan_width_hz: f64,

    pub pols: Vec1<ImagePol>,
}

impl ImageGeometry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nx: usize,
        ny: usize,
        cell_x: f64,
        cell_y: f64,
        phase_centre: RADec,
        freqs_hz: Vec1<f64>,
        chan_width_hz: f64,
        pols: Vec1<ImagePol>,
    ) -> Result<ImageGeometry, ImageError> {
        for n in [nx, ny] {
            if n < MIN_IMAGE_SIZE {
                return Err(ImageError::TooSmall {
                    size: n,
                    min: MIN_IMAGE_SIZE,
                });
            }
            if n % 2 == 1 {
                return Err(ImageError::OddSize(n));
            }
        }
        if !(cell_x > 0.0 && cell_y > 0.0) {
            return Err(ImageError::BadCellSize { cell_x, cell_y });
        }
        if freqs_hz.len() > 1 && chan_width_hz <= 0.0 {
            return Err(ImageError::BadChanWidth(chan_width_hz));
        }
        for (i, pol) in pols.iter().enumerate() {
            if pols[..i].contains(pol) {
                return Err(ImageError::DuplicatePol(*pol));
            }
        }

        Ok(ImageGeometry {
            nx,
            ny,
            cell_x,
            cell_y,
            phase_centre,
            freqs_hz,
            chan_width_hz,
            pols,
        })
    }

    pub fn num_chans(&self) -> usize {
        self.freqs_hz.len()
    }

    pub fn num_pols(&self) -> usize {
        self.pols.len()
    }

    /// `(chan, pol, y, x)`
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.num_chans(), self.num_pols(), self.ny, self.nx)
    }

    /// A zero-filled image with this geometry.
    pub fn zeros(&self) -> Array4<f32> {
        Array4::zeros(self.shape())
    }

    /// The index of the image channel that a visibility channel at `freq_hz`
    /// belongs to, if any.
    pub fn chan_for_freq(&self, freq_hz: f64) -> Option<usize> {
        if self.num_chans() == 1 {
            return Some(0);
        }
        let half_width = 0.5 * self.chan_width_hz * (1.0 + 1e-9);
        self.freqs_hz
            .iter()
            .enumerate()
            .map(|(i, f)| (i, (f - freq_hz).abs()))
            .filter(|(_, diff)| *diff <= half_width)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    pub fn pixel_to_lm(&self, x: f64, y: f64) -> (f64, f64) {
        (
            -(x - (self.nx / 2) as f64) * self.cell_x,
            (y - (self.ny / 2) as f64) * self.cell_y,
        )
    }

    pub fn lm_to_pixel(&self, l: f64, m: f64) -> (f64, f64) {
        (
            (self.nx / 2) as f64 - l / self.cell_x,
            (self.ny / 2) as f64 + m / self.cell_y,
        )
    }

    /// The (fractional) pixel coordinates of a sky position. Positions more
    /// than 90 degrees from the phase centre have no SIN-projected pixel.
    pub fn radec_to_pixel(&self, radec: RADec) -> Option<(f64, f64)> {
        let LMN { l, m, n } = radec.to_lmn(self.phase_centre);
        if n < 0.0 {
            return None;
        }
        Some(self.lm_to_pixel(l, m))
    }

    /// The sky position of a pixel, or `None` if the pixel is outside the
    /// celestial sphere.
    pub fn pixel_to_radec(&self, x: f64, y: f64) -> Option<RADec> {
        let (l, m) = self.pixel_to_lm(x, y);
        let r2 = l * l + m * m;
        if r2 >= 1.0 {
            return None;
        }
        let n = (1.0 - r2).sqrt();
        let (sin_dec0, cos_dec0) = self.phase_centre.dec.sin_cos();
        let dec = (m * cos_dec0 + n * sin_dec0).asin();
        let ra = self.phase_centre.ra + l.atan2(n * cos_dec0 - m * sin_dec0);
        Some(RADec::from_radians(ra, dec))
    }
}
