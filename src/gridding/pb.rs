// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Analytic primary beams.
//!
//! W-only projection doesn't put the primary beam into its kernels, so the
//! beam is handled in the image plane: it's evaluated about the antenna
//! pointing centre (which need not be the phase centre) and divided out of
//! the final images.

use std::sync::Arc;

use marlu::RADec;
use ndarray::{parallel::prelude::*, prelude::*};

use crate::{
    constants::{AIRY_FIRST_NULL, FWHM_FACTOR, LN_2, PI, VEL_C},
    image::ImageGeometry,
    math::bessel_j1,
};

/// A circularly symmetric power pattern.
pub trait PrimaryBeam: Send + Sync {
    /// The power response `separation` radians from the pointing centre at
    /// `freq_hz`. It's 1 on axis.
    fn response(&self, separation: f64, freq_hz: f64) -> f64;

    fn name(&self) -> &'static str;
}

/// A Gaussian power pattern whose width scales inversely with frequency.
#[derive(Debug, Clone, Copy)]
pub struct GaussianBeam {
    /// The full width at half maximum at `ref_freq_hz` \[radians\].
    pub fwhm_rad: f64,
    pub ref_freq_hz: f64,
}

impl GaussianBeam {
    pub fn sigma(&self, freq_hz: f64) -> f64 {
        self.fwhm_rad * self.ref_freq_hz / freq_hz / FWHM_FACTOR
    }
}

impl PrimaryBeam for GaussianBeam {
    fn response(&self, separation: f64, freq_hz: f64) -> f64 {
        let fwhm = self.fwhm_rad * self.ref_freq_hz / freq_hz;
        (-4.0 * LN_2 * (separation / fwhm).powi(2)).exp()
    }

    fn name(&self) -> &'static str {
        "Gaussian"
    }
}

/// The power pattern of a uniformly illuminated circular aperture.
#[derive(Debug, Clone, Copy)]
pub struct AiryBeam {
    pub dish_diameter_m: f64,
}

impl AiryBeam {
    /// The angular distance to the first null \[radians\].
    pub fn first_null(&self, freq_hz: f64) -> f64 {
        AIRY_FIRST_NULL * VEL_C / freq_hz / self.dish_diameter_m
    }
}

impl PrimaryBeam for AiryBeam {
    fn response(&self, separation: f64, freq_hz: f64) -> f64 {
        let x = PI * self.dish_diameter_m * separation.sin() * freq_hz / VEL_C;
        if x.abs() < 1e-9 {
            return 1.0;
        }
        let amp = 2.0 * bessel_j1(x) / x;
        amp * amp
    }

    fn name(&self) -> &'static str {
        "Airy"
    }
}

/// A beam and where it points.
#[derive(Clone)]
pub struct PointedBeam {
    pub beam: Arc<dyn PrimaryBeam>,
    pub pointing_centre: RADec,
}

impl std::fmt::Debug for PointedBeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointedBeam")
            .field("beam", &self.beam.name())
            .field("pointing_centre", &self.pointing_centre)
            .finish()
    }
}

/// The great-circle distance between two directions \[radians\].
pub(crate) fn angular_separation(a: RADec, b: RADec) -> f64 {
    let (sin_half_ddec, sin_half_dra) = (
        ((b.dec - a.dec) / 2.0).sin(),
        ((b.ra - a.ra) / 2.0).sin(),
    );
    let h = sin_half_ddec * sin_half_ddec + a.dec.cos() * b.dec.cos() * sin_half_dra * sin_half_dra;
    2.0 * h.sqrt().min(1.0).asin()
}

impl PointedBeam {
    pub fn response(&self, direction: RADec, freq_hz: f64) -> f64 {
        self.beam
            .response(angular_separation(self.pointing_centre, direction), freq_hz)
    }

    /// The beam over an image, shaped `[chan, y, x]`. Pixels off the
    /// celestial sphere are 0.
    pub fn image(&self, geometry: &ImageGeometry) -> Array3<f32> {
        let mut pb = Array3::zeros((geometry.num_chans(), geometry.ny, geometry.nx));
        pb.outer_iter_mut()
            .into_par_iter()
            .zip(geometry.freqs_hz.as_slice().par_iter())
            .for_each(|(mut plane, &freq)| {
                for ((y, x), value) in plane.indexed_iter_mut() {
                    if let Some(radec) = geometry.pixel_to_radec(x as f64, y as f64) {
                        *value = self.response(radec, freq) as f32;
                    }
                }
            });
        pb
    }
}

/// Divide images shaped `[chan, pol, y, x]` by a primary beam shaped
/// `[chan, y, x]`. Pixels where the beam is below `pb_limit` are set to 0.
pub fn apply_pb_correction(image: &mut Array4<f32>, pb: ArrayView3<f32>, pb_limit: f32) {
    image
        .outer_iter_mut()
        .into_par_iter()
        .zip(pb.outer_iter().into_par_iter())
        .for_each(|(mut chan, pb_plane)| {
            for mut pol in chan.outer_iter_mut() {
                ndarray::Zip::from(&mut pol)
                    .and(&pb_plane)
                    .for_each(|v, &b| *v = if b >= pb_limit && b > 0.0 { *v / b } else { 0.0 });
            }
        });
}
