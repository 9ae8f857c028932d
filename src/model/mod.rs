// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to generate sky-model visibilities by direct Fourier transform.
//!
//! This is exact (no gridding), so it's used to simulate visibilities and to
//! check the FT machines. A visibility of a source with direction cosines
//! `(l, m, n)` is `S exp(-2 pi i (ul + vm + w(n - 1)))`.

#[cfg(test)]
mod tests;

use marlu::{c32, c64, RADec, LMN, UVW};
use ndarray::{parallel::prelude::*, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{TAU, VEL_C},
    gridding::PointedBeam,
    image::Correlation,
    vis::{VisBuffer, VisColumn},
};

/// An unpolarised point source with a power-law spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub radec: RADec,

    /// The Stokes I flux density at `ref_freq_hz` \[Jy\].
    pub flux_jy: f64,

    pub ref_freq_hz: f64,

    /// S ∝ ν^α
    #[serde(default)]
    pub spectral_index: f64,
}

impl PointSource {
    pub fn flux_at(&self, freq_hz: f64) -> f64 {
        if self.spectral_index == 0.0 {
            self.flux_jy
        } else {
            self.flux_jy * (freq_hz / self.ref_freq_hz).powf(self.spectral_index)
        }
    }
}

/// Something that can write model visibilities into a buffer.
pub trait SkyModeller {
    /// Add model visibilities to a column of a buffer.
    fn add_model(&self, vb: &mut VisBuffer, column: VisColumn);
}

/// Models a list of point sources, optionally attenuated by a primary beam.
pub struct PointSourceModeller<'a> {
    pub sources: &'a [PointSource],
    pub beam: Option<&'a PointedBeam>,
}

/// The factor that turns Stokes I into a correlation of an unpolarised
/// source.
fn unpolarised_factor(corr: Correlation) -> f64 {
    match corr {
        Correlation::XX | Correlation::YY | Correlation::RR | Correlation::LL => 1.0,
        Correlation::XY | Correlation::YX | Correlation::RL | Correlation::LR => 0.0,
    }
}

impl SkyModeller for PointSourceModeller<'_> {
    fn add_model(&self, vb: &mut VisBuffer, column: VisColumn) {
        let lmns: Vec<LMN> = self
            .sources
            .iter()
            .map(|s| s.radec.to_lmn(vb.phase_centre))
            .collect();
        // Flux densities (beam attenuated) per source per channel.
        let fluxes = Array2::from_shape_fn((self.sources.len(), vb.num_chans()), |(i, j)| {
            let source = &self.sources[i];
            let freq = vb.freqs_hz[j];
            let pb = self.beam.map(|b| b.response(source.radec, freq)).unwrap_or(1.0);
            source.flux_at(freq) * pb
        });
        let corr_factors: Vec<f64> = vb.corrs.iter().map(|&c| unpolarised_factor(c)).collect();
        let freqs = vb.freqs_hz.clone();
        let uvws = vb.uvws.clone();

        vb.column_mut(column)
            .outer_iter_mut()
            .into_par_iter()
            .zip(uvws.par_iter())
            .for_each(|(mut row, &UVW { u, v, w })| {
                for (mut chan, (&freq, fluxes)) in row
                    .outer_iter_mut()
                    .zip(freqs.iter().zip(fluxes.columns()))
                {
                    let scale = freq / VEL_C;
                    let (u, v, w) = (u * scale, v * scale, w * scale);
                    let vis: c64 = lmns
                        .iter()
                        .zip(fluxes.iter())
                        .map(|(LMN { l, m, n }, &flux)| {
                            flux * c64::cis(-TAU * (u * l + v * m + w * (n - 1.0)))
                        })
                        .sum();
                    for (out, &factor) in chan.iter_mut().zip(corr_factors.iter()) {
                        *out += c32::new((vis.re * factor) as f32, (vis.im * factor) as f32);
                    }
                }
            });
    }
}

/// Replace a column with the visibilities of `sources`.
pub fn simulate_point_sources(
    vb: &mut VisBuffer,
    column: VisColumn,
    sources: &[PointSource],
    beam: Option<&PointedBeam>,
) {
    vb.column_mut(column).fill(c32::default());
    PointSourceModeller { sources, beam }.add_model(vb, column);
}

/// The sky positions of the given pixels of an image, for building point
/// sources that sit exactly on pixel centres.
pub fn sources_on_pixels(
    geometry: &crate::image::ImageGeometry,
    pixels: &[((usize, usize), f64)],
    ref_freq_hz: f64,
) -> Vec<PointSource> {
    pixels
        .iter()
        .filter_map(|&((x, y), flux_jy)| {
            geometry
                .pixel_to_radec(x as f64, y as f64)
                .map(|radec: RADec| PointSource {
                    radec,
                    flux_jy,
                    ref_freq_hz,
                    spectral_index: 0.0,
                })
        })
        .collect()
}
