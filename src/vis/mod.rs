// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory visibilities.
//!
//! A [`VisBuffer`] holds a chunk of rows (one baseline at one time each), with
//! every per-sample cube shaped `[row, chan, corr]`.

mod error;

pub use error::VisError;

use marlu::{c32, pos::xyz::xyzs_to_cross_uvws, RADec, XyzGeodetic, UVW};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use crate::{constants::VEL_C, image::Correlation, math::parallactic_angle};

/// Which data column to grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize)]
pub enum VisColumn {
    #[strum(serialize = "data")]
    Observed,

    #[strum(serialize = "model")]
    Model,

    #[strum(serialize = "corrected")]
    Corrected,
}

#[derive(Debug, Clone)]
pub struct VisBuffer {
    /// The UVW coordinates of each row \[metres\].
    pub uvws: Vec<UVW>,

    pub antenna1: Vec<usize>,
    pub antenna2: Vec<usize>,

    /// Rows flagged in their entirety.
    pub flag_row: Vec<bool>,

    /// The parallactic angle of the phase centre for each row \[radians\].
    pub parallactic_angles: Vec<f64>,

    pub freqs_hz: Vec1<f64>,
    pub corrs: Vec1<Correlation>,

    /// The direction that the visibilities are phased to.
    pub phase_centre: RADec,

    pub observed: Array3<c32>,
    pub model: Array3<c32>,
    pub corrected: Array3<c32>,
    pub flags: Array3<bool>,
    pub weights: Array3<f32>,
}

impl VisBuffer {
    /// Make a buffer with zeroed data, unit weights and nothing flagged.
    pub fn new(
        uvws: Vec<UVW>,
        antenna1: Vec<usize>,
        antenna2: Vec<usize>,
        freqs_hz: Vec1<f64>,
        corrs: Vec1<Correlation>,
        phase_centre: RADec,
    ) -> Result<VisBuffer, VisError> {
        let num_rows = uvws.len();
        if antenna1.len() != num_rows || antenna2.len() != num_rows {
            return Err(VisError::RowCountMismatch {
                uvws: num_rows,
                antenna1: antenna1.len(),
                antenna2: antenna2.len(),
            });
        }
        if let Some(f) = freqs_hz.iter().find(|f| **f <= 0.0) {
            return Err(VisError::BadFreq(*f));
        }

        let shape = (num_rows, freqs_hz.len(), corrs.len());
        Ok(VisBuffer {
            uvws,
            antenna1,
            antenna2,
            flag_row: vec![false; num_rows],
            parallactic_angles: vec![0.0; num_rows],
            freqs_hz,
            corrs,
            phase_centre,
            observed: Array3::zeros(shape),
            model: Array3::zeros(shape),
            corrected: Array3::zeros(shape),
            flags: Array3::from_elem(shape, false),
            weights: Array3::ones(shape),
        })
    }

    /// Make a buffer of cross-correlation rows for an array of tiles observing
    /// `phase_centre` at each of the local sidereal times `lsts_rad`. Rows are
    /// ordered by time, then by baseline.
    pub fn from_tiles(
        tile_xyzs: &[XyzGeodetic],
        phase_centre: RADec,
        lsts_rad: &[f64],
        array_latitude_rad: f64,
        freqs_hz: Vec1<f64>,
        corrs: Vec1<Correlation>,
    ) -> Result<VisBuffer, VisError> {
        let num_tiles = tile_xyzs.len();
        if num_tiles < 2 {
            return Err(VisError::TooFewTiles(num_tiles));
        }

        let (baseline_ant1, baseline_ant2): (Vec<usize>, Vec<usize>) = (0..num_tiles)
            .flat_map(|i| (i + 1..num_tiles).map(move |j| (i, j)))
            .unzip();
        let num_baselines = baseline_ant1.len();

        let mut uvws = Vec::with_capacity(num_baselines * lsts_rad.len());
        let mut pas = Vec::with_capacity(uvws.capacity());
        for &lst in lsts_rad {
            let hadec = phase_centre.to_hadec(lst);
            uvws.extend(xyzs_to_cross_uvws(tile_xyzs, hadec));
            let pa = parallactic_angle(hadec.ha, hadec.dec, array_latitude_rad);
            pas.extend(std::iter::repeat(pa).take(num_baselines));
        }
        let antenna1 = baseline_ant1
            .iter()
            .copied()
            .cycle()
            .take(uvws.len())
            .collect();
        let antenna2 = baseline_ant2
            .iter()
            .copied()
            .cycle()
            .take(uvws.len())
            .collect();

        let mut vb = VisBuffer::new(uvws, antenna1, antenna2, freqs_hz, corrs, phase_centre)?;
        vb.parallactic_angles = pas;
        Ok(vb)
    }

    pub fn num_rows(&self) -> usize {
        self.uvws.len()
    }

    pub fn num_chans(&self) -> usize {
        self.freqs_hz.len()
    }

    pub fn num_corrs(&self) -> usize {
        self.corrs.len()
    }

    pub fn is_auto(&self, row: usize) -> bool {
        self.antenna1[row] == self.antenna2[row]
    }

    pub fn column(&self, column: VisColumn) -> ArrayView3<c32> {
        match column {
            VisColumn::Observed => self.observed.view(),
            VisColumn::Model => self.model.view(),
            VisColumn::Corrected => self.corrected.view(),
        }
    }

    pub fn column_mut(&mut self, column: VisColumn) -> ArrayViewMut3<c32> {
        match column {
            VisColumn::Observed => self.observed.view_mut(),
            VisColumn::Model => self.model.view_mut(),
            VisColumn::Corrected => self.corrected.view_mut(),
        }
    }

    /// Set the corrected column to the observed visibilities minus the model.
    pub fn set_corrected_to_residual(&mut self) {
        ndarray::Zip::from(&mut self.corrected)
            .and(&self.observed)
            .and(&self.model)
            .par_for_each(|r, &d, &m| *r = d - m);
    }

    /// The largest |w| of any unflagged row \[wavelengths\].
    pub fn max_w_lambda(&self) -> f64 {
        let max_freq = self.freqs_hz.iter().copied().fold(0.0, f64::max);
        self.uvws
            .iter()
            .zip(self.flag_row.iter())
            .filter(|(_, &flagged)| !flagged)
            .map(|(uvw, _)| uvw.w.abs())
            .fold(0.0, f64::max)
            * max_freq
            / VEL_C
    }

    /// Check that all per-row and per-sample arrays agree with the number of
    /// rows, channels and correlations.
    pub fn validate(&self) -> Result<(), VisError> {
        let expected = (self.num_rows(), self.num_chans(), self.num_corrs());
        for (name, got) in [
            ("observed", self.observed.dim()),
            ("model", self.model.dim()),
            ("corrected", self.corrected.dim()),
            ("flags", self.flags.dim()),
            ("weights", self.weights.dim()),
        ] {
            if got != expected {
                return Err(VisError::CubeShape {
                    name,
                    expected,
                    got,
                });
            }
        }
        for (name, len) in [
            ("antenna1", self.antenna1.len()),
            ("antenna2", self.antenna2.len()),
            ("flag_row", self.flag_row.len()),
            ("parallactic_angles", self.parallactic_angles.len()),
        ] {
            if len != self.num_rows() {
                return Err(VisError::RowArrayLength {
                    name,
                    expected: self.num_rows(),
                    got: len,
                });
            }
        }
        Ok(())
    }
}
