// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fourier-transform machines: gridding visibilities into images and
//! degridding images into visibilities.

use log::{debug, trace, warn};
use marlu::{c32, c64, LMN, UVW};
use ndarray::{parallel::prelude::*, prelude::*};
use serde::{Deserialize, Serialize};

use super::{
    convfunc::{ConvFuncStore, WOnlyConvFuncGenerator, WTermConvFunc},
    pb::PointedBeam,
    spheroidal::grid_correction,
    GriddingError,
};
use crate::{
    constants::{DEFAULT_CONV_SAMPLING, DEFAULT_NUM_W_PLANES, DEFAULT_PADDING, TAU, VEL_C},
    image::{polarisation_map, ImageError, ImageGeometry, PolarisationMap},
    math::{next_even_composite, nint, Fft2d},
    vis::{VisBuffer, VisColumn},
};

/// The interface between visibilities and images used by the deconvolution
/// loop.
///
/// Imaging is `initialize_to_sky`, any number of `put`s, then `get_image`.
/// Prediction is `initialize_to_vis`, any number of `get`s, then
/// `finalize_to_vis`.
pub trait FtMachine: Send {
    fn name(&self) -> &'static str;

    fn geometry(&self) -> &ImageGeometry;

    /// Zero the grid and weights in preparation for `put`.
    fn initialize_to_sky(&mut self) -> Result<(), GriddingError>;

    /// Grid a column of visibilities. With `do_psf`, every visibility is
    /// replaced by 1, making the point-spread function.
    fn put(&mut self, vb: &VisBuffer, column: VisColumn, do_psf: bool) -> Result<(), GriddingError>;

    /// Transform the grid to an image. With `normalize`, each plane is divided
    /// by its sum of weights.
    fn get_image(&mut self, normalize: bool) -> Result<Array4<f32>, GriddingError>;

    /// The sum of weights gridded into each `[chan, pol]` plane.
    fn sum_weights(&self) -> ArrayView2<f64>;

    /// The sensitivity of each pixel, i.e. the sum of weights times the
    /// square of the primary beam.
    fn get_weight_image(&self) -> Array4<f32>;

    /// Transform a model image to a grid for `get`.
    fn initialize_to_vis(&mut self, model: ArrayView4<f32>) -> Result<(), GriddingError>;

    /// Degrid into the model column of a buffer, overwriting it.
    fn get(&mut self, vb: &mut VisBuffer) -> Result<(), GriddingError>;

    /// Release the grid used for prediction.
    fn finalize_to_vis(&mut self);
}

/// Options controlling W projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WProjectionSettings {
    /// The number of W planes. 1 turns off W projection.
    pub num_w_planes: usize,

    /// The oversampling factor of the convolution functions.
    pub conv_sampling: usize,

    /// The padding factor of each uv-grid axis.
    pub padding: f64,

    /// The largest w \[wavelengths\] given its own plane. If this isn't set,
    /// it's derived from the cell size.
    pub max_w: Option<f64>,

    /// Grid auto-correlations too.
    pub use_autos: bool,
}

impl Default for WProjectionSettings {
    fn default() -> Self {
        WProjectionSettings {
            num_w_planes: DEFAULT_NUM_W_PLANES,
            conv_sampling: DEFAULT_CONV_SAMPLING,
            padding: DEFAULT_PADDING,
            max_w: None,
            use_autos: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FtState {
    Idle,
    ToSky,
    ToVis,
}

/// The direction-cosine offset used to re-phase visibilities from their own
/// phase centre to the image's.
#[derive(Debug, Clone, Copy)]
struct PhaseShift(LMN);

impl PhaseShift {
    fn new(vb: &VisBuffer, geometry: &ImageGeometry) -> Option<PhaseShift> {
        if vb.phase_centre == geometry.phase_centre {
            None
        } else {
            Some(PhaseShift(geometry.phase_centre.to_lmn(vb.phase_centre)))
        }
    }

    /// The phasor that moves a visibility at `uvw` \[wavelengths\] to the
    /// image phase centre.
    fn phasor(self, u: f64, v: f64, w: f64) -> c64 {
        let LMN { l, m, n } = self.0;
        c64::cis(TAU * (u * l + v * m + w * (n - 1.0)))
    }
}

/// Where a visibility lands on the uv grid.
#[derive(Debug, Clone, Copy)]
struct GridPosition {
    loc: [i64; 2],
    off: [i64; 2],
    w_plane: usize,
    support: i64,
    conjugate: bool,
}

/// W-projection gridding with W-term-only kernels. Primary-beam effects are
/// handled in the image plane, so the kernels don't depend on parallactic
/// angle or polarisation.
pub struct WOnlyProjectFt {
    geometry: ImageGeometry,
    settings: WProjectionSettings,

    padded_nx: usize,
    padded_ny: usize,
    /// Multiplying u and v \[wavelengths\] by these gives grid pixels...
    uv_scale: [f64; 2],
    /// ...relative to these.
    uv_offset: [f64; 2],

    store: ConvFuncStore<WOnlyConvFuncGenerator>,
    fft: Fft2d,
    correction_x: Vec<f64>,
    correction_y: Vec<f64>,

    /// `[chan, pol, v, u]`
    grid: Array4<c64>,
    /// `[chan, pol]`
    sum_weights: Array2<f64>,
    beam: Option<PointedBeam>,

    state: FtState,
    num_off_grid: usize,
}

impl WOnlyProjectFt {
    pub fn new(
        geometry: ImageGeometry,
        settings: WProjectionSettings,
    ) -> Result<WOnlyProjectFt, GriddingError> {
        if !(settings.padding >= 1.0) {
            return Err(GriddingError::BadPadding(settings.padding));
        }
        let padded_nx = next_even_composite((settings.padding * geometry.nx as f64).ceil() as usize);
        let padded_ny = next_even_composite((settings.padding * geometry.ny as f64).ceil() as usize);
        let max_w = settings
            .max_w
            .unwrap_or(0.25 / geometry.cell_x.abs());

        let generator = WOnlyConvFuncGenerator {
            nx: padded_nx,
            ny: padded_ny,
            cell_x: geometry.cell_x,
            cell_y: geometry.cell_y,
            num_w_planes: settings.num_w_planes,
            sampling: settings.conv_sampling,
            max_w,
        };
        let mut store = ConvFuncStore::new(generator);
        // Make the kernels now so that bad settings are reported early.
        store.get(0.0, 0)?;

        debug!(
            "W-only projection FT machine: image {}x{}, padded grid {padded_nx}x{padded_ny}, {} W planes up to {max_w:.1} wavelengths",
            geometry.nx, geometry.ny, settings.num_w_planes
        );

        Ok(WOnlyProjectFt {
            uv_scale: [
                -(padded_nx as f64) * geometry.cell_x,
                padded_ny as f64 * geometry.cell_y,
            ],
            uv_offset: [(padded_nx / 2) as f64, (padded_ny / 2) as f64],
            fft: Fft2d::new(padded_nx, padded_ny),
            correction_x: grid_correction(padded_nx, settings.conv_sampling),
            correction_y: grid_correction(padded_ny, settings.conv_sampling),
            grid: Array4::zeros((0, 0, 0, 0)),
            sum_weights: Array2::zeros((geometry.num_chans(), geometry.num_pols())),
            beam: None,
            state: FtState::Idle,
            num_off_grid: 0,
            geometry,
            settings,
            padded_nx,
            padded_ny,
            store,
        })
    }

    /// Account for a primary beam in weight images.
    pub fn with_beam(mut self, beam: PointedBeam) -> WOnlyProjectFt {
        self.beam = Some(beam);
        self
    }

    pub fn beam(&self) -> Option<&PointedBeam> {
        self.beam.as_ref()
    }

    pub fn settings(&self) -> &WProjectionSettings {
        &self.settings
    }

    /// `(nx, ny)` of the uv grid.
    pub fn padded_size(&self) -> (usize, usize) {
        (self.padded_nx, self.padded_ny)
    }

    pub fn conv_func_store(&self) -> &ConvFuncStore<WOnlyConvFuncGenerator> {
        &self.store
    }

    /// The number of samples skipped because their kernel fell off the grid
    /// since the last initialisation.
    pub fn num_off_grid(&self) -> usize {
        self.num_off_grid
    }

    fn check_state(&self, expected: FtState, operation: &'static str) -> Result<(), GriddingError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GriddingError::WrongState {
                expected: match expected {
                    FtState::ToSky => "imaging",
                    FtState::ToVis => "prediction",
                    FtState::Idle => "nothing",
                },
                operation,
            })
        }
    }

    fn chan_map(&self, vb: &VisBuffer) -> Vec<Option<usize>> {
        vb.freqs_hz
            .iter()
            .map(|&f| self.geometry.chan_for_freq(f))
            .collect()
    }

    fn pol_map(&self, vb: &VisBuffer) -> Result<PolarisationMap, GriddingError> {
        let map = polarisation_map(&vb.corrs, &self.geometry.pols);
        if map.iter().all(|planes| planes.is_empty()) {
            return Err(GriddingError::NoPolarisationOverlap(vb.num_corrs()));
        }
        Ok(map)
    }

    fn skip_row(&self, vb: &VisBuffer, row: usize) -> bool {
        vb.flag_row[row] || (!self.settings.use_autos && vb.is_auto(row))
    }

    fn grid_position(&self, cf: &WTermConvFunc, u: f64, v: f64, w: f64) -> Option<GridPosition> {
        let s = cf.sampling() as f64;
        let pos = [
            u * self.uv_scale[0] + self.uv_offset[0],
            v * self.uv_scale[1] + self.uv_offset[1],
        ];
        let loc = [nint(pos[0]), nint(pos[1])];
        let off = [
            nint((loc[0] as f64 - pos[0]) * s),
            nint((loc[1] as f64 - pos[1]) * s),
        ];
        let w_plane = cf.w_plane(w);
        let support = cf.support(w_plane) as i64;
        let on_grid = loc[0] - support >= 0
            && loc[0] + support < self.padded_nx as i64
            && loc[1] - support >= 0
            && loc[1] + support < self.padded_ny as i64;
        on_grid.then_some(GridPosition {
            loc,
            off,
            w_plane,
            support,
            conjugate: w < 0.0,
        })
    }
}

/// Spread `value` onto a grid plane. Returns the sum of the real parts of the
/// kernel taps used.
fn grid_sample(
    mut grid: ArrayViewMut2<c64>,
    cf: &WTermConvFunc,
    p: &GridPosition,
    value: c64,
) -> f64 {
    let s = cf.sampling() as i64;
    let mut norm = 0.0;
    for iy in -p.support..=p.support {
        let tap_v = (iy * s + p.off[1]).unsigned_abs() as usize;
        let gy = (p.loc[1] + iy) as usize;
        for ix in -p.support..=p.support {
            let tap_u = (ix * s + p.off[0]).unsigned_abs() as usize;
            let gx = (p.loc[0] + ix) as usize;
            let mut tap = cf.tap(p.w_plane, tap_u, tap_v);
            if p.conjugate {
                tap = tap.conj();
            }
            grid[(gy, gx)] += value * tap;
            norm += tap.re;
        }
    }
    norm
}

/// Interpolate a grid plane at a position with the conjugate of the gridding
/// kernel, normalised by the kernel sum.
fn degrid_sample(grid: ArrayView2<c64>, cf: &WTermConvFunc, p: &GridPosition) -> c64 {
    let s = cf.sampling() as i64;
    let mut sum = c64::default();
    let mut norm = 0.0;
    for iy in -p.support..=p.support {
        let tap_v = (iy * s + p.off[1]).unsigned_abs() as usize;
        let gy = (p.loc[1] + iy) as usize;
        for ix in -p.support..=p.support {
            let tap_u = (ix * s + p.off[0]).unsigned_abs() as usize;
            let gx = (p.loc[0] + ix) as usize;
            let mut tap = cf.tap(p.w_plane, tap_u, tap_v);
            if !p.conjugate {
                tap = tap.conj();
            }
            sum += grid[(gy, gx)] * tap;
            norm += tap.re;
        }
    }
    if norm != 0.0 {
        sum / norm
    } else {
        c64::default()
    }
}

impl FtMachine for WOnlyProjectFt {
    fn name(&self) -> &'static str {
        "WOnlyProjectFT"
    }

    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    fn initialize_to_sky(&mut self) -> Result<(), GriddingError> {
        let (num_chans, num_pols, _, _) = self.geometry.shape();
        self.grid = Array4::zeros((num_chans, num_pols, self.padded_ny, self.padded_nx));
        self.sum_weights.fill(0.0);
        self.num_off_grid = 0;
        self.state = FtState::ToSky;
        Ok(())
    }

    fn put(&mut self, vb: &VisBuffer, column: VisColumn, do_psf: bool) -> Result<(), GriddingError> {
        self.check_state(FtState::ToSky, "gridding")?;
        vb.validate()?;

        let chan_map = self.chan_map(vb);
        let pol_map = self.pol_map(vb)?;
        let shift = PhaseShift::new(vb, &self.geometry);
        let data = vb.column(column);
        let one = c64::new(1.0, 0.0);
        let mut num_off_grid = 0;

        for row in 0..vb.num_rows() {
            if self.skip_row(vb, row) {
                continue;
            }
            let cf = self.store.get(vb.parallactic_angles[row], 0)?;
            let UVW { u, v, w } = vb.uvws[row];

            for (i_chan, (&freq, image_chan)) in vb.freqs_hz.iter().zip(chan_map.iter()).enumerate() {
                let Some(image_chan) = *image_chan else {
                    continue;
                };
                let scale = freq / VEL_C;
                let (u, v, w) = (u * scale, v * scale, w * scale);
                let Some(position) = self.grid_position(&cf, u, v, w) else {
                    num_off_grid += 1;
                    continue;
                };
                let phasor = shift.map(|s| s.phasor(u, v, w)).unwrap_or(one);

                for (i_corr, planes) in pol_map.iter().enumerate() {
                    let weight = vb.weights[(row, i_chan, i_corr)] as f64;
                    if vb.flags[(row, i_chan, i_corr)] || !(weight > 0.0) {
                        continue;
                    }
                    let vis = if do_psf {
                        one
                    } else {
                        let vis = data[(row, i_chan, i_corr)];
                        c64::new(vis.re as f64, vis.im as f64) * phasor
                    };

                    for &(i_pol, coef) in planes {
                        let factor = if do_psf { one } else { coef.conj() };
                        let norm = grid_sample(
                            self.grid.slice_mut(s![image_chan, i_pol, .., ..]),
                            &cf,
                            &position,
                            vis * factor * weight,
                        );
                        self.sum_weights[(image_chan, i_pol)] += weight * norm;
                    }
                }
            }
        }

        if num_off_grid > 0 {
            debug!("{num_off_grid} samples fell off the uv grid and were not gridded");
        }
        self.num_off_grid += num_off_grid;
        Ok(())
    }

    fn get_image(&mut self, normalize: bool) -> Result<Array4<f32>, GriddingError> {
        self.check_state(FtState::ToSky, "making an image")?;

        let (nx, ny) = (self.geometry.nx, self.geometry.ny);
        let x0 = (self.padded_nx - nx) / 2;
        let y0 = (self.padded_ny - ny) / 2;
        let mut image = self.geometry.zeros();
        let fft = &self.fft;
        let (correction_x, correction_y) = (&self.correction_x, &self.correction_y);

        image
            .outer_iter_mut()
            .into_par_iter()
            .zip(self.grid.outer_iter_mut().into_par_iter())
            .zip(self.sum_weights.outer_iter().into_par_iter())
            .for_each(|((mut image_chan, mut grid_chan), weights)| {
                for ((mut image_plane, mut grid_plane), &weight) in image_chan
                    .outer_iter_mut()
                    .zip(grid_chan.outer_iter_mut())
                    .zip(weights.iter())
                {
                    if normalize && weight == 0.0 {
                        // Nothing was gridded; leave the image plane zeroed.
                        continue;
                    }
                    fft.inverse_centred(grid_plane.view_mut());
                    let norm = if normalize { 1.0 / weight } else { 1.0 };
                    for ((y, x), pixel) in image_plane.indexed_iter_mut() {
                        let (gy, gx) = (y0 + y, x0 + x);
                        let correction = correction_x[gx] * correction_y[gy];
                        *pixel = (grid_plane[(gy, gx)].re * norm / correction) as f32;
                    }
                }
            });

        for ((i_chan, i_pol), weight) in self.sum_weights.indexed_iter() {
            if *weight == 0.0 {
                warn!(
                    "No visibilities were gridded into image channel {i_chan} polarisation {}",
                    self.geometry.pols[i_pol]
                );
            }
        }

        // The grid has been transformed in place; it can't be used again.
        self.grid = Array4::zeros((0, 0, 0, 0));
        self.state = FtState::Idle;
        Ok(image)
    }

    fn sum_weights(&self) -> ArrayView2<f64> {
        self.sum_weights.view()
    }

    fn get_weight_image(&self) -> Array4<f32> {
        let mut weights = self.geometry.zeros();
        let pb = self.beam.as_ref().map(|b| b.image(&self.geometry));
        for ((i_chan, i_pol), &sum) in self.sum_weights.indexed_iter() {
            let mut plane = weights.slice_mut(s![i_chan, i_pol, .., ..]);
            match &pb {
                Some(pb) => {
                    ndarray::Zip::from(&mut plane)
                        .and(pb.slice(s![i_chan, .., ..]))
                        .for_each(|w, &b| *w = (sum * (b as f64).powi(2)) as f32);
                }
                None => plane.fill(sum as f32),
            }
        }
        weights
    }

    fn initialize_to_vis(&mut self, model: ArrayView4<f32>) -> Result<(), GriddingError> {
        if model.dim() != self.geometry.shape() {
            return Err(ImageError::ShapeMismatch {
                expected: self.geometry.shape(),
                got: model.dim(),
            }
            .into());
        }

        let (num_chans, num_pols, ny, nx) = self.geometry.shape();
        let x0 = (self.padded_nx - nx) / 2;
        let y0 = (self.padded_ny - ny) / 2;
        let mut grid = Array4::zeros((num_chans, num_pols, self.padded_ny, self.padded_nx));
        let fft = &self.fft;
        let (correction_x, correction_y) = (&self.correction_x, &self.correction_y);

        grid.outer_iter_mut()
            .into_par_iter()
            .zip(model.outer_iter().into_par_iter())
            .for_each(|(mut grid_chan, model_chan)| {
                for (mut grid_plane, model_plane) in
                    grid_chan.outer_iter_mut().zip(model_chan.outer_iter())
                {
                    for ((y, x), &pixel) in model_plane.indexed_iter() {
                        let (gy, gx) = (y0 + y, x0 + x);
                        let correction = correction_x[gx] * correction_y[gy];
                        grid_plane[(gy, gx)] = c64::new(pixel as f64 / correction, 0.0);
                    }
                    fft.forward_centred(grid_plane.view_mut());
                }
            });

        self.grid = grid;
        self.num_off_grid = 0;
        self.state = FtState::ToVis;
        Ok(())
    }

    fn get(&mut self, vb: &mut VisBuffer) -> Result<(), GriddingError> {
        self.check_state(FtState::ToVis, "degridding")?;
        vb.validate()?;

        let chan_map = self.chan_map(vb);
        let pol_map = self.pol_map(vb)?;
        let shift = PhaseShift::new(vb, &self.geometry);
        let num_pols = self.geometry.num_pols();
        let mut num_off_grid = 0;
        let mut plane_values = vec![c64::default(); num_pols];

        for row in 0..vb.num_rows() {
            let cf = self.store.get(vb.parallactic_angles[row], 0)?;
            let UVW { u, v, w } = vb.uvws[row];

            for (i_chan, (&freq, image_chan)) in vb.freqs_hz.iter().zip(chan_map.iter()).enumerate() {
                let mut model = vb.model.slice_mut(s![row, i_chan, ..]);
                model.fill(c32::default());
                let Some(image_chan) = *image_chan else {
                    continue;
                };
                let scale = freq / VEL_C;
                let (u, v, w) = (u * scale, v * scale, w * scale);
                let Some(position) = self.grid_position(&cf, u, v, w) else {
                    num_off_grid += 1;
                    continue;
                };
                let phasor = shift
                    .map(|s| s.phasor(u, v, w).conj())
                    .unwrap_or(c64::new(1.0, 0.0));

                for (i_pol, value) in plane_values.iter_mut().enumerate() {
                    *value = degrid_sample(
                        self.grid.slice(s![image_chan, i_pol, .., ..]),
                        &cf,
                        &position,
                    );
                }
                for (i_corr, planes) in pol_map.iter().enumerate() {
                    let vis: c64 = planes
                        .iter()
                        .map(|&(i_pol, coef)| coef * plane_values[i_pol])
                        .sum::<c64>()
                        * phasor;
                    model[i_corr] = c32::new(vis.re as f32, vis.im as f32);
                }
            }
        }

        if num_off_grid > 0 {
            trace!("{num_off_grid} samples fell off the uv grid and were not predicted");
        }
        self.num_off_grid += num_off_grid;
        Ok(())
    }

    fn finalize_to_vis(&mut self) {
        self.grid = Array4::zeros((0, 0, 0, 0));
        self.state = FtState::Idle;
    }
}
