// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The multi-scale CLEAN minor cycle on a single image plane.
//!
//! Every scale keeps its own residual, the dirty image smoothed by that
//! scale. Each iteration picks the scale whose (PSF-normalised, biased) peak
//! is largest, adds a component of that scale to the model and subtracts the
//! PSF smoothed by both scales from every scale's residual.

use log::{debug, trace};
use marlu::c64;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::{
    scales::{scale_biases, scale_kernel, verify_scales},
    CleanError,
};
use crate::{
    constants::{DEFAULT_GAIN, DEFAULT_NITER, DEFAULT_THRESHOLD, MINOR_CYCLE_DIVERGENCE_FACTOR},
    math::Fft2d,
};

/// What a minor cycle is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleanControls {
    /// The maximum number of components.
    pub niter: usize,

    /// The fraction of each optimum component that is removed.
    pub gain: f64,

    /// Stop once the optimum component is weaker than this \[Jy\].
    pub threshold: f64,

    /// Stop when the largest scale's optimum component is negative.
    pub stop_large_scale_negative: bool,

    /// Stop after this many consecutive point-scale components. 0 disables
    /// the check. It is only used when there is more than one scale.
    pub stop_point_mode: usize,
}

impl Default for CleanControls {
    fn default() -> Self {
        CleanControls {
            niter: DEFAULT_NITER,
            gain: DEFAULT_GAIN,
            threshold: DEFAULT_THRESHOLD,
            stop_large_scale_negative: false,
            stop_point_mode: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CleanStopReason {
    /// `niter` components were found.
    #[strum(serialize = "iteration limit reached")]
    Niter,

    #[strum(serialize = "threshold reached")]
    Threshold,

    #[strum(serialize = "largest scale went negative")]
    LargeScaleNegative,

    #[strum(serialize = "only point components remain")]
    PointMode,

    #[strum(serialize = "diverging")]
    Diverged,
}

#[derive(Debug, Clone)]
pub struct CleanResult {
    pub iterations: usize,

    /// The flux density of all components found by this run \[Jy\].
    pub total_flux: f64,

    /// The flux density found at each scale \[Jy\].
    pub flux_by_scale: Vec<f64>,

    pub stop_reason: CleanStopReason,

    /// The largest absolute (unsmoothed) residual left inside the mask.
    pub peak_residual: f64,
}

/// A scale component, cropped to where it's non-zero.
#[derive(Debug, Clone)]
struct Component {
    values: Array2<f64>,
    /// `(y, x)` of the component's centre within `values`.
    centre: (usize, usize),
}

impl Component {
    fn new(full: Array2<f64>) -> Component {
        let (ny, nx) = full.dim();
        let (cy, cx) = (ny / 2, nx / 2);
        let mut reach = 0;
        for ((y, x), &v) in full.indexed_iter() {
            if v != 0.0 {
                reach = reach.max(y.abs_diff(cy)).max(x.abs_diff(cx));
            }
        }
        let values = full
            .slice(s![cy - reach..=cy + reach, cx - reach..=cx + reach])
            .to_owned();
        Component {
            values,
            centre: (reach, reach),
        }
    }
}

/// `target[pos + d] += factor * source[centre + d]` for every offset `d` that
/// is in bounds for both arrays.
fn add_shifted(
    mut target: ArrayViewMut2<f64>,
    source: ArrayView2<f64>,
    pos: (usize, usize),
    centre: (usize, usize),
    factor: f64,
) {
    let overlap = |target_len: usize, source_len: usize, pos: usize, centre: usize| {
        let before = pos.min(centre);
        let after = (target_len - 1 - pos).min(source_len - 1 - centre);
        (pos - before..=pos + after, centre - before..=centre + after)
    };
    let (ty, sy) = overlap(target.len_of(Axis(0)), source.len_of(Axis(0)), pos.0, centre.0);
    let (tx, sx) = overlap(target.len_of(Axis(1)), source.len_of(Axis(1)), pos.1, centre.1);
    target
        .slice_mut(s![ty, tx])
        .scaled_add(factor, &source.slice(s![sy, sx]));
}

/// The signed value and `(y, x)` position of the largest absolute value.
fn find_peak(image: ArrayView2<f64>, mask: Option<&Array2<bool>>) -> (f64, (usize, usize)) {
    let mut best = (0.0_f64, (0, 0));
    for ((y, x), &v) in image.indexed_iter() {
        if let Some(mask) = mask {
            if !mask[(y, x)] {
                continue;
            }
        }
        if v.abs() > best.0.abs() {
            best = (v, (y, x));
        }
    }
    best
}

/// The index of the pair of scales `(s, t)` into the row-major upper triangle
/// of an `n` by `n` matrix.
fn cross_index(n: usize, s: usize, t: usize) -> usize {
    let (s, t) = if s <= t { (s, t) } else { (t, s) };
    s * n - s * s.saturating_sub(1) / 2 - s + t
}

pub struct MultiScaleCleaner {
    nx: usize,
    ny: usize,
    fft: Fft2d,

    scales: Vec<f64>,
    biases: Vec<f64>,
    components: Vec<Component>,
    kernel_fts: Vec<Array2<c64>>,

    /// `(y, x)` of the PSF peak. Cross terms are subtracted relative to this.
    psf_peak_pos: (usize, usize),
    /// The peak of the PSF smoothed twice by each scale.
    psf_peaks: Vec<f64>,
    /// The PSF smoothed by scales `s` and `t`, for `s <= t`.
    cross_terms: Vec<Array2<f64>>,

    mask: Option<Array2<bool>>,
    residuals: Vec<Array2<f64>>,
    model: Array2<f64>,
}

impl MultiScaleCleaner {
    /// Prepare to clean images with a PSF. Scale sizes are in pixels; scales
    /// larger than half the image are dropped.
    pub fn new(
        psf: ArrayView2<f32>,
        scales: &[f64],
        small_scale_bias: f64,
    ) -> Result<MultiScaleCleaner, CleanError> {
        let (ny, nx) = psf.dim();
        if nx % 2 == 1 || ny % 2 == 1 || nx < 2 || ny < 2 {
            return Err(CleanError::OddShape((ny, nx)));
        }
        let scales = verify_scales(scales, nx, ny)?;
        let biases = scale_biases(&scales, small_scale_bias);

        let psf = psf.mapv(|v| v as f64);
        let (peak, psf_peak_pos) = psf
            .indexed_iter()
            .fold((f64::MIN, (0, 0)), |acc, (pos, &v)| if v > acc.0 { (v, pos) } else { acc });
        if !(peak > 0.0) {
            return Err(CleanError::PsfNotPositive(peak));
        }

        let fft = Fft2d::new(nx, ny);
        let full_kernels: Vec<Array2<f64>> =
            scales.iter().map(|&s| scale_kernel(nx, ny, s)).collect();
        let kernel_fts: Vec<Array2<c64>> = full_kernels
            .iter()
            .map(|k| fft.forward_real_centred(k.view()))
            .collect();
        let psf_ft = fft.forward_real_centred(psf.view());

        let num_scales = scales.len();
        let mut cross_terms = Vec::with_capacity(num_scales * (num_scales + 1) / 2);
        for s in 0..num_scales {
            for t in s..num_scales {
                let product = &psf_ft * &kernel_fts[s] * &kernel_fts[t];
                cross_terms.push(fft.inverse_real_centred(product));
            }
        }

        let mut cleaner = MultiScaleCleaner {
            nx,
            ny,
            fft,
            components: full_kernels.into_iter().map(Component::new).collect(),
            kernel_fts,
            psf_peak_pos,
            psf_peaks: vec![],
            cross_terms,
            mask: None,
            residuals: vec![],
            model: Array2::zeros((ny, nx)),
            scales,
            biases,
        };
        for (s, &size) in cleaner.scales.iter().enumerate() {
            let smoothed = cleaner.cross_term(s, s);
            let peak = smoothed.fold(f64::MIN, |acc, &v| acc.max(v));
            if !(peak > 0.0) {
                return Err(CleanError::ScalePsfNotPositive { scale: size, peak });
            }
            debug!(
                "Scale {s}: {size:.2} pixels, bias {:.3}, smoothed PSF peak {peak:.4}",
                cleaner.biases[s]
            );
            cleaner.psf_peaks.push(peak);
        }
        Ok(cleaner)
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn scale_biases(&self) -> &[f64] {
        &self.biases
    }

    fn cross_term(&self, s: usize, t: usize) -> ArrayView2<f64> {
        self.cross_terms[cross_index(self.scales.len(), s, t)].view()
    }

    /// Only clean pixels where the mask is above 0.5. `None` cleans
    /// everywhere.
    pub fn set_mask(&mut self, mask: Option<ArrayView2<f32>>) -> Result<(), CleanError> {
        self.mask = match mask {
            Some(mask) => {
                if mask.dim() != (self.ny, self.nx) {
                    return Err(CleanError::ShapeMismatch {
                        psf: (self.ny, self.nx),
                        image: mask.dim(),
                    });
                }
                Some(mask.mapv(|v| v > 0.5))
            }
            None => None,
        };
        Ok(())
    }

    /// Set the image to be cleaned. This resets the model.
    pub fn set_dirty(&mut self, dirty: ArrayView2<f32>) -> Result<(), CleanError> {
        if dirty.dim() != (self.ny, self.nx) {
            return Err(CleanError::ShapeMismatch {
                psf: (self.ny, self.nx),
                image: dirty.dim(),
            });
        }
        let dirty = dirty.mapv(|v| v as f64);
        let dirty_ft = self.fft.forward_real(dirty.view());
        self.residuals = self
            .scales
            .iter()
            .zip(self.kernel_fts.iter())
            .map(|(&size, kernel_ft)| {
                if size == 0.0 {
                    dirty.clone()
                } else {
                    self.fft.inverse_real(&dirty_ft * kernel_ft)
                }
            })
            .collect();
        self.model.fill(0.0);
        Ok(())
    }

    /// The components found since the last [`MultiScaleCleaner::set_dirty`].
    pub fn model(&self) -> ArrayView2<f64> {
        self.model.view()
    }

    /// The unsmoothed residual image.
    pub fn residual(&self) -> Option<ArrayView2<f64>> {
        self.residuals.first().map(|r| r.view())
    }

    pub fn clean(&mut self, controls: &CleanControls) -> Result<CleanResult, CleanError> {
        if self.residuals.is_empty() {
            return Err(CleanError::NoDirtyImage);
        }
        if !(controls.gain > 0.0 && controls.gain <= 1.0) {
            return Err(CleanError::BadGain(controls.gain));
        }

        let num_scales = self.scales.len();
        let mut flux_by_scale = vec![0.0; num_scales];
        let mut first_strength: Option<f64> = None;
        let mut consecutive_points = 0;
        let mut iterations = 0;
        let mut stop_reason = CleanStopReason::Niter;

        while iterations < controls.niter {
            let mut optimum = 0;
            let mut optimum_biased = 0.0;
            let mut peaks = Vec::with_capacity(num_scales);
            for s in 0..num_scales {
                let (value, pos) = find_peak(self.residuals[s].view(), self.mask.as_ref());
                let normalised = value / self.psf_peaks[s];
                let biased = normalised * self.biases[s];
                if s == 0 || biased.abs() > optimum_biased {
                    optimum = s;
                    optimum_biased = biased.abs();
                }
                peaks.push((normalised, pos));
            }
            let (strength, position) = peaks[optimum];

            if strength.abs() <= controls.threshold || strength == 0.0 {
                stop_reason = CleanStopReason::Threshold;
                break;
            }
            if controls.stop_large_scale_negative
                && num_scales > 1
                && optimum == num_scales - 1
                && strength < 0.0
            {
                stop_reason = CleanStopReason::LargeScaleNegative;
                break;
            }
            let first = *first_strength.get_or_insert(strength.abs());
            if strength.abs() > MINOR_CYCLE_DIVERGENCE_FACTOR * first {
                stop_reason = CleanStopReason::Diverged;
                break;
            }

            let factor = controls.gain * strength;
            let component = &self.components[optimum];
            add_shifted(
                self.model.view_mut(),
                component.values.view(),
                position,
                component.centre,
                factor,
            );
            for s in 0..num_scales {
                add_shifted(
                    self.residuals[s].view_mut(),
                    self.cross_terms[cross_index(num_scales, s, optimum)].view(),
                    position,
                    self.psf_peak_pos,
                    -factor,
                );
            }
            flux_by_scale[optimum] += factor;
            iterations += 1;
            trace!(
                "Iteration {iterations}: scale {optimum} at {position:?}, {factor:.4e} Jy"
            );

            if optimum == 0 {
                consecutive_points += 1;
            } else {
                consecutive_points = 0;
            }
            if controls.stop_point_mode > 0
                && num_scales > 1
                && consecutive_points >= controls.stop_point_mode
            {
                stop_reason = CleanStopReason::PointMode;
                break;
            }
        }

        let (peak_residual, _) = find_peak(self.residuals[0].view(), self.mask.as_ref());
        let total_flux = flux_by_scale.iter().sum();
        debug!(
            "Minor cycle: {iterations} iterations, {total_flux:.4} Jy, stopped because {stop_reason}"
        );
        Ok(CleanResult {
            iterations,
            total_flux,
            flux_by_scale,
            stop_reason,
            peak_residual: peak_residual.abs(),
        })
    }
}
