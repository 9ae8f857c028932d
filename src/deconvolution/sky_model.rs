// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The major/minor cycle loop over all fields of a multi-field, multi-scale
//! image.

use std::borrow::Cow;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use ndarray::{prelude::*, Zip};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::{
    cleaner::{CleanControls, CleanStopReason, MultiScaleCleaner},
    psf::{convolve, fit_gaussian_psf, gaussian_kernel, psf_sidelobe_level, CleanBeam},
    CleanError,
};
use crate::{
    constants::{
        DEFAULT_CYCLE_FACTOR, DEFAULT_CYCLE_MAX_PSF_FRACTION, DEFAULT_GAIN,
        DEFAULT_MAX_MAJOR_CYCLES, DEFAULT_NITER, DEFAULT_SCALES, DEFAULT_SMALL_SCALE_BIAS,
        DEFAULT_STOP_POINT_MODE, DEFAULT_THRESHOLD, MAJOR_CYCLE_DIVERGENCE_FACTOR,
        MAJOR_CYCLE_WARNING_FACTOR,
    },
    equation::SkyEquation,
    image::ImageGeometry,
    math::Fft2d,
    printers::InfoPrinter,
};

/// How residual images are recomputed between major cycles.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResidualMode {
    /// Predict the model, subtract it from the visibilities and re-image.
    #[default]
    #[strum(serialize = "visibility")]
    Visibility,

    /// Subtract the model convolved with the PSF from the dirty image. A final
    /// residual is still made from the visibilities.
    #[strum(serialize = "xfr")]
    Xfr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanSettings {
    /// Scale sizes \[pixels\].
    pub scales: Vec<f64>,

    /// The maximum number of components over all major cycles and planes.
    pub niter: usize,

    pub gain: f64,

    /// The global stopping threshold \[Jy\].
    pub threshold: f64,

    pub cycle_factor: f64,

    pub cycle_max_psf_fraction: f64,

    pub small_scale_bias: f64,

    pub stop_large_scale_negative: bool,

    pub stop_point_mode: usize,

    pub residual_mode: ResidualMode,

    pub max_major_cycles: usize,
}

impl Default for CleanSettings {
    fn default() -> Self {
        CleanSettings {
            scales: DEFAULT_SCALES.to_vec(),
            niter: DEFAULT_NITER,
            gain: DEFAULT_GAIN,
            threshold: DEFAULT_THRESHOLD,
            cycle_factor: DEFAULT_CYCLE_FACTOR,
            cycle_max_psf_fraction: DEFAULT_CYCLE_MAX_PSF_FRACTION,
            small_scale_bias: DEFAULT_SMALL_SCALE_BIAS,
            stop_large_scale_negative: false,
            stop_point_mode: DEFAULT_STOP_POINT_MODE,
            residual_mode: ResidualMode::default(),
            max_major_cycles: DEFAULT_MAX_MAJOR_CYCLES,
        }
    }
}

/// The images of a single field. All `Array4`s are `[chan, pol, y, x]`.
#[derive(Debug, Clone)]
pub struct FieldImages {
    pub geometry: ImageGeometry,
    pub model: Array4<f32>,
    pub residual: Array4<f32>,
    pub psf: Array4<f32>,

    /// Pixels above 0.5 may be cleaned. Shaped `[y, x]`.
    pub mask: Option<Array2<f32>>,

    /// The restoring beam, fitted to the PSF by
    /// [`MfMsCleanImageSkyModel::solve`].
    pub beam: Option<CleanBeam>,

    /// The dirty image, kept for XFR residuals.
    dirty: Option<Array4<f32>>,
}

impl FieldImages {
    pub fn new(geometry: ImageGeometry) -> FieldImages {
        FieldImages {
            model: geometry.zeros(),
            residual: geometry.zeros(),
            psf: geometry.zeros(),
            mask: None,
            beam: None,
            dirty: None,
            geometry,
        }
    }

    pub fn with_mask(mut self, mask: Array2<f32>) -> FieldImages {
        self.mask = Some(mask);
        self
    }

    /// Start cleaning from an existing model.
    pub fn with_model(mut self, model: Array4<f32>) -> FieldImages {
        self.model = model;
        self
    }

    fn check_shapes(&self, field: usize) -> Result<(), CleanError> {
        let expected = self.geometry.shape();
        for got in [self.model.dim(), self.residual.dim(), self.psf.dim()] {
            if got != expected {
                return Err(CleanError::FieldShape {
                    field,
                    expected,
                    got,
                });
            }
        }
        if let Some(mask) = &self.mask {
            let (ny, nx) = mask.dim();
            if (ny, nx) != (self.geometry.ny, self.geometry.nx) {
                return Err(CleanError::FieldShape {
                    field,
                    expected,
                    got: (expected.0, expected.1, ny, nx),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SolveStopReason {
    #[strum(serialize = "peak residual below threshold")]
    Threshold,

    #[strum(serialize = "iteration limit reached")]
    Niter,

    #[strum(serialize = "major cycle limit reached")]
    MaxMajorCycles,

    #[strum(serialize = "peak residual diverging")]
    Diverged,

    #[strum(serialize = "no plane could be cleaned further")]
    NoProgress,
}

#[derive(Debug, Clone)]
pub struct SolveSummary {
    pub major_cycles: usize,
    pub iterations: usize,

    /// Did the peak residual reach the threshold?
    pub converged: bool,

    pub stop_reason: SolveStopReason,

    /// The largest absolute residual over all fields at the end \[Jy/beam\].
    pub peak_residual: f64,
}

/// The (max, min) of a residual plane inside the mask.
fn masked_extrema(plane: ArrayView2<f32>, mask: Option<&Array2<f32>>) -> (f32, f32) {
    let mut extrema = (f32::MIN, f32::MAX);
    for ((y, x), &v) in plane.indexed_iter() {
        if mask.map(|m| m[(y, x)] > 0.5).unwrap_or(true) {
            extrema = (extrema.0.max(v), extrema.1.min(v));
        }
    }
    if extrema.0 < extrema.1 {
        (0.0, 0.0)
    } else {
        extrema
    }
}

fn abs_max(extrema: (f32, f32)) -> f64 {
    extrema.0.abs().max(extrema.1.abs()) as f64
}

/// A multi-field, multi-scale CLEAN sky model.
pub struct MfMsCleanImageSkyModel {
    fields: Vec<FieldImages>,
    settings: CleanSettings,
    max_sidelobe: f64,
    draw_progress_bars: bool,
    solved: bool,
}

impl MfMsCleanImageSkyModel {
    pub fn new(fields: Vec<FieldImages>, settings: CleanSettings) -> MfMsCleanImageSkyModel {
        MfMsCleanImageSkyModel {
            fields,
            settings,
            max_sidelobe: 0.0,
            draw_progress_bars: false,
            solved: false,
        }
    }

    pub fn with_progress_bars(mut self, draw_progress_bars: bool) -> MfMsCleanImageSkyModel {
        self.draw_progress_bars = draw_progress_bars;
        self
    }

    pub fn fields(&self) -> &[FieldImages] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<FieldImages> {
        self.fields
    }

    pub fn settings(&self) -> &CleanSettings {
        &self.settings
    }

    /// The largest PSF sidelobe over all fields, as a fraction of the peak.
    pub fn max_sidelobe(&self) -> f64 {
        self.max_sidelobe
    }

    fn global_peak(&self) -> f64 {
        self.fields
            .iter()
            .flat_map(|f| {
                let mask = f.mask.as_ref();
                f.residual
                    .outer_iter()
                    .flat_map(move |chan| {
                        chan.outer_iter()
                            .map(|plane| abs_max(masked_extrema(plane, mask)))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
            .fold(0.0, f64::max)
    }

    fn make_psfs(&mut self, eq: &mut dyn SkyEquation) -> Result<(), CleanError> {
        let mut printer = InfoPrinter::new("PSFs".into());
        self.max_sidelobe = 0.0;
        for (i_field, field) in self.fields.iter_mut().enumerate() {
            field.psf = eq.make_psf(i_field)?;

            let mut beam = None;
            for chan in field.psf.outer_iter() {
                for plane in chan.outer_iter() {
                    let sidelobe = psf_sidelobe_level(plane);
                    self.max_sidelobe = self.max_sidelobe.max(sidelobe);
                    if beam.is_none() && plane.iter().any(|&v| v > 0.0) {
                        beam = Some(fit_gaussian_psf(
                            plane,
                            field.geometry.cell_x,
                            field.geometry.cell_y,
                        )?);
                    }
                }
            }
            let beam = beam.ok_or(CleanError::PsfNotPositive(0.0))?;
            printer.push_line(
                format!(
                    "Field {i_field}: beam {:.2}\" x {:.2}\", PA {:.1}°",
                    beam.major_rad.to_degrees() * 3600.0,
                    beam.minor_rad.to_degrees() * 3600.0,
                    beam.pa_rad.to_degrees()
                )
                .into(),
            );
            field.beam = Some(beam);
        }
        printer.push_line(format!("Max. PSF sidelobe: {:.3}", self.max_sidelobe).into());
        printer.display();
        Ok(())
    }

    fn update_residuals(
        &mut self,
        eq: &mut dyn SkyEquation,
        mode: ResidualMode,
    ) -> Result<(), CleanError> {
        match mode {
            ResidualMode::Visibility => {
                let models: Vec<ArrayView4<f32>> = self.fields.iter().map(|f| f.model.view()).collect();
                let residuals = eq.make_residuals(&models)?;
                for (field, residual) in self.fields.iter_mut().zip(residuals) {
                    field.residual = residual;
                }
            }

            ResidualMode::Xfr => {
                for field in self.fields.iter_mut() {
                    let fft = Fft2d::new(field.geometry.nx, field.geometry.ny);
                    let dirty = match field.dirty.as_ref() {
                        Some(d) => d,
                        None => continue,
                    };
                    let (num_chans, num_pols, _, _) = field.geometry.shape();
                    for i_chan in 0..num_chans {
                        for i_pol in 0..num_pols {
                            let smeared = convolve(
                                &fft,
                                field.model.slice(s![i_chan, i_pol, .., ..]).mapv(|v| v as f64).view(),
                                field.psf.slice(s![i_chan, i_pol, .., ..]).mapv(|v| v as f64).view(),
                            );
                            Zip::from(field.residual.slice_mut(s![i_chan, i_pol, .., ..]))
                                .and(dirty.slice(s![i_chan, i_pol, .., ..]))
                                .and(&smeared)
                                .for_each(|r, &d, &s| *r = d - s as f32);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Deconvolve every field. PSFs and clean beams are made first, then
    /// major cycles alternate between minor cycles on each image plane and
    /// recomputing the residuals.
    pub fn solve(&mut self, eq: &mut dyn SkyEquation) -> Result<SolveSummary, CleanError> {
        if eq.num_fields() != self.fields.len() {
            return Err(CleanError::FieldCount {
                equation: eq.num_fields(),
                model: self.fields.len(),
            });
        }
        for (i_field, field) in self.fields.iter().enumerate() {
            if eq.geometry(i_field).shape() != field.geometry.shape() {
                return Err(CleanError::FieldShape {
                    field: i_field,
                    expected: field.geometry.shape(),
                    got: eq.geometry(i_field).shape(),
                });
            }
            field.check_shapes(i_field)?;
        }
        let settings = self.settings.clone();

        self.make_psfs(eq)?;
        self.update_residuals(eq, ResidualMode::Visibility)?;
        if settings.residual_mode == ResidualMode::Xfr {
            // dirty = residual + PSF * model
            for field in self.fields.iter_mut() {
                field.dirty = Some(field.residual.clone());
            }
            if self.fields.iter().any(|f| f.model.iter().any(|&v| v != 0.0)) {
                let zero_models: Vec<Array4<f32>> =
                    self.fields.iter().map(|f| f.geometry.zeros()).collect();
                let views: Vec<ArrayView4<f32>> = zero_models.iter().map(|m| m.view()).collect();
                let dirty = eq.make_residuals(&views)?;
                for (field, dirty) in self.fields.iter_mut().zip(dirty) {
                    field.dirty = Some(dirty);
                }
            }
        }

        // One cleaner per field and image plane, made when first needed.
        let mut cleaners: Vec<Vec<Option<MultiScaleCleaner>>> = self
            .fields
            .iter()
            .map(|f| (0..f.geometry.num_chans() * f.geometry.num_pols()).map(|_| None).collect())
            .collect();
        let mut retired: Vec<Vec<bool>> = self
            .fields
            .iter()
            .map(|f| {
                f.psf
                    .outer_iter()
                    .flat_map(|c| {
                        c.outer_iter()
                            .map(|p| !p.iter().any(|&v| v > 0.0))
                            .collect::<Vec<_>>()
                    })
                    .collect()
            })
            .collect();

        let progress = ProgressBar::with_draw_target(
            Some(settings.niter as u64),
            if self.draw_progress_bars {
                ProgressDrawTarget::stdout()
            } else {
                ProgressDrawTarget::hidden()
            },
        )
        .with_style(
            ProgressStyle::default_bar()
                .template("{msg:17}: [{wide_bar:.blue}] {pos:3}/{len:3} components ({elapsed_precise}<{eta_precise})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        )
        .with_position(0)
        .with_message("Cleaning");

        let mut iterations = 0;
        let mut major_cycles = 0;
        let mut previous_peak: Option<f64> = None;
        let stop_reason = loop {
            let peak = self.global_peak();
            for (i_field, field) in self.fields.iter().enumerate() {
                for (i_chan, chan) in field.residual.outer_iter().enumerate() {
                    for (i_pol, plane) in chan.outer_iter().enumerate() {
                        let (max, min) = masked_extrema(plane, field.mask.as_ref());
                        debug!("Field {i_field} chan {i_chan} pol {i_pol}: residual max {max:.4e}, min {min:.4e}");
                    }
                }
            }

            if peak < settings.threshold || peak == 0.0 {
                break SolveStopReason::Threshold;
            }
            if iterations >= settings.niter {
                break SolveStopReason::Niter;
            }
            if major_cycles >= settings.max_major_cycles {
                break SolveStopReason::MaxMajorCycles;
            }
            if let Some(previous) = previous_peak {
                if peak > MAJOR_CYCLE_DIVERGENCE_FACTOR * previous {
                    warn!("Peak residual {peak:.4e} has grown by more than a factor of {MAJOR_CYCLE_DIVERGENCE_FACTOR} across major cycles; stopping");
                    break SolveStopReason::Diverged;
                }
                if peak > MAJOR_CYCLE_WARNING_FACTOR * previous {
                    warn!("Peak residual {peak:.4e} has grown across major cycles; it could be diverging");
                }
            }
            previous_peak = Some(peak);

            let fraction = (settings.cycle_factor * self.max_sidelobe)
                .min(settings.cycle_max_psf_fraction)
                .min(0.8);
            let cycle_threshold = settings.threshold.max(fraction * peak);
            let mut printer = InfoPrinter::new(format!("Major cycle {}", major_cycles + 1).into());
            printer.push_block(vec![
                format!("Peak residual: {peak:.4e} Jy").into(),
                format!("Cycle threshold: {cycle_threshold:.4e} Jy ({fraction:.3} of the peak)").into(),
            ]);

            let mut cycle_iterations = 0;
            'fields: for (i_field, field) in self.fields.iter_mut().enumerate() {
                let num_pols = field.geometry.num_pols();
                for i_plane in 0..cleaners[i_field].len() {
                    if retired[i_field][i_plane] {
                        continue;
                    }
                    let remaining = settings.niter - iterations;
                    if remaining == 0 {
                        break 'fields;
                    }
                    let (i_chan, i_pol) = (i_plane / num_pols, i_plane % num_pols);
                    let residual = field.residual.slice(s![i_chan, i_pol, .., ..]);
                    if abs_max(masked_extrema(residual, field.mask.as_ref())) < cycle_threshold {
                        continue;
                    }

                    let cleaner = match &mut cleaners[i_field][i_plane] {
                        Some(c) => c,
                        slot @ None => slot.insert(MultiScaleCleaner::new(
                            field.psf.slice(s![i_chan, i_pol, .., ..]),
                            &settings.scales,
                            settings.small_scale_bias,
                        )?),
                    };
                    cleaner.set_mask(field.mask.as_ref().map(|m| m.view()))?;
                    cleaner.set_dirty(residual)?;
                    let result = cleaner.clean(&CleanControls {
                        niter: remaining,
                        gain: settings.gain,
                        threshold: cycle_threshold,
                        stop_large_scale_negative: settings.stop_large_scale_negative,
                        stop_point_mode: settings.stop_point_mode,
                    })?;
                    field
                        .model
                        .slice_mut(s![i_chan, i_pol, .., ..])
                        .zip_mut_with(&cleaner.model(), |m, &c| *m += c as f32);

                    iterations += result.iterations;
                    cycle_iterations += result.iterations;
                    progress.inc(result.iterations as u64);
                    printer.push_line(Cow::Owned(format!(
                        "Field {i_field} chan {i_chan} pol {}: {} components, {:.4e} Jy, {}",
                        field.geometry.pols[i_pol],
                        result.iterations,
                        result.total_flux,
                        result.stop_reason
                    )));
                    match result.stop_reason {
                        CleanStopReason::LargeScaleNegative | CleanStopReason::PointMode => {
                            debug!("Field {i_field} plane {i_plane} is finished: {}", result.stop_reason);
                            retired[i_field][i_plane] = true;
                        }
                        CleanStopReason::Diverged => {
                            warn!("The minor cycle of field {i_field} plane {i_plane} started diverging; starting a new major cycle");
                        }
                        CleanStopReason::Niter | CleanStopReason::Threshold => (),
                    }
                }
            }
            printer.display();
            major_cycles += 1;

            self.update_residuals(eq, settings.residual_mode)?;
            if cycle_iterations == 0 {
                break SolveStopReason::NoProgress;
            }
        };
        progress.abandon();

        if settings.residual_mode == ResidualMode::Xfr && major_cycles > 0 {
            self.update_residuals(eq, ResidualMode::Visibility)?;
        }
        let peak_residual = self.global_peak();
        self.solved = true;

        let summary = SolveSummary {
            major_cycles,
            iterations,
            converged: stop_reason == SolveStopReason::Threshold,
            stop_reason,
            peak_residual,
        };
        info!(
            "Finished after {major_cycles} major cycle(s) and {iterations} component(s): {stop_reason}; peak residual {peak_residual:.4e} Jy"
        );
        Ok(summary)
    }

    /// The model of each field convolved with its clean beam, plus the
    /// residual.
    pub fn restore(&self) -> Result<Vec<Array4<f32>>, CleanError> {
        if !self.solved {
            return Err(CleanError::NotSolved);
        }
        self.fields
            .iter()
            .map(|field| {
                let beam = field.beam.as_ref().ok_or(CleanError::NotSolved)?;
                let geometry = &field.geometry;
                let kernel = gaussian_kernel(beam, geometry.nx, geometry.ny, geometry.cell_x, geometry.cell_y);
                let fft = Fft2d::new(geometry.nx, geometry.ny);
                let mut restored = field.residual.clone();
                let (num_chans, num_pols, _, _) = geometry.shape();
                for i_chan in 0..num_chans {
                    for i_pol in 0..num_pols {
                        let model = field.model.slice(s![i_chan, i_pol, .., ..]);
                        if model.iter().all(|&v| v == 0.0) {
                            continue;
                        }
                        let smoothed = convolve(&fft, model.mapv(|v| v as f64).view(), kernel.view());
                        restored
                            .slice_mut(s![i_chan, i_pol, .., ..])
                            .zip_mut_with(&smoothed, |r, &s| *r += s as f32);
                    }
                }
                Ok(restored)
            })
            .collect()
    }
}
