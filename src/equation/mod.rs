// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The measurement equation as seen by the deconvolution loop: turning
//! visibilities into PSFs and residual images, and model images into
//! visibilities.

mod error;
#[cfg(test)]
mod tests;

pub use error::EquationError;

use log::{debug, trace};
use marlu::c32;
use ndarray::prelude::*;

use crate::{
    gridding::FtMachine,
    image::ImageGeometry,
    vis::{VisBuffer, VisColumn},
};

pub trait SkyEquation {
    fn num_fields(&self) -> usize;

    fn geometry(&self, field: usize) -> &ImageGeometry;

    /// Image the weights of every visibility for a field.
    fn make_psf(&mut self, field: usize) -> Result<Array4<f32>, EquationError>;

    /// The sensitivity image of a field, available after
    /// [`SkyEquation::make_psf`].
    fn weight_image(&self, field: usize) -> Array4<f32>;

    /// Predict the model images of every field into the model column of the
    /// visibilities, summing over fields.
    fn predict(&mut self, models: &[ArrayView4<f32>]) -> Result<(), EquationError>;

    /// Subtract the predicted models from the observed visibilities and image
    /// the result for every field.
    fn make_residuals(
        &mut self,
        models: &[ArrayView4<f32>],
    ) -> Result<Vec<Array4<f32>>, EquationError>;
}

/// A sky equation evaluated by gridding and degridding visibilities, with one
/// FT machine per field.
pub struct VisSkyEquation<'a> {
    ftms: Vec<Box<dyn FtMachine>>,
    vis: &'a mut [VisBuffer],
}

impl<'a> VisSkyEquation<'a> {
    pub fn new(
        ftms: Vec<Box<dyn FtMachine>>,
        vis: &'a mut [VisBuffer],
    ) -> Result<VisSkyEquation<'a>, EquationError> {
        if ftms.is_empty() {
            return Err(EquationError::NoFields);
        }
        if vis.is_empty() {
            return Err(EquationError::NoVisibilities);
        }
        for vb in vis.iter() {
            vb.validate()?;
        }
        debug!(
            "Sky equation with {} field(s) and {} visibility buffer(s)",
            ftms.len(),
            vis.len()
        );
        Ok(VisSkyEquation { ftms, vis })
    }

    pub fn ft_machine(&self, field: usize) -> &dyn FtMachine {
        self.ftms[field].as_ref()
    }

    pub fn vis(&self) -> &[VisBuffer] {
        &*self.vis
    }

    fn check_models(&self, models: &[ArrayView4<f32>]) -> Result<(), EquationError> {
        if models.len() != self.ftms.len() {
            return Err(EquationError::FieldCountMismatch {
                fields: self.ftms.len(),
                models: models.len(),
            });
        }
        Ok(())
    }

    fn image_column(&mut self, field: usize, column: VisColumn) -> Result<Array4<f32>, EquationError> {
        let ftm = &mut self.ftms[field];
        ftm.initialize_to_sky()?;
        for vb in self.vis.iter() {
            ftm.put(vb, column, false)?;
        }
        Ok(ftm.get_image(true)?)
    }
}

/// Degrid the given fields into the model column of every buffer. The FT
/// machines must already be initialised for prediction.
fn degrid_fields(
    ftms: &mut [Box<dyn FtMachine>],
    vis: &mut [VisBuffer],
    fields: &[usize],
) -> Result<(), EquationError> {
    for vb in vis.iter_mut() {
        if let [field] = fields {
            ftms[*field].get(vb)?;
            continue;
        }
        let mut total = Array3::<c32>::zeros(vb.model.dim());
        for &field in fields {
            ftms[field].get(vb)?;
            total += &vb.model;
        }
        vb.model = total;
    }
    Ok(())
}

impl SkyEquation for VisSkyEquation<'_> {
    fn num_fields(&self) -> usize {
        self.ftms.len()
    }

    fn geometry(&self, field: usize) -> &ImageGeometry {
        self.ftms[field].geometry()
    }

    fn make_psf(&mut self, field: usize) -> Result<Array4<f32>, EquationError> {
        let ftm = &mut self.ftms[field];
        trace!("Making the PSF of field {field} with {}", ftm.name());
        ftm.initialize_to_sky()?;
        for vb in self.vis.iter() {
            ftm.put(vb, VisColumn::Observed, true)?;
        }
        Ok(ftm.get_image(true)?)
    }

    fn weight_image(&self, field: usize) -> Array4<f32> {
        self.ftms[field].get_weight_image()
    }

    fn predict(&mut self, models: &[ArrayView4<f32>]) -> Result<(), EquationError> {
        self.check_models(models)?;
        // Fields without any flux contribute nothing.
        let active: Vec<usize> = models
            .iter()
            .enumerate()
            .filter(|(_, m)| m.iter().any(|&v| v != 0.0))
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            for vb in self.vis.iter_mut() {
                vb.model.fill(c32::default());
            }
            return Ok(());
        }

        for &field in &active {
            self.ftms[field].initialize_to_vis(models[field])?;
        }
        let result = degrid_fields(&mut self.ftms, self.vis, &active);
        for &field in &active {
            self.ftms[field].finalize_to_vis();
        }
        result
    }

    fn make_residuals(
        &mut self,
        models: &[ArrayView4<f32>],
    ) -> Result<Vec<Array4<f32>>, EquationError> {
        self.predict(models)?;
        for vb in self.vis.iter_mut() {
            vb.set_corrected_to_residual();
        }
        (0..self.ftms.len())
            .map(|field| self.image_column(field, VisColumn::Corrected))
            .collect()
    }
}
