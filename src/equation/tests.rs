// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;
use vec1::vec1;

use super::*;
use crate::{
    gridding::{WOnlyProjectFt, WProjectionSettings},
    model::sources_on_pixels,
    tests::*,
};

const FREQ: f64 = 150e6;

fn ftm(geometry: &ImageGeometry) -> Box<dyn FtMachine> {
    Box::new(WOnlyProjectFt::new(geometry.clone(), WProjectionSettings::default()).unwrap())
}

#[test]
fn test_residuals_of_an_exact_model_are_small() {
    let geometry = test_geometry(64, 4.0, FREQ);
    let sources = sources_on_pixels(&geometry, &[((36, 30), 3.0)], FREQ);
    let mut vis = vec![test_vis(&test_tiles(16, 150.0), vec1![FREQ], &sources)];
    let mut eq = VisSkyEquation::new(vec![ftm(&geometry)], &mut vis).unwrap();
    assert_eq!(eq.num_fields(), 1);

    let psf = eq.make_psf(0).unwrap();
    assert_abs_diff_eq!(psf[(0, 0, 32, 32)], 1.0, epsilon = 1e-4);

    let mut model = geometry.zeros();
    let dirty = eq.make_residuals(&[model.view()]).unwrap();
    assert_abs_diff_eq!(dirty[0][(0, 0, 30, 36)], 3.0, epsilon = 0.03);

    model[(0, 0, 30, 36)] = 3.0;
    let residual = eq.make_residuals(&[model.view()]).unwrap();
    let max = residual[0].iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
    assert!(max < 0.15, "{max}");

    // The residual column holds data minus model.
    let vb = &eq.vis()[0];
    let expected = &vb.observed - &vb.model;
    assert_eq!(vb.corrected, expected);
}

#[test]
fn test_predict_sums_fields() {
    let geometry = test_geometry(64, 4.0, FREQ);
    let mut vis = vec![test_vis(&test_tiles(8, 150.0), vec1![FREQ], &[])];

    let mut model = geometry.zeros();
    model[(0, 0, 28, 40)] = 2.0;
    let single = {
        let mut eq = VisSkyEquation::new(vec![ftm(&geometry)], &mut vis).unwrap();
        eq.predict(&[model.view()]).unwrap();
        eq.vis()[0].model.clone()
    };

    let half = model.mapv(|v| v / 2.0);
    let mut eq = VisSkyEquation::new(vec![ftm(&geometry), ftm(&geometry)], &mut vis).unwrap();
    eq.predict(&[half.view(), half.view()]).unwrap();
    let summed = &eq.vis()[0].model;
    for (a, b) in single.iter().zip(summed.iter()) {
        assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-4);
        assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-4);
    }

    // Empty models clear the model column.
    let zero = geometry.zeros();
    eq.predict(&[zero.view(), zero.view()]).unwrap();
    assert!(eq.vis()[0].model.iter().all(|v| v.norm() == 0.0));
}

#[test]
fn test_bad_inputs() {
    let geometry = test_geometry(64, 4.0, FREQ);
    let mut vis = vec![test_vis(&test_tiles(4, 100.0), vec1![FREQ], &[])];
    assert!(matches!(
        VisSkyEquation::new(vec![], &mut vis),
        Err(EquationError::NoFields)
    ));
    assert!(matches!(
        VisSkyEquation::new(vec![ftm(&geometry)], &mut []),
        Err(EquationError::NoVisibilities)
    ));

    let mut eq = VisSkyEquation::new(vec![ftm(&geometry)], &mut vis).unwrap();
    let model = geometry.zeros();
    assert!(matches!(
        eq.make_residuals(&[model.view(), model.view()]),
        Err(EquationError::FieldCountMismatch {
            fields: 1,
            models: 2
        })
    ));
}
