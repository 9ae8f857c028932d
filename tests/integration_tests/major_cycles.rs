// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Deconvolve simulated visibilities through the public interfaces.

use approx::assert_abs_diff_eq;
use hyperclean::{
    CleanSettings, FieldImages, FtMachine, MfMsCleanImageSkyModel, ResidualMode,
    SolveStopReason, VisSkyEquation, WOnlyProjectFt, WProjectionSettings,
};
use ndarray::prelude::*;
use vec1::vec1;

use crate::{geometry, observe, two_sources, FREQ};

fn settings(residual_mode: ResidualMode) -> CleanSettings {
    CleanSettings {
        scales: vec![0.0],
        niter: 500,
        gain: 0.2,
        threshold: 0.05,
        residual_mode,
        ..Default::default()
    }
}

fn clean(residual_mode: ResidualMode) -> (Array4<f32>, Array4<f32>, SolveStopReason) {
    let geometry = geometry(64, 4.0);
    let mut vis = vec![observe(&two_sources(&geometry), vec1![FREQ])];
    let ftm = WOnlyProjectFt::new(geometry.clone(), WProjectionSettings::default()).unwrap();
    let ftms: Vec<Box<dyn FtMachine>> = vec![Box::new(ftm)];
    let mut eq = VisSkyEquation::new(ftms, &mut vis).unwrap();

    let mut sky_model =
        MfMsCleanImageSkyModel::new(vec![FieldImages::new(geometry)], settings(residual_mode));
    let summary = sky_model.solve(&mut eq).unwrap();
    assert!(summary.major_cycles >= 1, "{summary:?}");
    assert!(sky_model.max_sidelobe() > 0.0);
    let restored = sky_model.restore().unwrap().remove(0);
    let field = sky_model.into_fields().remove(0);
    (field.model, restored, summary.stop_reason)
}

#[test]
fn test_both_residual_modes_recover_the_sources() {
    for mode in [ResidualMode::Visibility, ResidualMode::Xfr] {
        let (model, restored, stop_reason) = clean(mode);
        assert_ne!(stop_reason, SolveStopReason::NoProgress);

        assert_abs_diff_eq!(model.sum(), 5.5, epsilon = 0.5);
        assert_abs_diff_eq!(
            model.slice(s![0, 0, 34..39, 24..29]).sum(),
            4.0,
            epsilon = 0.4
        );
        assert_abs_diff_eq!(
            model.slice(s![0, 0, 26..31, 38..43]).sum(),
            1.5,
            epsilon = 0.3
        );
        assert_abs_diff_eq!(restored[(0, 0, 36, 26)], 4.0, epsilon = 0.4);
        assert_abs_diff_eq!(restored[(0, 0, 28, 40)], 1.5, epsilon = 0.3);
    }
}

#[test]
fn test_model_visibilities_match_the_data_after_solving() {
    let geometry = geometry(64, 4.0);
    let mut vis = vec![observe(&two_sources(&geometry), vec1![FREQ])];
    {
        let ftm = WOnlyProjectFt::new(geometry.clone(), WProjectionSettings::default()).unwrap();
        let ftms: Vec<Box<dyn FtMachine>> = vec![Box::new(ftm)];
        let mut eq = VisSkyEquation::new(ftms, &mut vis).unwrap();
        let mut sky_model = MfMsCleanImageSkyModel::new(
            vec![FieldImages::new(geometry)],
            settings(ResidualMode::Visibility),
        );
        sky_model.solve(&mut eq).unwrap();
    }

    let vb = &vis[0];
    let data_power: f32 = vb.observed.iter().map(|v| v.norm_sqr()).sum();
    let residual_power: f32 = vb.corrected.iter().map(|v| v.norm_sqr()).sum();
    assert!(
        residual_power < 0.05 * data_power,
        "residual {residual_power}, data {data_power}"
    );
}
