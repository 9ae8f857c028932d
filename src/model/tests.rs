// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::{RADec, UVW};
use vec1::vec1;

use super::*;
use crate::{
    constants::{TAU, VEL_C},
    gridding::{GaussianBeam, PointedBeam},
    image::Correlation,
};

fn buffer(phase_centre: RADec) -> VisBuffer {
    VisBuffer::new(
        vec![
            UVW {
                u: 100.0,
                v: -40.0,
                w: 3.0,
            },
            UVW {
                u: -250.0,
                v: 10.0,
                w: -20.0,
            },
        ],
        vec![0, 0],
        vec![1, 2],
        vec1![150e6, 180e6],
        vec1![Correlation::XX, Correlation::XY, Correlation::YY],
        phase_centre,
    )
    .unwrap()
}

#[test]
fn test_source_at_phase_centre_is_flat() {
    let phase_centre = RADec::from_degrees(30.0, -45.0);
    let mut vb = buffer(phase_centre);
    let source = PointSource {
        radec: phase_centre,
        flux_jy: 2.5,
        ref_freq_hz: 150e6,
        spectral_index: 0.0,
    };
    simulate_point_sources(&mut vb, VisColumn::Observed, &[source], None);
    for ((_, _, i_corr), vis) in vb.observed.indexed_iter() {
        let expected = if i_corr == 1 { 0.0 } else { 2.5 };
        assert_abs_diff_eq!(vis.re, expected, epsilon = 1e-6);
        assert_abs_diff_eq!(vis.im, 0.0, epsilon = 1e-6);
    }
}

#[test]
fn test_offset_source_phase() {
    let phase_centre = RADec::from_degrees(30.0, -45.0);
    let mut vb = buffer(phase_centre);
    let radec = RADec::from_degrees(31.0, -44.5);
    let source = PointSource {
        radec,
        flux_jy: 1.0,
        ref_freq_hz: 150e6,
        spectral_index: 0.0,
    };
    simulate_point_sources(&mut vb, VisColumn::Model, &[source], None);

    let lmn = radec.to_lmn(phase_centre);
    let UVW { u, v, w } = vb.uvws[1] * (180e6 / VEL_C);
    let expected = c64::cis(-TAU * (u * lmn.l + v * lmn.m + w * (lmn.n - 1.0)));
    let got = vb.model[(1, 1, 0)];
    assert_abs_diff_eq!(got.re as f64, expected.re, epsilon = 1e-5);
    assert_abs_diff_eq!(got.im as f64, expected.im, epsilon = 1e-5);
    // The observed column is untouched.
    assert_abs_diff_eq!(vb.observed[(1, 1, 0)].norm(), 0.0);
}

#[test]
fn test_spectral_index_and_beam() {
    let phase_centre = RADec::from_degrees(0.0, -27.0);
    let mut vb = buffer(phase_centre);
    let source = PointSource {
        radec: phase_centre,
        flux_jy: 1.0,
        ref_freq_hz: 150e6,
        spectral_index: -0.8,
    };
    assert_abs_diff_eq!(source.flux_at(180e6), 1.2_f64.powf(-0.8));

    // A beam pointed away from the source attenuates it.
    let beam = PointedBeam {
        beam: std::sync::Arc::new(GaussianBeam {
            fwhm_rad: 10.0_f64.to_radians(),
            ref_freq_hz: 150e6,
        }),
        pointing_centre: RADec::from_degrees(0.0, -32.0),
    };
    simulate_point_sources(&mut vb, VisColumn::Observed, &[source], Some(&beam));
    let expected = (-4.0 * std::f64::consts::LN_2 * 0.25).exp();
    assert_abs_diff_eq!(vb.observed[(0, 0, 0)].re as f64, expected, epsilon = 1e-5);
}
