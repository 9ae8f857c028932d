// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpful functions for tests: fake arrays, image geometries and simulated
//! visibilities.

use marlu::{RADec, XyzGeodetic};
use vec1::{vec1, Vec1};

use crate::{
    image::{Correlation, ImageGeometry, ImagePol},
    model::{simulate_point_sources, PointSource},
    vis::{VisBuffer, VisColumn},
};

pub(crate) const TEST_LATITUDE_RAD: f64 = -0.4660608448386394; // -26.7 degrees

pub(crate) fn test_phase_centre() -> RADec {
    RADec::from_degrees(0.0, -27.0)
}

/// Tile positions scattered within `extent_m` metres of the array centre in
/// every axis. The positions are pseudo-random but deterministic.
pub(crate) fn test_tiles(num_tiles: usize, extent_m: f64) -> Vec<XyzGeodetic> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    };
    (0..num_tiles)
        .map(|_| XyzGeodetic {
            x: next() * extent_m,
            y: next() * extent_m,
            z: next() * extent_m,
        })
        .collect()
}

/// A square, single-channel Stokes I image.
pub(crate) fn test_geometry(n: usize, cell_arcmin: f64, freq_hz: f64) -> ImageGeometry {
    let cell = (cell_arcmin / 60.0).to_radians();
    ImageGeometry::new(
        n,
        n,
        cell,
        cell,
        test_phase_centre(),
        vec1![freq_hz],
        1e6,
        vec1![ImagePol::I],
    )
    .unwrap()
}

/// Visibilities of `sources` over a few hour angles either side of transit.
pub(crate) fn test_vis(
    tiles: &[XyzGeodetic],
    freqs_hz: Vec1<f64>,
    sources: &[PointSource],
) -> VisBuffer {
    let lsts: Vec<f64> = (-3..=3).map(|i| i as f64 * 0.05).collect();
    let mut vb = VisBuffer::from_tiles(
        tiles,
        test_phase_centre(),
        &lsts,
        TEST_LATITUDE_RAD,
        freqs_hz,
        vec1![Correlation::XX, Correlation::YY],
    )
    .unwrap();
    simulate_point_sources(&mut vb, VisColumn::Observed, sources, None);
    vb
}

/// Find the maximum of a 2D image, returning `((x, y), value)`.
pub(crate) fn peak(image: ndarray::ArrayView2<f32>) -> ((usize, usize), f32) {
    let mut best = ((0, 0), f32::MIN);
    for ((y, x), &v) in image.indexed_iter() {
        if v > best.1 {
            best = ((x, y), v);
        }
    }
    best
}
