// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod arg_files;
mod major_cycles;

use hyperclean::{
    marlu::{RADec, XyzGeodetic},
    model::{simulate_point_sources, sources_on_pixels, PointSource},
    Correlation, ImageGeometry, ImagePol, VisBuffer, VisColumn,
};
use vec1::{vec1, Vec1};

const FREQ: f64 = 150e6;
const LATITUDE_RAD: f64 = -0.4660608448386394;

fn phase_centre() -> RADec {
    RADec::from_degrees(30.0, -30.0)
}

fn geometry(n: usize, cell_arcmin: f64) -> ImageGeometry {
    let cell = (cell_arcmin / 60.0).to_radians();
    ImageGeometry::new(
        n,
        n,
        cell,
        cell,
        phase_centre(),
        vec1![FREQ],
        1e6,
        vec1![ImagePol::I],
    )
    .unwrap()
}

/// Tiles on a jittered grid within `extent_m` of the array centre.
fn tiles(num_tiles: usize, extent_m: f64) -> Vec<XyzGeodetic> {
    let side = (num_tiles as f64).sqrt().ceil() as usize;
    (0..num_tiles)
        .map(|i| {
            let (row, col) = (i / side, i % side);
            let jitter = ((i * 7919) % 101) as f64 / 101.0 - 0.5;
            XyzGeodetic {
                x: (col as f64 / side as f64 - 0.5 + 0.3 * jitter) * 2.0 * extent_m,
                y: (row as f64 / side as f64 - 0.5 - 0.2 * jitter) * 2.0 * extent_m,
                z: jitter * extent_m * 0.1,
            }
        })
        .collect()
}

fn observe(sources: &[PointSource], freqs_hz: Vec1<f64>) -> VisBuffer {
    let lsts: Vec<f64> = (-4..=4)
        .map(|i| phase_centre().ra + i as f64 * 0.04)
        .collect();
    let mut vb = VisBuffer::from_tiles(
        &tiles(36, 150.0),
        phase_centre(),
        &lsts,
        LATITUDE_RAD,
        freqs_hz,
        vec1![Correlation::XX, Correlation::YY],
    )
    .unwrap();
    simulate_point_sources(&mut vb, VisColumn::Observed, sources, None);
    vb
}

fn two_sources(geometry: &ImageGeometry) -> Vec<PointSource> {
    sources_on_pixels(geometry, &[((26, 36), 4.0), ((40, 28), 1.5)], FREQ)
}
