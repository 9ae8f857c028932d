// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The prolate spheroidal taper used in every convolution function, and the
//! image-plane correction that undoes it.

use crate::{constants::PI, math::sinc};

const P0: [f64; 5] = [
    8.203343e-2,
    -3.644705e-1,
    6.278660e-1,
    -5.335581e-1,
    2.312756e-1,
];
const P1: [f64; 5] = [
    4.028559e-3,
    -3.697768e-2,
    1.021332e-1,
    -1.201436e-1,
    6.412774e-2,
];
const Q0: [f64; 3] = [1.0, 8.212018e-1, 2.078043e-1];
const Q1: [f64; 3] = [1.0, 9.599102e-1, 2.918724e-1];

/// Schwab's rational approximation of the prolate spheroidal wave function
/// (support 6, alpha 1) at `nu`, where |nu| = 1 is the edge of the taper.
/// Zero outside.
pub(crate) fn grdsf(nu: f64) -> f64 {
    let nu = nu.abs();
    let (p, q, nu_end) = if nu < 0.75 {
        (&P0, &Q0, 0.75)
    } else if nu <= 1.0 {
        (&P1, &Q1, 1.0)
    } else {
        return 0.0;
    };

    let delnusq = nu * nu - nu_end * nu_end;
    let top = p.iter().rev().fold(0.0, |acc, c| acc * delnusq + c);
    let bottom = q.iter().rev().fold(0.0, |acc, c| acc * delnusq + c);
    if bottom == 0.0 {
        0.0
    } else {
        top / bottom
    }
}

/// The image-plane response of the gridding convolution along one axis of `n`
/// pixels, normalised to 1 at the centre pixel. It's the spheroidal taper
/// times the sinc from looking up an `sampling`-times oversampled kernel at
/// its nearest sample.
pub(crate) fn grid_correction(n: usize, sampling: usize) -> Vec<f64> {
    let half = (n / 2) as f64;
    let centre = grdsf(0.0);
    (0..n)
        .map(|i| {
            let offset = i as f64 - half;
            let taper = grdsf(offset / half) / centre;
            taper * sinc(PI * offset / (n * sampling) as f64)
        })
        .collect()
}
