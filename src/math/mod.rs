// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.

mod fft;
#[cfg(test)]
mod tests;

pub(crate) use fft::Fft2d;

/// Inverse tangent. y comes before x, like the C function.
#[inline]
pub(crate) fn atan2(y: f64, x: f64) -> f64 {
    y.atan2(x)
}

/// sin(x) / x, with the removable singularity at 0 filled in.
#[inline]
pub(crate) fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Round to the nearest integer, with halves rounded away from zero.
#[inline]
pub(crate) fn nint(x: f64) -> i64 {
    x.round() as i64
}

/// Is `n` a product of only 2s, 3s and 5s? FFTs of these lengths are fast.
pub(crate) fn is_composite(mut n: usize) -> bool {
    if n == 0 {
        return false;
    }
    for factor in [2, 3, 5] {
        while n % factor == 0 {
            n /= factor;
        }
    }
    n == 1
}

/// The smallest even composite number that is at least `n`.
pub(crate) fn next_even_composite(n: usize) -> usize {
    let mut candidate = n.max(2);
    if candidate % 2 == 1 {
        candidate += 1;
    }
    while !is_composite(candidate) {
        candidate += 2;
    }
    candidate
}

/// The parallactic angle \[radians\] of a source at hour angle `ha` and
/// declination `dec`, observed from latitude `lat` (all in radians).
pub fn parallactic_angle(ha: f64, dec: f64, lat: f64) -> f64 {
    atan2(
        ha.sin() * lat.cos(),
        lat.sin() * dec.cos() - lat.cos() * dec.sin() * ha.cos(),
    )
}

/// The Bessel function of the first kind of order 1. This uses the rational
/// approximations of Numerical Recipes, good to ~1e-8.
pub(crate) fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let num = x
            * (72362614232.0
                + y * (-7895059235.0
                    + y * (242396853.1
                        + y * (-2972611.439 + y * (15704.48260 + y * (-30.16036606))))));
        let den = 144725228442.0
            + y * (2300535178.0
                + y * (18583304.74 + y * (99447.43394 + y * (376.9991397 + y))));
        num / den
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p = 1.0
            + y * (0.183105e-2
                + y * (-0.3516396496e-4 + y * (0.2457520174e-5 + y * (-0.240337019e-6))));
        let q = 0.04687499995
            + y * (-0.2002690873e-3
                + y * (0.8449199096e-5 + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        let ans = (0.636619772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q);
        if x < 0.0 {
            -ans
        } else {
            ans
        }
    }
}
