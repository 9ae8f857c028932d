// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::c64;
use ndarray::prelude::*;

use super::{fft::fftshift, *};

#[test]
fn test_sinc() {
    assert_abs_diff_eq!(sinc(0.0), 1.0);
    assert_abs_diff_eq!(sinc(std::f64::consts::PI), 0.0, epsilon = 1e-15);
    assert_abs_diff_eq!(sinc(1.0), 1.0_f64.sin());
}

#[test]
fn test_composites() {
    assert!(is_composite(1));
    assert!(is_composite(360));
    assert!(!is_composite(7));
    assert!(!is_composite(0));

    assert_eq!(next_even_composite(1), 2);
    assert_eq!(next_even_composite(121), 128);
    assert_eq!(next_even_composite(308), 320);
    assert_eq!(next_even_composite(240), 240);
    // 243 is composite but odd.
    assert_eq!(next_even_composite(241), 250);
}

#[test]
fn test_parallactic_angle() {
    let lat = (-26.7_f64).to_radians();
    let dec = (-30.0_f64).to_radians();
    // On the meridian, the parallactic angle is zero for a source south of
    // zenith, and pi for a source north of it.
    assert_abs_diff_eq!(parallactic_angle(0.0, dec, lat), 0.0);
    assert_abs_diff_eq!(
        parallactic_angle(0.0, (10.0_f64).to_radians(), lat).abs(),
        std::f64::consts::PI
    );
    // Symmetric about transit.
    let east = parallactic_angle(-0.5, dec, lat);
    let west = parallactic_angle(0.5, dec, lat);
    assert_abs_diff_eq!(east, -west, epsilon = 1e-12);
}

#[test]
fn test_bessel_j1() {
    assert_abs_diff_eq!(bessel_j1(0.0), 0.0);
    assert_abs_diff_eq!(bessel_j1(1.0), 0.440_050_585_744_933_5, epsilon = 1e-7);
    assert_abs_diff_eq!(bessel_j1(-1.0), -0.440_050_585_744_933_5, epsilon = 1e-7);
    assert_abs_diff_eq!(bessel_j1(10.0), 0.043_472_746_168_861_44, epsilon = 1e-7);
    // First zero.
    assert_abs_diff_eq!(bessel_j1(3.831_705_970_207_512), 0.0, epsilon = 1e-7);
}

#[test]
fn test_fftshift_is_an_involution() {
    let original = Array2::from_shape_fn((4, 6), |(y, x)| (y * 6 + x) as f64);
    let mut a = original.clone();
    fftshift(a.view_mut());
    assert_abs_diff_eq!(a[(0, 0)], original[(2, 3)]);
    assert_abs_diff_eq!(a[(2, 3)], original[(0, 0)]);
    fftshift(a.view_mut());
    assert_abs_diff_eq!(a, original);
}

#[test]
fn test_centred_fft_of_centred_delta_is_flat() {
    let fft = Fft2d::new(8, 6);
    let mut a = Array2::<c64>::zeros((6, 8));
    a[(3, 4)] = c64::new(1.0, 0.0);
    fft.forward_centred(a.view_mut());
    for v in a.iter() {
        assert_abs_diff_eq!(v.re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.im, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_forward_inverse_scales_by_size() {
    let fft = Fft2d::new(10, 4);
    let original = Array2::from_shape_fn((4, 10), |(y, x)| {
        c64::new((y as f64).sin() + x as f64, (x as f64 * 0.3).cos())
    });
    let mut a = original.clone();
    fft.forward(a.view_mut());
    fft.inverse(a.view_mut());
    for (out, orig) in a.iter().zip(original.iter()) {
        assert_abs_diff_eq!(out.re / 40.0, orig.re, epsilon = 1e-10);
        assert_abs_diff_eq!(out.im / 40.0, orig.im, epsilon = 1e-10);
    }
}

#[test]
fn test_convolution_with_shifted_delta() {
    let fft = Fft2d::new(8, 8);
    let image = Array2::from_shape_fn((8, 8), |(y, x)| if (y, x) == (2, 5) { 3.0 } else { 0.0 });
    // A delta one pixel right of the centre shifts the image one pixel right.
    let mut kernel = Array2::zeros((8, 8));
    kernel[(4, 5)] = 1.0;
    let product = fft.forward_real(image.view()) * fft.forward_real_centred(kernel.view());
    let result = fft.inverse_real(product);
    assert_abs_diff_eq!(result[(2, 6)], 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(result.sum(), 3.0, epsilon = 1e-12);

    // Two centred kernels convolve into a centred kernel.
    let mut delta = Array2::zeros((8, 8));
    delta[(4, 4)] = 1.0;
    let product = fft.forward_real_centred(delta.view()) * fft.forward_real_centred(kernel.view());
    let result = fft.inverse_real_centred(product);
    assert_abs_diff_eq!(result[(4, 5)], 1.0, epsilon = 1e-12);
}
