// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Two-dimensional FFTs on [`ndarray`] arrays.
//!
//! All arrays are indexed `[y, x]`. "Centred" transforms treat the pixel at
//! `(ny / 2, nx / 2)` as the origin on both the input and output side; both
//! dimensions must then be even.

use std::sync::Arc;

use marlu::c64;
use ndarray::prelude::*;
use rustfft::{Fft, FftPlanner};

/// Plans for forward and inverse FFTs of a fixed 2D shape. The transforms are
/// unnormalised, except for [`Fft2d::inverse_real`] and
/// [`Fft2d::inverse_real_centred`].
#[derive(Clone)]
pub(crate) struct Fft2d {
    nx: usize,
    ny: usize,
    fwd_x: Arc<dyn Fft<f64>>,
    fwd_y: Arc<dyn Fft<f64>>,
    inv_x: Arc<dyn Fft<f64>>,
    inv_y: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Fft2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2d")
            .field("nx", &self.nx)
            .field("ny", &self.ny)
            .finish()
    }
}

fn transform_lanes(mut a: ArrayViewMut2<c64>, axis: Axis, fft: &dyn Fft<f64>) {
    let mut buffer = vec![c64::default(); a.len_of(axis)];
    let mut scratch = vec![c64::default(); fft.get_inplace_scratch_len()];
    for mut lane in a.lanes_mut(axis) {
        buffer
            .iter_mut()
            .zip(lane.iter())
            .for_each(|(b, &l)| *b = l);
        fft.process_with_scratch(&mut buffer, &mut scratch);
        lane.iter_mut()
            .zip(buffer.iter())
            .for_each(|(l, &b)| *l = b);
    }
}

/// Swap quadrants so that the centre pixel moves to the origin (or back; for
/// even dimensions this is its own inverse).
pub(crate) fn fftshift<T>(mut a: ArrayViewMut2<T>) {
    let (ny, nx) = a.dim();
    assert!(
        ny % 2 == 0 && nx % 2 == 0,
        "fftshift needs even dimensions, got {ny}x{nx}"
    );
    let (hy, hx) = (ny / 2, nx / 2);
    // Pixel (y, x) in the top half pairs with (y + ny/2, x + nx/2) in the
    // bottom half.
    let (mut top, mut bottom) = a.view_mut().split_at(Axis(0), hy);
    for y in 0..hy {
        for x in 0..nx {
            std::mem::swap(&mut top[(y, x)], &mut bottom[(y, (x + hx) % nx)]);
        }
    }
}

impl Fft2d {
    pub(crate) fn new(nx: usize, ny: usize) -> Fft2d {
        let mut planner = FftPlanner::new();
        Fft2d {
            nx,
            ny,
            fwd_x: planner.plan_fft_forward(nx),
            fwd_y: planner.plan_fft_forward(ny),
            inv_x: planner.plan_fft_inverse(nx),
            inv_y: planner.plan_fft_inverse(ny),
        }
    }

    /// The (ny, nx) shape this plan works on.
    pub(crate) fn dim(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    fn check(&self, a: &ArrayViewMut2<c64>) {
        assert_eq!(a.dim(), self.dim(), "FFT plan and array shapes differ");
    }

    /// In-place forward transform (negative exponent).
    pub(crate) fn forward(&self, mut a: ArrayViewMut2<c64>) {
        self.check(&a);
        transform_lanes(a.view_mut(), Axis(1), self.fwd_x.as_ref());
        transform_lanes(a, Axis(0), self.fwd_y.as_ref());
    }

    /// In-place inverse transform (positive exponent).
    pub(crate) fn inverse(&self, mut a: ArrayViewMut2<c64>) {
        self.check(&a);
        transform_lanes(a.view_mut(), Axis(1), self.inv_x.as_ref());
        transform_lanes(a, Axis(0), self.inv_y.as_ref());
    }

    pub(crate) fn forward_centred(&self, mut a: ArrayViewMut2<c64>) {
        fftshift(a.view_mut());
        self.forward(a.view_mut());
        fftshift(a);
    }

    pub(crate) fn inverse_centred(&self, mut a: ArrayViewMut2<c64>) {
        fftshift(a.view_mut());
        self.inverse(a.view_mut());
        fftshift(a);
    }

    /// Forward transform of a real image whose origin is pixel (0, 0).
    pub(crate) fn forward_real(&self, a: ArrayView2<f64>) -> Array2<c64> {
        let mut out = a.mapv(|v| c64::new(v, 0.0));
        self.forward(out.view_mut());
        out
    }

    /// Forward transform of a real kernel centred on the centre pixel. The
    /// product of this with [`Fft2d::forward_real`] of an image convolves the
    /// image with the kernel without shifting it.
    pub(crate) fn forward_real_centred(&self, kernel: ArrayView2<f64>) -> Array2<c64> {
        let mut out = kernel.mapv(|v| c64::new(v, 0.0));
        fftshift(out.view_mut());
        self.forward(out.view_mut());
        out
    }

    /// Normalised inverse transform, keeping the real part.
    pub(crate) fn inverse_real(&self, mut a: Array2<c64>) -> Array2<f64> {
        self.inverse(a.view_mut());
        let norm = 1.0 / (self.nx * self.ny) as f64;
        a.mapv(|v| v.re * norm)
    }

    /// Like [`Fft2d::inverse_real`], but the result is centred on the centre
    /// pixel. Use this when both factors came from
    /// [`Fft2d::forward_real_centred`].
    pub(crate) fn inverse_real_centred(&self, a: Array2<c64>) -> Array2<f64> {
        let mut out = self.inverse_real(a);
        fftshift(out.view_mut());
        out
    }
}
