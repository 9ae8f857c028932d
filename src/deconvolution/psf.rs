// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Measuring PSFs: the clean beam fitted to the main lobe, and the largest
//! sidelobe.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::CleanError;
use crate::{
    constants::{FRAC_PI_2, LN_2, PI, PSF_FIT_CUTOFF},
    math::{atan2, Fft2d},
};

/// An elliptical Gaussian restoring beam. Widths are FWHMs; the position
/// angle is measured from north through east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleanBeam {
    pub major_rad: f64,
    pub minor_rad: f64,
    pub pa_rad: f64,
}

/// The `(y, x)` position and value of the PSF maximum.
fn psf_peak(psf: ArrayView2<f32>) -> ((usize, usize), f32) {
    psf.indexed_iter()
        .fold(((0, 0), f32::MIN), |acc, (pos, &v)| if v > acc.1 { (pos, v) } else { acc })
}

/// The pixels above `cutoff` that are connected to `start` (4-connectivity).
fn flood_fill(psf: ArrayView2<f32>, start: (usize, usize), cutoff: f32) -> Array2<bool> {
    let (ny, nx) = psf.dim();
    let mut filled = Array2::from_elem((ny, nx), false);
    let mut stack = vec![start];
    while let Some((y, x)) = stack.pop() {
        if filled[(y, x)] || !(psf[(y, x)] > cutoff) {
            continue;
        }
        filled[(y, x)] = true;
        if y > 0 {
            stack.push((y - 1, x));
        }
        if y + 1 < ny {
            stack.push((y + 1, x));
        }
        if x > 0 {
            stack.push((y, x - 1));
        }
        if x + 1 < nx {
            stack.push((y, x + 1));
        }
    }
    filled
}

/// Fit an elliptical Gaussian to the main lobe of a PSF. The fit is a linear
/// least-squares fit to the logarithm of the pixels above 0.35 of the peak
/// that are connected to the peak.
pub fn fit_gaussian_psf(
    psf: ArrayView2<f32>,
    cell_x: f64,
    cell_y: f64,
) -> Result<CleanBeam, CleanError> {
    let ((py, px), peak) = psf_peak(psf);
    if !(peak > 0.0) {
        return Err(CleanError::PsfNotPositive(peak as f64));
    }
    let lobe = flood_fill(psf, (py, px), PSF_FIT_CUTOFF as f32 * peak);

    // Normal equations for ln(p) = -(a l^2 + 2b lm + c m^2).
    let mut ata = [[0.0_f64; 3]; 3];
    let mut atb = [0.0_f64; 3];
    let mut num_points = 0;
    for ((y, x), _) in lobe.indexed_iter().filter(|(_, &inside)| inside) {
        if (y, x) == (py, px) {
            continue;
        }
        let l = -(x as f64 - px as f64) * cell_x;
        let m = (y as f64 - py as f64) * cell_y;
        let row = [l * l, 2.0 * l * m, m * m];
        let target = -(psf[(y, x)] as f64 / peak as f64).ln();
        for i in 0..3 {
            for j in 0..3 {
                ata[i][j] += row[i] * row[j];
            }
            atb[i] += row[i] * target;
        }
        num_points += 1;
    }
    if num_points < 3 {
        return Err(CleanError::PsfFit("the main lobe has too few pixels"));
    }
    // A lobe with no off-axis pixels can't constrain b. Fit an axis-aligned
    // Gaussian instead.
    let [a, b, c] = match solve_3x3(ata, atb) {
        Some(abc) => abc,
        None => {
            let reduced = [[ata[0][0], ata[0][2]], [ata[2][0], ata[2][2]]];
            let [a, c] = solve_2x2(reduced, [atb[0], atb[2]])
                .ok_or(CleanError::PsfFit("the fit is degenerate"))?;
            [a, 0.0, c]
        }
    };

    let mean = 0.5 * (a + c);
    let radius = (0.25 * (a - c) * (a - c) + b * b).sqrt();
    let (narrow, wide) = (mean + radius, mean - radius);
    if !(wide > 0.0) {
        return Err(CleanError::PsfFit("the main lobe isn't peaked"));
    }
    // The direction of the narrowest axis, anticlockwise from +l.
    let phi = 0.5 * atan2(2.0 * b, a - c);
    let mut pa = -phi;
    if pa <= -FRAC_PI_2 {
        pa += PI;
    } else if pa > FRAC_PI_2 {
        pa -= PI;
    }
    Ok(CleanBeam {
        major_rad: 2.0 * (LN_2 / wide).sqrt(),
        minor_rad: 2.0 * (LN_2 / narrow).sqrt(),
        pa_rad: pa,
    })
}

fn solve_2x2(m: [[f64; 2]; 2], b: [f64; 2]) -> Option<[f64; 2]> {
    let d = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let scale = m.iter().flatten().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !(d.abs() > 1e-12 * scale * scale) {
        return None;
    }
    Some([
        (b[0] * m[1][1] - m[0][1] * b[1]) / d,
        (m[0][0] * b[1] - b[0] * m[1][0]) / d,
    ])
}

/// Cramer's rule.
fn solve_3x3(m: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = |m: &[[f64; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let d = det(&m);
    let scale = m.iter().flatten().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !(d.abs() > 1e-12 * scale.powi(3)) {
        return None;
    }
    let mut solution = [0.0; 3];
    for (i, s) in solution.iter_mut().enumerate() {
        let mut mi = m;
        for (row, &bi) in mi.iter_mut().zip(b.iter()) {
            row[i] = bi;
        }
        *s = det(&mi) / d;
    }
    Some(solution)
}

/// Grow a lobe outwards through positive pixels that don't rise above the
/// pixel they are reached from. Plateaus are included; anything that climbs
/// again is a separate lobe.
fn grow_downhill(psf: ArrayView2<f32>, lobe: &mut Array2<bool>) {
    let (ny, nx) = psf.dim();
    let mut stack: Vec<(usize, usize)> = lobe
        .indexed_iter()
        .filter(|(_, &inside)| inside)
        .map(|(pos, _)| pos)
        .collect();
    while let Some((y, x)) = stack.pop() {
        let v = psf[(y, x)];
        let mut neighbours = Vec::with_capacity(4);
        if y > 0 {
            neighbours.push((y - 1, x));
        }
        if y + 1 < ny {
            neighbours.push((y + 1, x));
        }
        if x > 0 {
            neighbours.push((y, x - 1));
        }
        if x + 1 < nx {
            neighbours.push((y, x + 1));
        }
        for n in neighbours {
            let nv = psf[n];
            if !lobe[n] && nv > 0.0 && nv <= v {
                lobe[n] = true;
                stack.push(n);
            }
        }
    }
}

/// The largest absolute PSF value outside the main lobe, as a fraction of the
/// peak. The main lobe is the region above 0.35 of the peak connected to it,
/// plus the skirt that falls away from that region.
pub fn psf_sidelobe_level(psf: ArrayView2<f32>) -> f64 {
    let (peak_pos, peak) = psf_peak(psf);
    if !(peak > 0.0) {
        return 0.0;
    }
    let mut lobe = flood_fill(psf, peak_pos, PSF_FIT_CUTOFF as f32 * peak);
    grow_downhill(psf, &mut lobe);
    let sidelobe = psf
        .iter()
        .zip(lobe.iter())
        .filter(|(_, &inside)| !inside)
        .fold(0.0_f32, |acc, (&v, _)| acc.max(v.abs()));
    (sidelobe / peak) as f64
}

/// A unit-peak image of a clean beam centred on pixel `(ny / 2, nx / 2)`.
pub fn gaussian_kernel(beam: &CleanBeam, nx: usize, ny: usize, cell_x: f64, cell_y: f64) -> Array2<f64> {
    let (sin_pa, cos_pa) = beam.pa_rad.sin_cos();
    let (cx, cy) = ((nx / 2) as f64, (ny / 2) as f64);
    Array2::from_shape_fn((ny, nx), |(y, x)| {
        let l = -(x as f64 - cx) * cell_x;
        let m = (y as f64 - cy) * cell_y;
        let along_major = l * sin_pa + m * cos_pa;
        let along_minor = l * cos_pa - m * sin_pa;
        let q = (along_major / beam.major_rad).powi(2) + (along_minor / beam.minor_rad).powi(2);
        (-4.0 * LN_2 * q).exp()
    })
}

/// Convolve an image with a kernel centred on pixel `(ny / 2, nx / 2)`. The
/// convolution is circular.
pub(crate) fn convolve(fft: &Fft2d, image: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Array2<f64> {
    let product = fft.forward_real(image) * fft.forward_real_centred(kernel);
    fft.inverse_real(product)
}
