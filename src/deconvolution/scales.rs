// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multi-scale CLEAN components.
//!
//! Scale 0 is a delta function. Every other scale is a paraboloid tapered by
//! the prolate spheroidal function, `(1 - nu^2) sf(nu)` with `nu = r / size`,
//! normalised to unit sum so that a component's amplitude is its flux.

use log::warn;
use ndarray::prelude::*;

use super::CleanError;
use crate::gridding::grdsf;

/// `num_scales` scale sizes \[pixels\] growing geometrically from `increment`:
/// `0, increment * 10^((k - 2) / 2)` for `k = 1..num_scales`.
pub fn default_scales(num_scales: usize, increment: f64) -> Vec<f64> {
    (0..num_scales)
        .map(|k| {
            if k == 0 {
                0.0
            } else {
                increment * 10_f64.powf((k as f64 - 2.0) / 2.0)
            }
        })
        .collect()
}

/// Sort and de-duplicate scale sizes, dropping any that are too large for an
/// `nx` by `ny` image.
pub(crate) fn verify_scales(scales: &[f64], nx: usize, ny: usize) -> Result<Vec<f64>, CleanError> {
    if let Some(&s) = scales.iter().find(|s| !(**s >= 0.0)) {
        return Err(CleanError::NegativeScale(s));
    }
    let limit = (nx.min(ny) / 2) as f64;
    let mut verified: Vec<f64> = scales.iter().copied().filter(|&s| s <= limit).collect();
    if verified.len() < scales.len() {
        let dropped = scales.len() - verified.len();
        warn!("Dropped {dropped} CLEAN scale(s) larger than half the image ({limit} pixels)");
    }
    verified.sort_by(|a, b| a.total_cmp(b));
    verified.dedup();
    if verified.is_empty() {
        return Err(CleanError::NoScales);
    }
    Ok(verified)
}

/// The bias applied to each scale when choosing the optimum one. Larger
/// scales are penalised more.
pub(crate) fn scale_biases(scales: &[f64], small_scale_bias: f64) -> Vec<f64> {
    let largest = scales.iter().copied().fold(0.0, f64::max);
    scales
        .iter()
        .map(|&s| {
            if largest > 0.0 {
                1.0 - small_scale_bias * s / largest
            } else {
                1.0
            }
        })
        .collect()
}

/// A scale's component image, centred on pixel `(ny / 2, nx / 2)`.
pub(crate) fn scale_kernel(nx: usize, ny: usize, size: f64) -> Array2<f64> {
    let mut kernel = Array2::zeros((ny, nx));
    let (cx, cy) = (nx / 2, ny / 2);
    if size == 0.0 {
        kernel[(cy, cx)] = 1.0;
        return kernel;
    }

    let reach = size.ceil() as i64;
    let mut sum = 0.0;
    for dy in -reach..=reach {
        let y = cy as i64 + dy;
        if y < 0 || y >= ny as i64 {
            continue;
        }
        for dx in -reach..=reach {
            let x = cx as i64 + dx;
            if x < 0 || x >= nx as i64 {
                continue;
            }
            let nu2 = ((dx * dx + dy * dy) as f64) / (size * size);
            if nu2 < 1.0 {
                let v = (1.0 - nu2) * grdsf(nu2.sqrt());
                kernel[(y as usize, x as usize)] = v;
                sum += v;
            }
        }
    }
    if sum > 0.0 {
        kernel.mapv_inplace(|v| v / sum);
    } else {
        kernel[(cy, cx)] = 1.0;
    }
    kernel
}
