// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! W-term convolution functions and the cache that hands them out.
//!
//! A kernel is the Fourier transform of the image-plane screen
//! `sf(l) sf(m) exp(2 pi i w (sqrt(1 - l^2 - m^2) - 1))`, sampled
//! `sampling` times finer than the uv grid. Only one quadrant is stored; the
//! screen is symmetric in l and m, so the kernel is too. W planes are spaced
//! quadratically in w, i.e. plane `k` is at `w = k^2 / w_scale`.

use std::{collections::HashMap, sync::Arc};

use log::{debug, trace, warn};
use marlu::c64;
use ndarray::prelude::*;
use rayon::prelude::*;

use super::{spheroidal::grdsf, ConvFuncError};
use crate::{
    constants::{CONV_SUPPORT_CUTOFF, MAX_CONV_SIZE, TAU},
    math::{nint, Fft2d},
};

/// The kernels of every W plane for one (parallactic angle, polarisation)
/// key.
#[derive(Debug, Clone)]
pub struct WTermConvFunc {
    /// One quadrant of each kernel, indexed `[w, v, u]` in oversampled pixels
    /// from the kernel centre.
    planes: Array3<c64>,

    /// The half-width of each plane's kernel in uv-grid pixels.
    supports: Vec<usize>,

    sampling: usize,

    /// Plane `k` is at `w = k^2 / w_scale` wavelengths.
    w_scale: f64,
}

impl WTermConvFunc {
    /// Make the kernels for a uv grid of `nx` by `ny` pixels whose image-plane
    /// pixels are `cell_x` by `cell_y` radians, with planes up to `max_w`
    /// wavelengths.
    pub fn new(
        nx: usize,
        ny: usize,
        cell_x: f64,
        cell_y: f64,
        num_w_planes: usize,
        sampling: usize,
        max_w: f64,
    ) -> Result<WTermConvFunc, ConvFuncError> {
        if num_w_planes == 0 {
            return Err(ConvFuncError::NoWPlanes);
        }
        if sampling == 0 {
            return Err(ConvFuncError::BadSampling);
        }
        if num_w_planes > 1 && !(max_w > 0.0) {
            return Err(ConvFuncError::BadMaxW(max_w));
        }

        // The kernel FFT is done on a grid that is a multiple of 2 * sampling
        // so the screen occupies a whole number of samples about the centre.
        let conv_size = {
            let size = nx.min(ny).min(MAX_CONV_SIZE);
            (size / (2 * sampling)) * (2 * sampling)
        };
        if conv_size < 10 * sampling {
            return Err(ConvFuncError::GridTooSmall {
                nx,
                ny,
                sampling,
            });
        }
        let half_conv = conv_size / 2;
        let half_inner = conv_size / sampling / 2;
        // The direction-cosine increment between screen samples.
        let screen_dl = (sampling * nx) as f64 * cell_x / conv_size as f64;
        let screen_dm = (sampling * ny) as f64 * cell_y / conv_size as f64;
        let w_scale = if num_w_planes > 1 {
            ((num_w_planes - 1) * (num_w_planes - 1)) as f64 / max_w
        } else {
            0.0
        };
        debug!(
            "Making {num_w_planes} W-term convolution functions; conv. size {conv_size}, sampling {sampling}, w scale {w_scale:.3e}"
        );

        let fft = Fft2d::new(conv_size, conv_size);
        let quadrants: Vec<Array2<c64>> = (0..num_w_planes)
            .into_par_iter()
            .map(|iw| {
                let w = if w_scale > 0.0 {
                    (iw * iw) as f64 / w_scale
                } else {
                    0.0
                };
                let mut screen = Array2::<c64>::zeros((conv_size, conv_size));
                let extent = half_inner as i64 - 1;
                for iy in -extent..=extent {
                    let m = iy as f64 * screen_dm;
                    let sf_y = grdsf(iy as f64 / half_inner as f64);
                    let gy = (half_conv as i64 + iy) as usize;
                    for ix in -extent..=extent {
                        let l = ix as f64 * screen_dl;
                        let r2 = l * l + m * m;
                        if r2 >= 1.0 {
                            continue;
                        }
                        let taper = sf_y * grdsf(ix as f64 / half_inner as f64);
                        let phase = TAU * w * ((1.0 - r2).sqrt() - 1.0);
                        screen[(gy, (half_conv as i64 + ix) as usize)] =
                            c64::from_polar(taper, phase);
                    }
                }
                fft.forward_centred(screen.view_mut());
                screen
                    .slice(s![half_conv.., half_conv..])
                    .to_owned()
            })
            .collect();

        let peak = quadrants[0].iter().map(|c| c.norm()).fold(0.0, f64::max);
        if !(peak > 0.0) {
            return Err(ConvFuncError::ZeroKernel);
        }

        // Supports, in uv-grid pixels. Step in from the edge along the u axis
        // until the kernel is significant.
        let max_support = half_conv / sampling - 2;
        let mut num_overflowing = 0;
        let mut supports = Vec::with_capacity(num_w_planes);
        for (iw, quadrant) in quadrants.iter().enumerate() {
            let trial = (0..half_conv - 1)
                .rev()
                .find(|&trial| quadrant[(0, trial)].norm() / peak > CONV_SUPPORT_CUTOFF);
            let support = match trial {
                Some(trial) => (0.5 + trial as f64 / sampling as f64) as usize + 1,
                None => max_support + 1,
            };
            if support > max_support {
                num_overflowing += 1;
                supports.push(max_support);
            } else {
                supports.push(support);
            }
            trace!("W plane {iw}: support {}", supports[iw]);
        }
        if num_overflowing > 0 {
            warn!("{num_overflowing} W planes have kernels larger than the allocated size of {max_support} pixels; they have been truncated. Consider more padding or fewer W planes");
        }
        if supports[0] < 1 {
            return Err(ConvFuncError::ZeroSupport);
        }

        // Normalise so that the W = 0 kernel sums to 1 when it's sampled at
        // the uv-grid spacing.
        let support_0 = supports[0] as i64;
        let s = sampling as i64;
        let mut sum = 0.0;
        for iy in -support_0..=support_0 {
            for ix in -support_0..=support_0 {
                let tap = ((iy * s).unsigned_abs() as usize, (ix * s).unsigned_abs() as usize);
                sum += quadrants[0][tap].re;
            }
        }
        if !(sum > 0.0) {
            return Err(ConvFuncError::NonPositiveSum(sum));
        }

        let max_used = supports.iter().copied().max().unwrap_or(1);
        let trimmed = ((max_used + 2) * sampling).min(half_conv);
        let mut planes = Array3::zeros((num_w_planes, trimmed, trimmed));
        for (mut plane, quadrant) in planes.outer_iter_mut().zip(quadrants.iter()) {
            plane.assign(&quadrant.slice(s![..trimmed, ..trimmed]));
            plane.mapv_inplace(|c| c / sum);
        }

        Ok(WTermConvFunc {
            planes,
            supports,
            sampling,
            w_scale,
        })
    }

    pub fn num_w_planes(&self) -> usize {
        self.supports.len()
    }

    pub fn sampling(&self) -> usize {
        self.sampling
    }

    pub fn w_scale(&self) -> f64 {
        self.w_scale
    }

    pub fn support(&self, w_plane: usize) -> usize {
        self.supports[w_plane]
    }

    pub fn supports(&self) -> &[usize] {
        &self.supports
    }

    /// The W plane that a visibility at `w` wavelengths is gridded with.
    pub fn w_plane(&self, w: f64) -> usize {
        let plane = nint((w.abs() * self.w_scale).sqrt()).max(0) as usize;
        plane.min(self.num_w_planes() - 1)
    }

    /// The w value \[wavelengths\] at the centre of a plane.
    pub fn w_of_plane(&self, w_plane: usize) -> f64 {
        if self.w_scale > 0.0 {
            (w_plane * w_plane) as f64 / self.w_scale
        } else {
            0.0
        }
    }

    /// The kernel value `(tap_u, tap_v)` oversampled pixels from the centre.
    #[inline]
    pub(crate) fn tap(&self, w_plane: usize, tap_u: usize, tap_v: usize) -> c64 {
        self.planes[(w_plane, tap_v, tap_u)]
    }

    /// The sum of a plane's kernel sampled at the uv-grid spacing, centred on
    /// a grid point.
    pub fn plane_sum(&self, w_plane: usize) -> c64 {
        let support = self.supports[w_plane] as i64;
        let s = self.sampling as i64;
        let mut sum = c64::default();
        for iy in -support..=support {
            for ix in -support..=support {
                sum += self.tap(
                    w_plane,
                    (ix * s).unsigned_abs() as usize,
                    (iy * s).unsigned_abs() as usize,
                );
            }
        }
        sum
    }

    /// The size of each stored quadrant, in oversampled pixels.
    pub fn quadrant_size(&self) -> usize {
        self.planes.len_of(Axis(1))
    }
}

/// Identifies a set of convolution functions in a [`ConvFuncStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CfKey {
    /// The parallactic-angle bin.
    pub pa_bin: i64,

    /// The polarisation slot of the kernel.
    pub cf_pol: usize,
}

/// Makes convolution functions on demand for a [`ConvFuncStore`].
pub trait ConvFuncGenerator {
    /// The key under which the kernels for a parallactic angle \[radians\]
    /// and image polarisation plane are stored. Kernels that don't change
    /// with parallactic angle or polarisation collapse those parts of the key.
    fn key(&self, parallactic_angle: f64, pol_plane: usize) -> CfKey;

    fn generate(&self, key: CfKey) -> Result<WTermConvFunc, ConvFuncError>;
}

/// Generates W-term-only kernels. These are the same for every parallactic
/// angle and polarisation, so there is only ever one key.
#[derive(Debug, Clone)]
pub struct WOnlyConvFuncGenerator {
    pub nx: usize,
    pub ny: usize,
    pub cell_x: f64,
    pub cell_y: f64,
    pub num_w_planes: usize,
    pub sampling: usize,
    pub max_w: f64,
}

impl ConvFuncGenerator for WOnlyConvFuncGenerator {
    fn key(&self, _parallactic_angle: f64, _pol_plane: usize) -> CfKey {
        CfKey {
            pa_bin: 0,
            cf_pol: 0,
        }
    }

    fn generate(&self, _key: CfKey) -> Result<WTermConvFunc, ConvFuncError> {
        WTermConvFunc::new(
            self.nx,
            self.ny,
            self.cell_x,
            self.cell_y,
            self.num_w_planes,
            self.sampling,
            self.max_w,
        )
    }
}

/// A cache of convolution functions. Kernels are made the first time their
/// key is asked for and shared afterwards.
#[derive(Debug)]
pub struct ConvFuncStore<G: ConvFuncGenerator> {
    generator: G,
    cache: HashMap<CfKey, Arc<WTermConvFunc>>,
    hits: usize,
    misses: usize,
}

impl<G: ConvFuncGenerator> ConvFuncStore<G> {
    pub fn new(generator: G) -> ConvFuncStore<G> {
        ConvFuncStore {
            generator,
            cache: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Get the kernels for a parallactic angle and image polarisation plane.
    pub fn get(
        &mut self,
        parallactic_angle: f64,
        pol_plane: usize,
    ) -> Result<Arc<WTermConvFunc>, ConvFuncError> {
        let key = self.generator.key(parallactic_angle, pol_plane);
        if let Some(cf) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(cf));
        }

        self.misses += 1;
        debug!("Convolution function cache miss for {key:?}");
        let cf = Arc::new(self.generator.generate(key)?);
        self.cache.insert(key, Arc::clone(&cf));
        Ok(cf)
    }

    /// The number of distinct kernel sets made so far.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
