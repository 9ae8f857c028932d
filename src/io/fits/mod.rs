// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions for reading and writing FITS images.
//!
//! Images are `[chan, pol, y, x]` arrays. In the file, axis 1 is RA, axis 2 is
//! Dec (both SIN projected about the phase centre), axis 3 is Stokes and axis
//! 4 is frequency.

mod error;
#[cfg(test)]
mod tests;

pub use error::FitsError;

use std::{panic::Location, path::Path};

use fitsio::{
    headers::WritesKey,
    hdu::{FitsHdu, HduInfo},
    images::{ImageDescription, ImageType},
    FitsFile,
};
use log::debug;
use ndarray::prelude::*;

use crate::{deconvolution::CleanBeam, image::ImageGeometry};

type Caller = &'static Location<'static>;

fn fitsio_error(
    fits_error: fitsio::errors::Error,
    fits_filename: &Path,
    hdu_description: &str,
    caller: Caller,
) -> FitsError {
    FitsError::Fitsio {
        fits_error: Box::new(fits_error),
        fits_filename: fits_filename.to_path_buf().into_boxed_path(),
        hdu_description: hdu_description.to_string().into_boxed_str(),
        source_file: caller.file(),
        source_line: caller.line(),
        source_column: caller.column(),
    }
}

fn write_key<T: WritesKey>(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    name: &str,
    value: T,
    caller: Caller,
) -> Result<(), FitsError> {
    hdu.write_key(fptr, name, value)
        .map_err(|e| fitsio_error(e, fptr.file_path(), "primary", caller))
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type.
#[track_caller]
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, FitsError> {
    let caller = Location::caller();
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        Err(e) => match &e {
            // The keyword doesn't exist.
            fitsio::errors::Error::Fits(fe) if matches!(fe.status, 202 | 204) => return Ok(None),
            _ => {
                return Err(fitsio_error(
                    e,
                    fits_fptr.file_path(),
                    &format!("{}", hdu.number + 1),
                    caller,
                ))
            }
        },
    };

    match unparsed_value.trim().trim_matches('\'').trim().parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => Err(FitsError::Parse {
            key: keyword.to_string().into_boxed_str(),
            fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
            hdu_num: hdu.number + 1,
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }),
    }
}

/// Write an image to a new FITS file, overwriting anything already at `file`.
/// The restoring beam is recorded in the `BMAJ`, `BMIN` and `BPA` keys.
#[track_caller]
pub fn write_image<P: AsRef<Path>>(
    file: P,
    image: ArrayView4<f32>,
    geometry: &ImageGeometry,
    bunit: &str,
    beam: Option<&CleanBeam>,
) -> Result<(), FitsError> {
    let caller = Location::caller();
    let file = file.as_ref();
    let (num_chans, num_pols, ny, nx) = image.dim();
    if image.dim() != geometry.shape() {
        return Err(FitsError::BadShape {
            shape: vec![num_chans, num_pols, ny, nx],
            fits_filename: file.to_path_buf().into_boxed_path(),
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        });
    }
    debug!("Writing a {nx}x{ny}x{num_pols}x{num_chans} image to {}", file.display());

    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[num_chans, num_pols, ny, nx],
    };
    let mut fptr = FitsFile::create(file)
        .with_custom_primary(&description)
        .overwrite()
        .open()
        .map_err(|e| FitsError::Create {
            fits_error: Box::new(e),
            fits_filename: file.to_path_buf().into_boxed_path(),
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        })?;
    let hdu = fptr
        .primary_hdu()
        .map_err(|e| fitsio_error(e, file, "primary", caller))?;

    let f = &mut fptr;
    write_key(f, &hdu, "BUNIT", bunit, caller)?;
    write_key(f, &hdu, "EQUINOX", 2000.0, caller)?;
    write_key(f, &hdu, "RADESYS", "FK5", caller)?;

    let phase_centre = geometry.phase_centre;
    write_key(f, &hdu, "CTYPE1", "RA---SIN", caller)?;
    write_key(f, &hdu, "CRVAL1", phase_centre.ra.to_degrees(), caller)?;
    write_key(f, &hdu, "CDELT1", -geometry.cell_x.to_degrees(), caller)?;
    write_key(f, &hdu, "CRPIX1", (nx / 2 + 1) as f64, caller)?;
    write_key(f, &hdu, "CUNIT1", "deg", caller)?;

    write_key(f, &hdu, "CTYPE2", "DEC--SIN", caller)?;
    write_key(f, &hdu, "CRVAL2", phase_centre.dec.to_degrees(), caller)?;
    write_key(f, &hdu, "CDELT2", geometry.cell_y.to_degrees(), caller)?;
    write_key(f, &hdu, "CRPIX2", (ny / 2 + 1) as f64, caller)?;
    write_key(f, &hdu, "CUNIT2", "deg", caller)?;

    let codes: Vec<i32> = geometry.pols.iter().map(|p| p.fits_code()).collect();
    let code_step = match codes.as_slice() {
        [a, b, ..] => b - a,
        _ => 1,
    };
    write_key(f, &hdu, "CTYPE3", "STOKES", caller)?;
    write_key(f, &hdu, "CRVAL3", codes[0] as f64, caller)?;
    write_key(f, &hdu, "CDELT3", code_step as f64, caller)?;
    write_key(f, &hdu, "CRPIX3", 1.0, caller)?;
    for (i, pol) in geometry.pols.iter().enumerate() {
        write_key(f, &hdu, &format!("POL{}", i + 1), pol.to_string(), caller)?;
    }

    let freq_step = if num_chans > 1 {
        geometry.freqs_hz[1] - geometry.freqs_hz[0]
    } else {
        geometry.chan_width_hz
    };
    write_key(f, &hdu, "CTYPE4", "FREQ", caller)?;
    write_key(f, &hdu, "CRVAL4", *geometry.freqs_hz.first(), caller)?;
    write_key(f, &hdu, "CDELT4", freq_step, caller)?;
    write_key(f, &hdu, "CRPIX4", 1.0, caller)?;
    write_key(f, &hdu, "CUNIT4", "Hz", caller)?;

    if let Some(beam) = beam {
        write_key(f, &hdu, "BMAJ", beam.major_rad.to_degrees(), caller)?;
        write_key(f, &hdu, "BMIN", beam.minor_rad.to_degrees(), caller)?;
        write_key(f, &hdu, "BPA", beam.pa_rad.to_degrees(), caller)?;
    }
    write_key(f, &hdu, "ORIGIN", "hyperclean", caller)?;

    let data: Vec<f32> = image.iter().copied().collect();
    hdu.write_image(f, &data)
        .map_err(|e| fitsio_error(e, file, "primary", caller))?;
    Ok(())
}

/// Read the primary image of a FITS file as `[chan, pol, y, x]`. Images with
/// fewer than 4 axes get leading axes of length 1.
#[track_caller]
pub fn read_image<P: AsRef<Path>>(file: P) -> Result<Array4<f32>, FitsError> {
    let caller = Location::caller();
    let file = file.as_ref();
    let mut fptr = FitsFile::open(file).map_err(|e| FitsError::Open {
        fits_error: Box::new(e),
        fits_filename: file.to_path_buf().into_boxed_path(),
        source_file: caller.file(),
        source_line: caller.line(),
        source_column: caller.column(),
    })?;
    let hdu = fptr
        .primary_hdu()
        .map_err(|e| fitsio_error(e, file, "primary", caller))?;
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        _ => {
            return Err(FitsError::NotImage {
                fits_filename: file.to_path_buf().into_boxed_path(),
                hdu_num: 1,
                source_file: caller.file(),
                source_line: caller.line(),
                source_column: caller.column(),
            })
        }
    };
    let bad_shape = |shape: Vec<usize>| FitsError::BadShape {
        shape,
        fits_filename: file.to_path_buf().into_boxed_path(),
        source_file: caller.file(),
        source_line: caller.line(),
        source_column: caller.column(),
    };
    let dim = match shape.as_slice() {
        &[ny, nx] => (1, 1, ny, nx),
        &[num_pols, ny, nx] => (1, num_pols, ny, nx),
        &[num_chans, num_pols, ny, nx] => (num_chans, num_pols, ny, nx),
        _ => return Err(bad_shape(shape.clone())),
    };
    debug!("Reading a {dim:?} image from {}", file.display());

    let data: Vec<f32> = hdu
        .read_image(&mut fptr)
        .map_err(|e| fitsio_error(e, file, "primary", caller))?;
    Array4::from_shape_vec(dim, data).map_err(|_| bad_shape(shape))
}

/// The restoring beam recorded in a FITS image, if there is one.
#[track_caller]
pub fn read_clean_beam<P: AsRef<Path>>(file: P) -> Result<Option<CleanBeam>, FitsError> {
    let caller = Location::caller();
    let file = file.as_ref();
    let mut fptr = FitsFile::open(file).map_err(|e| FitsError::Open {
        fits_error: Box::new(e),
        fits_filename: file.to_path_buf().into_boxed_path(),
        source_file: caller.file(),
        source_line: caller.line(),
        source_column: caller.column(),
    })?;
    let hdu = fptr
        .primary_hdu()
        .map_err(|e| fitsio_error(e, file, "primary", caller))?;
    let bmaj: Option<f64> = fits_get_optional_key(&mut fptr, &hdu, "BMAJ")?;
    let bmin: Option<f64> = fits_get_optional_key(&mut fptr, &hdu, "BMIN")?;
    let bpa: Option<f64> = fits_get_optional_key(&mut fptr, &hdu, "BPA")?;
    Ok(match (bmaj, bmin, bpa) {
        (Some(bmaj), Some(bmin), Some(bpa)) => Some(CleanBeam {
            major_rad: bmaj.to_radians(),
            minor_rad: bmin.to_radians(),
            pa_rad: bpa.to_radians(),
        }),
        _ => None,
    })
}
