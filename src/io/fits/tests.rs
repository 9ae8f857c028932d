// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use fitsio::FitsFile;
use ndarray::prelude::*;
use serial_test::serial;
use tempfile::TempDir;
use vec1::vec1;

use super::*;
use crate::{image::ImagePol, tests::test_geometry};

#[test]
#[serial]
fn test_write_then_read_image_with_header() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("image.fits");

    let mut geometry = test_geometry(16, 2.0, 150e6);
    geometry.pols = vec1![ImagePol::XX, ImagePol::YY];
    let image = Array4::from_shape_fn(geometry.shape(), |(c, p, y, x)| {
        (c * 1000 + p * 100 + y * 10 + x) as f32
    });
    let beam = CleanBeam {
        major_rad: 3e-3,
        minor_rad: 2e-3,
        pa_rad: 0.5,
    };
    write_image(&file, image.view(), &geometry, "Jy/beam", Some(&beam)).unwrap();

    let read = read_image(&file).unwrap();
    assert_eq!(read.dim(), image.dim());
    assert_eq!(read, image);

    let read_beam = read_clean_beam(&file).unwrap().unwrap();
    assert_abs_diff_eq!(read_beam.major_rad, beam.major_rad, epsilon = 1e-12);
    assert_abs_diff_eq!(read_beam.minor_rad, beam.minor_rad, epsilon = 1e-12);
    assert_abs_diff_eq!(read_beam.pa_rad, beam.pa_rad, epsilon = 1e-12);

    let mut fptr = FitsFile::open(&file).unwrap();
    let hdu = fptr.primary_hdu().unwrap();
    let ctype1: String = hdu.read_key(&mut fptr, "CTYPE1").unwrap();
    assert_eq!(ctype1, "RA---SIN");
    let ctype3: String = hdu.read_key(&mut fptr, "CTYPE3").unwrap();
    assert_eq!(ctype3, "STOKES");
    let crpix1: f64 = hdu.read_key(&mut fptr, "CRPIX1").unwrap();
    assert_abs_diff_eq!(crpix1, 9.0);
    let cdelt1: f64 = hdu.read_key(&mut fptr, "CDELT1").unwrap();
    assert_abs_diff_eq!(cdelt1, -2.0 / 60.0, epsilon = 1e-12);
    let crval2: f64 = hdu.read_key(&mut fptr, "CRVAL2").unwrap();
    assert_abs_diff_eq!(crval2, -27.0, epsilon = 1e-10);
    // XX and YY are -5 and -6.
    let crval3: f64 = hdu.read_key(&mut fptr, "CRVAL3").unwrap();
    let cdelt3: f64 = hdu.read_key(&mut fptr, "CDELT3").unwrap();
    assert_abs_diff_eq!(crval3, -5.0);
    assert_abs_diff_eq!(cdelt3, -1.0);
    let bunit: String = hdu.read_key(&mut fptr, "BUNIT").unwrap();
    assert_eq!(bunit, "Jy/beam");
}

#[test]
#[serial]
fn test_existing_files_are_overwritten() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("image.fits");
    let geometry = test_geometry(8, 2.0, 150e6);

    write_image(&file, geometry.zeros().view(), &geometry, "Jy/beam", None).unwrap();
    let ones = Array4::ones(geometry.shape());
    write_image(&file, ones.view(), &geometry, "Jy/pixel", None).unwrap();

    assert_eq!(read_image(&file).unwrap(), ones);
    assert!(read_clean_beam(&file).unwrap().is_none());
}

#[test]
#[serial]
fn test_fits_errors() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("image.fits");
    let geometry = test_geometry(8, 2.0, 150e6);

    let wrong = Array4::<f32>::zeros((1, 1, 4, 4));
    let result = write_image(&file, wrong.view(), &geometry, "Jy/beam", None);
    assert!(matches!(result, Err(FitsError::BadShape { .. })));

    let result = read_image(tmp_dir.path().join("missing.fits"));
    match result {
        Err(FitsError::Open { source_file, .. }) => assert!(source_file.ends_with("tests.rs")),
        _ => panic!("expected an open error"),
    }
}
