// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::Write;

use approx::assert_abs_diff_eq;
use indoc::indoc;
use serial_test::serial;
use tempfile::{Builder, TempDir};

use super::*;
use crate::{io::fits::write_image, tests::test_geometry};

fn minimal_args() -> ImagingArgs {
    ImagingArgs {
        image_args: ImageArgs {
            size: Some(vec![64]),
            cell: Some("30".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn write_arg_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_defaults_are_used() {
    let params = minimal_args().parse().unwrap();
    assert_eq!((params.nx, params.ny), (64, 64));
    assert_abs_diff_eq!(params.cell_x, (30.0_f64 / 3600.0).to_radians());
    assert_abs_diff_eq!(params.cell_y, params.cell_x);
    assert!(params.phase_centre.is_none());
    assert_eq!(params.pols.as_slice(), &[ImagePol::I]);
    assert_eq!(params.spectral_mode, SpectralMode::Mfs);
    assert_eq!(params.w_projection.num_w_planes, DEFAULT_NUM_W_PLANES);
    assert_eq!(params.clean, CleanSettings::default());
    assert!(params.beam.is_none());
    assert!(params.output_prefix.is_none());
    assert!(params.outputs.is_empty());
    assert!(params.draw_progress_bars);
}

#[test]
fn test_toml_arg_file_is_overridden_by_explicit_args() {
    let file = write_arg_file(
        ".toml",
        indoc! {r#"
            [image]
            size = [128, 96]
            cell = "1arcmin"
            pols = ["xx", "yy"]

            [gridding]
            num_w_planes = 8
            beam_type = "airy"
            dish_diameter = 12.0

            [deconvolution]
            niter = 50
            gain = 0.2
            threshold = "10mJy"
            residual_mode = "xfr"
        "#},
    );
    let mut args = ImagingArgs {
        args_file: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    args.deconvolution_args.niter = Some(7);
    let params = args.merge().unwrap().parse().unwrap();

    assert_eq!((params.nx, params.ny), (128, 96));
    assert_abs_diff_eq!(params.cell_x, (1.0_f64 / 60.0).to_radians());
    assert_eq!(params.pols.as_slice(), &[ImagePol::XX, ImagePol::YY]);
    assert_eq!(params.w_projection.num_w_planes, 8);
    assert_eq!(params.beam.as_ref().map(|b| b.name()), Some("Airy"));
    assert_eq!(params.clean.niter, 7);
    assert_abs_diff_eq!(params.clean.gain, 0.2);
    assert_abs_diff_eq!(params.clean.threshold, 0.01);
    assert_eq!(params.clean.residual_mode, ResidualMode::Xfr);
}

#[test]
fn test_json_arg_file() {
    let file = write_arg_file(
        ".json",
        indoc! {r#"
            {
                "image": { "size": [32], "cell": "0.5deg", "spectral_mode": "cube" },
                "deconvolution": { "num_scales": 4, "scale_increment": 2.0 },
                "output": { "output_prefix": "field", "no_progress_bars": true }
            }
        "#},
    );
    let args = ImagingArgs {
        args_file: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let params = args.merge().unwrap().parse().unwrap();

    assert_eq!(params.spectral_mode, SpectralMode::Cube);
    assert_eq!(params.clean.scales, default_scales(4, 2.0));
    assert_eq!(params.output_prefix, Some(PathBuf::from("field")));
    // No beam, so no beam products.
    assert_eq!(
        params.outputs,
        vec![
            ImageProduct::Model,
            ImageProduct::Residual,
            ImageProduct::Psf,
            ImageProduct::Restored
        ]
    );
    assert!(!params.draw_progress_bars);
}

#[test]
fn test_bad_arg_files() {
    let file = write_arg_file(".yaml", "image: {}");
    let args = ImagingArgs {
        args_file: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    assert!(matches!(args.merge(), Err(ImagingArgsError::ArgFile(_))));

    let file = write_arg_file(".toml", "[image\nsize = 3");
    let args = ImagingArgs {
        args_file: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    assert!(matches!(args.merge(), Err(ImagingArgsError::ArgFile(_))));

    let args = ImagingArgs {
        args_file: Some(PathBuf::from("/does/not/exist.toml")),
        ..Default::default()
    };
    assert!(matches!(args.merge(), Err(ImagingArgsError::IO(_))));
}

#[test]
fn test_image_arg_errors() {
    let result = ImagingArgs::default().parse();
    assert!(matches!(result, Err(ImagingArgsError::NoImageSize)));

    let mut args = minimal_args();
    args.image_args.size = Some(vec![1, 2, 3]);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::BadImageSize(_))
    ));

    let mut args = minimal_args();
    args.image_args.cell = None;
    assert!(matches!(args.parse(), Err(ImagingArgsError::NoCellSize)));

    let mut args = minimal_args();
    args.image_args.cell = Some("3 parsecs".to_string());
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::Unit {
            arg: "cell size",
            ..
        })
    ));

    let mut args = minimal_args();
    args.image_args.phase_centre = Some(vec![0.0, 100.0]);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::BadRaDec { .. })
    ));

    let mut args = minimal_args();
    args.image_args.pols = Some(vec!["Z".to_string()]);
    assert!(matches!(args.parse(), Err(ImagingArgsError::UnknownPol(_))));

    let mut args = minimal_args();
    args.image_args.pols = Some(vec![]);
    assert!(matches!(args.parse(), Err(ImagingArgsError::NoPols)));

    let mut args = minimal_args();
    args.image_args.spectral_mode = Some("rainbow".to_string());
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::UnknownSpectralMode { .. })
    ));
}

#[test]
fn test_beam_args() {
    let mut args = minimal_args();
    args.gridding_args.beam_type = Some("gaussian".to_string());
    args.gridding_args.beam_fwhm = Some("20".to_string());
    assert!(matches!(
        args.clone().parse(),
        Err(ImagingArgsError::MissingBeamArg {
            arg: "beam reference frequency",
            ..
        })
    ));

    args.gridding_args.beam_ref_freq = Some(150e6);
    let params = args.parse().unwrap();
    assert_eq!(params.beam.as_ref().map(|b| b.name()), Some("Gaussian"));

    let mut args = minimal_args();
    args.gridding_args.beam_type = Some("airy".to_string());
    args.gridding_args.dish_diameter = Some(-1.0);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::NotPositive {
            arg: "dish diameter",
            ..
        })
    ));

    let mut args = minimal_args();
    args.gridding_args.beam_type = Some("tophat".to_string());
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::UnknownBeamType { .. })
    ));

    let mut args = minimal_args();
    args.output_args.outputs = Some(vec!["pbcor".to_string()]);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::OutputNeedsBeam(_))
    ));
}

#[test]
fn test_gridding_arg_errors() {
    let mut args = minimal_args();
    args.gridding_args.num_w_planes = Some(0);
    assert!(matches!(args.parse(), Err(ImagingArgsError::ZeroWPlanes)));

    let mut args = minimal_args();
    args.gridding_args.conv_sampling = Some(0);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::ZeroConvSampling)
    ));

    let mut args = minimal_args();
    args.gridding_args.padding = Some(0.5);
    assert!(matches!(args.parse(), Err(ImagingArgsError::BadPadding(_))));

    let mut args = minimal_args();
    args.gridding_args.max_w = Some(0.0);
    assert!(matches!(args.parse(), Err(ImagingArgsError::BadMaxW(_))));
}

#[test]
fn test_deconvolution_arg_errors() {
    let mut args = minimal_args();
    args.deconvolution_args.scales = Some(vec![0.0, -3.0]);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::NegativeScale(_))
    ));

    for gain in [0.0, 1.5] {
        let mut args = minimal_args();
        args.deconvolution_args.gain = Some(gain);
        assert!(matches!(args.parse(), Err(ImagingArgsError::BadGain(_))));
    }

    let mut args = minimal_args();
    args.deconvolution_args.threshold = Some("-1mJy".to_string());
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::NegativeThreshold(_))
    ));

    let mut args = minimal_args();
    args.deconvolution_args.cycle_max_psf_fraction = Some(0.0);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::BadCycleMaxPsfFraction(_))
    ));

    let mut args = minimal_args();
    args.deconvolution_args.residual_mode = Some("fourier".to_string());
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::UnknownResidualMode { .. })
    ));

    let mut args = minimal_args();
    args.deconvolution_args.max_major_cycles = Some(0);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::ZeroMajorCycles)
    ));

    let mut args = minimal_args();
    args.output_args.outputs = Some(vec!["dirty".to_string()]);
    assert!(matches!(
        args.parse(),
        Err(ImagingArgsError::UnknownOutput { .. })
    ));

    let mut args = minimal_args();
    args.output_args.pb_limit = Some(1.0);
    assert!(matches!(args.parse(), Err(ImagingArgsError::BadPbLimit(_))));
}

#[test]
fn test_outputs_without_a_prefix_get_the_default_prefix() {
    let mut args = minimal_args();
    args.output_args.outputs = Some(vec!["Restored".to_string(), "model".to_string()]);
    let params = args.parse().unwrap();
    assert_eq!(
        params.output_prefix,
        Some(PathBuf::from(DEFAULT_OUTPUT_PREFIX))
    );
    assert_eq!(
        params.outputs,
        vec![ImageProduct::Restored, ImageProduct::Model]
    );
}

#[test]
#[serial]
fn test_mask_and_start_model_files() {
    let tmp_dir = TempDir::new().unwrap();
    let geometry = test_geometry(32, 30.0, 150e6);
    let mut mask = geometry.zeros();
    mask.slice_mut(s![0, 0, 8..24, 8..24]).fill(1.0);
    let mask_file = tmp_dir.path().join("mask.fits");
    write_image(&mask_file, mask.view(), &geometry, "", None).unwrap();

    let mut args = minimal_args();
    args.image_args.size = Some(vec![32]);
    args.deconvolution_args.mask = Some(mask_file.clone());
    args.deconvolution_args.start_model = Some(mask_file.clone());
    let params = args.parse().unwrap();
    let parsed_mask = params.mask.unwrap();
    assert_eq!(parsed_mask.dim(), (32, 32));
    assert_abs_diff_eq!(parsed_mask.sum(), 256.0);
    assert_eq!(params.start_model.unwrap(), mask);

    // The image is the wrong size for these files.
    let mut args = minimal_args();
    args.deconvolution_args.mask = Some(mask_file);
    match args.parse() {
        Err(ImagingArgsError::ImageShape {
            arg: "mask",
            expected,
            got,
            ..
        }) => {
            assert_eq!(expected, (64, 64));
            assert_eq!(got, (32, 32));
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("expected an error"),
    }
}
