// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image simulated visibilities as configured by a toml argument file.

use std::{fs::File, io::Write};

use approx::assert_abs_diff_eq;
use hyperclean::{io::fits::read_image, ImagingArgs};
use ndarray::prelude::*;
use tempfile::tempdir;
use vec1::vec1;

use crate::{geometry, observe, two_sources, FREQ};

#[test]
fn test_arg_file_drives_an_imaging_run() {
    let tmp_dir = tempdir().expect("Couldn't make tempdir");
    let prefix = tmp_dir.path().join("sim");
    let arg_file = tmp_dir.path().join("imaging.toml");
    let mut fh = File::create(&arg_file).unwrap();
    write!(
        fh,
        r#"
[image]
size = [64]
cell = "4arcmin"

[gridding]
num_w_planes = 8

[deconvolution]
scales = [0.0]
niter = 500
gain = 0.2
threshold = "50mJy"

[output]
output_prefix = "{}"
outputs = ["model", "restored", "psf"]
no_progress_bars = true
"#,
        prefix.display()
    )
    .unwrap();
    drop(fh);

    let args = ImagingArgs {
        args_file: Some(arg_file),
        ..Default::default()
    };
    let params = args.merge().unwrap().parse().unwrap();

    let geometry = geometry(64, 4.0);
    // Two adjacent channels end up in one image channel.
    let mut vis = vec![observe(&two_sources(&geometry), vec1![FREQ - 5e5, FREQ + 5e5])];
    let products = params.run(&mut vis).unwrap();
    assert_eq!(products.geometry.num_chans(), 1);
    assert_abs_diff_eq!(products.geometry.freqs_hz[0], FREQ);
    assert_eq!(products.written.len(), 3);

    let restored = read_image(tmp_dir.path().join("sim_restored.fits")).unwrap();
    assert_eq!(restored.dim(), (1, 1, 64, 64));
    assert_abs_diff_eq!(restored[(0, 0, 36, 26)], 4.0, epsilon = 0.4);

    let model = read_image(tmp_dir.path().join("sim_model.fits")).unwrap();
    assert_eq!(model, products.model);
    assert_abs_diff_eq!(model.slice(s![0, 0, .., ..]).sum(), 5.5, epsilon = 0.5);

    let psf = read_image(tmp_dir.path().join("sim_psf.fits")).unwrap();
    assert_abs_diff_eq!(psf[(0, 0, 32, 32)], 1.0, epsilon = 1e-4);

    assert!(!tmp_dir.path().join("sim_residual.fits").exists());
}
