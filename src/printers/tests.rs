// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;

#[test]
fn test_tree_lines() {
    let blocks = vec![
        vec!["Image: 64x64"],
        vec!["Scales: [0, 3]", "Gain: 0.1"],
        vec!["Threshold: 0.05 Jy"],
    ];
    assert_eq!(
        tree_lines(&blocks),
        vec![
            "├ Image: 64x64",
            "├ Scales: [0, 3]",
            "│ Gain: 0.1",
            "└ Threshold: 0.05 Jy",
        ]
    );

    // A multi-line final block stays open.
    let blocks = vec![vec!["Major cycle 1", "Peak residual: 1.0 Jy"]];
    assert_eq!(
        tree_lines(&blocks),
        vec!["├ Major cycle 1", "│ Peak residual: 1.0 Jy"]
    );

    assert!(tree_lines::<&str>(&[]).is_empty());
}
