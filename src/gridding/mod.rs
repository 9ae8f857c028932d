// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Convolutional gridding and degridding with W projection.

mod convfunc;
mod error;
mod ftmachine;
mod pb;
mod spheroidal;

pub use convfunc::{
    CfKey, ConvFuncGenerator, ConvFuncStore, WOnlyConvFuncGenerator, WTermConvFunc,
};
pub use error::{ConvFuncError, GriddingError};
pub use ftmachine::{FtMachine, WOnlyProjectFt, WProjectionSettings};
pub use pb::{apply_pb_correction, AiryBeam, GaussianBeam, PointedBeam, PrimaryBeam};
pub(crate) use spheroidal::grdsf;
