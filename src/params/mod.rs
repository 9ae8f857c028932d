// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters that have been parsed and are ready to be used directly.
//!
//! The code here mirrors the code within the `args` module; `args` is
//! unparsed and user-facing, whereas these parameters have been checked.

mod imaging;

pub use imaging::{
    ImageProduct, ImagingError, ImagingParams, ImagingProducts, SpectralMode,
};
