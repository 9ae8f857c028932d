// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{gridding::GriddingError, vis::VisError};

#[derive(Error, Debug)]
pub enum EquationError {
    #[error("At least one field is needed to make images")]
    NoFields,

    #[error("No visibilities were supplied")]
    NoVisibilities,

    #[error("There are {fields} fields, but {models} model images were supplied")]
    FieldCountMismatch { fields: usize, models: usize },

    #[error(transparent)]
    Gridding(#[from] GriddingError),

    #[error(transparent)]
    Vis(#[from] VisError),
}
