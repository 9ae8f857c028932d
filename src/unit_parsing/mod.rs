// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to parse strings into plain numbers or some quantity with a unit.

mod error;

pub use error::UnitParseError;

use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
#[allow(non_camel_case_types)]
pub(crate) enum AngleFormat {
    /// Arcseconds
    arcsec,

    /// Arcminutes
    arcmin,

    /// Degrees
    deg,

    /// Radians
    rad,
}

impl AngleFormat {
    fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleFormat::arcsec => (value / 3600.0).to_radians(),
            AngleFormat::arcmin => (value / 60.0).to_radians(),
            AngleFormat::deg => value.to_radians(),
            AngleFormat::rad => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
#[allow(non_camel_case_types)]
pub(crate) enum FluxFormat {
    /// Janskys
    Jy,

    /// milliJanskys
    mJy,

    /// microJanskys
    uJy,
}

impl FluxFormat {
    fn to_jy(self, value: f64) -> f64 {
        match self {
            FluxFormat::Jy => value,
            FluxFormat::mJy => value * 1e-3,
            FluxFormat::uJy => value * 1e-6,
        }
    }
}

/// Split "1.5arcsec" into 1.5 and the matching unit. Units are matched case
/// insensitively.
fn split_unit<U>(s: &str, unit_type: &'static str) -> Result<(f64, Option<U>), UnitParseError>
where
    U: IntoEnumIterator + Into<&'static str> + Copy,
{
    let s = s.trim();
    if let Ok(number) = s.parse::<f64>() {
        return Ok((number, None));
    }

    let prefix = s.trim_end_matches(char::is_alphabetic);
    let suffix = &s[prefix.len()..];
    for unit in U::iter() {
        let unit_str: &'static str = unit.into();
        if suffix.eq_ignore_ascii_case(unit_str) {
            return match prefix.trim().parse() {
                Ok(number) => Ok((number, Some(unit))),
                Err(_) => Err(UnitParseError::GotUnitButCantParse {
                    input: s.to_string(),
                    unit: unit_str,
                }),
            };
        }
    }

    Err(UnitParseError::Unknown {
        input: s.to_string(),
        unit_type,
    })
}

/// Parse a string that may have a unit of angle attached to it. The result is
/// in radians; a naked number is interpreted with `default_unit`.
pub(crate) fn parse_angle(s: &str, default_unit: AngleFormat) -> Result<f64, UnitParseError> {
    let (number, unit) = split_unit::<AngleFormat>(s, "angle")?;
    Ok(unit.unwrap_or(default_unit).to_radians(number))
}

/// Parse a string that may have a unit of flux density attached to it. The
/// result is in Janskys; a naked number is already in Janskys.
pub(crate) fn parse_flux_density(s: &str) -> Result<f64, UnitParseError> {
    let (number, unit) = split_unit::<FluxFormat>(s, "flux density")?;
    Ok(unit.unwrap_or(FluxFormat::Jy).to_jy(number))
}
