//! Firmware version gate.
//!
//! Versions are `major.minor.bugfix`. Major 0 is a development build and is
//! always accepted. Anything that does not parse is accepted as well.

use super::types::Model;

/// `(major, minor, bugfix)`
pub type Version = (u32, u32, u32);

/// Minimum supported firmware per family
pub fn min_version(model: Model) -> Version {
    match model {
        Model::Mambo => (2, 6, 6),
        Model::Cargo => (2, 1, 70),
        Model::Night => (2, 1, 70),
        Model::RollingSpider => (1, 99, 2),
    }
}

/// Parse the first three numeric components of a version string
pub fn parse_version(version: &str) -> Option<Version> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let bugfix = parts.next()?.parse().ok()?;
    Some((major, minor, bugfix))
}

/// True unless `version` parses and is below the model's minimum
pub fn is_up_to_date(model: Model, version: &str) -> bool {
    match parse_version(version) {
        Some((0, _, _)) => true,
        Some(v) => v >= min_version(model),
        None => true,
    }
}
