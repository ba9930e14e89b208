//! MySQL server version constants.
//!
//! Version numbers follow MySQL's internal format: `MAJOR * 10000 + MINOR * 100 + PATCH`.

use std::num::NonZeroI32;

pub const MYSQL_5_7: i32 = 50700;
pub const MYSQL_8_0: i32 = 80000;
/// First release accepting `INSERT ... AS alias ON DUPLICATE KEY UPDATE`.
pub const MYSQL_8_0_19: i32 = 80019;

/// Returns [`true`] if the server version meets or exceeds the required version.
///
/// Unknown server versions never meet a requirement.
pub fn meets_version(server_version: Option<NonZeroI32>, required_version: i32) -> bool {
    server_version.is_some_and(|v| v.get() >= required_version)
}

/// Parses a server version string like `8.0.35` or `5.7.44-log` into the numeric format.
///
/// Returns `None` if the string cannot be parsed or results in zero.
pub fn extract_server_version(server_version_str: impl AsRef<str>) -> Option<NonZeroI32> {
    let version_part = server_version_str
        .as_ref()
        .split_whitespace()
        .next()
        .unwrap_or("0.0.0");

    let version_part = version_part.split('-').next().unwrap_or("0.0.0");

    let mut components = version_part
        .split('.')
        .map(|component| component.parse::<i32>().unwrap_or(0));

    let major = components.next().unwrap_or(0);
    let minor = components.next().unwrap_or(0);
    let patch = components.next().unwrap_or(0);

    NonZeroI32::new(major * 10000 + minor * 100 + patch)
}
