//! Waterbody identifiers
//!
//! A waterbody UID is the 9-character geohash of its centroid. Id lists on
//! the command line are comma-separated UIDs with no whitespace.

use regex::Regex;
use std::sync::LazyLock;
use waterbodies_core::{Error, Result};

/// Geohash length used for waterbody UIDs
pub const UID_PRECISION: usize = 9;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// A single UID
pub static RE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9b-hjkmnp-z]{9}$").expect("valid UID pattern"));

/// A comma-separated list of UIDs
pub static RE_IDS_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9b-hjkmnp-z]{9}(,[0-9b-hjkmnp-z]{9})*$").expect("valid UID list pattern")
});

/// Check whether `id` is a well-formed UID
pub fn is_valid_id(id: &str) -> bool {
    RE_ID.is_match(id)
}

/// Split and validate a comma-separated UID list.
///
/// Duplicates are kept in the order given.
pub fn parse_ids(ids: &str) -> Result<Vec<String>> {
    if !RE_IDS_STRING.is_match(ids) {
        return Err(Error::InvalidParameter {
            name: "ids",
            value: ids.to_string(),
            reason: "expected comma-separated 9-character geohashes without spaces".into(),
        });
    }
    Ok(ids.split(',').map(str::to_string).collect())
}

/// Encode a longitude/latitude pair as a geohash.
///
/// # Arguments
/// * `lon` - Longitude in degrees, -180 to 180
/// * `lat` - Latitude in degrees, -90 to 90
/// * `precision` - Number of characters, 1 to 12
pub fn geohash_encode(lon: f64, lat: f64, precision: usize) -> Result<String> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(Error::InvalidParameter {
            name: "lon",
            value: lon.to_string(),
            reason: "longitude must be within [-180, 180]".into(),
        });
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(Error::InvalidParameter {
            name: "lat",
            value: lat.to_string(),
            reason: "latitude must be within [-90, 90]".into(),
        });
    }
    if !(1..=12).contains(&precision) {
        return Err(Error::InvalidParameter {
            name: "precision",
            value: precision.to_string(),
            reason: "must be between 1 and 12".into(),
        });
    }

    let mut lon_range = (-180.0, 180.0);
    let mut lat_range = (-90.0, 90.0);
    let mut hash = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0u8;
    let mut index = 0usize;

    while hash.len() < precision {
        // Bits alternate longitude, latitude, starting with longitude
        let (range, value) = if even {
            (&mut lon_range, lon)
        } else {
            (&mut lat_range, lat)
        };
        let mid = (range.0 + range.1) / 2.0;
        index <<= 1;
        if value >= mid {
            index |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even = !even;

        bits += 1;
        if bits == 5 {
            hash.push(BASE32[index] as char);
            bits = 0;
            index = 0;
        }
    }

    Ok(hash)
}
