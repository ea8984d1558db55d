//! Waterbody detection and identifiers
//!
//! - Detection: water-frequency raster to numbered waterbody polygons
//! - Ids: geohash UIDs and id list validation

mod detect;
mod ids;

pub use detect::{generate_waterbodies, GenerateWaterbodies, WaterbodyParams};
pub use ids::{geohash_encode, is_valid_id, parse_ids, RE_ID, RE_IDS_STRING, UID_PRECISION};
