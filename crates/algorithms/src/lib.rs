//! # Waterbodies Algorithms
//!
//! Processing steps for mapping surface-water bodies.
//!
//! ## Modules
//!
//! - **id_field**: Resolve the column that uniquely identifies each waterbody
//! - **vector**: Polygonize rasters, rasterize polygons
//! - **waterbodies**: Detect waterbodies from a water-frequency raster, geohash UIDs
//! - **timeseries**: Wet-pixel percentage time series and their CSV files

pub mod id_field;
mod maybe_rayon;
pub mod timeseries;
pub mod vector;
pub mod waterbodies;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::id_field::{
        guess_id_field, id_field_values_is_unique, IdFieldError, IdFieldResolver, ID_FIELD_PREFERENCE,
    };
    pub use crate::timeseries::{
        generate_timeseries, write_all_timeseries, write_timeseries_csv, Observation, TimeseriesParams,
        WaterbodyTimeseries,
    };
    pub use crate::vector::{
        polygonize, rasterize, Connectivity, Polygonize, PolygonizeParams, Rasterize, RasterizeParams,
    };
    pub use crate::waterbodies::{
        generate_waterbodies, geohash_encode, is_valid_id, parse_ids, GenerateWaterbodies, WaterbodyParams,
    };
    pub use waterbodies_core::prelude::*;
}
