//! I/O operations for reading and writing geospatial data
//!
//! - GeoTIFF rasters (water observations, frequency summaries, masks)
//! - GeoJSON polygon layers with attribute tables

mod geojson_io;
mod native;

pub use geojson_io::{parse_geojson, read_geojson, to_geojson_string, write_geojson};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer, GeoTiffOptions,
};
