//! Conversion between raster grids and polygon features
//!
//! - Polygonize: connected regions of equal value to polygons
//! - Rasterize: polygons burned onto a template grid

mod polygonize;
mod rasterize;

pub(crate) use rasterize::ensure_same_crs;
pub use polygonize::{polygonize, Connectivity, Polygonize, PolygonizeParams};
pub use rasterize::{covered_cells, rasterize, Rasterize, RasterizeParams};
