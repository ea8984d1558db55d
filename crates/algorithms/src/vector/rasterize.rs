//! Polygon to raster conversion
//!
//! Burns polygon features onto the grid of a template raster. Features are
//! burned in collection order, so later features overwrite earlier ones
//! where they overlap.

use crate::maybe_rayon::*;
use geo::{BoundingRect, Coord, Geometry, Intersects, Point, Rect};
use tracing::debug;
use waterbodies_core::raster::Raster;
use waterbodies_core::vector::{AttributeTable, FeatureCollection};
use waterbodies_core::{Algorithm, Error, RasterElement, Result, CRS};

/// Parameters for rasterizing polygons
#[derive(Debug, Clone)]
pub struct RasterizeParams {
    /// Numeric attribute to burn; `None` burns 1.0 for every covered cell
    pub attribute_col: Option<String>,
    /// Burn every cell the polygon touches, not only cells whose centre is inside
    pub all_touched: bool,
    /// Value of cells not covered by any feature
    pub fill: f64,
}

impl Default for RasterizeParams {
    fn default() -> Self {
        Self {
            attribute_col: None,
            all_touched: false,
            fill: 0.0,
        }
    }
}

/// Rasterize algorithm
#[derive(Debug, Clone, Default)]
pub struct Rasterize;

impl Algorithm for Rasterize {
    /// Features to burn and the template raster
    type Input = (FeatureCollection, Raster<f64>);
    type Output = Raster<f64>;
    type Params = RasterizeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Rasterize"
    }

    fn description(&self) -> &'static str {
        "Burn polygon features onto a template raster grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (features, template) = input;
        rasterize(&features, &template, &params)
    }
}

/// Cells of `template`'s grid covered by `geometry`, in row-major order.
///
/// Only polygonal geometries cover cells. A cell is covered when its centre
/// lies inside or on the boundary of the geometry, or with `all_touched`
/// when the geometry intersects the cell at all.
pub fn covered_cells<T: RasterElement>(
    geometry: &Geometry<f64>,
    template: &Raster<T>,
    all_touched: bool,
) -> Vec<(usize, usize)> {
    if !matches!(
        geometry,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_)
    ) {
        return Vec::new();
    }
    let Some(bbox) = geometry.bounding_rect() else {
        return Vec::new();
    };

    let (rows, cols) = template.shape();
    let transform = template.transform();

    // Pixel window of the bounding box, padded by one cell for rounding
    let (c0, r0) = transform.geo_to_pixel(bbox.min().x, bbox.min().y);
    let (c1, r1) = transform.geo_to_pixel(bbox.max().x, bbox.max().y);
    if !(c0.is_finite() && c1.is_finite() && r0.is_finite() && r1.is_finite()) {
        return Vec::new();
    }
    let clamp = |v: f64, max: usize| -> usize { v.max(0.0).min(max as f64) as usize };
    let col_start = clamp(c0.min(c1).floor() - 1.0, cols);
    let col_end = clamp(c0.max(c1).ceil() + 1.0, cols);
    let row_start = clamp(r0.min(r1).floor() - 1.0, rows);
    let row_end = clamp(r0.max(r1).ceil() + 1.0, rows);

    let mut cells = Vec::new();
    for row in row_start..row_end {
        for col in col_start..col_end {
            let hit = if all_touched {
                let (xa, ya) = transform.pixel_to_geo_corner(col, row);
                let (xb, yb) = transform.pixel_to_geo_corner(col + 1, row + 1);
                let cell = Rect::new(Coord { x: xa, y: ya }, Coord { x: xb, y: yb });
                geometry.intersects(&cell)
            } else {
                let (x, y) = transform.pixel_to_geo(col, row);
                geometry.intersects(&Point::new(x, y))
            };
            if hit {
                cells.push((row, col));
            }
        }
    }
    cells
}

/// Fail with [`Error::CrsMismatch`] when both sides know their CRS and differ.
pub(crate) fn ensure_same_crs(vector: Option<&CRS>, raster: Option<&CRS>) -> Result<()> {
    if let (Some(a), Some(b)) = (vector, raster) {
        if !a.is_equivalent(b) {
            return Err(Error::CrsMismatch(a.identifier(), b.identifier()));
        }
    }
    Ok(())
}

/// Rasterize polygon features onto the grid of `template`.
///
/// The output has the template's shape, transform and CRS. Features with a
/// null attribute are skipped; non-numeric attributes are an error.
///
/// # Arguments
/// * `features` - Polygon features
/// * `template` - Raster providing the output grid
/// * `params` - Burn attribute, touch rule and fill value
pub fn rasterize<T: RasterElement>(
    features: &FeatureCollection,
    template: &Raster<T>,
    params: &RasterizeParams,
) -> Result<Raster<f64>> {
    ensure_same_crs(features.crs(), template.crs())?;

    let mut burns: Vec<(usize, f64)> = Vec::with_capacity(features.len());
    match &params.attribute_col {
        Some(column) => {
            if !features.has_column(column) {
                return Err(Error::InvalidParameter {
                    name: "attribute_col",
                    value: column.clone(),
                    reason: format!("not one of the columns {:?}", features.columns()),
                });
            }
            for row in 0..features.row_count() {
                let value = features.value(row, column);
                if value.is_null() {
                    debug!(row, column = %column, "Skipping feature with null burn value");
                    continue;
                }
                let burn = value.as_f64().ok_or_else(|| Error::InvalidParameter {
                    name: "attribute_col",
                    value: column.clone(),
                    reason: format!("non-numeric value '{}' in row {}", value, row),
                })?;
                burns.push((row, burn));
            }
        }
        None => burns.extend((0..features.len()).map(|row| (row, 1.0))),
    }

    let all = features.features();
    let coverage: Vec<Vec<(usize, usize)>> = burns
        .par_iter()
        .map(|&(row, _)| match &all[row].geometry {
            Some(g) => covered_cells(g, template, params.all_touched),
            None => Vec::new(),
        })
        .collect();

    let (rows, cols) = template.shape();
    let mut data = vec![params.fill; rows * cols];
    for (cells, &(_, burn)) in coverage.iter().zip(&burns) {
        for &(r, c) in cells {
            data[r * cols + c] = burn;
        }
    }

    let mut out = Raster::from_vec(data, rows, cols)?;
    out.set_transform(*template.transform());
    out.set_crs(template.crs().cloned());
    Ok(out)
}
