//! Waterbody polygons from a water-frequency summary
//!
//! Cells observed wet at least `wet_threshold` of the time are grouped into
//! 8-connected regions, vectorized, filtered by area and numbered.

use super::ids::{geohash_encode, UID_PRECISION};
use crate::vector::{polygonize, Connectivity, PolygonizeParams};
use geo::{Area, Centroid, Euclidean, Geometry, Length};
use tracing::{debug, info};
use waterbodies_core::raster::Raster;
use waterbodies_core::vector::{Feature, FeatureCollection};
use waterbodies_core::{Algorithm, Error, Result};

/// Parameters for waterbody detection
#[derive(Debug, Clone)]
pub struct WaterbodyParams {
    /// Minimum wet frequency (0 to 1) for a cell to count as water
    pub wet_threshold: f64,
    /// Smallest polygon kept, in CRS units squared (default: three cells)
    pub min_area: Option<f64>,
    /// Largest polygon kept, in CRS units squared
    pub max_area: Option<f64>,
    /// Add a `UID` geohash column (needs a longitude/latitude CRS)
    pub assign_uid: bool,
}

impl Default for WaterbodyParams {
    fn default() -> Self {
        Self {
            wet_threshold: 0.1,
            min_area: None,
            max_area: None,
            assign_uid: false,
        }
    }
}

/// Waterbody detection algorithm
#[derive(Debug, Clone, Default)]
pub struct GenerateWaterbodies;

impl Algorithm for GenerateWaterbodies {
    type Input = Raster<f64>;
    type Output = FeatureCollection;
    type Params = WaterbodyParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "GenerateWaterbodies"
    }

    fn description(&self) -> &'static str {
        "Detect waterbody polygons from a water-frequency raster"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        generate_waterbodies(&input, &params)
    }
}

fn perimeter(geom: &Geometry<f64>) -> f64 {
    let polygons = match geom {
        Geometry::Polygon(p) => std::slice::from_ref(p),
        Geometry::MultiPolygon(mp) => mp.0.as_slice(),
        _ => return 0.0,
    };
    polygons
        .iter()
        .map(|p| {
            p.exterior().length::<Euclidean>()
                + p.interiors().iter().map(|ring| ring.length::<Euclidean>()).sum::<f64>()
        })
        .sum()
}

/// Detect waterbodies in a water-frequency raster.
///
/// Output columns are `UID` (only with `assign_uid`), `WB_ID` (1-based, in
/// scan order of each polygon's first cell), `area_m2` and `perim_m`. Areas
/// and perimeters are in CRS units. NaN and nodata cells are never wet.
///
/// # Arguments
/// * `frequency` - Fraction of clear observations that were wet, 0 to 1
/// * `params` - Threshold, area limits and UID option
pub fn generate_waterbodies(frequency: &Raster<f64>, params: &WaterbodyParams) -> Result<FeatureCollection> {
    if !(0.0..=1.0).contains(&params.wet_threshold) {
        return Err(Error::InvalidParameter {
            name: "wet_threshold",
            value: params.wet_threshold.to_string(),
            reason: "must be a frequency between 0 and 1".into(),
        });
    }
    let min_area = params.min_area.unwrap_or(3.0 * frequency.cell_area());
    if let Some(max_area) = params.max_area {
        if max_area < min_area {
            return Err(Error::InvalidParameter {
                name: "max_area",
                value: max_area.to_string(),
                reason: format!("smaller than the minimum area {}", min_area),
            });
        }
    }
    if params.assign_uid && frequency.crs().and_then(|c| c.epsg()) != Some(4326) {
        return Err(Error::InvalidParameter {
            name: "assign_uid",
            value: frequency.crs().map_or_else(|| "unknown CRS".to_string(), |c| c.identifier()),
            reason: "geohash UIDs need longitude/latitude (EPSG:4326) coordinates".into(),
        });
    }

    let (rows, cols) = frequency.shape();
    let wet_cells: Vec<u8> = frequency
        .data()
        .iter()
        .map(|&v| u8::from(!frequency.is_nodata(v) && v >= params.wet_threshold))
        .collect();
    let mut wet = Raster::from_vec(wet_cells, rows, cols)?;
    wet.set_transform(*frequency.transform());
    wet.set_crs(frequency.crs().cloned());

    let polygons = polygonize(
        &wet,
        &PolygonizeParams {
            attribute_col: "wet".to_string(),
            connectivity: Connectivity::Eight,
            mask: Some(wet.clone()),
        },
    )?;

    let mut columns = vec!["WB_ID", "area_m2", "perim_m"];
    if params.assign_uid {
        columns.insert(0, "UID");
    }
    let mut out = FeatureCollection::with_columns(columns);
    out.set_crs(frequency.crs().cloned());

    let mut filtered = 0usize;
    for feature in polygons {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let area = geometry.unsigned_area();
        if area < min_area || params.max_area.is_some_and(|max| area > max) {
            filtered += 1;
            continue;
        }

        let mut wb = Feature::empty();
        if params.assign_uid {
            let centroid = geometry.centroid().ok_or_else(|| Error::Algorithm("empty waterbody polygon".into()))?;
            wb.set_property("UID", geohash_encode(centroid.x(), centroid.y(), UID_PRECISION)?);
        }
        wb.set_property("WB_ID", out.len() as i64 + 1);
        wb.set_property("area_m2", area);
        wb.set_property("perim_m", perimeter(&geometry));
        wb.geometry = Some(geometry);
        out.push(wb);
    }

    debug!(filtered, min_area, max_area = ?params.max_area, "Area filter applied");
    info!(count = out.len(), "Detected waterbodies");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use waterbodies_core::vector::{AttributeTable, AttributeValue};
    use waterbodies_core::{GeoTransform, CRS};

    /// 8x8 frequency grid of 10 m cells with three wet patches
    fn frequency() -> Raster<f64> {
        let mut r = Raster::filled(8, 8, 0.0);
        r.set_transform(GeoTransform::new(1000.0, 2000.0, 10.0, -10.0));
        // 3x3 lake
        for row in 1..4 {
            for col in 1..4 {
                r.set(row, col, 0.6).unwrap();
            }
        }
        // Single wet cell, below the default minimum area
        r.set(6, 1, 0.9).unwrap();
        // Diagonal chain joined by corner contact
        r.set(5, 5, 0.2).unwrap();
        r.set(6, 6, 0.2).unwrap();
        r.set(7, 7, 0.2).unwrap();
        // Dry enough to stay out, and missing data
        r.set(0, 7, 0.05).unwrap();
        r.set(1, 7, f64::NAN).unwrap();
        r
    }

    #[test]
    fn detects_and_filters() {
        let fc = generate_waterbodies(&frequency(), &WaterbodyParams::default()).unwrap();

        assert_eq!(fc.columns(), ["WB_ID", "area_m2", "perim_m"]);
        assert_eq!(fc.row_count(), 2);
        assert_eq!(fc.value(0, "WB_ID"), &AttributeValue::Int(1));
        assert_eq!(fc.value(1, "WB_ID"), &AttributeValue::Int(2));

        let lake_area = fc.value(0, "area_m2").as_f64().unwrap();
        assert_relative_eq!(lake_area, 900.0, epsilon = 1e-9);
        assert_relative_eq!(fc.value(0, "perim_m").as_f64().unwrap(), 120.0, epsilon = 1e-9);

        let chain_area = fc.value(1, "area_m2").as_f64().unwrap();
        assert_relative_eq!(chain_area, 300.0, epsilon = 1e-9);
    }

    #[test]
    fn perimeter_includes_islands() {
        let mut r = frequency();
        r.set(2, 2, 0.0).unwrap();
        let fc = generate_waterbodies(&r, &WaterbodyParams::default()).unwrap();
        assert_relative_eq!(fc.value(0, "area_m2").as_f64().unwrap(), 800.0, epsilon = 1e-9);
        assert_relative_eq!(fc.value(0, "perim_m").as_f64().unwrap(), 160.0, epsilon = 1e-9);
    }

    #[test]
    fn area_limits() {
        let params = WaterbodyParams {
            min_area: Some(50.0),
            max_area: Some(500.0),
            ..Default::default()
        };
        let fc = generate_waterbodies(&frequency(), &params).unwrap();
        let areas: Vec<f64> = fc.column_values("area_m2").filter_map(AttributeValue::as_f64).collect();
        assert_eq!(areas.len(), 2);
        // Scan order: the chain starts on row 5, the single cell on row 6
        assert_relative_eq!(areas[0], 300.0, epsilon = 1e-9);
        assert_relative_eq!(areas[1], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn threshold_must_be_a_frequency() {
        let params = WaterbodyParams {
            wet_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            generate_waterbodies(&frequency(), &params),
            Err(Error::InvalidParameter { name: "wet_threshold", .. })
        ));
    }

    #[test]
    fn uid_needs_lon_lat() {
        let params = WaterbodyParams {
            assign_uid: true,
            ..Default::default()
        };
        assert!(matches!(
            generate_waterbodies(&frequency(), &params),
            Err(Error::InvalidParameter { name: "assign_uid", .. })
        ));
    }

    #[test]
    fn uid_from_centroid() {
        let mut r = Raster::filled(4, 4, 0.0);
        // 0.0001 degree cells around Lake Ginninderra
        r.set_transform(GeoTransform::new(149.0688, -35.2302, 0.0001, -0.0001));
        r.set_crs(Some(CRS::wgs84()));
        for row in 0..3 {
            for col in 0..3 {
                r.set(row, col, 1.0).unwrap();
            }
        }
        let params = WaterbodyParams {
            assign_uid: true,
            ..Default::default()
        };
        let fc = generate_waterbodies(&r, &params).unwrap();
        assert_eq!(fc.columns()[0], "UID");
        let uid = fc.value(0, "UID").to_string();
        assert_eq!(uid.len(), 9);
        assert!(uid.starts_with("r3dp84"));
    }
}
