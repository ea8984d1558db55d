//! Per-waterbody wet-pixel time series
//!
//! Each observation is a classified water raster: 128 is clear wet, 0 is
//! clear dry and every other value (cloud, shadow, nodata, ...) is invalid.
//! For every waterbody the polygon is burned onto the observation grid once
//! and the classes of its cells are counted per observation.

use crate::id_field::guess_id_field;
use crate::maybe_rayon::*;
use crate::vector::{covered_cells, ensure_same_crs};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use waterbodies_core::raster::Raster;
use waterbodies_core::vector::{AttributeTable, FeatureCollection};
use waterbodies_core::{Error, Result};

/// Observation value of a clear wet pixel
pub const WET: u8 = 128;
/// Observation value of a clear dry pixel
pub const DRY: u8 = 0;

/// One classified water observation
#[derive(Debug, Clone)]
pub struct Observation {
    pub date: DateTime<Utc>,
    pub raster: Raster<u8>,
}

/// Parameters for time-series extraction
#[derive(Debug, Clone)]
pub struct TimeseriesParams {
    /// ID column to use instead of guessing one
    pub use_id: Option<String>,
    /// Only these waterbodies, in this order
    pub ids: Option<Vec<String>>,
    /// Largest invalid fraction of a waterbody's pixels before an observation is dropped
    pub invalid_threshold: f64,
    /// Count every pixel the polygon touches
    pub all_touched: bool,
}

impl Default for TimeseriesParams {
    fn default() -> Self {
        Self {
            use_id: None,
            ids: None,
            invalid_threshold: 0.1,
            all_touched: false,
        }
    }
}

/// Pixel classes of one waterbody in one observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelCounts {
    pub wet: usize,
    pub dry: usize,
    pub invalid: usize,
}

impl PixelCounts {
    /// Classify the given cells of an observation
    pub fn count(raster: &Raster<u8>, cells: &[(usize, usize)]) -> Self {
        let data = raster.data();
        let mut counts = Self::default();
        for &(r, c) in cells {
            let v = data[(r, c)];
            if raster.is_nodata(v) {
                counts.invalid += 1;
                continue;
            }
            match v {
                WET => counts.wet += 1,
                DRY => counts.dry += 1,
                _ => counts.invalid += 1,
            }
        }
        counts
    }
}

/// One kept observation of a waterbody
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesRow {
    pub date: DateTime<Utc>,
    /// 100 * wet / n
    pub wet_percentage: f64,
    pub wet_count: usize,
}

/// Time series of one waterbody
#[derive(Debug, Clone, PartialEq)]
pub struct WaterbodyTimeseries {
    pub id: String,
    /// Pixels inside the waterbody polygon (n)
    pub pixel_count: usize,
    pub rows: Vec<TimeseriesRow>,
}

/// Extract wet-pixel time series for waterbodies.
///
/// The ID column is resolved with [`guess_id_field`]. Observations are
/// processed in date order and must all share one grid. A waterbody whose
/// polygon covers no pixel gets an empty series.
///
/// # Arguments
/// * `waterbodies` - Waterbody polygons with an identifier column
/// * `observations` - Classified water observations, in any order
/// * `params` - ID selection and invalid-pixel tolerance
pub fn generate_timeseries(
    waterbodies: &FeatureCollection,
    observations: &[Observation],
    params: &TimeseriesParams,
) -> Result<Vec<WaterbodyTimeseries>> {
    if !(0.0..=1.0).contains(&params.invalid_threshold) {
        return Err(Error::InvalidParameter {
            name: "invalid_threshold",
            value: params.invalid_threshold.to_string(),
            reason: "must be a fraction between 0 and 1".into(),
        });
    }

    let id_column = guess_id_field(waterbodies, params.use_id.as_deref())?;
    info!(column = %id_column, "Using ID column");

    let mut ordered: Vec<&Observation> = observations.iter().collect();
    ordered.sort_by_key(|o| o.date);
    let Some(template) = ordered.first().map(|o| &o.raster) else {
        warn!("No observations given; no time series produced");
        return Ok(Vec::new());
    };
    for obs in &ordered[1..] {
        template.ensure_same_shape(&obs.raster)?;
    }
    ensure_same_crs(waterbodies.crs(), template.crs())?;

    let selected = select_rows(waterbodies, &id_column, params.ids.as_deref())?;
    debug!(waterbodies = selected.len(), observations = ordered.len(), "Extracting time series");

    let features = waterbodies.features();
    let series: Vec<WaterbodyTimeseries> = selected
        .par_iter()
        .map(|(id, row)| {
            let cells = match &features[*row].geometry {
                Some(g) => covered_cells(g, template, params.all_touched),
                None => Vec::new(),
            };
            let n = cells.len();
            if n == 0 {
                warn!(id = %id, "Waterbody covers no pixels of the observation grid");
                return WaterbodyTimeseries {
                    id: id.clone(),
                    pixel_count: 0,
                    rows: Vec::new(),
                };
            }

            let mut rows = Vec::with_capacity(ordered.len());
            for obs in &ordered {
                let counts = PixelCounts::count(&obs.raster, &cells);
                let invalid_fraction = counts.invalid as f64 / n as f64;
                if invalid_fraction > params.invalid_threshold {
                    debug!(id = %id, date = %obs.date, invalid_fraction, "Skipping observation");
                    continue;
                }
                rows.push(TimeseriesRow {
                    date: obs.date,
                    wet_percentage: 100.0 * counts.wet as f64 / n as f64,
                    wet_count: counts.wet,
                });
            }

            WaterbodyTimeseries {
                id: id.clone(),
                pixel_count: n,
                rows,
            }
        })
        .collect();

    Ok(series)
}

/// Rows to process as `(id, row index)`, in table order or subset order.
///
/// Ids name output files, so a null id or two rows with the same id text
/// are rejected.
fn select_rows(
    waterbodies: &FeatureCollection,
    id_column: &str,
    subset: Option<&[String]>,
) -> Result<Vec<(String, usize)>> {
    let mut all: Vec<(String, usize)> = Vec::with_capacity(waterbodies.row_count());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(waterbodies.row_count());
    for row in 0..waterbodies.row_count() {
        let value = waterbodies.value(row, id_column);
        if value.is_null() {
            return Err(Error::InvalidParameter {
                name: "id",
                value: format!("row {}", row),
                reason: format!("null value in the {} column", id_column),
            });
        }
        let id = value.to_string();
        if let Some(first) = index.insert(id.clone(), row) {
            return Err(Error::InvalidParameter {
                name: "id",
                value: id,
                reason: format!("rows {} and {} share this {} value", first, row, id_column),
            });
        }
        all.push((id, row));
    }

    let Some(subset) = subset else {
        return Ok(all);
    };

    let unknown: Vec<&str> = subset
        .iter()
        .map(String::as_str)
        .filter(|id| !index.contains_key(*id))
        .collect();
    if !unknown.is_empty() {
        return Err(Error::InvalidParameter {
            name: "ids",
            value: unknown.join(","),
            reason: format!("not found in the {} column", id_column),
        });
    }

    Ok(subset.iter().map(|id| (id.clone(), index[id.as_str()])).collect())
}
