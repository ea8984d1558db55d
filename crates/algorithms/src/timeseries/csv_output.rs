//! CSV files of waterbody time series
//!
//! One file per waterbody at `<output>/<first four id characters>/<id>.csv`,
//! so that tens of thousands of waterbodies spread over many directories.

use super::extract::WaterbodyTimeseries;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use waterbodies_core::Result;

/// Timestamp format of the `Observation Date` column
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Location of a waterbody's CSV below `output_dir`
pub fn timeseries_path(output_dir: &Path, id: &str) -> PathBuf {
    let prefix: String = id.chars().take(4).collect();
    output_dir.join(prefix).join(format!("{}.csv", id))
}

/// Write one waterbody's time series, creating parent directories.
///
/// Returns the path written.
pub fn write_timeseries_csv(series: &WaterbodyTimeseries, output_dir: &Path) -> Result<PathBuf> {
    let path = timeseries_path(output_dir, &series.id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::Writer::from_path(&path)?;
    wtr.write_record([
        "Observation Date".to_string(),
        "Wet pixel percentage".to_string(),
        format!("Wet pixel count (n = {})", series.pixel_count),
    ])?;
    for row in &series.rows {
        wtr.write_record(&[
            row.date.format(DATE_FORMAT).to_string(),
            format!("{:.2}", row.wet_percentage),
            row.wet_count.to_string(),
        ])?;
    }
    wtr.flush()?;

    debug!(id = %series.id, rows = series.rows.len(), path = %path.display(), "Wrote time series");
    Ok(path)
}

/// Write every series to `output_dir`; returns the paths in input order
pub fn write_all_timeseries(series: &[WaterbodyTimeseries], output_dir: &Path) -> Result<Vec<PathBuf>> {
    series.iter().map(|s| write_timeseries_csv(s, output_dir)).collect()
}
