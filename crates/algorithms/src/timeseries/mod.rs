//! Wet-pixel time series per waterbody
//!
//! - Extraction: classified observations to per-waterbody wet percentages
//! - CSV output: one file per waterbody

mod csv_output;
mod extract;

pub use csv_output::{timeseries_path, write_all_timeseries, write_timeseries_csv, DATE_FORMAT};
pub use extract::{
    generate_timeseries, Observation, PixelCounts, TimeseriesParams, TimeseriesRow, WaterbodyTimeseries, DRY, WET,
};
