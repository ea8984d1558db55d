//! Waterbodies CLI - surface-water body mapping

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use waterbodies_algorithms::id_field::guess_id_field;
use waterbodies_algorithms::timeseries::{generate_timeseries, write_all_timeseries, Observation, TimeseriesParams};
use waterbodies_algorithms::vector::{polygonize, rasterize, Connectivity, PolygonizeParams, RasterizeParams};
use waterbodies_algorithms::waterbodies::{generate_waterbodies, parse_ids, WaterbodyParams};
use waterbodies_core::io::{read_geojson, read_geotiff, write_geojson, write_geotiff, GeoTiffOptions};
use waterbodies_core::{FeatureCollection, Raster, RasterElement};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "waterbodies")]
#[command(author, version, about = "Surface-water body mapping", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Print the column that uniquely identifies each waterbody
    GuessId {
        /// Waterbody polygons (GeoJSON)
        input: PathBuf,
        /// Use this column instead of guessing
        #[arg(long)]
        use_id: Option<String>,
    },
    /// Convert connected regions of equal value into polygons
    Vectorize {
        /// Input raster file
        input: PathBuf,
        /// Output GeoJSON file
        output: PathBuf,
        /// Attribute column receiving the cell value
        #[arg(short, long, default_value = "attribute")]
        attribute_col: String,
        /// Cell connectivity: 4 or 8
        #[arg(short, long, default_value = "4")]
        connectivity: String,
        /// Mask raster; cells where it is 0 are skipped
        #[arg(short, long)]
        mask: Option<PathBuf>,
    },
    /// Burn polygons onto the grid of a template raster
    Rasterize {
        /// Input polygons (GeoJSON)
        input: PathBuf,
        /// Template raster providing the output grid
        template: PathBuf,
        /// Output raster file
        output: PathBuf,
        /// Numeric attribute to burn (default: 1 for covered cells)
        #[arg(short, long)]
        attribute_col: Option<String>,
        /// Burn every cell the polygons touch
        #[arg(long)]
        all_touched: bool,
    },
    /// Detect waterbody polygons in a water-frequency raster
    GenerateWaterbodies {
        /// Water-frequency raster (0 to 1)
        input: PathBuf,
        /// Output GeoJSON file
        output: PathBuf,
        /// Minimum wet frequency for a cell to count as water
        #[arg(short, long, default_value = "0.1")]
        wet_threshold: f64,
        /// Smallest polygon area kept, in CRS units squared (default: three cells)
        #[arg(long)]
        min_area: Option<f64>,
        /// Largest polygon area kept, in CRS units squared
        #[arg(long)]
        max_area: Option<f64>,
        /// Add geohash UIDs (needs an EPSG:4326 raster)
        #[arg(long)]
        uid: bool,
    },
    /// Write one wet-pixel time series CSV per waterbody
    GenerateTimeseries {
        /// Waterbody polygons (GeoJSON)
        input: PathBuf,
        /// JSON manifest of observations: [{"date": ..., "path": ...}, ...]
        #[arg(long)]
        observations: PathBuf,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// ID column to use instead of guessing one
        #[arg(long)]
        use_id: Option<String>,
        /// Comma-separated waterbody UIDs to process
        #[arg(long)]
        ids: Option<String>,
        /// Largest invalid pixel fraction before an observation is dropped
        #[arg(long, default_value = "0.1")]
        invalid_threshold: f64,
        /// Count every pixel the polygons touch
        #[arg(long)]
        all_touched: bool,
    },
    /// Validate a comma-separated list of waterbody UIDs
    CheckIds {
        /// UIDs, e.g. r3dp84s8n,r3f2b0kvt
        ids: String,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster<T: RasterElement>(path: &Path) -> Result<Raster<T>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<T> =
        read_geotiff(path).with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_vector(path: &Path) -> Result<FeatureCollection> {
    let pb = spinner("Reading polygons...");
    let fc = read_geojson(path).with_context(|| format!("Failed to read polygons {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} features, columns {:?}", fc.len(), fc.columns());
    Ok(fc)
}

fn write_raster(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default())).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn write_vector(fc: &FeatureCollection, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geojson(fc, path).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// One entry of an observation manifest
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    date: String,
    path: PathBuf,
}

/// Parse an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC)
fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid observation date '{}'", s))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid observation date '{}'", s))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Read the manifest entries; relative paths are taken from the manifest's directory
fn read_manifest(manifest: &Path) -> Result<Vec<(DateTime<Utc>, PathBuf)>> {
    let text = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&text).with_context(|| format!("Invalid manifest {}", manifest.display()))?;
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));

    entries
        .into_iter()
        .map(|e| {
            let path = if e.path.is_absolute() { e.path } else { base.join(e.path) };
            Ok((parse_date(&e.date)?, path))
        })
        .collect()
}

fn load_observations(manifest: &Path) -> Result<Vec<Observation>> {
    let entries = read_manifest(manifest)?;
    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message("Reading observations...");

    let mut observations = Vec::with_capacity(entries.len());
    for (date, path) in entries {
        let raster = read_geotiff::<u8, _>(&path)
            .with_context(|| format!("Failed to read observation {}", path.display()))?;
        observations.push(Observation { date, raster });
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!("Loaded {} observations", observations.len());
    Ok(observations)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster: Raster<f64> = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let valid = raster.count_where(|v| !raster.is_nodata(v));

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!(
                "Valid cells: {} ({:.1}%)",
                valid,
                100.0 * valid as f64 / raster.len().max(1) as f64
            );
        }

        // ── ID column ────────────────────────────────────────────────
        Commands::GuessId { input, use_id } => {
            let fc = read_vector(&input)?;
            let column = guess_id_field(&fc, use_id.as_deref())?;
            println!("{}", column);
        }

        // ── Vector / raster conversion ───────────────────────────────
        Commands::Vectorize {
            input,
            output,
            attribute_col,
            connectivity,
            mask,
        } => {
            let connectivity: Connectivity = connectivity.parse()?;
            let raster: Raster<f64> = read_raster(&input)?;
            let mask = match mask {
                Some(path) => Some(read_raster::<u8>(&path)?),
                None => None,
            };
            let start = Instant::now();
            let params = PolygonizeParams {
                attribute_col,
                connectivity,
                mask,
            };
            let fc = polygonize(&raster, &params).context("Failed to vectorize raster")?;
            let elapsed = start.elapsed();
            info!("{} polygons", fc.len());
            write_vector(&fc, &output)?;
            done("Polygons", &output, elapsed);
        }

        Commands::Rasterize {
            input,
            template,
            output,
            attribute_col,
            all_touched,
        } => {
            let fc = read_vector(&input)?;
            let template: Raster<f64> = read_raster(&template)?;
            let start = Instant::now();
            let params = RasterizeParams {
                attribute_col,
                all_touched,
                ..Default::default()
            };
            let result = rasterize(&fc, &template, &params).context("Failed to rasterize polygons")?;
            let elapsed = start.elapsed();
            write_raster(&result, &output)?;
            done("Raster", &output, elapsed);
        }

        // ── Waterbodies ──────────────────────────────────────────────
        Commands::GenerateWaterbodies {
            input,
            output,
            wet_threshold,
            min_area,
            max_area,
            uid,
        } => {
            let frequency: Raster<f64> = read_raster(&input)?;
            let start = Instant::now();
            let params = WaterbodyParams {
                wet_threshold,
                min_area,
                max_area,
                assign_uid: uid,
            };
            let fc = generate_waterbodies(&frequency, &params).context("Failed to detect waterbodies")?;
            let elapsed = start.elapsed();
            write_vector(&fc, &output)?;
            done(&format!("{} waterbodies", fc.len()), &output, elapsed);
        }

        Commands::GenerateTimeseries {
            input,
            observations,
            output,
            use_id,
            ids,
            invalid_threshold,
            all_touched,
        } => {
            let ids = ids.as_deref().map(parse_ids).transpose()?;
            let fc = read_vector(&input)?;
            let observations = load_observations(&observations)?;
            let start = Instant::now();
            let params = TimeseriesParams {
                use_id,
                ids,
                invalid_threshold,
                all_touched,
            };
            let series =
                generate_timeseries(&fc, &observations, &params).context("Failed to extract time series")?;
            let paths = write_all_timeseries(&series, &output).context("Failed to write time series")?;
            let elapsed = start.elapsed();
            info!("{} CSV files written", paths.len());
            done("Time series", &output, elapsed);
        }

        Commands::CheckIds { ids } => match parse_ids(&ids) {
            Ok(parsed) => println!("{} valid ids", parsed.len()),
            Err(e) => bail!(e),
        },
    }

    Ok(())
}
