//! End-to-end run on a synthetic scene.
//!
//! A 10x10 water-frequency raster (30 m cells, EPSG:3577) holds two lakes.
//! They are detected, written to GeoJSON and read back, keyed by their ID
//! column, burned back onto the grid and tracked through three classified
//! observations that go through GeoTIFF files.

use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use waterbodies_algorithms::id_field::guess_id_field;
use waterbodies_algorithms::timeseries::{
    generate_timeseries, timeseries_path, write_all_timeseries, Observation, TimeseriesParams, DRY, WET,
};
use waterbodies_algorithms::vector::{rasterize, RasterizeParams};
use waterbodies_algorithms::waterbodies::{generate_waterbodies, WaterbodyParams};
use waterbodies_core::io::{read_geojson, read_geotiff, write_geojson, write_geotiff};
use waterbodies_core::raster::{GeoTransform, Raster};
use waterbodies_core::CRS;

const ROWS: usize = 10;
const COLS: usize = 10;

fn transform() -> GeoTransform {
    GeoTransform::new(1_500_000.0, -3_900_000.0, 30.0, -30.0)
}

/// Lake 1: rows 1-3, cols 1-3 (9 cells). Lake 2: rows 6-8, cols 5-8 (12 cells).
fn lake_cells(lake: u8) -> Vec<(usize, usize)> {
    let (rows, cols) = match lake {
        1 => (1..4, 1..4),
        _ => (6..9, 5..9),
    };
    rows.flat_map(|r| cols.clone().map(move |c| (r, c))).collect()
}

fn frequency() -> Raster<f64> {
    let mut r = Raster::filled(ROWS, COLS, 0.02);
    r.set_transform(transform());
    r.set_crs(Some(CRS::from_epsg(3577)));
    for (row, col) in lake_cells(1) {
        r.set(row, col, 0.8).unwrap();
    }
    for (row, col) in lake_cells(2) {
        r.set(row, col, 0.35).unwrap();
    }
    r
}

fn observation(cells: &[((usize, usize), u8)]) -> Raster<u8> {
    let mut r = Raster::filled(ROWS, COLS, DRY);
    r.set_transform(transform());
    r.set_crs(Some(CRS::from_epsg(3577)));
    for &((row, col), v) in cells {
        r.set(row, col, v).unwrap();
    }
    r
}

fn date(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, month, day, 0, 2, 51).unwrap()
}

#[test]
fn detect_track_and_write() {
    let dir = tempfile::tempdir().unwrap();

    // Detection and GeoJSON round trip
    let detected = generate_waterbodies(&frequency(), &WaterbodyParams::default()).unwrap();
    assert_eq!(detected.len(), 2);
    let vector_path = dir.path().join("waterbodies.geojson");
    write_geojson(&detected, &vector_path).unwrap();
    let waterbodies = read_geojson(&vector_path).unwrap();
    assert_eq!(waterbodies.columns(), ["WB_ID", "area_m2", "perim_m"]);
    assert_eq!(waterbodies.crs().and_then(CRS::epsg), Some(3577));

    assert_eq!(guess_id_field(&waterbodies, None).unwrap(), "WB_ID");

    // The polygons burn back onto exactly the lake cells
    let params = RasterizeParams {
        attribute_col: Some("WB_ID".into()),
        ..Default::default()
    };
    let ids = rasterize(&waterbodies, &frequency(), &params).unwrap();
    assert_eq!(ids.count_where(|v| v == 1.0), 9);
    assert_eq!(ids.count_where(|v| v == 2.0), 12);
    for (row, col) in lake_cells(2) {
        assert_eq!(ids.get(row, col).unwrap(), 2.0);
    }

    // Observations: lake 1 full, then half clouded, then both lakes full
    let all_wet = |lake| lake_cells(lake).into_iter().map(|c| (c, WET)).collect::<Vec<_>>();
    let mut clouded: Vec<_> = lake_cells(1)
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c, if i % 2 == 0 { 2 } else { WET }))
        .collect();
    clouded.extend(lake_cells(2).into_iter().take(6).map(|c| (c, WET)));
    let mut both = all_wet(1);
    both.extend(all_wet(2));

    let scenes = [
        (date(4, 15), observation(&clouded)),
        (date(3, 30), observation(&all_wet(1))),
        (date(5, 1), observation(&both)),
    ];
    let mut observations = Vec::new();
    for (i, (when, raster)) in scenes.iter().enumerate() {
        let path = dir.path().join(format!("wofl_{}.tif", i));
        write_geotiff(raster, &path, None).unwrap();
        observations.push(Observation {
            date: *when,
            raster: read_geotiff(&path).unwrap(),
        });
    }

    let series = generate_timeseries(&waterbodies, &observations, &TimeseriesParams::default()).unwrap();
    assert_eq!(series.len(), 2);

    let lake1 = &series[0];
    assert_eq!(lake1.id, "1");
    assert_eq!(lake1.pixel_count, 9);
    let dates: Vec<_> = lake1.rows.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date(3, 30), date(5, 1)]);
    assert!(lake1.rows.iter().all(|r| r.wet_count == 9));

    let lake2 = &series[1];
    assert_eq!(lake2.pixel_count, 12);
    let counts: Vec<_> = lake2.rows.iter().map(|r| r.wet_count).collect();
    assert_eq!(counts, vec![0, 6, 12]);
    assert_eq!(lake2.rows[1].wet_percentage, 50.0);

    // CSV output
    let out = dir.path().join("timeseries");
    let paths = write_all_timeseries(&series, &out).unwrap();
    assert_eq!(paths[0], timeseries_path(&out, "1"));
    assert_eq!(paths[1], out.join("2").join("2.csv"));

    let text = fs::read_to_string(&paths[1]).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Observation Date,Wet pixel percentage,Wet pixel count (n = 12)");
    assert_eq!(lines[1], "2021-03-30T00:02:51Z,0.00,0");
    assert_eq!(lines[2], "2021-04-15T00:02:51Z,50.00,6");
    assert_eq!(lines[3], "2021-05-01T00:02:51Z,100.00,12");
}

#[test]
fn subset_by_id_and_requested_column() {
    let waterbodies = generate_waterbodies(&frequency(), &WaterbodyParams::default()).unwrap();
    let observations = vec![Observation {
        date: date(3, 30),
        raster: observation(&[]),
    }];

    let params = TimeseriesParams {
        use_id: Some("WB_ID".into()),
        ids: Some(vec!["2".into()]),
        ..Default::default()
    };
    let series = generate_timeseries(&waterbodies, &observations, &params).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].id, "2");
    assert_eq!(series[0].rows[0].wet_count, 0);

    // A requested column must exist
    let params = TimeseriesParams {
        use_id: Some("missing".into()),
        ..Default::default()
    };
    assert!(generate_timeseries(&waterbodies, &observations, &params).is_err());
}

#[test]
fn unreadable_observation_pixels_count_as_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let waterbodies = generate_waterbodies(&frequency(), &WaterbodyParams::default()).unwrap();

    // A float scene: lake 1 wet in one cell and NaN elsewhere, lake 2 with
    // one sample that does not fit the u8 classes
    let mut scene: Raster<f32> = Raster::filled(ROWS, COLS, f32::from(DRY));
    scene.set_transform(transform());
    scene.set_crs(Some(CRS::from_epsg(3577)));
    for (i, (row, col)) in lake_cells(1).into_iter().enumerate() {
        let v = if i == 0 { f32::from(WET) } else { f32::NAN };
        scene.set(row, col, v).unwrap();
    }
    let (row, col) = lake_cells(2)[0];
    scene.set(row, col, -1.0).unwrap();

    let path = dir.path().join("scene.tif");
    write_geotiff(&scene, &path, None).unwrap();
    let observations = vec![Observation {
        date: date(4, 15),
        raster: read_geotiff(&path).unwrap(),
    }];

    let params = TimeseriesParams {
        invalid_threshold: 0.5,
        ..Default::default()
    };
    let series = generate_timeseries(&waterbodies, &observations, &params).unwrap();
    // 8 of 9 pixels invalid: skipped rather than counted as dry
    assert_eq!(series[0].pixel_count, 9);
    assert!(series[0].rows.is_empty());
    // 1 of 12 invalid is within the tolerance
    assert_eq!(series[1].rows.len(), 1);
    assert_eq!(series[1].rows[0].wet_count, 0);
}
