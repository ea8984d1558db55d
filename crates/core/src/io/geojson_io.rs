//! GeoJSON reading/writing for waterbody polygon layers
//!
//! Property order in the file becomes the attribute schema order. A legacy
//! named `crs` member is honoured on read and emitted on write when the
//! collection has an EPSG code.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geojson::feature::Id;
use geojson::{GeoJson, JsonObject, JsonValue};
use serde_json::json;
use std::fs;
use std::path::Path;

/// Read a GeoJSON file (FeatureCollection or single Feature)
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_geojson(&text)
}

/// Parse GeoJSON text into a FeatureCollection
pub fn parse_geojson(text: &str) -> Result<FeatureCollection> {
    let gj: GeoJson = text.parse()?;

    let (features, foreign) = match gj {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(f) => (vec![f], None),
        GeoJson::Geometry(_) => {
            return Err(Error::UnsupportedDataType(
                "bare GeoJSON geometry has no attribute table".into(),
            ))
        }
    };

    let mut out = FeatureCollection::new();
    out.set_crs(foreign.as_ref().and_then(crs_from_members));

    for f in features {
        if let Some(props) = &f.properties {
            for key in props.keys() {
                out.declare_column(key.as_str());
            }
        }
        out.push(convert_feature(f)?);
    }

    Ok(out)
}

fn convert_feature(f: geojson::Feature) -> Result<Feature> {
    let geometry = match f.geometry {
        Some(g) => Some(geo_types::Geometry::<f64>::try_from(g)?),
        None => None,
    };

    let mut feature = Feature {
        geometry,
        id: f.id.map(|id| match id {
            Id::String(s) => s,
            Id::Number(n) => n.to_string(),
        }),
        ..Feature::default()
    };

    for (key, value) in f.properties.unwrap_or_default() {
        feature.set_property(key, json_to_attribute(value));
    }
    Ok(feature)
}

fn crs_from_members(members: &JsonObject) -> Option<CRS> {
    members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(CRS::parse)
}

fn json_to_attribute(value: JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        JsonValue::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Int(i) => json!(i),
        // NaN and infinities have no JSON form
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(JsonValue::Null, JsonValue::Number),
        AttributeValue::String(s) => JsonValue::String(s.clone()),
    }
}

/// Serialize a FeatureCollection to GeoJSON text
pub fn to_geojson_string(fc: &FeatureCollection) -> String {
    let features = fc
        .iter()
        .map(|f| {
            let mut props = JsonObject::new();
            for column in fc.columns() {
                if let Some(v) = f.get_property(column) {
                    props.insert(column.clone(), attribute_to_json(v));
                }
            }
            geojson::Feature {
                bbox: None,
                geometry: f
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: f.id.clone().map(Id::String),
                properties: Some(props),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = fc.crs().and_then(CRS::urn).map(|urn| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            json!({ "type": "name", "properties": { "name": urn } }),
        );
        members
    });

    GeoJson::FeatureCollection(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    })
    .to_string()
}

/// Write a FeatureCollection to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(fc: &FeatureCollection, path: P) -> Result<()> {
    fs::write(path.as_ref(), to_geojson_string(fc))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::AttributeTable;
    use geo_types::{polygon, Geometry};

    const CANBERRA: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3577" } },
        "features": [
            { "type": "Feature",
              "properties": { "UID": "r3dp84s8n", "WB_ID": 1, "area_m2": 1358.5 },
              "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] } },
            { "type": "Feature",
              "properties": { "UID": "r3dp84s8p", "WB_ID": 2, "area_m2": null },
              "geometry": null }
        ]
    }"#;

    #[test]
    fn parse_keeps_file_column_order() {
        let fc = parse_geojson(CANBERRA).unwrap();
        assert_eq!(fc.columns(), ["UID", "WB_ID", "area_m2"]);
        assert_eq!(fc.row_count(), 2);
        assert_eq!(fc.value(0, "WB_ID"), &AttributeValue::Int(1));
        assert_eq!(fc.value(0, "area_m2"), &AttributeValue::Float(1358.5));
        assert!(fc.value(1, "area_m2").is_null());
        assert!(fc.features()[1].geometry.is_none());
        assert_eq!(fc.crs().and_then(CRS::epsg), Some(3577));
    }

    #[test]
    fn bare_geometry_is_rejected() {
        let text = r#"{ "type": "Point", "coordinates": [1.0, 2.0] }"#;
        assert!(matches!(parse_geojson(text), Err(Error::UnsupportedDataType(_))));
    }

    #[test]
    fn write_then_read_file() {
        let mut fc = FeatureCollection::with_columns(["WB_ID", "UID"]);
        fc.set_crs(Some(CRS::from_epsg(3577)));
        let square = polygon![(x: 0.0, y: 0.0), (x: 25.0, y: 0.0), (x: 25.0, y: 25.0), (x: 0.0, y: 25.0)];
        fc.push(
            Feature::new(Geometry::Polygon(square))
                .with_property("UID", "r3dp84s8n")
                .with_property("WB_ID", 7),
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wb.geojson");
        write_geojson(&fc, &path).unwrap();

        let back = read_geojson(&path).unwrap();
        assert_eq!(back.columns(), ["WB_ID", "UID"]);
        assert_eq!(back.value(0, "UID"), &AttributeValue::from("r3dp84s8n"));
        assert_eq!(back.crs().and_then(CRS::epsg), Some(3577));
        assert!(matches!(back.features()[0].geometry, Some(Geometry::Polygon(_))));
    }
}
