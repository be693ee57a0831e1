use crate::types::{PlaceRecord, TierFlags};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Keys the Indigenous flag has been published under.
const INDIGENOUS_KEYS: [&str; 3] = ["isFirstNation", "Indigenous", "indigenous"];

pub fn load_dataset(path: &Path) -> Result<Vec<PlaceRecord>> {
    tracing::info!("Loading places from {:?}", path);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Dataset file has no extension"))?;

    let (records, skipped) = match extension.as_str() {
        "json" => load_json(path)?,
        "geojson" => load_geojson(path)?,
        "csv" => load_csv(path)?,
        _ => return Err(anyhow!("Unsupported dataset format: {}", extension)),
    };

    if skipped > 0 {
        tracing::debug!("Skipped {} malformed records", skipped);
    }
    tracing::info!("Loaded {} places", records.len());

    Ok(records)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open dataset: {:?}", path))?;
    Ok(BufReader::new(file))
}

/// Keep the rows that parse, count the rest.
fn collect_valid<I>(rows: I) -> (Vec<PlaceRecord>, usize)
where
    I: IntoIterator<Item = Option<PlaceRecord>>,
{
    let mut records = Vec::new();
    let mut skipped = 0;
    for row in rows {
        match row {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }
    (records, skipped)
}

fn load_json(path: &Path) -> Result<(Vec<PlaceRecord>, usize)> {
    let rows: Vec<Value> = serde_json::from_reader(open(path)?)
        .with_context(|| format!("Dataset must be a JSON array of places: {:?}", path))?;

    Ok(collect_valid(rows.iter().map(|row| {
        row.as_object().and_then(|props| record_from_properties(props, None))
    })))
}

fn load_geojson(path: &Path) -> Result<(Vec<PlaceRecord>, usize)> {
    use geojson::GeoJson;

    let geojson = GeoJson::from_reader(open(path)?).context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    Ok(collect_valid(collection.features.iter().map(|feature| {
        let position = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(geojson::Value::Point(coords)) if coords.len() >= 2 => Some((coords[1], coords[0])),
            _ => None,
        };
        let empty = Map::new();
        let props = feature.properties.as_ref().unwrap_or(&empty);
        record_from_properties(props, position)
    })))
}

fn load_csv(path: &Path) -> Result<(Vec<PlaceRecord>, usize)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(open(path)?);
    let headers = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let Ok(row) = result else {
            rows.push(None);
            continue;
        };
        let props: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.trim().to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(record_from_properties(&props, None));
    }
    Ok(collect_valid(rows))
}

/// Build a record from loosely typed fields; `None` marks it malformed.
/// `position` is (lat, lon) taken from a geometry, overriding the fields.
fn record_from_properties(
    props: &Map<String, Value>,
    position: Option<(f64, f64)>,
) -> Option<PlaceRecord> {
    let name = text(props, "name")?;
    let province = text(props, "province").unwrap_or_default();
    let (latitude, longitude) = match position {
        Some(pos) => pos,
        None => (number(props, "latitude")?, number(props, "longitude")?),
    };
    if !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }

    Some(PlaceRecord {
        name,
        province,
        latitude,
        longitude,
        flags: TierFlags {
            indigenous: INDIGENOUS_KEYS.iter().any(|k| flag(props, k)),
            micro_listed: flag(props, "microListed"),
            short_listed: flag(props, "shortListed"),
        },
    })
}

fn text(props: &Map<String, Value>, key: &str) -> Option<String> {
    match props.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(props: &Map<String, Value>, key: &str) -> Option<f64> {
    match props.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `true` or `"true"`; anything else is unset.
fn flag(props: &Map<String, Value>, key: &str) -> bool {
    match props.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}
