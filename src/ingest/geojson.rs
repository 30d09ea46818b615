//! GeoJSON serialization of the normalized polygons and the enriched points.

use anyhow::{bail, Context, Result};
use geo::{LineString, Polygon};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Number, Value};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use hoodjoin::pip::{Crs, Geometry};
use hoodjoin::{Attributes, EnrichedPoint, PipelineOutput, PolygonRecord};

#[derive(Debug, Serialize)]
pub struct FeatureCollection<P> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    crs: Option<Value>,
    features: Vec<Feature<P>>,
}

impl<P> FeatureCollection<P> {
    fn new(crs: Crs, features: Vec<Feature<P>>) -> Self {
        Self {
            kind: "FeatureCollection",
            crs: crs_member(crs),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }
}

#[derive(Debug, Serialize)]
struct Feature<P> {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: GeoJsonGeometry,
    properties: P,
}

impl<P> Feature<P> {
    fn new(geometry: GeoJsonGeometry, properties: P) -> Self {
        Self {
            kind: "Feature",
            geometry,
            properties,
        }
    }
}

type Ring = Vec<[f64; 2]>;

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "coordinates")]
enum GeoJsonGeometry {
    Point([f64; 2]),
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl From<&Geometry> for GeoJsonGeometry {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(p) => GeoJsonGeometry::Point([p.x(), p.y()]),
            Geometry::Polygon(p) => GeoJsonGeometry::Polygon(rings(p)),
            Geometry::MultiPolygon(mp) => {
                GeoJsonGeometry::MultiPolygon(mp.0.iter().map(rings).collect())
            }
        }
    }
}

fn rings(polygon: &Polygon<f64>) -> Vec<Ring> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring)
        .collect()
}

fn ring(line: &LineString<f64>) -> Ring {
    line.coords().map(|c| [c.x, c.y]).collect()
}

/// Named CRS member; omitted for WGS84, the GeoJSON default.
fn crs_member(crs: Crs) -> Option<Value> {
    match crs {
        Crs::Wgs84 => None,
        other => Some(json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", other.epsg_code()) }
        })),
    }
}

/// Typed JSON value for a raw attribute string.
pub fn property_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Some(n) = trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
    {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

#[derive(Debug)]
pub struct PolygonProperties<'a> {
    label_field: &'a str,
    label: &'a str,
}

impl Serialize for PolygonProperties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.label_field, self.label)?;
        map.end()
    }
}

/// Point attributes in source order followed by the matched label.
#[derive(Debug)]
pub struct PointProperties<'a> {
    attributes: &'a Attributes,
    label_field: &'a str,
    label: Option<&'a str>,
}

impl Serialize for PointProperties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let collides = self.attributes.contains(self.label_field);
        let mut map = serializer.serialize_map(Some(self.attributes.len() + 1))?;
        for (name, raw) in self.attributes.iter() {
            if collides && name == self.label_field {
                map.serialize_entry(&format!("{}_left", name), &property_value(raw))?;
            } else {
                map.serialize_entry(name, &property_value(raw))?;
            }
        }
        if collides {
            map.serialize_entry(&format!("{}_right", self.label_field), &self.label)?;
        } else {
            map.serialize_entry(self.label_field, &self.label)?;
        }
        map.end()
    }
}

pub fn polygon_collection<'a>(
    polygons: &'a [PolygonRecord],
    label_field: &'a str,
    crs: Crs,
) -> FeatureCollection<PolygonProperties<'a>> {
    let features = polygons
        .iter()
        .map(|record| {
            Feature::new(
                GeoJsonGeometry::from(record.boundary()),
                PolygonProperties {
                    label_field,
                    label: record.label(),
                },
            )
        })
        .collect();
    FeatureCollection::new(crs, features)
}

pub fn point_collection<'a>(
    points: &'a [EnrichedPoint],
    label_field: &'a str,
    crs: Crs,
) -> FeatureCollection<PointProperties<'a>> {
    let features = points
        .iter()
        .map(|point| {
            Feature::new(
                GeoJsonGeometry::Point([point.location.x(), point.location.y()]),
                PointProperties {
                    attributes: &point.attributes,
                    label_field,
                    label: point.label(),
                },
            )
        })
        .collect();
    FeatureCollection::new(crs, features)
}

/// A fully written temp file waiting to be moved onto its destination
pub struct StagedFile {
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedFile {
    pub fn commit(self) -> Result<PathBuf> {
        self.file
            .persist(&self.destination)
            .with_context(|| format!("Failed to write {}", self.destination.display()))?;
        Ok(self.destination)
    }
}

/// Serialize `value` into a temp file beside `destination`.
pub fn stage<T: Serialize>(destination: &Path, value: &T) -> Result<StagedFile> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer(&mut writer, value)
            .with_context(|| format!("Failed to serialize {}", destination.display()))?;
        writer.flush()?;
    }

    Ok(StagedFile {
        file,
        destination: destination.to_path_buf(),
    })
}

/// Write both collections. On any failure neither output is left behind.
pub fn write_outputs(
    output: &PipelineOutput,
    label_field: &str,
    polygons_path: &Path,
    points_path: &Path,
) -> Result<()> {
    let polygons = polygon_collection(&output.polygons, label_field, output.crs);
    let points = point_collection(&output.points, label_field, output.crs);

    for path in [polygons_path, points_path] {
        if path.is_dir() {
            bail!("Output path {} is a directory", path.display());
        }
    }

    let staged_polygons = stage(polygons_path, &polygons)?;
    let staged_points = stage(points_path, &points)?;

    let written_polygons = staged_polygons.commit()?;
    let written_points = match staged_points.commit() {
        Ok(path) => path,
        Err(e) => {
            // Never leave one output without the other
            if let Err(cleanup) = fs::remove_file(&written_polygons) {
                warn!(
                    "Failed to remove {} after error: {}",
                    written_polygons.display(),
                    cleanup
                );
            }
            return Err(e);
        }
    };

    info!("Wrote {} polygons to {}", polygons.len(), written_polygons.display());
    info!("Wrote {} points to {}", points.len(), written_points.display());

    Ok(())
}
