//! Coordinate reference systems and collection normalization.
//!
//! Supported systems are geographic WGS84 (EPSG:4326, x = longitude) and
//! spherical Web Mercator (EPSG:3857). Anything else is a configuration
//! error.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords, Point};
use rayon::prelude::*;
use tracing::{info, warn};

use super::{Geometry, GeometryError};
use crate::models::{Dataset, PointRecord, PolygonRecord};

/// Sphere radius used by Web Mercator (WGS84 semi-major axis)
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of Web Mercator
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779;

/// Fatal: the reference system cannot be resolved or the transform failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReferenceSystemError {
    #[error("unsupported coordinate reference system '{0}' (supported: EPSG:4326, EPSG:3857)")]
    Unsupported(String),
    #[error("reprojecting {from} to {to} gave a non-finite coordinate for ({x}, {y})")]
    Transform { from: Crs, to: Crs, x: f64, y: f64 },
    #[error("reprojecting {from} to {to} broke a polygon: {source}")]
    Geometry {
        from: Crs,
        to: Crs,
        source: GeometryError,
    },
}

/// Reference system tag attached to a whole collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326, longitude/latitude in degrees
    #[default]
    Wgs84,
    /// EPSG:3857, metres
    WebMercator,
}

impl Crs {
    /// Resolve `EPSG:<code>`, a bare code, or `CRS84`.
    pub fn parse(id: &str) -> Result<Self, ReferenceSystemError> {
        let trimmed = id.trim();
        let upper = trimmed.to_ascii_uppercase();

        if matches!(upper.as_str(), "CRS84" | "OGC:CRS84" | "WGS84") {
            return Ok(Crs::Wgs84);
        }

        let code = upper.strip_prefix("EPSG:").unwrap_or(&upper);
        match code.parse::<u32>() {
            Ok(4326) => Ok(Crs::Wgs84),
            Ok(3857) | Ok(900913) | Ok(3785) | Ok(102100) | Ok(102113) => Ok(Crs::WebMercator),
            _ => Err(ReferenceSystemError::Unsupported(trimmed.to_string())),
        }
    }

    pub fn epsg_code(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg_code())
    }
}

impl FromStr for Crs {
    type Err = ReferenceSystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Crs::parse(s)
    }
}

/// Coordinate transform between two supported systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    pub from: Crs,
    pub to: Crs,
}

impl Transform {
    pub fn new(from: Crs, to: Crs) -> Self {
        Self { from, to }
    }

    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    pub fn apply(&self, c: Coord<f64>) -> Result<Coord<f64>, ReferenceSystemError> {
        let out = match (self.from, self.to) {
            (Crs::Wgs84, Crs::Wgs84) | (Crs::WebMercator, Crs::WebMercator) => c,
            (Crs::Wgs84, Crs::WebMercator) => to_web_mercator(c),
            (Crs::WebMercator, Crs::Wgs84) => from_web_mercator(c),
        };

        if out.x.is_finite() && out.y.is_finite() {
            Ok(out)
        } else {
            Err(ReferenceSystemError::Transform {
                from: self.from,
                to: self.to,
                x: c.x,
                y: c.y,
            })
        }
    }
}

fn to_web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    Coord {
        x: WEB_MERCATOR_RADIUS * c.x.to_radians(),
        y: WEB_MERCATOR_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln(),
    }
}

fn from_web_mercator(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / WEB_MERCATOR_RADIUS).to_degrees(),
        y: (2.0 * (c.y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
    }
}

/// Reprojection that keeps the geometry type and coordinate count.
pub trait Reproject: Sized {
    fn reproject(self, transform: &Transform) -> Result<Self, ReferenceSystemError>;
}

impl Reproject for Point<f64> {
    fn reproject(self, transform: &Transform) -> Result<Self, ReferenceSystemError> {
        transform.apply(self.0).map(Point::from)
    }
}

impl Reproject for Geometry {
    fn reproject(self, transform: &Transform) -> Result<Self, ReferenceSystemError> {
        let f = |c| transform.apply(c);
        Ok(match self {
            Geometry::Point(p) => Geometry::Point(p.try_map_coords(f)?),
            Geometry::Polygon(p) => Geometry::Polygon(p.try_map_coords(f)?),
            Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.try_map_coords(f)?),
        })
    }
}

impl Reproject for PolygonRecord {
    fn reproject(self, transform: &Transform) -> Result<Self, ReferenceSystemError> {
        let (label, boundary) = self.into_parts();
        let boundary = boundary.reproject(transform)?;
        PolygonRecord::new(label, boundary).map_err(|source| {
            ReferenceSystemError::Geometry {
                from: transform.from,
                to: transform.to,
                source,
            }
        })
    }
}

impl Reproject for PointRecord {
    fn reproject(self, transform: &Transform) -> Result<Self, ReferenceSystemError> {
        Ok(PointRecord {
            location: self.location.reproject(transform)?,
            attributes: self.attributes,
        })
    }
}

/// Surfaced when a collection had no declared system and the target was assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrsAdvisory {
    pub dataset: Dataset,
    pub assumed: Crs,
}

impl fmt::Display for CrsAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} declares no coordinate reference system; assuming {}",
            self.dataset, self.assumed
        )
    }
}

/// A collection whose members are all expressed in one reference system.
///
/// Only [`normalize`] builds one, so holding a `Normalized` is proof of a
/// resolved, uniform CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    crs: Crs,
    items: Vec<T>,
}

impl<T> Normalized<T> {
    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Reproject + Send> Normalized<T> {
    /// Re-express the collection in `target`; a no-op when already there.
    pub fn into_crs(self, target: Crs) -> Result<Normalized<T>, ReferenceSystemError> {
        let transform = Transform::new(self.crs, target);
        if transform.is_identity() {
            return Ok(self);
        }
        let items = self
            .items
            .into_par_iter()
            .map(|item| item.reproject(&transform))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Normalized { crs: target, items })
    }
}

/// Outcome of [`normalize`]: the collection plus any assumption made.
#[derive(Debug, Clone)]
pub struct Normalization<T> {
    pub collection: Normalized<T>,
    pub advisory: Option<CrsAdvisory>,
}

/// Express `items` in `target`.
///
/// With no declared system the collection is assumed to already be in
/// `target`, and the assumption is returned as an advisory. Unknown
/// declared systems are an error.
pub fn normalize<T: Reproject + Send>(
    dataset: Dataset,
    items: Vec<T>,
    declared: Option<&str>,
    target: Crs,
) -> Result<Normalization<T>, ReferenceSystemError> {
    let declared = match declared.map(str::trim).filter(|d| !d.is_empty()) {
        Some(id) => Crs::parse(id)?,
        None => {
            let advisory = CrsAdvisory {
                dataset,
                assumed: target,
            };
            warn!("{}", advisory);
            return Ok(Normalization {
                collection: Normalized { crs: target, items },
                advisory: Some(advisory),
            });
        }
    };

    if declared == target {
        info!("{} is already in {}", dataset, target);
    } else {
        info!(
            "Reprojecting {} {} from {} to {}",
            items.len(),
            dataset,
            declared,
            target
        );
    }

    let collection = Normalized {
        crs: declared,
        items,
    }
    .into_crs(target)?;

    Ok(Normalization {
        collection,
        advisory: None,
    })
}
