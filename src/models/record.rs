//! Polygon and point records flowing through the join.

use std::sync::Arc;

use geo::{Point, Rect};

use super::Attributes;
use crate::pip::{Geometry, GeometryError};

/// A labelled boundary polygon (e.g. a neighborhood)
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRecord {
    label: Arc<str>,
    boundary: Geometry,
    envelope: Rect<f64>,
}

impl PolygonRecord {
    /// Create a record, rejecting blank labels and non-areal or empty geometry.
    pub fn new(label: impl AsRef<str>, boundary: Geometry) -> Result<Self, GeometryError> {
        let label = label.as_ref().trim();
        if label.is_empty() {
            return Err(GeometryError::MissingLabel);
        }
        if !boundary.is_areal() {
            return Err(GeometryError::UnsupportedType(boundary.kind().to_string()));
        }
        let envelope = boundary.bounding_rect().ok_or(GeometryError::EmptyGeometry)?;

        Ok(Self {
            label: Arc::from(label),
            boundary,
            envelope,
        })
    }

    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    pub fn boundary(&self) -> &Geometry {
        &self.boundary
    }

    /// Bounding box of the boundary
    pub fn envelope(&self) -> Rect<f64> {
        self.envelope
    }

    pub fn into_parts(self) -> (Arc<str>, Geometry) {
        (self.label, self.boundary)
    }
}

/// A point-located input row; attributes pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub attributes: Attributes,
    pub location: Point<f64>,
}

impl PointRecord {
    pub fn new(attributes: Attributes, location: Point<f64>) -> Self {
        Self {
            attributes,
            location,
        }
    }
}

/// A point record after the join, carrying the label of its containing polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedPoint {
    pub attributes: Attributes,
    pub location: Point<f64>,
    /// `None` when no polygon contains the point
    pub matched_label: Option<Arc<str>>,
}

impl EnrichedPoint {
    pub fn from_record(record: PointRecord, matched_label: Option<Arc<str>>) -> Self {
        Self {
            attributes: record.attributes,
            location: record.location,
            matched_label,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.matched_label.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pip::parse_polygon;

    #[test]
    fn test_polygon_record_envelope() {
        let boundary = parse_polygon("POLYGON ((0 0, 2 0, 2 1, 0 1, 0 0))").unwrap();
        let record = PolygonRecord::new("  Loop ", boundary).unwrap();
        assert_eq!(&**record.label(), "Loop");
        assert_eq!(record.envelope().min().x, 0.0);
        assert_eq!(record.envelope().max().x, 2.0);
        assert_eq!(record.envelope().max().y, 1.0);
    }

    #[test]
    fn test_polygon_record_rejects_blank_label() {
        let boundary = parse_polygon("POLYGON ((0 0, 1 0, 1 1, 0 0))").unwrap();
        assert_eq!(
            PolygonRecord::new("   ", boundary),
            Err(GeometryError::MissingLabel)
        );
    }

    #[test]
    fn test_polygon_record_rejects_point() {
        let point = Geometry::Point(Point::new(1.0, 2.0));
        assert!(matches!(
            PolygonRecord::new("A", point),
            Err(GeometryError::UnsupportedType(_))
        ));
    }
}
