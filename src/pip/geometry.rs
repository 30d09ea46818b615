//! Geometry parsing: WKT polygon text and lon/lat coordinate pairs.

use geo::{BoundingRect, Coord, LineString, MultiPolygon, Point, Polygon, Rect};

/// Error for a single row's geometry. Recoverable: the row is dropped and counted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("geometry text is missing")]
    Missing,
    #[error("{0} is missing")]
    MissingCoordinate(&'static str),
    #[error("{axis} is not a finite number: '{value}'")]
    InvalidCoordinate { axis: &'static str, value: String },
    #[error("unsupported geometry type '{0}', expected POLYGON or MULTIPOLYGON")]
    UnsupportedType(String),
    #[error("malformed WKT at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("ring has {0} positions, at least 4 are required")]
    RingTooShort(usize),
    #[error("ring is not closed")]
    UnclosedRing,
    #[error("geometry is empty")]
    EmptyGeometry,
    #[error("label is missing")]
    MissingLabel,
}

impl GeometryError {
    /// True when the value was absent rather than malformed
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            GeometryError::Missing | GeometryError::MissingCoordinate(_)
        )
    }
}

/// Point, polygon or multi-polygon. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Polygon or multi-polygon
    pub fn is_areal(&self) -> bool {
        !matches!(self, Geometry::Point(_))
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Geometry::Point(p) => Some(p.bounding_rect()),
            Geometry::Polygon(p) => p.bounding_rect(),
            Geometry::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }

    /// True when no member polygon encloses any space: every outer ring
    /// has all of its vertices on one line. Self-intersecting rings whose
    /// signed areas cancel out are not degenerate.
    pub fn is_degenerate(&self) -> bool {
        self.polygons().all(|p| ring_is_flat(p.exterior()))
    }

    /// Member polygons; empty for a point
    pub fn polygons(&self) -> std::slice::Iter<'_, Polygon<f64>> {
        match self {
            Geometry::Point(_) => <&[Polygon<f64>]>::default().iter(),
            Geometry::Polygon(p) => std::slice::from_ref(p).iter(),
            Geometry::MultiPolygon(mp) => mp.0.iter(),
        }
    }
}

fn ring_is_flat(ring: &LineString<f64>) -> bool {
    let Some(&origin) = ring.0.first() else {
        return true;
    };
    let Some(&towards) = ring.0.iter().find(|c| **c != origin) else {
        return true;
    };
    ring.0.iter().all(|c| {
        (towards.x - origin.x) * (c.y - origin.y) - (towards.y - origin.y) * (c.x - origin.x)
            == 0.0
    })
}

/// Parse WKT text holding a POLYGON or MULTIPOLYGON.
///
/// Z/M ordinates are accepted and dropped. Rings must be closed and have at
/// least four positions.
pub fn parse_polygon(text: &str) -> Result<Geometry, GeometryError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GeometryError::Missing);
    }

    let mut cursor = WktCursor::new(text);
    let kind = cursor.word().to_ascii_uppercase();
    if kind.is_empty() {
        return Err(cursor.error("expected a geometry type"));
    }

    // Optional dimension tag, or EMPTY
    if cursor.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
        let tag = cursor.word().to_ascii_uppercase();
        match tag.as_str() {
            "Z" | "M" | "ZM" => {}
            "EMPTY" => return Err(GeometryError::EmptyGeometry),
            _ => return Err(cursor.error(&format!("unexpected keyword '{}'", tag))),
        }
        if cursor.keyword("EMPTY") {
            return Err(GeometryError::EmptyGeometry);
        }
    }

    let geometry = match kind.as_str() {
        "POLYGON" => Geometry::Polygon(cursor.polygon()?),
        "MULTIPOLYGON" => Geometry::MultiPolygon(cursor.multi_polygon()?),
        _ => return Err(GeometryError::UnsupportedType(kind)),
    };

    cursor.finish()?;
    Ok(geometry)
}

/// Build a point from raw longitude and latitude values.
pub fn parse_point(lon: Option<&str>, lat: Option<&str>) -> Result<Point<f64>, GeometryError> {
    let x = parse_coordinate("longitude", lon)?;
    let y = parse_coordinate("latitude", lat)?;
    Ok(Point::new(x, y))
}

fn parse_coordinate(axis: &'static str, raw: Option<&str>) -> Result<f64, GeometryError> {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return Err(GeometryError::MissingCoordinate(axis)),
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(GeometryError::InvalidCoordinate {
            axis,
            value: raw.to_string(),
        }),
    }
}

/// Byte cursor over WKT text
struct WktCursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> WktCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn error(&self, message: &str) -> GeometryError {
        GeometryError::Syntax {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.text.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), GeometryError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    /// Consume a run of ASCII letters
    fn word(&mut self) -> &'a str {
        self.skip_whitespace();
        let start = self.pos;
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    /// Consume `keyword` (case-insensitive) if it comes next
    fn keyword(&mut self, keyword: &str) -> bool {
        let start = self.pos;
        if self.word().eq_ignore_ascii_case(keyword) {
            true
        } else {
            self.pos = start;
            false
        }
    }

    fn number(&mut self) -> Result<f64, GeometryError> {
        self.skip_whitespace();
        let start = self.pos;
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len()
            && matches!(bytes[self.pos], b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')
        {
            self.pos += 1;
        }
        let raw = &self.text[start..self.pos];
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => {
                self.pos = start;
                Err(self.error("expected a finite number"))
            }
        }
    }

    /// `x y [z [m]]`, keeping x and y
    fn position(&mut self) -> Result<Coord<f64>, GeometryError> {
        let x = self.number()?;
        let y = self.number()?;
        for _ in 0..2 {
            match self.peek() {
                Some(b',') | Some(b')') | None => break,
                _ => {
                    self.number()?;
                }
            }
        }
        Ok(Coord { x, y })
    }

    fn ring(&mut self) -> Result<LineString<f64>, GeometryError> {
        self.expect(b'(')?;
        let mut coords = vec![self.position()?];
        while self.eat(b',') {
            coords.push(self.position()?);
        }
        self.expect(b')')?;

        if coords.len() < 4 {
            return Err(GeometryError::RingTooShort(coords.len()));
        }
        if coords.first() != coords.last() {
            return Err(GeometryError::UnclosedRing);
        }
        Ok(LineString::new(coords))
    }

    fn polygon(&mut self) -> Result<Polygon<f64>, GeometryError> {
        self.expect(b'(')?;
        let exterior = self.ring()?;
        let mut interiors = Vec::new();
        while self.eat(b',') {
            interiors.push(self.ring()?);
        }
        self.expect(b')')?;
        Ok(Polygon::new(exterior, interiors))
    }

    fn multi_polygon(&mut self) -> Result<MultiPolygon<f64>, GeometryError> {
        self.expect(b'(')?;
        let mut polygons = vec![self.polygon()?];
        while self.eat(b',') {
            polygons.push(self.polygon()?);
        }
        self.expect(b')')?;
        Ok(MultiPolygon::new(polygons))
    }

    fn finish(&mut self) -> Result<(), GeometryError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("trailing characters after geometry")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn test_parse_simple_polygon() {
        let geometry = parse_polygon("POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
        match geometry {
            Geometry::Polygon(p) => {
                assert_eq!(p.exterior().0.len(), 5);
                assert!(p.interiors().is_empty());
            }
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_polygon_with_hole_and_lowercase() {
        let geometry = parse_polygon(
            "polygon((0 0,10 0,10 10,0 10,0 0),(2 2,4 2,4 4,2 4,2 2))",
        )
        .unwrap();
        let polygons: Vec<_> = geometry.polygons().collect();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].interiors().len(), 1);
        assert_eq!(polygons[0].unsigned_area(), 96.0);
        assert!(!geometry.is_degenerate());
    }

    #[test]
    fn test_parse_multipolygon() {
        let text = "MULTIPOLYGON (((-87.6 41.8, -87.5 41.8, -87.5 41.9, -87.6 41.8)), \
                    ((-87.7 41.7, -87.65 41.7, -87.65 41.75, -87.7 41.7)))";
        let geometry = parse_polygon(text).unwrap();
        assert_eq!(geometry.kind(), "MultiPolygon");
        assert_eq!(geometry.polygons().count(), 2);
    }

    #[test]
    fn test_parse_drops_z_ordinates() {
        let geometry = parse_polygon("POLYGON Z ((0 0 5, 1 0 5, 1 1 5, 0 0 5))").unwrap();
        let rect = geometry.bounding_rect().unwrap();
        assert_eq!(rect.max(), Coord { x: 1.0, y: 1.0 });
    }

    #[test]
    fn test_parse_scientific_notation() {
        let geometry = parse_polygon("POLYGON ((0 0, 1e1 0, 1E1 -1.5e+0, 0 0))").unwrap();
        let rect = geometry.bounding_rect().unwrap();
        assert_eq!(rect.max().x, 10.0);
        assert_eq!(rect.min().y, -1.5);
    }

    #[test]
    fn test_degenerate_means_collinear() {
        let flat = parse_polygon("POLYGON ((0 0, 1 1, 3 3, 0 0))").unwrap();
        assert!(flat.is_degenerate());

        let bow_tie = parse_polygon("POLYGON ((0 0, 2 2, 2 0, 0 2, 0 0))").unwrap();
        assert!(!bow_tie.is_degenerate());

        let mixed = parse_polygon(
            "MULTIPOLYGON (((0 0, 1 0, 2 0, 0 0)), ((5 5, 6 5, 6 6, 5 5)))",
        )
        .unwrap();
        assert!(!mixed.is_degenerate());

        let all_flat = parse_polygon(
            "MULTIPOLYGON (((0 0, 1 0, 2 0, 0 0)), ((5 5, 5 6, 5 7, 5 5)))",
        )
        .unwrap();
        assert!(all_flat.is_degenerate());
    }

    #[test]
    fn test_missing_text() {
        assert_eq!(parse_polygon(""), Err(GeometryError::Missing));
        assert_eq!(parse_polygon("   "), Err(GeometryError::Missing));
        assert!(parse_polygon(" ").unwrap_err().is_missing());
    }

    #[test]
    fn test_empty_geometry() {
        assert_eq!(
            parse_polygon("POLYGON EMPTY"),
            Err(GeometryError::EmptyGeometry)
        );
        assert_eq!(
            parse_polygon("MULTIPOLYGON Z EMPTY"),
            Err(GeometryError::EmptyGeometry)
        );
    }

    #[test]
    fn test_malformed_text() {
        assert!(matches!(
            parse_polygon("POLYGON ((0 0, 1 0, 1 1, 0 0)"),
            Err(GeometryError::Syntax { .. })
        ));
        assert!(matches!(
            parse_polygon("POLYGON ((0 0, 1 zero, 1 1, 0 0))"),
            Err(GeometryError::Syntax { .. })
        ));
        assert!(matches!(
            parse_polygon("POLYGON ((0 0, 1 0, 1 1, 0 0)) extra"),
            Err(GeometryError::Syntax { .. })
        ));
        assert!(matches!(
            parse_polygon("not a geometry"),
            Err(GeometryError::Syntax { .. }) | Err(GeometryError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_ring_rules() {
        assert_eq!(
            parse_polygon("POLYGON ((0 0, 1 0, 0 0))"),
            Err(GeometryError::RingTooShort(3))
        );
        assert_eq!(
            parse_polygon("POLYGON ((0 0, 1 0, 1 1, 0 1))"),
            Err(GeometryError::UnclosedRing)
        );
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(
            parse_polygon("LINESTRING (0 0, 1 1)"),
            Err(GeometryError::UnsupportedType("LINESTRING".to_string()))
        );
    }

    #[test]
    fn test_parse_point() {
        let point = parse_point(Some("-87.62"), Some(" 41.88 ")).unwrap();
        assert_eq!(point.x(), -87.62);
        assert_eq!(point.y(), 41.88);
    }

    #[test]
    fn test_parse_point_missing_and_invalid() {
        assert_eq!(
            parse_point(None, Some("41.8")),
            Err(GeometryError::MissingCoordinate("longitude"))
        );
        assert_eq!(
            parse_point(Some("-87.6"), Some("")),
            Err(GeometryError::MissingCoordinate("latitude"))
        );
        assert!(matches!(
            parse_point(Some("NaN"), Some("41.8")),
            Err(GeometryError::InvalidCoordinate { axis: "longitude", .. })
        ));
        assert!(matches!(
            parse_point(Some("-87.6"), Some("north")),
            Err(GeometryError::InvalidCoordinate { axis: "latitude", .. })
        ));
        assert!(!parse_point(Some("inf"), Some("1")).unwrap_err().is_missing());
    }
}
