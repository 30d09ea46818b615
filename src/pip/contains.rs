//! Exact point-in-polygon location.
//!
//! Crossing-number test with an explicit on-boundary check. Edges and
//! vertices of both outer rings and holes count as boundary; callers treat
//! boundary as contained. Comparisons are exact on the f64 inputs.

use geo::{Coord, LineString, Point, Polygon};

use super::Geometry;

/// Position of a point relative to a ring or polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Inside,
    Boundary,
    Outside,
}

impl Location {
    /// Inside or on the boundary
    pub fn is_covered(self) -> bool {
        !matches!(self, Location::Outside)
    }
}

/// Locate a point relative to a closed ring.
pub fn locate_in_ring(ring: &LineString<f64>, p: Coord<f64>) -> Location {
    let mut inside = false;

    for segment in ring.lines() {
        let (a, b) = (segment.start, segment.end);

        if on_segment(a, b, p) {
            return Location::Boundary;
        }

        // Half-open rule on y so a vertex shared by two edges is crossed once
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }

    if inside {
        Location::Inside
    } else {
        Location::Outside
    }
}

/// Locate a point relative to a polygon with holes.
pub fn locate_in_polygon(polygon: &Polygon<f64>, p: Coord<f64>) -> Location {
    match locate_in_ring(polygon.exterior(), p) {
        Location::Inside => {}
        other => return other,
    }

    for hole in polygon.interiors() {
        match locate_in_ring(hole, p) {
            Location::Inside => return Location::Outside,
            Location::Boundary => return Location::Boundary,
            Location::Outside => {}
        }
    }

    Location::Inside
}

/// Locate a point relative to an areal geometry. Points never contain anything.
pub fn locate(geometry: &Geometry, point: Point<f64>) -> Location {
    let p = point.0;
    let mut result = Location::Outside;
    for polygon in geometry.polygons() {
        match locate_in_polygon(polygon, p) {
            Location::Inside => return Location::Inside,
            Location::Boundary => result = Location::Boundary,
            Location::Outside => {}
        }
    }
    result
}

/// Boundary-inclusive containment
pub fn covers(geometry: &Geometry, point: Point<f64>) -> bool {
    locate(geometry, point).is_covered()
}

fn on_segment(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross != 0.0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}
