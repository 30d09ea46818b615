//! Point-in-polygon (PIP) enrichment core.
//!
//! Parses boundary and point geometry, brings both collections into one
//! reference system, indexes the polygons in an R-tree and joins every
//! point to the polygon that contains it.

pub mod contains;
mod crs;
mod extract;
mod geometry;
mod index;
mod join;

pub use crs::{
    normalize, Crs, CrsAdvisory, Normalization, Normalized, ReferenceSystemError, Reproject,
    Transform,
};
pub use extract::{extract_points, extract_polygons, Extracted, RowStats};
pub use geometry::{parse_point, parse_polygon, Geometry, GeometryError};
pub use index::PolygonIndex;
pub use join::{join, JoinEngine, JoinError, JoinOutcome, JoinStats, Lookup};
