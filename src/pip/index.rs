//! Spatial index for candidate polygon lookups.

use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{info, warn};

use super::{Crs, Normalized};
use crate::models::PolygonRecord;

/// R-tree entry pointing back at a polygon record by position
#[derive(Debug, Clone)]
struct IndexedPolygon {
    id: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedPolygon {
    fn new(id: usize, record: &PolygonRecord) -> Self {
        let rect = record.envelope();
        Self {
            id,
            envelope: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        }
    }
}

/// Bounding-box index over labelled polygons.
///
/// Record ids are positions in the collection it was built from, so input
/// order doubles as the stable candidate order. Immutable once built and
/// safe to share across threads.
pub struct PolygonIndex {
    tree: RTree<IndexedPolygon>,
    records: Vec<PolygonRecord>,
    /// Polygons whose outer rings are all flat, by record id
    degenerate: Vec<bool>,
    crs: Crs,
}

impl PolygonIndex {
    /// Build the index; every record gets exactly one entry.
    pub fn build(polygons: Normalized<PolygonRecord>) -> Self {
        let crs = polygons.crs();
        let records = polygons.into_items();

        info!("Building spatial index for {} polygons...", records.len());

        let indexed: Vec<IndexedPolygon> = records
            .iter()
            .enumerate()
            .map(|(id, record)| IndexedPolygon::new(id, record))
            .collect();

        let degenerate: Vec<bool> = records
            .iter()
            .map(|record| record.boundary().is_degenerate())
            .collect();

        for (id, record) in records.iter().enumerate() {
            if degenerate[id] {
                warn!(
                    "Polygon #{} '{}' is degenerate (collinear vertices)",
                    id,
                    record.label()
                );
            }
        }

        let tree = RTree::bulk_load(indexed);
        info!("Spatial index built with {} entries", tree.size());

        Self {
            tree,
            records,
            degenerate,
            crs,
        }
    }

    /// Ids of polygons whose bounding box covers the point, ascending.
    pub fn query(&self, point: Point<f64>) -> Vec<usize> {
        let query_envelope = AABB::from_point([point.x(), point.y()]);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            .map(|ip| ip.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn record(&self, id: usize) -> Option<&PolygonRecord> {
        self.records.get(id)
    }

    pub fn is_degenerate(&self, id: usize) -> bool {
        self.degenerate.get(id).copied().unwrap_or(false)
    }

    pub fn records(&self) -> &[PolygonRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PolygonRecord> {
        self.records
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Get total number of indexed polygons
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dataset;
    use crate::pip::{normalize, parse_polygon};

    fn index_of(polygons: &[(&str, &str)]) -> PolygonIndex {
        let records = polygons
            .iter()
            .map(|(label, wkt)| PolygonRecord::new(label, parse_polygon(wkt).unwrap()).unwrap())
            .collect();
        let normalized = normalize(Dataset::Polygons, records, Some("EPSG:4326"), Crs::Wgs84)
            .unwrap()
            .collection;
        PolygonIndex::build(normalized)
    }

    #[test]
    fn test_empty_index() {
        let index = index_of(&[]);
        assert!(index.is_empty());
        assert!(index.query(Point::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_every_record_indexed_once() {
        let index = index_of(&[
            ("A", "POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))"),
            ("A", "POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))"),
            ("B", "POLYGON ((5 5, 6 5, 6 6, 5 5))"),
        ]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.records().len(), 3);
        assert_eq!(index.query(Point::new(0.5, 0.5)), vec![0, 1]);
        assert_eq!(index.crs(), Crs::Wgs84);
    }

    #[test]
    fn test_query_prunes_by_envelope() {
        let index = index_of(&[
            ("A", "POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))"),
            ("B", "POLYGON ((1 0, 2 0, 2 1, 1 1, 1 0))"),
            ("C", "POLYGON ((2 0, 3 0, 3 1, 2 1, 2 0))"),
        ]);
        assert_eq!(index.query(Point::new(1.5, 0.5)), vec![1]);
        assert_eq!(index.query(Point::new(1.0, 0.5)), vec![0, 1]);
        assert!(index.query(Point::new(5.0, 5.0)).is_empty());
    }

    #[test]
    fn test_candidates_sorted_by_input_order() {
        let wkt = "POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))";
        let polygons: Vec<(String, &str)> = (0..50).map(|i| (format!("P{}", i), wkt)).collect();
        let borrowed: Vec<(&str, &str)> = polygons.iter().map(|(l, w)| (l.as_str(), *w)).collect();
        let index = index_of(&borrowed);
        let ids = index.query(Point::new(5.0, 5.0));
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
        assert_eq!(&**index.record(7).unwrap().label(), "P7");
    }

    #[test]
    fn test_degenerate_flagged() {
        let index = index_of(&[
            ("flat", "POLYGON ((0 0, 1 0, 2 0, 0 0))"),
            ("A", "POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))"),
        ]);
        assert!(index.is_degenerate(0));
        assert!(!index.is_degenerate(1));
        assert!(!index.is_degenerate(99));
    }

    #[test]
    fn test_self_intersecting_ring_is_not_degenerate() {
        let index = index_of(&[("bow tie", "POLYGON ((0 0, 2 2, 2 0, 0 2, 0 0))")]);
        assert!(!index.is_degenerate(0));
        assert_eq!(index.query(Point::new(0.2, 1.0)), vec![0]);
    }
}
