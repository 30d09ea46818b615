//! Left-outer point-in-polygon join.
//!
//! Each point is matched independently: the index narrows candidates by
//! bounding box, then candidates are tested in ascending record id order
//! with a boundary-inclusive containment test. The first covering
//! candidate wins. Points with no covering candidate keep `None`.

use std::sync::Arc;

use geo::Point;
use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::contains::covers;
use super::{Normalized, PolygonIndex, ReferenceSystemError};
use crate::models::{EnrichedPoint, PointRecord};

/// Recoverable per-point failure while evaluating containment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("polygon #{id} '{label}' is degenerate (collinear vertices)")]
    DegeneratePolygon { id: usize, label: Arc<str> },
}

/// Result of matching one point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookup {
    /// Record id of the matched polygon
    pub polygon: Option<usize>,
    /// Candidates that could not be evaluated
    pub errors: Vec<JoinError>,
}

/// Counts gathered over a whole join
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinStats {
    pub matched: usize,
    pub unmatched: usize,
    /// Number of (point, candidate) evaluations that hit a [`JoinError`]
    pub join_errors: usize,
    /// Ids of polygons that raised a [`JoinError`], ascending
    pub failing_polygons: Vec<usize>,
    /// Points per label, sorted by label
    pub per_label: Vec<(Arc<str>, usize)>,
}

/// Enriched points in input order plus stats
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub points: Vec<EnrichedPoint>,
    pub stats: JoinStats,
}

/// Runs point lookups against a built [`PolygonIndex`]
pub struct JoinEngine<'a> {
    index: &'a PolygonIndex,
}

impl<'a> JoinEngine<'a> {
    pub fn new(index: &'a PolygonIndex) -> Self {
        Self { index }
    }

    /// Find the polygon covering a point, if any.
    pub fn lookup(&self, location: Point<f64>) -> Lookup {
        let mut lookup = Lookup::default();

        for id in self.index.query(location) {
            let Some(record) = self.index.record(id) else {
                continue;
            };
            if self.index.is_degenerate(id) {
                lookup.errors.push(JoinError::DegeneratePolygon {
                    id,
                    label: Arc::clone(record.label()),
                });
                continue;
            }
            if covers(record.boundary(), location) {
                lookup.polygon = Some(id);
                break;
            }
        }

        lookup
    }

    /// Join every point, calling `inspect` once per finished point.
    ///
    /// Points tagged with another reference system are first reprojected
    /// into the index's system. Output order and size match the input.
    pub fn join_with<F>(
        &self,
        points: Normalized<PointRecord>,
        inspect: F,
    ) -> Result<JoinOutcome, ReferenceSystemError>
    where
        F: Fn(&EnrichedPoint) + Sync + Send,
    {
        let points = if points.crs() != self.index.crs() {
            info!(
                "Reprojecting {} points from {} to {} to match polygons",
                points.len(),
                points.crs(),
                self.index.crs()
            );
            points.into_crs(self.index.crs())?
        } else {
            points
        };

        info!(
            "Joining {} points against {} polygons...",
            points.len(),
            self.index.len()
        );

        let results: Vec<(EnrichedPoint, Lookup)> = points
            .into_items()
            .into_par_iter()
            .map(|record| {
                let lookup = self.lookup(record.location);
                let label = lookup
                    .polygon
                    .and_then(|id| self.index.record(id))
                    .map(|r| Arc::clone(r.label()));
                let enriched = EnrichedPoint::from_record(record, label);
                inspect(&enriched);
                (enriched, lookup)
            })
            .collect();

        let mut stats = JoinStats::default();
        let mut per_label: HashMap<Arc<str>, usize> = HashMap::new();
        let mut failing: Vec<usize> = Vec::new();
        let mut enriched = Vec::with_capacity(results.len());

        for (point, lookup) in results {
            for error in &lookup.errors {
                debug!(
                    "Skipping candidate for point ({}, {}): {}",
                    point.location.x(),
                    point.location.y(),
                    error
                );
                let JoinError::DegeneratePolygon { id, .. } = error;
                failing.push(*id);
            }
            stats.join_errors += lookup.errors.len();

            match &point.matched_label {
                Some(label) => {
                    stats.matched += 1;
                    *per_label.entry(Arc::clone(label)).or_insert(0) += 1;
                }
                None => stats.unmatched += 1,
            }
            enriched.push(point);
        }

        failing.sort_unstable();
        failing.dedup();
        stats.failing_polygons = failing;

        let mut per_label: Vec<(Arc<str>, usize)> = per_label.into_iter().collect();
        per_label.sort_by(|a, b| a.0.cmp(&b.0));
        stats.per_label = per_label;

        if stats.join_errors > 0 {
            warn!(
                "{} containment checks skipped on {} degenerate polygons",
                stats.join_errors,
                stats.failing_polygons.len()
            );
        }
        info!(
            "Join complete: {} matched, {} unmatched",
            stats.matched, stats.unmatched
        );

        Ok(JoinOutcome {
            points: enriched,
            stats,
        })
    }
}

/// Left-outer join of `points` against `index`.
pub fn join(
    points: Normalized<PointRecord>,
    index: &PolygonIndex,
) -> Result<JoinOutcome, ReferenceSystemError> {
    JoinEngine::new(index).join_with(points, |_| {})
}
