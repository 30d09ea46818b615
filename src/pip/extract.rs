//! Turn raw rows into polygon and point records, counting what gets dropped.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{parse_point, parse_polygon, GeometryError};
use crate::error::PipelineError;
use crate::models::{Dataset, PointRecord, PolygonRecord, Table};

/// Row accounting for one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowStats {
    pub read: usize,
    pub kept: usize,
    /// Geometry or coordinate value absent
    pub missing: usize,
    /// Geometry or coordinate value present but unusable
    pub invalid: usize,
    /// Usable geometry but blank label
    pub unlabeled: usize,
}

impl RowStats {
    pub fn dropped(&self) -> usize {
        self.missing + self.invalid + self.unlabeled
    }
}

/// Records that survived parsing, in input order
#[derive(Debug, Clone)]
pub struct Extracted<T> {
    pub records: Vec<T>,
    pub stats: RowStats,
}

/// Parse polygon rows. Fails only when a required field is absent.
pub fn extract_polygons(
    table: &Table,
    geometry_field: &str,
    label_field: &str,
) -> Result<Extracted<PolygonRecord>, PipelineError> {
    table.require(&[geometry_field, label_field])?;

    info!(
        "Parsing WKT geometry from field '{}' ({} rows)...",
        geometry_field,
        table.len()
    );

    let outcomes: Vec<Result<PolygonRecord, GeometryError>> = table
        .rows()
        .par_iter()
        .map(|row| {
            let boundary = parse_polygon(row.value(geometry_field).unwrap_or_default())?;
            PolygonRecord::new(row.get(label_field).unwrap_or_default(), boundary)
        })
        .collect();

    Ok(tally(table.dataset, outcomes))
}

/// Parse point rows; all attributes move into the records unchanged.
pub fn extract_points(
    table: Table,
    latitude_field: &str,
    longitude_field: &str,
) -> Result<Extracted<PointRecord>, PipelineError> {
    table.require(&[latitude_field, longitude_field])?;

    let dataset = table.dataset;
    let outcomes: Vec<Result<PointRecord, GeometryError>> = table
        .into_rows()
        .into_par_iter()
        .map(|row| {
            let location = parse_point(row.value(longitude_field), row.value(latitude_field))?;
            Ok(PointRecord::new(row, location))
        })
        .collect();

    Ok(tally(dataset, outcomes))
}

fn tally<T>(dataset: Dataset, outcomes: Vec<Result<T, GeometryError>>) -> Extracted<T> {
    let mut stats = RowStats {
        read: outcomes.len(),
        ..RowStats::default()
    };
    let mut records = Vec::with_capacity(outcomes.len());

    for (row, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!("Dropping row {} of {}: {}", row + 1, dataset, e);
                match e {
                    GeometryError::MissingLabel => stats.unlabeled += 1,
                    ref e if e.is_missing() => stats.missing += 1,
                    _ => stats.invalid += 1,
                }
            }
        }
    }
    stats.kept = records.len();

    let what = match dataset {
        Dataset::Polygons => "geometry",
        Dataset::Points => "latitude/longitude",
    };
    if stats.missing > 0 {
        warn!(
            "Found {} rows with missing {} in {}. These rows will be dropped.",
            stats.missing, what, dataset
        );
    }
    if stats.invalid > 0 {
        warn!(
            "Found {} rows with invalid {} in {}. These rows will be dropped.",
            stats.invalid, what, dataset
        );
    }
    if stats.unlabeled > 0 {
        warn!(
            "Found {} rows with a blank label in {}. These rows will be dropped.",
            stats.unlabeled, dataset
        );
    }
    info!("Kept {} of {} rows from {}", stats.kept, stats.read, dataset);

    Extracted { records, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polygon_table(rows: &[(&str, &str)]) -> Table {
        let mut table = Table::new(
            Dataset::Polygons,
            vec!["the_geom".into(), "PRI_NEIGH".into(), "SEC_NEIGH".into()],
        );
        for (geom, name) in rows {
            table.push_values([*geom, *name, "x"]);
        }
        table
    }

    #[test]
    fn test_extract_polygons_counts_drops() {
        let table = polygon_table(&[
            ("POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))", "Loop"),
            ("", "Empty"),
            ("   ", "Blank"),
            ("POLYGON ((0 0, 1 0", "Broken"),
            ("LINESTRING (0 0, 1 1)", "Line"),
            ("MULTIPOLYGON (((0 0, 1 0, 1 1, 0 0)))", ""),
            ("MULTIPOLYGON (((2 2, 3 2, 3 3, 2 2)))", "Hyde Park"),
        ]);

        let extracted = extract_polygons(&table, "the_geom", "PRI_NEIGH").unwrap();
        assert_eq!(
            extracted.stats,
            RowStats {
                read: 7,
                kept: 2,
                missing: 2,
                invalid: 2,
                unlabeled: 1,
            }
        );
        assert_eq!(extracted.stats.dropped(), 5);
        let labels: Vec<&str> = extracted.records.iter().map(|r| &**r.label()).collect();
        assert_eq!(labels, vec!["Loop", "Hyde Park"]);
    }

    #[test]
    fn test_extract_polygons_schema_error() {
        let table = polygon_table(&[]);
        let err = extract_polygons(&table, "geometry", "PRI_NEIGH").unwrap_err();
        assert!(matches!(err, PipelineError::Schema { ref field, .. } if field == "geometry"));
    }

    #[test]
    fn test_extract_points() {
        let mut table = Table::new(
            Dataset::Points,
            vec!["ID".into(), "Latitude".into(), "Longitude".into()],
        );
        table.push_values(["1", "41.88", "-87.63"]);
        table.push_values(["2", "", "-87.63"]);
        table.push_values(["3", "41.88", "west"]);
        table.push_values(["4", "41.79", "-87.59"]);

        let extracted = extract_points(table, "Latitude", "Longitude").unwrap();
        assert_eq!(extracted.stats.read, 4);
        assert_eq!(extracted.stats.kept, 2);
        assert_eq!(extracted.stats.missing, 1);
        assert_eq!(extracted.stats.invalid, 1);

        let first = &extracted.records[0];
        assert_eq!(first.location.x(), -87.63);
        assert_eq!(first.location.y(), 41.88);
        assert_eq!(first.attributes.len(), 3);
        assert_eq!(extracted.records[1].attributes.get("ID"), Some("4"));
    }

    #[test]
    fn test_extract_points_schema_error() {
        let table = Table::new(Dataset::Points, vec!["Latitude".into()]);
        let err = extract_points(table, "Latitude", "Longitude").unwrap_err();
        match err {
            PipelineError::Schema {
                dataset, field, ..
            } => {
                assert_eq!(dataset, Dataset::Points);
                assert_eq!(field, "Longitude");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
