//! End-to-end enrichment: rows in, normalized polygons and labelled points out.

use tracing::info;

use crate::error::PipelineError;
use crate::models::{Dataset, EnrichedPoint, PolygonRecord, Table};
use crate::pip::{
    extract_points, extract_polygons, normalize, Crs, CrsAdvisory, JoinEngine, JoinStats,
    PolygonIndex, RowStats,
};

/// Field names and reference systems the core needs from its caller
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// WKT geometry field of the polygon dataset
    pub geometry_field: String,
    /// Label field of the polygon dataset
    pub label_field: String,
    pub latitude_field: String,
    pub longitude_field: String,
    /// Declared CRS of the polygon dataset, if known
    pub polygon_crs: Option<String>,
    /// Declared CRS of the point dataset, if known
    pub point_crs: Option<String>,
    pub target_crs: Crs,
    /// Worker threads, 0 for one per core
    pub threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            geometry_field: "the_geom".to_string(),
            label_field: "PRI_NEIGH".to_string(),
            latitude_field: "Latitude".to_string(),
            longitude_field: "Longitude".to_string(),
            polygon_crs: None,
            point_crs: None,
            target_crs: Crs::Wgs84,
            threads: 0,
        }
    }
}

/// What happened during a successful run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub polygon_rows: RowStats,
    pub point_rows: RowStats,
    pub join: JoinStats,
    /// Reference system assumptions made for undeclared datasets
    pub advisories: Vec<CrsAdvisory>,
}

impl RunReport {
    pub fn log(&self) {
        info!(
            "Polygons: {} read, {} kept ({} missing, {} invalid, {} unlabeled)",
            self.polygon_rows.read,
            self.polygon_rows.kept,
            self.polygon_rows.missing,
            self.polygon_rows.invalid,
            self.polygon_rows.unlabeled
        );
        info!(
            "Points: {} read, {} kept ({} missing, {} invalid)",
            self.point_rows.read,
            self.point_rows.kept,
            self.point_rows.missing,
            self.point_rows.invalid
        );
        for advisory in &self.advisories {
            info!("Assumption: {}", advisory);
        }
        info!(
            "Matched {} points, {} unmatched, {} skipped containment checks",
            self.join.matched, self.join.unmatched, self.join.join_errors
        );
        for (label, count) in &self.join.per_label {
            info!("  {}: {}", label, count);
        }
    }
}

/// Everything the output writer needs
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub crs: Crs,
    pub polygons: Vec<PolygonRecord>,
    pub points: Vec<EnrichedPoint>,
    pub report: RunReport,
}

/// Parse, normalize, index and join
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, polygons: Table, points: Table) -> Result<PipelineOutput, PipelineError> {
        self.run_with(polygons, points, |_| {})
    }

    /// Run the pipeline, calling `inspect` for every point as it is joined.
    pub fn run_with<F>(
        &self,
        polygons: Table,
        points: Table,
        inspect: F,
    ) -> Result<PipelineOutput, PipelineError>
    where
        F: Fn(&EnrichedPoint) + Sync + Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()?;
        pool.install(|| self.execute(polygons, points, inspect))
    }

    fn execute<F>(
        &self,
        polygons: Table,
        points: Table,
        inspect: F,
    ) -> Result<PipelineOutput, PipelineError>
    where
        F: Fn(&EnrichedPoint) + Sync + Send,
    {
        let config = &self.config;

        // Schema problems abort before any row is parsed
        polygons.require(&[config.geometry_field.as_str(), config.label_field.as_str()])?;
        points.require(&[config.latitude_field.as_str(), config.longitude_field.as_str()])?;

        let polygon_rows =
            extract_polygons(&polygons, &config.geometry_field, &config.label_field)?;
        ensure_not_empty(Dataset::Polygons, polygon_rows.records.len(), polygon_rows.stats)?;

        let point_rows = extract_points(points, &config.latitude_field, &config.longitude_field)?;
        ensure_not_empty(Dataset::Points, point_rows.records.len(), point_rows.stats)?;

        let mut advisories = Vec::new();

        let normalized_polygons = normalize(
            Dataset::Polygons,
            polygon_rows.records,
            config.polygon_crs.as_deref(),
            config.target_crs,
        )?;
        advisories.extend(normalized_polygons.advisory);

        let normalized_points = normalize(
            Dataset::Points,
            point_rows.records,
            config.point_crs.as_deref(),
            config.target_crs,
        )?;
        advisories.extend(normalized_points.advisory);

        let index = PolygonIndex::build(normalized_polygons.collection);
        let outcome = JoinEngine::new(&index).join_with(normalized_points.collection, inspect)?;

        let report = RunReport {
            polygon_rows: polygon_rows.stats,
            point_rows: point_rows.stats,
            join: outcome.stats,
            advisories,
        };

        Ok(PipelineOutput {
            crs: index.crs(),
            polygons: index.into_records(),
            points: outcome.points,
            report,
        })
    }
}

fn ensure_not_empty(dataset: Dataset, kept: usize, stats: RowStats) -> Result<(), PipelineError> {
    if kept == 0 {
        return Err(PipelineError::EmptyInput {
            dataset,
            read: stats.read,
            dropped: stats.dropped(),
        });
    }
    Ok(())
}
