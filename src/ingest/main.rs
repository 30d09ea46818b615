//! Neighborhood preprocessing.
//!
//! Reads a polygon CSV (WKT boundaries plus a name) and a point CSV
//! (latitude/longitude records), labels every point with the polygon that
//! contains it, and writes both collections as GeoJSON.

mod config;
mod geojson;
mod source;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hoodjoin::{Dataset, Pipeline};

use crate::config::{Config, Overrides};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "preprocess")]
#[command(about = "Label point records with the neighborhood polygon that contains them")]
struct Args {
    /// Optional TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Polygon CSV with a WKT geometry column (.gz accepted)
    #[arg(long)]
    polygons: Option<PathBuf>,

    /// Point CSV with latitude/longitude columns (.gz accepted)
    #[arg(long)]
    points: Option<PathBuf>,

    /// Output GeoJSON for the normalized polygons
    #[arg(long)]
    polygons_out: Option<PathBuf>,

    /// Output GeoJSON for the labelled points
    #[arg(long)]
    points_out: Option<PathBuf>,

    /// WKT column of the polygon CSV [default: the_geom]
    #[arg(long)]
    geometry_field: Option<String>,

    /// Name column of the polygon CSV [default: PRI_NEIGH]
    #[arg(long)]
    label_field: Option<String>,

    /// [default: Latitude]
    #[arg(long)]
    latitude_field: Option<String>,

    /// [default: Longitude]
    #[arg(long)]
    longitude_field: Option<String>,

    /// Reference system of the polygon CSV (assumed to be the target if omitted)
    #[arg(long)]
    polygon_crs: Option<String>,

    /// Reference system of the point CSV (assumed to be the target if omitted)
    #[arg(long)]
    point_crs: Option<String>,

    /// Reference system of both outputs [default: EPSG:4326]
    #[arg(long)]
    target_crs: Option<String>,

    /// Worker threads, 0 for one per core
    #[arg(long)]
    threads: Option<usize>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            polygons: self.polygons.clone(),
            points: self.points.clone(),
            polygons_out: self.polygons_out.clone(),
            points_out: self.points_out.clone(),
            geometry_field: self.geometry_field.clone(),
            label_field: self.label_field.clone(),
            latitude_field: self.latitude_field.clone(),
            longitude_field: self.longitude_field.clone(),
            polygon_crs: self.polygon_crs.clone(),
            point_crs: self.point_crs.clone(),
            target_crs: self.target_crs.clone(),
            threads: self.threads,
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let settings = config.resolve(args.overrides())?;

    info!("Hoodjoin preprocessing");
    info!("Polygons: {}", settings.polygons.display());
    info!("Points: {}", settings.points.display());
    info!("Target CRS: {}", settings.pipeline.target_crs);

    let polygons = source::read_table(&settings.polygons, Dataset::Polygons)?;
    let points = source::read_table(&settings.points, Dataset::Points)?;

    // Rows are dropped during extraction, so the join count is open-ended
    let pb = join_progress(args.quiet)?;

    let pipeline = Pipeline::new(settings.pipeline);
    let output = pipeline.run_with(polygons, points, |_| pb.inc(1));
    pb.finish_and_clear();
    let output = output.context("Preprocessing failed")?;

    geojson::write_outputs(
        &output,
        &pipeline.config().label_field,
        &settings.polygons_out,
        &settings.points_out,
    )?;

    output.report.log();
    info!("Preprocessing complete");

    Ok(())
}

fn join_progress(quiet: bool) -> Result<ProgressBar> {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} points joined ({per_sec})")?,
    );
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_progress_has_no_fixed_length() {
        let pb = join_progress(true).unwrap();
        assert_eq!(pb.length(), None);
        pb.inc(3);
        assert_eq!(pb.position(), 3);
    }
}
