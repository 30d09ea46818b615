use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use hoodjoin::pip::Crs;
use hoodjoin::PipelineConfig;

const DEFAULT_POLYGONS_OUT: &str = "neighborhoods.geojson";
const DEFAULT_POINTS_OUT: &str = "crimes_with_neighborhoods.geojson";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub target_crs: Option<String>,
    pub threads: Option<usize>,
    pub polygons: PolygonSourceConfig,
    pub points: PointSourceConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PolygonSourceConfig {
    pub path: Option<PathBuf>,
    pub geometry_field: Option<String>,
    pub label_field: Option<String>,
    pub crs: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PointSourceConfig {
    pub path: Option<PathBuf>,
    pub latitude_field: Option<String>,
    pub longitude_field: Option<String>,
    pub crs: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub polygons: Option<PathBuf>,
    pub points: Option<PathBuf>,
}

/// Values given on the command line; these win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub polygons: Option<PathBuf>,
    pub points: Option<PathBuf>,
    pub polygons_out: Option<PathBuf>,
    pub points_out: Option<PathBuf>,
    pub geometry_field: Option<String>,
    pub label_field: Option<String>,
    pub latitude_field: Option<String>,
    pub longitude_field: Option<String>,
    pub polygon_crs: Option<String>,
    pub point_crs: Option<String>,
    pub target_crs: Option<String>,
    pub threads: Option<usize>,
}

/// Fully resolved run settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub polygons: PathBuf,
    pub points: PathBuf,
    pub polygons_out: PathBuf,
    pub points_out: PathBuf,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Merge command line overrides over this config and fill in defaults.
    pub fn resolve(self, cli: Overrides) -> Result<Settings> {
        let defaults = PipelineConfig::default();

        let polygons = cli
            .polygons
            .or(self.polygons.path)
            .context("No polygon file given (--polygons or [polygons] path)")?;
        let points = cli
            .points
            .or(self.points.path)
            .context("No point file given (--points or [points] path)")?;

        let target_crs = match cli.target_crs.or(self.target_crs) {
            Some(id) => Crs::parse(&id).context("Invalid target CRS")?,
            None => defaults.target_crs,
        };

        let pipeline = PipelineConfig {
            geometry_field: cli
                .geometry_field
                .or(self.polygons.geometry_field)
                .unwrap_or(defaults.geometry_field),
            label_field: cli
                .label_field
                .or(self.polygons.label_field)
                .unwrap_or(defaults.label_field),
            latitude_field: cli
                .latitude_field
                .or(self.points.latitude_field)
                .unwrap_or(defaults.latitude_field),
            longitude_field: cli
                .longitude_field
                .or(self.points.longitude_field)
                .unwrap_or(defaults.longitude_field),
            polygon_crs: cli.polygon_crs.or(self.polygons.crs),
            point_crs: cli.point_crs.or(self.points.crs),
            target_crs,
            threads: cli.threads.or(self.threads).unwrap_or(defaults.threads),
        };

        Ok(Settings {
            polygons,
            points,
            polygons_out: cli
                .polygons_out
                .or(self.output.polygons)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_POLYGONS_OUT)),
            points_out: cli
                .points_out
                .or(self.output.points)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_POINTS_OUT)),
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
target_crs = "EPSG:3857"
threads = 4

[polygons]
path = "Neighborhoods_2012b.csv"
label_field = "SEC_NEIGH"
crs = "EPSG:4326"

[points]
path = "crimes.csv.gz"

[output]
points = "out/crimes.geojson"
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.polygons.label_field.as_deref(), Some("SEC_NEIGH"));
        assert!(config.points.latitude_field.is_none());

        let settings = config.resolve(Overrides::default()).unwrap();
        assert_eq!(settings.polygons, PathBuf::from("Neighborhoods_2012b.csv"));
        assert_eq!(settings.points, PathBuf::from("crimes.csv.gz"));
        assert_eq!(settings.points_out, PathBuf::from("out/crimes.geojson"));
        assert_eq!(settings.polygons_out, PathBuf::from(DEFAULT_POLYGONS_OUT));
        assert_eq!(settings.pipeline.label_field, "SEC_NEIGH");
        assert_eq!(settings.pipeline.geometry_field, "the_geom");
        assert_eq!(settings.pipeline.latitude_field, "Latitude");
        assert_eq!(settings.pipeline.polygon_crs.as_deref(), Some("EPSG:4326"));
        assert_eq!(settings.pipeline.target_crs, Crs::WebMercator);
        assert_eq!(settings.pipeline.threads, 4);
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = Config {
            target_crs: Some("EPSG:3857".to_string()),
            polygons: PolygonSourceConfig {
                path: Some(PathBuf::from("a.csv")),
                label_field: Some("NAME".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = config
            .resolve(Overrides {
                points: Some(PathBuf::from("b.csv")),
                label_field: Some("PRI_NEIGH".to_string()),
                target_crs: Some("4326".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.pipeline.label_field, "PRI_NEIGH");
        assert_eq!(settings.pipeline.target_crs, Crs::Wgs84);
        assert_eq!(settings.points, PathBuf::from("b.csv"));
    }

    #[test]
    fn test_missing_inputs_and_bad_crs() {
        assert!(Config::default().resolve(Overrides::default()).is_err());

        let err = Config::default()
            .resolve(Overrides {
                polygons: Some(PathBuf::from("a.csv")),
                points: Some(PathBuf::from("b.csv")),
                target_crs: Some("EPSG:2263".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(format!("{:#}", err).contains("EPSG:2263"));
    }
}
