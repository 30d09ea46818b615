use anyhow::{Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use hoodjoin::{Dataset, Table};

/// Load a CSV export (optionally gzipped) into a table of raw string values.
pub fn read_table(path: &Path, dataset: Dataset) -> Result<Table> {
    info!("Loading {} from {}", dataset, path.display());

    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file {}", dataset, path.display()))?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    table_from_reader(reader, dataset)
        .with_context(|| format!("Failed to read {} from {}", dataset, path.display()))
}

pub fn table_from_reader<R: Read>(reader: R, dataset: Dataset) -> Result<Table> {
    // Ragged rows are padded by the table rather than rejected
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Missing header row")?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let mut table = Table::new(dataset, headers);
    for (line, result) in csv_reader.records().enumerate() {
        let record = result.with_context(|| format!("Malformed CSV record {}", line + 1))?;
        table.push_values(record.iter());
    }

    info!("Loaded {} rows from {}", table.len(), dataset);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const NEIGHBORHOODS: &str = "\u{feff}the_geom,PRI_NEIGH,SEC_NEIGH\n\
        \"MULTIPOLYGON (((0 0, 1 0, 1 1, 0 1, 0 0)))\",Grand Boulevard,BRONZEVILLE\n\
        \"POLYGON ((1 0, 2 0, 2 1, 1 1, 1 0))\",Printers Row\n";

    #[test]
    fn test_reads_quoted_wkt_and_pads_short_rows() {
        let table = table_from_reader(NEIGHBORHOODS.as_bytes(), Dataset::Polygons).unwrap();
        assert_eq!(table.headers(), &["the_geom", "PRI_NEIGH", "SEC_NEIGH"]);
        assert_eq!(table.len(), 2);

        let first = &table.rows()[0];
        assert_eq!(
            first.get("the_geom"),
            Some("MULTIPOLYGON (((0 0, 1 0, 1 1, 0 1, 0 0)))")
        );
        assert_eq!(table.rows()[1].get("SEC_NEIGH"), Some(""));
    }

    #[test]
    fn test_reads_gzip_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crimes.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder
            .write_all(b"ID,Latitude,Longitude\n1,41.88,-87.63\n2,,\n")
            .unwrap();
        encoder.finish().unwrap();

        let table = read_table(&path, Dataset::Points).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get("Latitude"), Some("41.88"));
        assert_eq!(table.rows()[1].value("Latitude"), None);
    }

    #[test]
    fn test_missing_file() {
        let err = read_table(Path::new("/nonexistent/crimes.csv"), Dataset::Points).unwrap_err();
        assert!(err.to_string().contains("point dataset"));
    }
}
