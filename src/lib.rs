//! Hoodjoin - labels point records with the polygon that contains them
//!
//! This library holds the geometry parsing, reference system normalization,
//! spatial index and join engine used by the `preprocess` binary.

pub mod error;
pub mod models;
pub mod pip;
pub mod pipeline;

pub use error::PipelineError;
pub use models::{Attributes, Dataset, EnrichedPoint, PointRecord, PolygonRecord, Table};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, RunReport};
