//! Core data models for the enrichment pipeline.

pub mod record;
pub mod table;

pub use record::{EnrichedPoint, PointRecord, PolygonRecord};
pub use table::{is_missing, Attributes, Dataset, Table};
