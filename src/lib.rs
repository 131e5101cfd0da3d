//! Catalog ingestion pipeline for the HoReCa storefront
//!
//! Crawls the supplier's catalog, extracts structured product data from
//! heterogeneous HTML, materializes local image assets, and upserts
//! slug-keyed records into a flat-file or SQLite store. Separate offline
//! passes enrich thin records and verify/deduplicate the whole store.
//! The storefront itself is a read-only consumer of the persisted records.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the main entry points
pub use application::{run_enrich, run_import, run_verify, PipelineContext};
pub use domain::{ProductRecord, RawProduct};
pub use infrastructure::{AppConfig, ImportStrategy, StoreMode};
