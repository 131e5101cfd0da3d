//! Application layer: the three pipeline passes and their shared context
//!
//! `import` discovers and ingests products, `enrich` backfills thin
//! records, `verify` deduplicates and rewrites the store. Each pass takes
//! the same `PipelineContext`.

pub mod context;
pub mod crawl;
pub mod enrich;
pub mod import;
pub mod verify;

pub use context::PipelineContext;
pub use crawl::AcceptPolicy;
pub use enrich::{run_enrich, EnrichSummary};
pub use import::{run_import, RunSummary};
pub use verify::{run_verify, VerifySummary};
