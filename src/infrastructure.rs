//! Infrastructure layer: network, parsing, images, persistence, logging
//!
//! Everything that touches the outside world lives here; the domain rules
//! stay in `domain` and the pass orchestration in `application`.

pub mod config;
pub mod http_client;
pub mod images;
pub mod logging;
pub mod parsing;
pub mod retry;
pub mod sitemap;
pub mod store;

// Re-export commonly used items
pub use config::{AppConfig, ImportStrategy, StoreMode};
pub use http_client::HttpClient;
pub use images::ImagePipeline;
pub use logging::{init_logging, RunLog};
pub use parsing::{ListingParser, ParsingError, ParsingResult, ProductPageParser, SelectorConfig};
pub use retry::{run_with_retry, RetryPolicy};
pub use store::{JsonProductStore, ProductStore, SqliteProductStore, UpsertOutcome};
