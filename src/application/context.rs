//! Shared pipeline state threaded through every pass
//!
//! One context per run: the HTTP client, the parsers, the image pipeline,
//! the category registry and the store. Passing it explicitly (instead of
//! module-level singletons) keeps each pass testable against its own
//! instance.

use crate::domain::category::CategoryRegistry;
use crate::infrastructure::config::{AppConfig, StoreMode};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::images::ImagePipeline;
use crate::infrastructure::logging::RunLog;
use crate::infrastructure::parsing::{ListingParser, ProductPageParser};
use crate::infrastructure::store::{JsonProductStore, ProductStore, SqliteProductStore};
use anyhow::Result;
use std::sync::{Arc, Mutex};

pub struct PipelineContext {
    pub config: AppConfig,
    pub http: HttpClient,
    pub product_parser: ProductPageParser,
    pub listing_parser: ListingParser,
    pub images: ImagePipeline,
    pub registry: Mutex<CategoryRegistry>,
    pub store: Arc<dyn ProductStore>,
    pub run_log: RunLog,
}

impl PipelineContext {
    /// Build the full context for a run: backend per the configured store
    /// mode, a run log named after the pass.
    pub async fn build(config: AppConfig, run_name: &str) -> Result<Arc<Self>> {
        let store: Arc<dyn ProductStore> = match config.mode {
            StoreMode::File => Arc::new(JsonProductStore::new(&config.data_dir)),
            StoreMode::Db => Arc::new(SqliteProductStore::connect(&config.database_url).await?),
        };
        Self::build_with_store(config, run_name, store).await
    }

    pub async fn build_with_store(
        config: AppConfig,
        run_name: &str,
        store: Arc<dyn ProductStore>,
    ) -> Result<Arc<Self>> {
        let http = HttpClient::from_config(&config)?;
        let product_parser = ProductPageParser::new()?;
        let listing_parser = ListingParser::new();
        let images = ImagePipeline::new(&config.asset_root, config.max_images_per_product);
        let run_log = RunLog::create(&config.log_dir, run_name)?;

        Ok(Arc::new(Self {
            config,
            http,
            product_parser,
            listing_parser,
            images,
            registry: Mutex::new(CategoryRegistry::new()),
            store,
            run_log,
        }))
    }

    /// Register a breadcrumb trail; first-seen entries win.
    pub fn register_categories(&self, trail: &[(String, String)]) {
        if trail.is_empty() {
            return;
        }
        if let Ok(mut registry) = self.registry.lock() {
            registry.register_trail(trail);
        }
    }

    /// Snapshot the discovered category forest.
    pub fn category_nodes(&self) -> Vec<crate::domain::category::CategoryNode> {
        self.registry
            .lock()
            .map(|r| r.nodes())
            .unwrap_or_default()
    }
}
