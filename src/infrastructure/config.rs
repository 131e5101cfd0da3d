//! Configuration infrastructure
//!
//! All pipeline settings load from `IMPORT_*` environment variables layered
//! over built-in defaults, so the binary can run unattended from cron or CI
//! without a config file. Variable names follow the original deployment
//! (`IMPORT_BASE_URL`, `IMPORT_STRATEGY`, `IMPORT_MODE`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How candidate product URLs are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStrategy {
    /// Parse the supplier's XML sitemap (index indirection supported).
    Sitemap,
    /// Breadth-first crawl from the seed category page.
    Crawl,
}

/// Which persistence backend receives the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Normalized SQLite tables.
    Db,
    /// Single JSON document store plus a categories side artifact.
    File,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Supplier site root, also the base for resolving relative links.
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Sitemap entry point; defaults to `<base_url>/sitemap.xml` when unset.
    #[serde(default)]
    pub sitemap_url: Option<String>,

    /// Path prefix that keeps the crawl inside the catalog section.
    #[serde(default = "defaults::url_prefix")]
    pub url_prefix: String,

    /// Seed URL override; defaults to `<base_url><url_prefix>`.
    #[serde(default)]
    pub supplier_url: Option<String>,

    #[serde(default = "defaults::strategy")]
    pub strategy: ImportStrategy,

    #[serde(default = "defaults::mode")]
    pub mode: StoreMode,

    /// Proceed even when robots.txt disallows the site root.
    #[serde(default)]
    pub ignore_robots: bool,

    /// Skip records that fail minimum validity instead of persisting them
    /// sparsely for later enrichment.
    #[serde(default)]
    pub append_only: bool,

    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Simultaneous in-flight fetch/parse/download tasks.
    #[serde(default = "defaults::concurrency")]
    pub concurrency: usize,

    #[serde(default = "defaults::max_requests_per_second")]
    pub max_requests_per_second: u32,

    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    #[serde(default = "defaults::retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Soft cap on pages visited by the crawl strategy.
    #[serde(default = "defaults::max_visited_pages")]
    pub max_visited_pages: usize,

    /// Soft cap on accumulated candidate products.
    #[serde(default = "defaults::max_products")]
    pub max_products: usize,

    /// Listing anchors speculatively parsed per page.
    #[serde(default = "defaults::anchor_sample_size")]
    pub anchor_sample_size: usize,

    #[serde(default = "defaults::dry_run_limit")]
    pub dry_run_limit: usize,

    /// Image slots materialized per product (1..=3).
    #[serde(default = "defaults::max_images_per_product")]
    pub max_images_per_product: usize,

    /// Directory holding `products.json` and `categories.json`.
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    /// Web root under which per-product image directories are written.
    #[serde(default = "defaults::asset_root")]
    pub asset_root: PathBuf,

    #[serde(default = "defaults::log_dir")]
    pub log_dir: PathBuf,

    /// SQLite connection string for `StoreMode::Db`.
    #[serde(default = "defaults::database_url")]
    pub database_url: String,

    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

mod defaults {
    use super::{ImportStrategy, StoreMode};
    use std::path::PathBuf;

    pub fn base_url() -> String {
        "https://complex-bar.kz".to_string()
    }
    pub fn url_prefix() -> String {
        "/catalog/".to_string()
    }
    pub fn strategy() -> ImportStrategy {
        ImportStrategy::Crawl
    }
    pub fn mode() -> StoreMode {
        StoreMode::File
    }
    pub fn batch_size() -> usize {
        50
    }
    pub fn concurrency() -> usize {
        4
    }
    pub fn max_requests_per_second() -> u32 {
        7
    }
    pub fn request_timeout_secs() -> u64 {
        12
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_backoff_ms() -> u64 {
        400
    }
    pub fn max_visited_pages() -> usize {
        2_000
    }
    pub fn max_products() -> usize {
        5_000
    }
    pub fn anchor_sample_size() -> usize {
        20
    }
    pub fn dry_run_limit() -> usize {
        200
    }
    pub fn max_images_per_product() -> usize {
        3
    }
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn asset_root() -> PathBuf {
        PathBuf::from("public")
    }
    pub fn log_dir() -> PathBuf {
        PathBuf::from("logs")
    }
    pub fn database_url() -> String {
        "sqlite://data/catalog.db".to_string()
    }
    pub fn user_agent() -> String {
        "horecas-group-importer/2.0".to_string()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // An empty source deserializes into pure defaults.
        config::Config::builder()
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("default configuration must deserialize")
    }
}

impl AppConfig {
    /// Load configuration from `IMPORT_*` environment variables over the
    /// built-in defaults.
    pub fn from_env() -> Result<Self> {
        let mut cfg: AppConfig = config::Config::builder()
            .add_source(config::Environment::with_prefix("IMPORT"))
            .build()
            .context("failed to read environment configuration")?
            .try_deserialize()
            .context("invalid IMPORT_* configuration value")?;
        cfg.clamp();
        Ok(cfg)
    }

    fn clamp(&mut self) {
        self.concurrency = self.concurrency.clamp(1, 16);
        self.batch_size = self.batch_size.max(1);
        self.max_images_per_product = self.max_images_per_product.clamp(1, 3);
        if self.max_requests_per_second == 0 {
            self.max_requests_per_second = 1;
        }
    }

    /// Sitemap entry point with the default applied.
    pub fn sitemap_url(&self) -> String {
        self.sitemap_url
            .clone()
            .unwrap_or_else(|| format!("{}/sitemap.xml", self.base_url.trim_end_matches('/')))
    }

    /// Seed URL for the crawl strategy.
    pub fn seed_url(&self) -> String {
        self.supplier_url
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.base_url.trim_end_matches('/'), self.url_prefix))
    }

    pub fn products_json_path(&self) -> PathBuf {
        self.data_dir.join("products.json")
    }

    pub fn categories_json_path(&self) -> PathBuf {
        self.data_dir.join("categories.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.strategy, ImportStrategy::Crawl);
        assert_eq!(cfg.mode, StoreMode::File);
        assert_eq!(cfg.url_prefix, "/catalog/");
        assert!(cfg.concurrency >= 1);
        assert_eq!(cfg.sitemap_url(), "https://complex-bar.kz/sitemap.xml");
        assert_eq!(cfg.seed_url(), "https://complex-bar.kz/catalog/");
    }

    #[test]
    fn clamp_bounds_concurrency_and_image_slots() {
        let mut cfg = AppConfig {
            concurrency: 99,
            max_images_per_product: 10,
            max_requests_per_second: 0,
            ..AppConfig::default()
        };
        cfg.clamp();
        assert_eq!(cfg.concurrency, 16);
        assert_eq!(cfg.max_images_per_product, 3);
        assert_eq!(cfg.max_requests_per_second, 1);
    }

    #[test]
    fn supplier_url_overrides_seed() {
        let cfg = AppConfig {
            supplier_url: Some("https://complex-bar.kz/catalog/stolovaya-posuda/".into()),
            ..AppConfig::default()
        };
        assert_eq!(cfg.seed_url(), "https://complex-bar.kz/catalog/stolovaya-posuda/");
    }
}
