//! Flat-file document store: one JSON array of products
//!
//! All writes serialize through a single async mutex and land via a temp
//! file plus atomic rename, retried with backoff because the rename can
//! transiently fail under file-lock contention. A crash mid-write can
//! therefore never leave a half-written store behind.

use super::{upsert_into, ProductStore, UpsertOutcome};
use crate::domain::category::CategoryNode;
use crate::domain::product::ProductRecord;
use crate::infrastructure::retry::{run_with_retry, RetryPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub struct JsonProductStore {
    products_path: PathBuf,
    categories_path: PathBuf,
    /// Single write path: concurrent upserts queue here instead of racing
    /// read-modify-write cycles against each other.
    write_lock: Mutex<()>,
    rename_retry: RetryPolicy,
}

impl JsonProductStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            products_path: data_dir.join("products.json"),
            categories_path: data_dir.join("categories.json"),
            write_lock: Mutex::new(()),
            rename_retry: RetryPolicy {
                max_attempts: 8,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
            },
        }
    }

    pub fn products_path(&self) -> &Path {
        &self.products_path
    }

    async fn load(&self) -> Result<Vec<ProductRecord>> {
        match tokio::fs::read_to_string(&self.products_path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt store at {}", self.products_path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read store at {}", self.products_path.display())
            }),
        }
    }

    /// Write-to-temp then rename. The caller must hold the write lock.
    async fn save_atomic(&self, records: &[ProductRecord]) -> Result<()> {
        if let Some(parent) = self.products_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload =
            serde_json::to_vec_pretty(records).context("failed to serialize product store")?;
        let tmp = self.products_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;

        run_with_retry(&self.rename_retry, "store rename", || async {
            tokio::fs::rename(&tmp, &self.products_path).await
        })
        .await
        .with_context(|| {
            format!(
                "failed to move store into place at {}",
                self.products_path.display()
            )
        })
    }
}

#[async_trait]
impl ProductStore for JsonProductStore {
    async fn upsert(&self, record: ProductRecord) -> Result<UpsertOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let outcome = upsert_into(&mut records, record);
        self.save_atomic(&records).await?;
        Ok(outcome)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ProductRecord>> {
        Ok(self.load().await?.into_iter().find(|r| r.slug == slug))
    }

    async fn load_all(&self) -> Result<Vec<ProductRecord>> {
        self.load().await
    }

    async fn replace_all(&self, records: Vec<ProductRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.save_atomic(&records).await?;
        info!("store rewritten: {} records", records.len());
        Ok(())
    }

    async fn write_categories(&self, nodes: &[CategoryNode]) -> Result<()> {
        if let Some(parent) = self.categories_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload =
            serde_json::to_vec_pretty(nodes).context("failed to serialize categories")?;
        tokio::fs::write(&self.categories_path, payload)
            .await
            .with_context(|| format!("failed to write {}", self.categories_path.display()))?;
        info!("categories written: {}", nodes.len());
        Ok(())
    }

    async fn log_import_error(&self, _url: &str, _message: &str) -> Result<()> {
        // failures already land in the run log in file mode
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(slug: &str) -> ProductRecord {
        let mut specs = BTreeMap::new();
        specs.insert("Материал".to_string(), "Фарфор".to_string());
        specs.insert("Цвет".to_string(), "Белый".to_string());
        ProductRecord {
            slug: slug.into(),
            title: format!("Товар {slug}"),
            price: Some(4500),
            description: "Описание длиннее десяти символов.".into(),
            specs,
            images: vec![format!("/products/{slug}/main.jpg")],
            brand: None,
            material: Some("Фарфор".into()),
            color: None,
            category_slug: Some("plates".into()),
            subcategory_slug: None,
            source_url: Some(format!("https://supplier.example/product/{slug}")),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProductStore::new(dir.path());

        assert_eq!(store.upsert(record("a")).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(record("b")).await.unwrap(), UpsertOutcome::Inserted);

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.find_by_slug("a").await.unwrap().unwrap().slug, "a");
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProductStore::new(dir.path());

        store.upsert(record("a")).await.unwrap();
        let first = store.load_all().await.unwrap();
        let created = first[0].created_at;

        assert_eq!(store.upsert(record("a")).await.unwrap(), UpsertOutcome::Updated);
        let second = store.load_all().await.unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].created_at, created);
        assert_eq!(first[0].slug, second[0].slug);
        assert_eq!(first[0].specs, second[0].specs);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProductStore::new(dir.path());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_lose_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(JsonProductStore::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert(record(&format!("p{i}"))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.load_all().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn categories_artifact_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProductStore::new(dir.path());
        store
            .write_categories(&[CategoryNode {
                slug: "plates".into(),
                name: "Тарелки".into(),
                parent_slug: None,
            }])
            .await
            .unwrap();
        let raw = std::fs::read_to_string(dir.path().join("categories.json")).unwrap();
        assert!(raw.contains("plates"));
        assert!(raw.contains("parent_slug"));
    }
}
