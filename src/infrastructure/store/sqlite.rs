//! Relational store backend
//!
//! Normalized SQLite schema: brand, price history and media live in related
//! rows; the characteristics map is kept as a JSON column. Behaviorally
//! equivalent to the flat-file backend at the `ProductStore` contract.

use super::{ProductStore, UpsertOutcome};
use crate::domain::category::CategoryNode;
use crate::domain::product::ProductRecord;
use crate::domain::slug::slugify;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS products (
        slug TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        specs TEXT NOT NULL DEFAULT '{}',
        material TEXT,
        color TEXT,
        category_slug TEXT,
        subcategory_slug TEXT,
        source_url TEXT,
        brand_slug TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS brands (
        slug TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS prices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_slug TEXT NOT NULL,
        amount INTEGER NOT NULL,
        recorded_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS media (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_slug TEXT NOT NULL,
        url TEXT NOT NULL,
        alt TEXT,
        position INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS categories (
        slug TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        parent_slug TEXT
    )",
    "CREATE TABLE IF NOT EXISTS supplier_refs (
        url TEXT PRIMARY KEY,
        product_slug TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS import_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        status TEXT NOT NULL,
        message TEXT,
        logged_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_prices_product ON prices(product_slug)",
    "CREATE INDEX IF NOT EXISTS idx_media_product ON media(product_slug)",
];

pub struct SqliteProductStore {
    pool: SqlitePool,
    /// Serializes read-modify-write upserts; the pool alone does not.
    write_lock: Mutex<()>,
}

impl SqliteProductStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {database_url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open SQLite store")?;

        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to initialize schema")?;
        }
        Ok(())
    }

    async fn slug_for_source_url(&self, source_url: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT product_slug FROM supplier_refs WHERE url = ?")
            .bind(source_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("product_slug")))
    }

    async fn fetch_record(&self, slug: &str) -> Result<Option<ProductRecord>> {
        let row = sqlx::query(
            "SELECT p.slug, p.title, p.description, p.specs, p.material, p.color,
                    p.category_slug, p.subcategory_slug, p.source_url, p.created_at,
                    b.name AS brand_name
             FROM products p LEFT JOIN brands b ON b.slug = p.brand_slug
             WHERE p.slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let mut record = row_to_record(&row)?;

        let media = sqlx::query(
            "SELECT url FROM media WHERE product_slug = ? ORDER BY position ASC, id ASC",
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;
        record.images = media.iter().map(|m| m.get("url")).collect();

        let price = sqlx::query(
            "SELECT amount FROM prices WHERE product_slug = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        record.price = price.map(|p| p.get::<i64, _>("amount") as u64);

        Ok(Some(record))
    }

    /// Write a full record: product row, brand, media rows, a price-history
    /// entry and the supplier reference.
    async fn write_record(&self, record: &ProductRecord, price_changed: bool) -> Result<()> {
        let brand_slug = match &record.brand {
            Some(name) if !name.trim().is_empty() => {
                let slug = slugify(name);
                sqlx::query(
                    "INSERT INTO brands (slug, name) VALUES (?, ?)
                     ON CONFLICT(slug) DO UPDATE SET name = excluded.name",
                )
                .bind(&slug)
                .bind(name)
                .execute(&self.pool)
                .await?;
                Some(slug)
            }
            _ => None,
        };

        let specs_json =
            serde_json::to_string(&record.specs).context("failed to serialize specs")?;
        sqlx::query(
            "INSERT OR REPLACE INTO products
             (slug, title, description, specs, material, color,
              category_slug, subcategory_slug, source_url, brand_slug, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.slug)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&specs_json)
        .bind(&record.material)
        .bind(&record.color)
        .bind(&record.category_slug)
        .bind(&record.subcategory_slug)
        .bind(&record.source_url)
        .bind(&brand_slug)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM media WHERE product_slug = ?")
            .bind(&record.slug)
            .execute(&self.pool)
            .await?;
        for (position, url) in record.images.iter().enumerate() {
            sqlx::query(
                "INSERT INTO media (product_slug, url, alt, position) VALUES (?, ?, ?, ?)",
            )
            .bind(&record.slug)
            .bind(url)
            .bind(&record.title)
            .bind(position as i64)
            .execute(&self.pool)
            .await?;
        }

        if price_changed {
            if let Some(amount) = record.price {
                sqlx::query(
                    "INSERT INTO prices (product_slug, amount, recorded_at) VALUES (?, ?, ?)",
                )
                .bind(&record.slug)
                .bind(amount as i64)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            }
        }

        if let Some(source_url) = &record.source_url {
            sqlx::query(
                "INSERT INTO supplier_refs (url, product_slug) VALUES (?, ?)
                 ON CONFLICT(url) DO UPDATE SET product_slug = excluded.product_slug",
            )
            .bind(source_url)
            .bind(&record.slug)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn delete_record(&self, slug: &str) -> Result<()> {
        sqlx::query("DELETE FROM products WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM media WHERE product_slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM prices WHERE product_slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn upsert(&self, record: ProductRecord) -> Result<UpsertOutcome> {
        let _guard = self.write_lock.lock().await;

        let existing_slug = match self.fetch_record(&record.slug).await? {
            Some(_) => Some(record.slug.clone()),
            None => match &record.source_url {
                Some(source) => self.slug_for_source_url(source).await?,
                None => None,
            },
        };

        match existing_slug {
            Some(slug) => {
                let mut merged = self
                    .fetch_record(&slug)
                    .await?
                    .context("record vanished mid-upsert")?;
                let old_price = merged.price;
                if merged.slug != record.slug {
                    // retitled upstream: move the row to the new slug
                    self.delete_record(&merged.slug).await?;
                    merged.slug = record.slug.clone();
                }
                merged.merge_update(&record);
                let price_changed = merged.price != old_price || old_price.is_none();
                self.write_record(&merged, price_changed).await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.write_record(&record, true).await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ProductRecord>> {
        self.fetch_record(slug).await
    }

    async fn load_all(&self) -> Result<Vec<ProductRecord>> {
        let rows = sqlx::query(
            "SELECT p.slug, p.title, p.description, p.specs, p.material, p.color,
                    p.category_slug, p.subcategory_slug, p.source_url, p.created_at,
                    b.name AS brand_name
             FROM products p LEFT JOIN brands b ON b.slug = p.brand_slug
             ORDER BY p.slug ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records: Vec<ProductRecord> = Vec::with_capacity(rows.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in &rows {
            let record = row_to_record(row)?;
            index.insert(record.slug.clone(), records.len());
            records.push(record);
        }

        let media = sqlx::query(
            "SELECT product_slug, url FROM media ORDER BY position ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in media {
            let slug: String = row.get("product_slug");
            if let Some(&i) = index.get(&slug) {
                records[i].images.push(row.get("url"));
            }
        }

        let prices = sqlx::query("SELECT product_slug, amount FROM prices ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        for row in prices {
            let slug: String = row.get("product_slug");
            if let Some(&i) = index.get(&slug) {
                // rows arrive oldest-first; the last write wins
                records[i].price = Some(row.get::<i64, _>("amount") as u64);
            }
        }

        Ok(records)
    }

    async fn replace_all(&self, records: Vec<ProductRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for table in ["products", "media", "prices", "supplier_refs"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&self.pool)
                .await?;
        }
        for record in &records {
            self.write_record(record, true).await?;
        }
        info!("store rewritten: {} records", records.len());
        Ok(())
    }

    async fn write_categories(&self, nodes: &[CategoryNode]) -> Result<()> {
        for node in nodes {
            sqlx::query(
                "INSERT INTO categories (slug, name, parent_slug) VALUES (?, ?, ?)
                 ON CONFLICT(slug) DO NOTHING",
            )
            .bind(&node.slug)
            .bind(&node.name)
            .bind(&node.parent_slug)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn log_import_error(&self, url: &str, message: &str) -> Result<()> {
        let clipped: String = message.chars().take(500).collect();
        sqlx::query(
            "INSERT INTO import_logs (url, status, message, logged_at) VALUES (?, 'error', ?, ?)",
        )
        .bind(url)
        .bind(clipped)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ProductRecord> {
    let specs_json: String = row.get("specs");
    let specs: BTreeMap<String, String> =
        serde_json::from_str(&specs_json).context("corrupt specs column")?;
    Ok(ProductRecord {
        slug: row.get("slug"),
        title: row.get("title"),
        price: None, // filled from the prices table
        description: row.get("description"),
        specs,
        images: Vec::new(), // filled from the media table
        brand: row.get("brand_name"),
        material: row.get("material"),
        color: row.get("color"),
        category_slug: row.get("category_slug"),
        subcategory_slug: row.get("subcategory_slug"),
        source_url: row.get("source_url"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slug: &str) -> ProductRecord {
        let mut specs = BTreeMap::new();
        specs.insert("Материал".to_string(), "Стекло".to_string());
        specs.insert("Объём".to_string(), "0.5 л".to_string());
        ProductRecord {
            slug: slug.into(),
            title: format!("Товар {slug}"),
            price: Some(2500),
            description: "Описание длиннее десяти символов.".into(),
            specs,
            images: vec![format!("/products/{slug}/main.jpg")],
            brand: Some("Pasabahce".into()),
            material: Some("Стекло".into()),
            color: None,
            category_slug: Some("stakany".into()),
            subcategory_slug: None,
            source_url: Some(format!("https://supplier.example/product/{slug}")),
            created_at: Utc::now(),
        }
    }

    async fn memory_store() -> SqliteProductStore {
        SqliteProductStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_round_trips_through_related_rows() {
        let store = memory_store().await;
        store.upsert(record("stakan")).await.unwrap();

        let loaded = store.find_by_slug("stakan").await.unwrap().unwrap();
        assert_eq!(loaded.price, Some(2500));
        assert_eq!(loaded.brand.as_deref(), Some("Pasabahce"));
        assert_eq!(loaded.images, vec!["/products/stakan/main.jpg".to_string()]);
        assert_eq!(loaded.non_empty_spec_count(), 2);
    }

    #[tokio::test]
    async fn second_upsert_updates_and_preserves_created_at() {
        let store = memory_store().await;
        store.upsert(record("stakan")).await.unwrap();
        let created = store
            .find_by_slug("stakan")
            .await
            .unwrap()
            .unwrap()
            .created_at;

        let mut newer = record("stakan");
        newer.price = Some(2700);
        let outcome = store.upsert(newer).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let loaded = store.find_by_slug("stakan").await.unwrap().unwrap();
        assert_eq!(loaded.price, Some(2700));
        assert_eq!(loaded.created_at, created);
    }

    #[tokio::test]
    async fn source_url_is_the_secondary_upsert_key() {
        let store = memory_store().await;
        store.upsert(record("old-name")).await.unwrap();

        let mut renamed = record("new-name");
        renamed.source_url = record("old-name").source_url;
        let outcome = store.upsert(renamed).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        assert!(store.find_by_slug("old-name").await.unwrap().is_none());
        assert!(store.find_by_slug("new-name").await.unwrap().is_some());
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_all_stitches_media_and_latest_price() {
        let store = memory_store().await;
        store.upsert(record("a")).await.unwrap();
        let mut b = record("b");
        b.images.push("/products/b/alt1.jpg".into());
        store.upsert(b).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        let b = all.iter().find(|r| r.slug == "b").unwrap();
        assert_eq!(b.images.len(), 2);
        assert_eq!(b.price, Some(2500));
    }
}
