//! Persistence layer: slug-keyed upsert over two backends
//!
//! The flat-file JSON store and the SQLite store are behaviorally
//! equivalent at this trait's level: look up by slug (source URL as the
//! secondary key), merge non-empty fields over the stored record, stamp
//! `created_at` once on first insert.

pub mod json;
pub mod sqlite;

use crate::domain::category::CategoryNode;
use crate::domain::product::ProductRecord;
use anyhow::Result;
use async_trait::async_trait;

pub use json::JsonProductStore;
pub use sqlite::SqliteProductStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Contract shared by both persistence backends. The pipeline is the sole
/// writer; the storefront consumes `load_all`/`find_by_slug` read-only.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert or merge a record. Existing records are matched by slug, then
    /// by source URL when the slug lookup misses (a retitled product keeps
    /// its identity through the supplier page it came from).
    async fn upsert(&self, record: ProductRecord) -> Result<UpsertOutcome>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ProductRecord>>;

    async fn load_all(&self) -> Result<Vec<ProductRecord>>;

    /// Atomically replace the whole store; used by the repair passes.
    async fn replace_all(&self, records: Vec<ProductRecord>) -> Result<()>;

    /// Persist the category forest side artifact.
    async fn write_categories(&self, nodes: &[CategoryNode]) -> Result<()>;

    /// Record a per-URL import failure for later review.
    async fn log_import_error(&self, url: &str, message: &str) -> Result<()>;
}

/// Shared upsert resolution: find the record to merge into, apply the
/// update, report the outcome. Works on an in-memory snapshot; each backend
/// persists the result its own way.
pub(crate) fn upsert_into(records: &mut Vec<ProductRecord>, incoming: ProductRecord) -> UpsertOutcome {
    let by_slug = records.iter().position(|r| r.slug == incoming.slug);
    let position = by_slug.or_else(|| {
        incoming.source_url.as_ref().and_then(|source| {
            records
                .iter()
                .position(|r| r.source_url.as_deref() == Some(source.as_str()))
        })
    });

    match position {
        Some(idx) => {
            let existing = &mut records[idx];
            // matched through the source URL: the title (and slug) changed
            // upstream, follow it
            if existing.slug != incoming.slug {
                existing.slug = incoming.slug.clone();
            }
            existing.merge_update(&incoming);
            UpsertOutcome::Updated
        }
        None => {
            records.push(incoming);
            UpsertOutcome::Inserted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(slug: &str, source: &str) -> ProductRecord {
        ProductRecord {
            slug: slug.into(),
            title: slug.into(),
            price: None,
            description: String::new(),
            specs: BTreeMap::new(),
            images: Vec::new(),
            brand: None,
            material: None,
            color: None,
            category_slug: None,
            subcategory_slug: None,
            source_url: Some(source.into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_matches_by_slug_first() {
        let mut records = vec![record("a", "https://s/1")];
        let outcome = upsert_into(&mut records, record("a", "https://s/other"));
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn upsert_falls_back_to_source_url_and_adopts_new_slug() {
        let mut records = vec![record("old-title", "https://s/1")];
        let outcome = upsert_into(&mut records, record("new-title", "https://s/1"));
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].slug, "new-title");
    }

    #[test]
    fn upsert_inserts_unknown_records() {
        let mut records = vec![record("a", "https://s/1")];
        let outcome = upsert_into(&mut records, record("b", "https://s/2"));
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(records.len(), 2);
    }
}
