//! Verification pass: dedup, repair, validity filter, deterministic rewrite
//!
//! Runs over the whole persisted store, independent of any crawl. Records
//! are deduplicated by slug and by normalized title (the richer entry
//! wins), thin spec tables are repaired from the supplier page, dangling
//! image paths are dropped, invalid records are removed, and the survivors
//! are rewritten atomically in a deterministic title order so diffs
//! between runs stay readable.

use crate::application::context::PipelineContext;
use crate::domain::product::ProductRecord;
use crate::infrastructure::parsing::clamp_sentences;
use anyhow::Result;
use futures::future::join_all;
use scraper::Html;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

const VERIFY_SENTENCE_CAP: usize = 4;

#[derive(Debug, Default, Clone)]
pub struct VerifySummary {
    pub total: usize,
    pub kept: usize,
    pub duplicates_removed: usize,
    pub specs_repaired: usize,
    pub images_dropped: usize,
    pub records_dropped: usize,
}

impl fmt::Display for VerifySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total records: {}", self.total)?;
        writeln!(f, "Kept: {}", self.kept)?;
        writeln!(f, "Duplicates removed: {}", self.duplicates_removed)?;
        writeln!(f, "Specs repaired: {}", self.specs_repaired)?;
        writeln!(f, "Dangling images dropped: {}", self.images_dropped)?;
        write!(f, "Invalid records dropped: {}", self.records_dropped)
    }
}

pub async fn run_verify(ctx: Arc<PipelineContext>) -> Result<VerifySummary> {
    let records = ctx.store.load_all().await?;
    let mut summary = VerifySummary {
        total: records.len(),
        ..Default::default()
    };
    info!("verify start: {} records", records.len());

    // 1. dedup by slug, then by normalized title, richer record wins
    let (mut records, removed) = dedup_records(records);
    summary.duplicates_removed = removed;

    // 2. normalize descriptions and drop image paths with no file behind them
    for record in &mut records {
        record.description = clamp_sentences(&record.description, VERIFY_SENTENCE_CAP);
        let before = record.images.len();
        record
            .images
            .retain(|path| ctx.images.disk_path(path).is_file());
        summary.images_dropped += before - record.images.len();
    }

    // 3. repair thin spec tables from the supplier page
    let semaphore = Arc::new(Semaphore::new(ctx.config.concurrency));
    let tasks = records.into_iter().map(|record| {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            Some(repair_specs(&ctx, record).await)
        })
    });
    let mut records: Vec<ProductRecord> = Vec::new();
    for joined in join_all(tasks).await {
        if let Ok(Some((record, repaired))) = joined {
            summary.specs_repaired += repaired as usize;
            records.push(record);
        }
    }

    // 4. minimum-validity filter
    let before = records.len();
    records.retain(|record| {
        let valid = record.meets_minimum_validity();
        if !valid {
            ctx.run_log
                .line(&format!("dropped {}: fails minimum validity", record.slug));
        }
        valid
    });
    summary.records_dropped = before - records.len();

    // 5. deterministic order: lowercased title, byte-wise
    records.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then_with(|| a.slug.cmp(&b.slug))
    });

    summary.kept = records.len();
    ctx.store.replace_all(records).await?;
    ctx.run_log.block(&summary.to_string());
    info!("verify finished\n{summary}");
    Ok(summary)
}

/// Collapse duplicates, keyed first by slug and then by normalized title.
/// Returns the surviving records (original relative order preserved for
/// the winners) and the number of losers removed.
pub fn dedup_records(records: Vec<ProductRecord>) -> (Vec<ProductRecord>, usize) {
    let mut removed = 0usize;

    let mut by_slug: Vec<ProductRecord> = Vec::with_capacity(records.len());
    let mut slug_index: HashMap<String, usize> = HashMap::new();
    for record in records {
        match slug_index.get(&record.slug) {
            Some(&idx) => {
                removed += 1;
                if record.is_richer_than(&by_slug[idx]) {
                    by_slug[idx] = record;
                }
            }
            None => {
                slug_index.insert(record.slug.clone(), by_slug.len());
                by_slug.push(record);
            }
        }
    }

    let mut out: Vec<ProductRecord> = Vec::with_capacity(by_slug.len());
    let mut title_index: HashMap<String, usize> = HashMap::new();
    for record in by_slug {
        let key = record.title.trim().to_lowercase();
        match title_index.get(&key) {
            Some(&idx) => {
                removed += 1;
                if record.is_richer_than(&out[idx]) {
                    out[idx] = record;
                }
            }
            None => {
                title_index.insert(key, out.len());
                out.push(record);
            }
        }
    }

    (out, removed)
}

/// Re-fetch the supplier page for records with fewer than two spec pairs;
/// a fresh table with at least two pairs replaces the stored one.
async fn repair_specs(
    ctx: &Arc<PipelineContext>,
    mut record: ProductRecord,
) -> (ProductRecord, bool) {
    if record.non_empty_spec_count() >= 2 {
        return (record, false);
    }
    let Some(source_url) = record.source_url.clone() else {
        return (record, false);
    };

    match ctx.http.fetch_text(&source_url).await {
        Ok(html) => {
            let fresh = {
                let doc = Html::parse_document(&html);
                ctx.product_parser.extract_specs(&doc)
            };
            let pairs = fresh
                .iter()
                .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
                .count();
            if pairs >= 2 {
                record.specs = fresh;
                return (record, true);
            }
            (record, false)
        }
        Err(err) => {
            debug!("verify refetch failed for {}: {:#}", record.slug, err);
            (record, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(slug: &str, title: &str, specs: usize, images: usize, desc_len: usize) -> ProductRecord {
        let mut spec_map = BTreeMap::new();
        for i in 0..specs {
            spec_map.insert(format!("k{i}"), "v".to_string());
        }
        ProductRecord {
            slug: slug.into(),
            title: title.into(),
            price: None,
            description: "о".repeat(desc_len),
            specs: spec_map,
            images: (0..images)
                .map(|i| format!("/products/{slug}/{i}.jpg"))
                .collect(),
            brand: None,
            material: None,
            color: None,
            category_slug: None,
            subcategory_slug: None,
            source_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_by_slug_keeps_richer_entry() {
        // A: 3 specs / 1 image / 50 chars, B: 5 specs / 1 image / 30 chars
        let a = record("x", "Товар X", 3, 1, 50);
        let b = record("x", "Товар X", 5, 1, 30);
        let (out, removed) = dedup_records(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert!(removed >= 1);
        assert_eq!(out[0].non_empty_spec_count(), 5);
    }

    #[test]
    fn dedup_by_title_is_case_insensitive() {
        let a = record("x1", "Тарелка Глубокая", 2, 1, 30);
        let b = record("x2", "тарелка глубокая", 4, 1, 30);
        let (out, removed) = dedup_records(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(removed, 1);
        // the richer record wins wholesale, slug included
        assert_eq!(out[0].slug, "x2");
        assert_eq!(out[0].non_empty_spec_count(), 4);
    }

    #[test]
    fn dedup_keeps_distinct_products() {
        let a = record("x1", "Тарелка", 2, 1, 30);
        let b = record("x2", "Кружка", 2, 1, 30);
        let (out, removed) = dedup_records(vec![a, b]);
        assert_eq!(out.len(), 2);
        assert_eq!(removed, 0);
    }
}
