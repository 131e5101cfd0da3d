//! Enrichment pass: refetch thin records and backfill what is missing
//!
//! Idempotent offline batch over the persisted store. Records below the
//! richness threshold get their supplier page re-fetched: fresh specs
//! replace the stored ones only when strictly richer, a fresh description
//! only when longer. Whatever still lacks a description receives neutral
//! generated text, and products without a single image go through the
//! image pipeline's fallback chain.

use crate::application::context::PipelineContext;
use crate::domain::product::ProductRecord;
use anyhow::Result;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

const MIN_DESCRIPTION_CHARS: usize = 60;
const TARGET_DESCRIPTION_CHARS: usize = 250;
const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Default, Clone)]
pub struct EnrichSummary {
    pub total: usize,
    pub refetched: usize,
    pub specs_updated: usize,
    pub descriptions_updated: usize,
    pub descriptions_generated: usize,
    pub images_added: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl fmt::Display for EnrichSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total records: {}", self.total)?;
        writeln!(f, "Refetched: {}", self.refetched)?;
        writeln!(f, "Specs updated: {}", self.specs_updated)?;
        writeln!(f, "Descriptions updated: {}", self.descriptions_updated)?;
        writeln!(f, "Descriptions generated: {}", self.descriptions_generated)?;
        writeln!(f, "Images added: {}", self.images_added)?;
        writeln!(f, "Already rich (skipped): {}", self.skipped)?;
        write!(f, "Errors: {}", self.errors)
    }
}

/// What happened to one record; merged into the summary afterwards.
#[derive(Debug, Default)]
struct RecordDelta {
    refetched: bool,
    specs_updated: bool,
    description_updated: bool,
    description_generated: bool,
    images_added: bool,
    skipped: bool,
    failed: bool,
}

pub async fn run_enrich(ctx: Arc<PipelineContext>) -> Result<EnrichSummary> {
    let records = ctx.store.load_all().await?;
    let total = records.len();
    info!("enrich start: {} records", total);

    let semaphore = Arc::new(Semaphore::new(ctx.config.concurrency));
    let tasks = records.into_iter().map(|record| {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            Some(enrich_one(&ctx, record).await)
        })
    });

    let mut out: Vec<ProductRecord> = Vec::with_capacity(total);
    let mut summary = EnrichSummary {
        total,
        ..Default::default()
    };
    for joined in join_all(tasks).await {
        let Ok(Some((record, delta))) = joined else {
            summary.errors += 1;
            continue;
        };
        summary.refetched += delta.refetched as usize;
        summary.specs_updated += delta.specs_updated as usize;
        summary.descriptions_updated += delta.description_updated as usize;
        summary.descriptions_generated += delta.description_generated as usize;
        summary.images_added += delta.images_added as usize;
        summary.skipped += delta.skipped as usize;
        summary.errors += delta.failed as usize;
        out.push(record);
    }

    ctx.store.replace_all(out).await?;
    ctx.run_log.block(&summary.to_string());
    info!("enrich finished\n{summary}");
    Ok(summary)
}

async fn enrich_one(
    ctx: &Arc<PipelineContext>,
    mut record: ProductRecord,
) -> (ProductRecord, RecordDelta) {
    let mut delta = RecordDelta::default();

    if !record.needs_enrichment() {
        delta.skipped = true;
        return (record, delta);
    }

    let mut fresh_image_urls: Vec<String> = Vec::new();

    if let Some(source_url) = record.source_url.clone() {
        match ctx.http.fetch_text(&source_url).await {
            Ok(html) => {
                delta.refetched = true;
                let parsed = ctx.product_parser.parse(&source_url, &html);
                if let Ok(fresh) = parsed {
                    ctx.register_categories(&fresh.category_trail);

                    // fresh specs win only when strictly richer
                    let fresh_pairs = fresh
                        .specs
                        .iter()
                        .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
                        .count();
                    if fresh_pairs >= 2 && fresh_pairs > record.non_empty_spec_count() {
                        record.specs = fresh.specs.clone();
                        delta.specs_updated = true;
                    }

                    // longer description wins
                    if fresh.description.chars().count() > record.description.chars().count()
                        && fresh.description.chars().count() > 20
                    {
                        record.description = fresh.description.clone();
                        delta.description_updated = true;
                    }

                    if record.price.is_none() {
                        record.price = fresh.price;
                    }
                    fresh_image_urls = fresh.image_urls;
                }
            }
            Err(err) => {
                debug!("enrich refetch failed for {}: {:#}", record.slug, err);
                delta.failed = true;
            }
        }
    }

    // convenience fields re-derived from specs when absent
    backfill_from_specs(&mut record);

    if record.description.chars().count() < MIN_DESCRIPTION_CHARS {
        record.description = generate_description(
            &record.title,
            record.material.as_deref(),
            record.brand.as_deref(),
        );
        delta.description_generated = true;
    }

    if record.images.is_empty() {
        let sources: Vec<String> = fresh_image_urls
            .into_iter()
            .take(ctx.config.max_images_per_product)
            .collect();
        let images = ctx
            .images
            .materialize(&ctx.http, &sources, &record.slug, &record.title)
            .await;
        if !images.is_empty() {
            record.images = images;
            delta.images_added = true;
        }
    }

    (record, delta)
}

/// Fill `material`, `color` and `brand` from the spec table when the
/// dedicated fields are empty.
fn backfill_from_specs(record: &mut ProductRecord) {
    let lookups: [(&str, fn(&ProductRecord) -> &Option<String>); 3] =
        [("Материал", |r| &r.material), ("Цвет", |r| &r.color), ("Бренд", |r| &r.brand)];

    for (key, getter) in lookups {
        let missing = getter(record)
            .as_deref()
            .map(|v| v.trim().is_empty())
            .unwrap_or(true);
        if !missing {
            continue;
        }
        let value = record
            .specs
            .get(key)
            .or_else(|| record.specs.iter().find(|(k, _)| k.contains(key)).map(|(_, v)| v))
            .filter(|v| !v.trim().is_empty())
            .cloned();
        if let Some(value) = value {
            match key {
                "Материал" => record.material = Some(value),
                "Цвет" => record.color = Some(value),
                _ => record.brand = Some(value),
            }
        }
    }
}

/// Neutral marketing text for records whose supplier page offers none.
/// The exact wording is a placeholder, not a contract; it only has to be
/// clean, in-language and inside the 250..=500 character window.
pub fn generate_description(title: &str, material: Option<&str>, brand: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!(
        "«{title}» рассчитана на интенсивную эксплуатацию и отличается качеством исполнения."
    ));
    if let Some(material) = material.filter(|m| !m.trim().is_empty()) {
        parts.push(format!(
            "Материал: {material} — сочетает прочность и долговечность при ежедневном использовании."
        ));
    }
    if let Some(brand) = brand.filter(|b| !b.trim().is_empty()) {
        parts.push(format!("Производитель: {brand}."));
    }
    parts.push(
        "Лаконичный современный дизайн легко сочетается с любой сервировкой и концепцией заведения."
            .to_string(),
    );
    parts.push(
        "Подходит для ресторанов, кафе, кейтеринга и домашней кухни; проста в уходе и устойчива к износу."
            .to_string(),
    );

    let mut description = parts.join(" ");
    while description.chars().count() < TARGET_DESCRIPTION_CHARS {
        description.push_str(
            " Сбалансированный вес и удобная форма обеспечивают комфортную подачу и хранение.",
        );
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        description = description
            .chars()
            .take(MAX_DESCRIPTION_CHARS - 3)
            .collect::<String>()
            .trim_end_matches([' ', ',', ';', ':', '-', '.'])
            .to_string()
            + "...";
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_description_lands_in_window() {
        for (material, brand) in [
            (Some("Фарфор"), Some("Luminarc")),
            (None, None),
            (Some("Стекло"), None),
        ] {
            let text = generate_description("Тарелка глубокая 25 см", material, brand);
            let chars = text.chars().count();
            assert!(
                (TARGET_DESCRIPTION_CHARS..=MAX_DESCRIPTION_CHARS).contains(&chars),
                "length {chars} out of window: {text}"
            );
        }
    }

    #[test]
    fn generated_description_mentions_inputs() {
        let text = generate_description("Кружка 300 мл", Some("Керамика"), Some("Ardesto"));
        assert!(text.contains("Кружка 300 мл"));
        assert!(text.contains("Керамика"));
        assert!(text.contains("Ardesto"));
    }

    #[test]
    fn backfill_pulls_convenience_fields_from_specs() {
        use chrono::Utc;
        use std::collections::BTreeMap;

        let mut specs = BTreeMap::new();
        specs.insert("Материал".to_string(), "Фарфор".to_string());
        specs.insert("Цвет покрытия".to_string(), "Белый".to_string());
        let mut record = ProductRecord {
            slug: "x".into(),
            title: "X".into(),
            price: None,
            description: String::new(),
            specs,
            images: vec![],
            brand: Some("Ardesto".into()),
            material: None,
            color: None,
            category_slug: None,
            subcategory_slug: None,
            source_url: None,
            created_at: Utc::now(),
        };

        backfill_from_specs(&mut record);
        assert_eq!(record.material.as_deref(), Some("Фарфор"));
        // substring key match
        assert_eq!(record.color.as_deref(), Some("Белый"));
        // populated field untouched
        assert_eq!(record.brand.as_deref(), Some("Ardesto"));
    }
}
