//! Import pass: discovery, extraction, image materialization, upsert
//!
//! One URL, one log line: each processed product reports its validity
//! checks and what happened to it (appended, updated, skipped with
//! reasons). A failed URL never aborts the run. The pass ends with a
//! summary block of counters in the run log.

use crate::application::context::PipelineContext;
use crate::application::crawl::{crawl_for_products, AcceptPolicy};
use crate::domain::product::RawProduct;
use crate::infrastructure::config::ImportStrategy;
use crate::infrastructure::sitemap::collect_product_urls;
use crate::infrastructure::store::UpsertOutcome;
use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::join_all;
use scraper::Html;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const BATCH_PAUSE: Duration = Duration::from_millis(300);

/// Final run counters, printed and appended to the run log.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub discovered: usize,
    pub processed: usize,
    pub ok_descriptions: usize,
    pub ok_images: usize,
    pub ok_specs: usize,
    pub appended: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total discovered: {}", self.discovered)?;
        writeln!(f, "Total processed: {}", self.processed)?;
        writeln!(f, "Descriptions extracted: {}", self.ok_descriptions)?;
        writeln!(f, "Images materialized: {}", self.ok_images)?;
        writeln!(f, "Specs parsed: {}", self.ok_specs)?;
        writeln!(f, "Appended: {}", self.appended)?;
        writeln!(f, "Updated: {}", self.updated)?;
        writeln!(f, "Skipped: {}", self.skipped)?;
        write!(f, "Errors: {}", self.errors)
    }
}

/// Run the configured discovery strategy and ingest everything it finds.
pub async fn run_import(ctx: Arc<PipelineContext>, dry_run: bool) -> Result<RunSummary> {
    if !ctx.config.ignore_robots && !ctx.http.robots_allows(&ctx.config.base_url).await {
        bail!(
            "robots.txt disallows crawling {}; set IMPORT_IGNORE_ROBOTS=true to override",
            ctx.config.base_url
        );
    }

    let summary = Arc::new(Mutex::new(RunSummary::default()));
    let sequence = Arc::new(AtomicUsize::new(0));

    match ctx.config.strategy {
        ImportStrategy::Sitemap => {
            let sitemap_url = ctx.config.sitemap_url();
            info!("import start (sitemap): {}", sitemap_url);
            let mut urls =
                collect_product_urls(&ctx.http, &sitemap_url, &ctx.config.url_prefix).await?;
            if dry_run {
                urls.truncate(ctx.config.dry_run_limit);
            }
            summary.lock().unwrap().discovered = urls.len();
            ctx.run_log.line(&format!("discovered {} sitemap URLs", urls.len()));

            run_batches(&ctx, urls, dry_run, &summary, &sequence, ingest_sitemap_url).await;
        }
        ImportStrategy::Crawl => {
            let seed = ctx.config.seed_url();
            info!("import start (crawl): {}", seed);
            let mut candidates = crawl_for_products(&ctx, &seed, AcceptPolicy::default()).await;
            if dry_run {
                candidates.truncate(ctx.config.dry_run_limit);
            }
            summary.lock().unwrap().discovered = candidates.len();
            ctx.run_log
                .line(&format!("discovered {} crawl candidates", candidates.len()));

            run_batches(&ctx, candidates, dry_run, &summary, &sequence, ingest_candidate).await;
        }
    }

    ctx.store.write_categories(&ctx.category_nodes()).await?;

    let final_summary = summary.lock().unwrap().clone();
    ctx.run_log.block(&final_summary.to_string());
    info!("import finished\n{final_summary}");
    Ok(final_summary)
}

/// Drain work items in `batch_size` chunks, each chunk internally bounded
/// by the concurrency semaphore, with a polite pause between chunks.
async fn run_batches<T, F, Fut>(
    ctx: &Arc<PipelineContext>,
    items: Vec<T>,
    dry_run: bool,
    summary: &Arc<Mutex<RunSummary>>,
    sequence: &Arc<AtomicUsize>,
    work: F,
) where
    T: Send + 'static,
    F: Fn(Arc<WorkContext>, T, bool) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Vec<ProductReport>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(ctx.config.concurrency));
    let batch_size = ctx.config.batch_size;
    let mut batch_no = 0usize;
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        batch_no += 1;
        let batch: Vec<T> = items.by_ref().take(batch_size).collect();
        ctx.run_log
            .line(&format!("batch {}: {} items", batch_no, batch.len()));

        let tasks = batch.into_iter().map(|item| {
            let work = work.clone();
            let semaphore = Arc::clone(&semaphore);
            let summary = Arc::clone(summary);
            let sequence = Arc::clone(sequence);
            let work_ctx = Arc::new(WorkContext {
                ctx: Arc::clone(ctx),
                summary,
                sequence,
            });
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let reports = work(Arc::clone(&work_ctx), item, dry_run).await;
                for report in reports {
                    work_ctx.apply(report).await;
                }
            })
        });
        join_all(tasks).await;

        tokio::time::sleep(BATCH_PAUSE).await;
    }
}

/// Everything a worker task needs to account for its results.
pub struct WorkContext {
    pub ctx: Arc<PipelineContext>,
    summary: Arc<Mutex<RunSummary>>,
    sequence: Arc<AtomicUsize>,
}

/// Outcome of one product attempt, ready for counting and logging.
pub enum ProductReport {
    Ingested {
        slug: String,
        has_description: bool,
        has_images: bool,
        has_specs: bool,
        outcome: Option<UpsertOutcome>,
        skip_reasons: Vec<String>,
    },
    DryRun {
        line: String,
    },
    Failed {
        url: String,
        message: String,
    },
}

impl WorkContext {
    async fn apply(&self, report: ProductReport) {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        match report {
            ProductReport::Ingested {
                slug,
                has_description,
                has_images,
                has_specs,
                outcome,
                skip_reasons,
            } => {
                let mut summary = self.summary.lock().unwrap();
                summary.processed += 1;
                if has_description {
                    summary.ok_descriptions += 1;
                }
                if has_images {
                    summary.ok_images += 1;
                }
                if has_specs {
                    summary.ok_specs += 1;
                }
                let status = match outcome {
                    Some(UpsertOutcome::Inserted) => {
                        summary.appended += 1;
                        "appended".to_string()
                    }
                    Some(UpsertOutcome::Updated) => {
                        summary.updated += 1;
                        "updated".to_string()
                    }
                    None => {
                        summary.skipped += 1;
                        format!("skipped: {}", skip_reasons.join(", "))
                    }
                };
                drop(summary);

                let checks = format!(
                    "{} description {} images {} specs",
                    mark(has_description),
                    mark(has_images),
                    mark(has_specs)
                );
                self.ctx
                    .run_log
                    .line(&format!("[{n}] {slug} — {checks} ({status})"));
            }
            ProductReport::DryRun { line } => {
                self.summary.lock().unwrap().processed += 1;
                self.ctx.run_log.line(&format!("[{n}] DRY {line}"));
            }
            ProductReport::Failed { url, message } => {
                self.summary.lock().unwrap().errors += 1;
                self.ctx.run_log.line(&format!("[{n}] error {url} => {message}"));
                if let Err(err) = self.ctx.store.log_import_error(&url, &message).await {
                    warn!("failed to record import error: {:#}", err);
                }
            }
        }
    }
}

fn mark(ok: bool) -> char {
    if ok {
        '✓'
    } else {
        '✗'
    }
}

/// Sitemap mode: fetch the URL; a product page is ingested directly, a
/// listing page contributes a bounded sample of its product anchors.
async fn ingest_sitemap_url(
    work: Arc<WorkContext>,
    url: String,
    dry_run: bool,
) -> Vec<ProductReport> {
    let ctx = &work.ctx;
    let html = match ctx.http.fetch_text(&url).await {
        Ok(html) => html,
        Err(err) => {
            return vec![ProductReport::Failed {
                url,
                message: format!("{err:#}"),
            }]
        }
    };

    let prefix = ctx.config.url_prefix.clone();
    let (parsed, anchors) = {
        let doc = Html::parse_document(&html);
        if ctx.product_parser.is_product_page(&doc) {
            (ctx.product_parser.parse_document(&url, &doc).ok(), Vec::new())
        } else {
            let anchors = ctx.listing_parser.find_product_anchors(&doc, &url, &prefix);
            (None, anchors)
        }
    };

    let mut reports = Vec::new();
    if let Some(raw) = parsed {
        reports.push(ingest_product(ctx, raw, dry_run).await);
        return reports;
    }

    for anchor in anchors.into_iter().take(ctx.config.anchor_sample_size) {
        match ctx.http.fetch_text(&anchor).await {
            Ok(html) => match ctx.product_parser.parse(&anchor, &html) {
                Ok(raw) => reports.push(ingest_product(ctx, raw, dry_run).await),
                Err(err) => reports.push(ProductReport::Failed {
                    url: anchor,
                    message: format!("{err:#}"),
                }),
            },
            Err(err) => reports.push(ProductReport::Failed {
                url: anchor,
                message: format!("{err:#}"),
            }),
        }
    }
    reports
}

/// Crawl mode: re-fetch each candidate's detail page to enrich the tile
/// glimpse, falling back to the glimpse when the re-fetch fails.
async fn ingest_candidate(
    work: Arc<WorkContext>,
    candidate: RawProduct,
    dry_run: bool,
) -> Vec<ProductReport> {
    let ctx = &work.ctx;
    let url = candidate.source_url.clone();

    let raw = match ctx.http.fetch_text(&url).await {
        Ok(html) => match ctx.product_parser.parse(&url, &html) {
            Ok(mut parsed) => {
                // the listing knew the category even when the page does not
                if parsed.category_slug.is_none() {
                    parsed.category_slug = candidate.category_slug.clone();
                }
                if parsed.subcategory_slug.is_none() {
                    parsed.subcategory_slug = candidate.subcategory_slug.clone();
                }
                if parsed.price.is_none() {
                    parsed.price = candidate.price;
                }
                parsed
            }
            Err(_) => candidate,
        },
        Err(err) => {
            warn!("candidate re-fetch failed, using listing data: {:#}", err);
            candidate
        }
    };

    vec![ingest_product(ctx, raw, dry_run).await]
}

/// Shared tail of both strategies: register categories, materialize
/// images, check validity, upsert (or skip).
pub async fn ingest_product(
    ctx: &Arc<PipelineContext>,
    raw: RawProduct,
    dry_run: bool,
) -> ProductReport {
    ctx.register_categories(&raw.category_trail);

    if dry_run {
        return ProductReport::DryRun {
            line: format!(
                "{{\"supplier_url\":{:?},\"title\":{:?},\"price_raw\":{:?},\"price\":{:?},\"category\":{:?},\"images\":{}}}",
                raw.source_url,
                raw.title,
                raw.price_raw,
                raw.price,
                raw.category_slug,
                raw.image_urls.len()
            ),
        };
    }

    let image_sources: Vec<String> = raw
        .image_urls
        .iter()
        .take(ctx.config.max_images_per_product)
        .cloned()
        .collect();
    let images = ctx
        .images
        .materialize(&ctx.http, &image_sources, &raw.slug, &raw.title)
        .await;

    let has_title = !raw.title.trim().is_empty() && !raw.slug.is_empty();
    let has_description = raw.description.chars().count() > 10;
    let has_specs = raw
        .specs
        .iter()
        .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
        .count()
        >= 2;
    let has_images = !images.is_empty();

    let slug = raw.slug.clone();
    let url = raw.source_url.clone();
    let record = raw.into_record(images, Utc::now());

    let mut skip_reasons = Vec::new();
    if !has_title {
        skip_reasons.push("no-title".to_string());
    }
    if !has_description {
        skip_reasons.push("no-description".to_string());
    }
    if !has_specs {
        skip_reasons.push("specs<2".to_string());
    }
    if !has_images {
        skip_reasons.push("no-images".to_string());
    }

    let should_persist = skip_reasons.is_empty() || !ctx.config.append_only;
    // a record without identity can never be keyed
    let should_persist = should_persist && has_title;

    let outcome = if should_persist {
        match ctx.store.upsert(record).await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                return ProductReport::Failed {
                    url,
                    message: format!("{err:#}"),
                }
            }
        }
    } else {
        None
    };

    ProductReport::Ingested {
        slug,
        has_description,
        has_images,
        has_specs,
        outcome,
        skip_reasons,
    }
}
