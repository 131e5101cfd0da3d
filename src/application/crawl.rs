//! Crawl frontier: breadth-first discovery from a seed category page
//!
//! The queue drains in fixed-size batches; inside a batch a semaphore
//! bounds in-flight fetches. Each page yields either a directly-parsed
//! product, low-confidence listing tiles, or both; further in-scope links
//! feed back into the queue. A bounded sample of product-path anchors per
//! page is parsed speculatively and kept only when the accept policy says
//! the result looks like a real product.

use crate::application::context::PipelineContext;
use crate::domain::product::RawProduct;
use crate::domain::slug::slugify;
use crate::infrastructure::parsing::category_from_url;
use crate::infrastructure::parsing::TileCandidate;
use futures::future::join_all;
use scraper::Html;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Precision heuristic for speculatively parsed anchors: accept only when a
/// price was found or the description is substantial, so non-product pages
/// cannot pollute the result set.
#[derive(Debug, Clone, Copy)]
pub struct AcceptPolicy {
    pub min_title_chars: usize,
    pub min_description_chars: usize,
}

impl Default for AcceptPolicy {
    fn default() -> Self {
        Self {
            min_title_chars: 4,
            min_description_chars: 21,
        }
    }
}

impl AcceptPolicy {
    pub fn accepts(&self, product: &RawProduct) -> bool {
        if product.title.chars().count() < self.min_title_chars {
            return false;
        }
        product.price.map(|p| p > 0).unwrap_or(false)
            || product.description.chars().count() >= self.min_description_chars
    }
}

/// What one crawled page contributed.
struct PageOutcome {
    direct: Option<RawProduct>,
    tiles: Vec<TileCandidate>,
    sampled: Vec<RawProduct>,
    links: Vec<String>,
}

/// Crawl from the seed until the queue is dry or a soft cap trips.
/// Candidates keep their discovery order; failed pages are logged and
/// skipped without aborting the run.
pub async fn crawl_for_products(
    ctx: &Arc<PipelineContext>,
    seed: &str,
    policy: AcceptPolicy,
) -> Vec<RawProduct> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([seed.to_string()]);
    let mut products: Vec<RawProduct> = Vec::new();
    let mut known_urls: HashSet<String> = HashSet::new();

    let concurrency = ctx.config.concurrency;
    let semaphore = Arc::new(Semaphore::new(concurrency));

    while !queue.is_empty() {
        let mut batch = Vec::with_capacity(concurrency);
        while batch.len() < concurrency {
            let Some(next) = queue.pop_front() else { break };
            if visited.insert(next.clone()) {
                batch.push(next);
            }
        }
        if batch.is_empty() {
            break;
        }

        let tasks = batch.into_iter().map(|url| {
            let ctx = Arc::clone(ctx);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match process_page(&ctx, &url, policy).await {
                    Ok(outcome) => Some(outcome),
                    Err(err) => {
                        warn!("crawl page failed, skipping {}: {:#}", url, err);
                        None
                    }
                }
            })
        });

        for joined in join_all(tasks).await {
            let Ok(Some(outcome)) = joined else { continue };

            if let Some(direct) = outcome.direct {
                push_product(&mut products, &mut known_urls, direct, true);
            }
            for sampled in outcome.sampled {
                push_product(&mut products, &mut known_urls, sampled, true);
            }
            for tile in outcome.tiles {
                push_product(&mut products, &mut known_urls, raw_from_tile(tile), false);
            }
            for link in outcome.links {
                if !visited.contains(&link) {
                    queue.push_back(link);
                }
            }
        }

        if visited.len() >= ctx.config.max_visited_pages {
            info!("crawl stopped: visited-page cap reached ({})", visited.len());
            break;
        }
        if products.len() >= ctx.config.max_products {
            info!("crawl stopped: product cap reached ({})", products.len());
            break;
        }
    }

    info!(
        "crawl finished: {} candidates from {} visited pages",
        products.len(),
        visited.len()
    );
    products
}

/// Keep discovery order; a confidently-parsed product replaces an earlier
/// tile glimpse of the same URL, never the other way around.
fn push_product(
    products: &mut Vec<RawProduct>,
    known_urls: &mut HashSet<String>,
    product: RawProduct,
    confident: bool,
) {
    if known_urls.insert(product.source_url.clone()) {
        products.push(product);
    } else if confident {
        if let Some(existing) = products
            .iter_mut()
            .find(|p| p.source_url == product.source_url)
        {
            if existing.specs.is_empty() && existing.description.is_empty() {
                *existing = product;
            }
        }
    }
}

fn raw_from_tile(tile: TileCandidate) -> RawProduct {
    let (category_slug, subcategory_slug, trail) = category_from_url(&tile.url);
    let slug = slugify(&tile.name);
    RawProduct {
        source_url: tile.url,
        slug,
        title: tile.name,
        price: tile.price,
        price_raw: tile.price.map(|p| p.to_string()).unwrap_or_default(),
        image_urls: tile.image_url.into_iter().collect(),
        category_slug,
        subcategory_slug,
        category_trail: trail
            .iter()
            .map(|s| (s.clone(), crate::domain::category::prettify_slug(s)))
            .collect(),
        ..RawProduct::default()
    }
}

async fn process_page(
    ctx: &Arc<PipelineContext>,
    url: &str,
    policy: AcceptPolicy,
) -> anyhow::Result<PageOutcome> {
    let html = ctx.http.fetch_text(url).await?;
    let prefix = ctx.config.url_prefix.clone();

    // parse synchronously; `Html` must not live across an await point
    let (direct, tiles, links, anchors) = {
        let doc = Html::parse_document(&html);
        if ctx.product_parser.is_product_page(&doc) {
            let direct = ctx.product_parser.parse_document(url, &doc).ok();
            (direct, Vec::new(), Vec::new(), Vec::new())
        } else {
            let tiles = ctx.listing_parser.extract_tiles(&doc, url, &prefix);
            let links = ctx.listing_parser.collect_links(&doc, url, &prefix);
            let anchors = ctx.listing_parser.find_product_anchors(&doc, url, &prefix);
            (None, tiles, links, anchors)
        }
    };

    if direct.is_some() {
        debug!("product page: {}", url);
        return Ok(PageOutcome {
            direct,
            tiles: Vec::new(),
            sampled: Vec::new(),
            links: Vec::new(),
        });
    }

    // speculative sample of product-looking anchors
    let sample: Vec<String> = anchors
        .into_iter()
        .filter(|a| a.contains("/product/"))
        .take(ctx.config.anchor_sample_size)
        .collect();

    let sampled_futures = sample.into_iter().map(|anchor| {
        let ctx = Arc::clone(ctx);
        async move {
            let html = ctx.http.fetch_text(&anchor).await.ok()?;
            let parsed = ctx.product_parser.parse(&anchor, &html).ok()?;
            policy.accepts(&parsed).then_some(parsed)
        }
    });
    let sampled: Vec<RawProduct> = join_all(sampled_futures)
        .await
        .into_iter()
        .flatten()
        .collect();

    Ok(PageOutcome {
        direct: None,
        tiles,
        sampled,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(title: &str, price: Option<u64>, description: &str) -> RawProduct {
        RawProduct {
            source_url: "https://supplier.example/product/x".into(),
            title: title.into(),
            slug: slugify(title),
            price,
            description: description.into(),
            ..RawProduct::default()
        }
    }

    #[test]
    fn accept_policy_wants_price_or_description() {
        let policy = AcceptPolicy::default();
        assert!(policy.accepts(&product("Тарелка глубокая", Some(4500), "")));
        assert!(policy.accepts(&product(
            "Тарелка глубокая",
            None,
            "Достаточно длинное описание товара"
        )));
        assert!(!policy.accepts(&product("Тарелка глубокая", None, "короткое")));
        // zero price is "unknown", not a signal
        assert!(!policy.accepts(&product("Тарелка глубокая", Some(0), "")));
        assert!(!policy.accepts(&product("X", Some(4500), "")));
    }

    #[test]
    fn confident_parse_replaces_tile_glimpse() {
        let mut products = Vec::new();
        let mut known = HashSet::new();

        let tile = raw_from_tile(TileCandidate {
            url: "https://supplier.example/product/x".into(),
            name: "Тарелка".into(),
            price: Some(100),
            image_url: None,
        });
        push_product(&mut products, &mut known, tile, false);
        assert!(products[0].specs.is_empty());

        let mut full = product("Тарелка", Some(4500), "Полное описание товара с деталями.");
        full.specs.insert("Материал".into(), "Фарфор".into());
        push_product(&mut products, &mut known, full, true);

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, Some(4500));
        assert!(!products[0].specs.is_empty());
    }

    #[test]
    fn tile_conversion_derives_slug_and_categories() {
        let raw = raw_from_tile(TileCandidate {
            url: "https://supplier.example/catalog/stolovaya-posuda/tarelki/p1".into(),
            name: "Тарелка мелкая".into(),
            price: None,
            image_url: Some("/img/p1.jpg".into()),
        });
        assert_eq!(raw.slug, "tarelka-melkaya");
        assert_eq!(raw.category_slug.as_deref(), Some("stolovaya-posuda"));
        assert_eq!(raw.subcategory_slug.as_deref(), Some("tarelki"));
        assert_eq!(raw.image_urls.len(), 1);
    }
}
