//! Listing and category page extraction
//!
//! Listing pages yield three things: product anchors worth speculative
//! parsing, low-confidence tile candidates (image + title + optional
//! price), and further in-scope links for the frontier.

use super::text::{collapse_ws, parse_price};
use scraper::{ElementRef, Html, Selector};
use url::Url;

const MAX_LINK_DEPTH: usize = 8;

/// A product glimpsed on a listing tile; low confidence until its detail
/// page has been parsed.
#[derive(Debug, Clone)]
pub struct TileCandidate {
    pub url: String,
    pub name: String,
    pub price: Option<u64>,
    pub image_url: Option<String>,
}

pub struct ListingParser {
    anchor: Selector,
    img: Selector,
    card_anchors: Selector,
    price_like: Selector,
    heading: Selector,
}

impl ListingParser {
    pub fn new() -> Self {
        let fixed = |s: &str| Selector::parse(s).expect("fixed selector");
        Self {
            anchor: fixed("a[href]"),
            img: fixed("img"),
            card_anchors: fixed("[data-product-id] a[href], .product a[href], .card a[href]"),
            price_like: fixed("[class*=\"price\"], [itemprop=\"price\"]"),
            heading: fixed("h2, h3"),
        }
    }

    /// In-scope links to keep the traversal going: prefix-matched path,
    /// bounded depth, no mailto/tel/fragment anchors.
    pub fn collect_links(&self, doc: &Html, page_url: &str, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        for anchor in doc.select(&self.anchor) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = normalize_link(href, page_url) else {
                continue;
            };
            if url.path().starts_with(prefix) && !out.contains(&url.to_string()) {
                out.push(url.to_string());
            }
        }
        out
    }

    /// Anchors that look like product detail pages: `/product/` paths plus
    /// links inside recognizable product cards.
    pub fn find_product_anchors(&self, doc: &Html, page_url: &str, prefix: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |url: Url, out: &mut Vec<String>| {
            let mut url = url;
            url.set_query(None);
            let s = url.to_string();
            if !out.contains(&s) {
                out.push(s);
            }
        };

        for anchor in doc.select(&self.anchor) {
            if anchor.select(&self.img).next().is_none() {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = normalize_link(href, page_url) else {
                continue;
            };
            if is_product_path(url.path()) || url.path().starts_with(prefix) {
                push(url, &mut out);
            }
        }

        for anchor in doc.select(&self.card_anchors) {
            if let Some(href) = anchor.value().attr("href") {
                if let Some(url) = normalize_link(href, page_url) {
                    if is_product_path(url.path()) || url.path().starts_with(prefix) {
                        push(url, &mut out);
                    }
                }
            }
        }

        out
    }

    /// Listing tiles: an image wrapped in an anchor, with a name from the
    /// image alt, the anchor title or a nearby heading, and an optional
    /// price from the surrounding card.
    pub fn extract_tiles(&self, doc: &Html, page_url: &str, prefix: &str) -> Vec<TileCandidate> {
        let mut out: Vec<TileCandidate> = Vec::new();

        for anchor in doc.select(&self.anchor) {
            let Some(img) = anchor.select(&self.img).next() else {
                continue;
            };
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = normalize_link(href, page_url) else {
                continue;
            };
            if !is_product_path(url.path()) && !url.path().starts_with(prefix) {
                continue;
            }

            let card = card_container(&anchor);
            let name = img
                .value()
                .attr("alt")
                .map(collapse_ws_str)
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    anchor
                        .value()
                        .attr("title")
                        .map(collapse_ws_str)
                        .filter(|s| !s.is_empty())
                })
                .or_else(|| {
                    card.as_ref().and_then(|c| {
                        c.select(&self.heading)
                            .next()
                            .map(|h| collapse_ws(&h.text().collect::<String>()))
                            .filter(|s| !s.is_empty())
                    })
                });
            let Some(name) = name else { continue };

            let price = card.as_ref().and_then(|c| {
                c.select(&self.price_like).next().and_then(|el| {
                    el.value()
                        .attr("content")
                        .and_then(parse_price_str)
                        .or_else(|| parse_price(&el.text().collect::<String>()))
                })
            });

            let image_url = img.value().attr("src").map(str::to_string);

            let mut clean_url = url;
            clean_url.set_query(None);
            let url_string = clean_url.to_string();
            if !out.iter().any(|t| t.url == url_string) {
                out.push(TileCandidate {
                    url: url_string,
                    name,
                    price,
                    image_url,
                });
            }
        }

        out
    }
}

impl Default for ListingParser {
    fn default() -> Self {
        Self::new()
    }
}

fn collapse_ws_str(s: &str) -> String {
    collapse_ws(s)
}

fn parse_price_str(s: &str) -> Option<u64> {
    parse_price(s)
}

fn is_product_path(path: &str) -> bool {
    path.starts_with("/product/") || path.contains("/product/")
}

/// Resolve and vet a traversal link: absolute, http(s), fragment-free,
/// bounded path depth.
fn normalize_link(href: &str, page_url: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.contains('#') {
        return None;
    }
    let base = Url::parse(page_url).ok()?;
    let url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let depth = url.path().split('/').filter(|s| !s.is_empty()).count();
    if depth > MAX_LINK_DEPTH {
        return None;
    }
    Some(url)
}

/// Nearest ancestor that looks like a product card.
fn card_container<'a>(anchor: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    anchor.ancestors().filter_map(ElementRef::wrap).find(|el| {
        let value = el.value();
        if value.name() == "li" {
            return true;
        }
        value
            .attr("class")
            .map(|classes| {
                let classes = classes.to_lowercase();
                ["product", "card", "item", "catalog", "grid", "col"]
                    .iter()
                    .any(|marker| classes.contains(marker))
            })
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_HTML: &str = r#"<html><body>
        <div class="product-card">
          <a href="/product/plate-25?sort=asc"><img src="/img/plate.jpg" alt="Тарелка глубокая"></a>
          <div class="price">4 500 ₸</div>
        </div>
        <li>
          <a href="/catalog/stolovaya-posuda/bowl-1" title="Салатник"><img src="/img/bowl.jpg" alt=""></a>
          <span class="product-price">2 300 ₸</span>
        </li>
        <a href="/catalog/stolovaya-posuda/tarelki/">Тарелки</a>
        <a href="/catalog/stolovaya-posuda/?PAGEN_1=2">Стр. 2</a>
        <a href="/brands/">Бренды</a>
        <a href="mailto:shop@supplier.example">почта</a>
        <a href="/catalog/x#reviews">якорь</a>
        </body></html>"#;

    const PAGE: &str = "https://supplier.example/catalog/stolovaya-posuda/";

    #[test]
    fn collects_only_in_scope_links() {
        let parser = ListingParser::new();
        let doc = Html::parse_document(LISTING_HTML);
        let links = parser.collect_links(&doc, PAGE, "/catalog/");
        assert!(links
            .iter()
            .any(|l| l.ends_with("/catalog/stolovaya-posuda/tarelki/")));
        assert!(links.iter().any(|l| l.contains("PAGEN_1=2")));
        assert!(!links.iter().any(|l| l.contains("/brands/")));
        assert!(!links.iter().any(|l| l.contains("mailto")));
        assert!(!links.iter().any(|l| l.contains('#')));
    }

    #[test]
    fn product_anchors_strip_queries_and_dedup() {
        let parser = ListingParser::new();
        let doc = Html::parse_document(LISTING_HTML);
        let anchors = parser.find_product_anchors(&doc, PAGE, "/catalog/");
        assert!(anchors.contains(&"https://supplier.example/product/plate-25".to_string()));
        let unique: std::collections::HashSet<_> = anchors.iter().collect();
        assert_eq!(unique.len(), anchors.len());
    }

    #[test]
    fn tiles_pick_name_from_alt_then_title_and_price_from_card() {
        let parser = ListingParser::new();
        let doc = Html::parse_document(LISTING_HTML);
        let tiles = parser.extract_tiles(&doc, PAGE, "/catalog/");
        assert_eq!(tiles.len(), 2);

        let plate = tiles.iter().find(|t| t.name == "Тарелка глубокая").unwrap();
        assert_eq!(plate.price, Some(4500));
        assert_eq!(plate.image_url.as_deref(), Some("/img/plate.jpg"));

        // empty alt falls through to the anchor title
        let bowl = tiles.iter().find(|t| t.name == "Салатник").unwrap();
        assert_eq!(bowl.price, Some(2300));
    }
}
