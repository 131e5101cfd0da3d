//! Product detail page extractor
//!
//! Layered extraction: structured data first (JSON-LD, microdata, meta
//! tags), then the selector cascades, then document-wide scans as the last
//! resort. Field by field, the first non-empty source wins, and the order
//! is fixed so runs are reproducible.

use super::error::ParsingResult;
use super::selectors::{compile_selectors, SelectorConfig};
use super::text::{clamp_sentences, collapse_ws, parse_price, sanitize_text};
use crate::domain::category::prettify_slug;
use crate::domain::product::RawProduct;
use crate::domain::slug::slugify;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Placeholder title for pages that expose no usable name.
pub const FALLBACK_TITLE: &str = "Товар";

const MAX_IMAGES: usize = 10;
const MAX_SPEC_KEY_CHARS: usize = 80;
const MAX_SPEC_VALUE_CHARS: usize = 500;
const MAX_SPEC_TABLE_ROWS: usize = 40;
const DESCRIPTION_SENTENCE_CAP: usize = 6;

static LD_PRODUCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""@type"\s*:\s*"Product""#).expect("ld product pattern"));
static IMAGE_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)placeholder|no-image|sprite|\.svg($|\?)|\.gif($|\?)").unwrap());
static LOGO_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/images/logos/|(^|/)logo([.\-_/])").unwrap());
static SPEC_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)характеристик|spec").unwrap());
static MENU_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(Бренды|Серии|Новинки|Ликвидация|Блог|Каталог по заведениям|Фуршетные линии|Технологическое оборудование|Вспомогательный инвентарь|Униформа|Хозяйственные товары)$",
    )
    .unwrap()
});

/// Parser for supplier product detail pages.
pub struct ProductPageParser {
    title: Vec<Selector>,
    price: Vec<Selector>,
    description: Vec<Selector>,
    gallery: Vec<Selector>,
    product_containers: Vec<Selector>,
    spec_tables: Vec<Selector>,
    feature_blocks: Vec<Selector>,
    breadcrumb_links: Vec<Selector>,
    brand: Vec<Selector>,

    ld_json: Selector,
    microdata_product: Selector,
    h1: Selector,
    meta_description: Selector,
    og_description: Selector,
    og_image: Selector,
    itemprop_image: Selector,
    micro_breadcrumb_items: Selector,
    micro_breadcrumb_link: Selector,
    spec_headers: Selector,
    row: Selector,
    cell: Selector,
    dt: Selector,
    dd: Selector,
    img: Selector,
    image_anchor: Selector,
    paragraph: Selector,
    feature_name: Selector,
    feature_value: Selector,
    list_item: Selector,
    span: Selector,
}

impl ProductPageParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&SelectorConfig::default())
    }

    pub fn with_config(config: &SelectorConfig) -> ParsingResult<Self> {
        let fixed = |s: &str| Selector::parse(s).expect("fixed selector");
        Ok(Self {
            title: compile_selectors(&config.title)?,
            price: compile_selectors(&config.price)?,
            description: compile_selectors(&config.description)?,
            gallery: compile_selectors(&config.gallery)?,
            product_containers: compile_selectors(&config.product_containers)?,
            spec_tables: compile_selectors(&config.spec_tables)?,
            feature_blocks: compile_selectors(&config.feature_blocks)?,
            breadcrumb_links: compile_selectors(&config.breadcrumb_links)?,
            brand: compile_selectors(&config.brand)?,

            ld_json: fixed("script[type=\"application/ld+json\"]"),
            microdata_product: fixed("[itemtype*=\"Product\"]"),
            h1: fixed("h1"),
            meta_description: fixed("meta[name=\"description\"]"),
            og_description: fixed("meta[property=\"og:description\"]"),
            og_image: fixed("meta[property=\"og:image\"]"),
            itemprop_image: fixed("[itemprop=\"image\"]"),
            micro_breadcrumb_items: fixed(
                "[itemtype*=\"BreadcrumbList\"] [itemprop=\"itemListElement\"]",
            ),
            micro_breadcrumb_link: fixed("a, [itemprop=\"item\"]"),
            spec_headers: fixed("h2, h3, h4"),
            row: fixed("tr"),
            cell: fixed("td, th"),
            dt: fixed("dt"),
            dd: fixed("dd"),
            img: fixed("img"),
            image_anchor: fixed(
                "a[href$=\".jpg\"], a[href$=\".jpeg\"], a[href$=\".png\"], a[href$=\".webp\"]",
            ),
            paragraph: fixed("p"),
            feature_name: fixed("[class*=\"name\"]"),
            feature_value: fixed("[class*=\"value\"]"),
            list_item: fixed("li"),
            span: fixed("span"),
        })
    }

    /// Product-page predicate: a schema.org Product marker (JSON-LD or
    /// microdata) plus an `<h1>`. Listing and category pages fail this and
    /// must be handled as link sources instead.
    pub fn is_product_page(&self, doc: &Html) -> bool {
        let has_ld = doc
            .select(&self.ld_json)
            .any(|script| LD_PRODUCT.is_match(&script.text().collect::<String>()));
        let has_micro = doc.select(&self.microdata_product).next().is_some();
        let has_h1 = doc.select(&self.h1).next().is_some();
        (has_ld || has_micro) && has_h1
    }

    /// Parse an already-fetched page into a raw product.
    pub fn parse(&self, url: &str, html: &str) -> ParsingResult<RawProduct> {
        let doc = Html::parse_document(html);
        self.parse_document(url, &doc)
    }

    pub fn parse_document(&self, url: &str, doc: &Html) -> ParsingResult<RawProduct> {
        let (category_slug, subcategory_slug, category_path) = category_from_url(url);

        let title = self.extract_title(doc);
        let slug = {
            let from_title = slugify(&title);
            if from_title.is_empty() {
                category_path
                    .last()
                    .map(|s| slugify(s))
                    .unwrap_or_default()
            } else {
                from_title
            }
        };

        let (price, price_raw) = self.extract_price(doc);
        let description = self.extract_description(doc);
        let specs = self.extract_specs(doc);
        let image_urls = self.collect_images(doc, url);
        let brand = self.extract_brand(doc);

        let crumbs = self.parse_breadcrumbs(doc);
        let category_trail = if crumbs.is_empty() {
            trail_from_path(&category_path)
        } else {
            crumbs
        };

        let material = spec_lookup(&specs, "Материал");
        let color = spec_lookup(&specs, "Цвет");

        debug!(
            "parsed {}: price={:?} specs={} images={}",
            slug,
            price,
            specs.len(),
            image_urls.len()
        );

        Ok(RawProduct {
            source_url: url.to_string(),
            title,
            slug,
            price,
            price_raw,
            description,
            specs,
            image_urls,
            brand,
            material,
            color,
            category_slug,
            subcategory_slug,
            category_trail,
        })
    }

    fn extract_title(&self, doc: &Html) -> String {
        for selector in &self.title {
            if let Some(el) = doc.select(selector).next() {
                let mut text = collapse_ws(&el.text().collect::<String>());
                // <title> carries a " | store name" suffix
                if el.value().name() == "title" {
                    if let Some(pos) = text.find('|') {
                        text.truncate(pos);
                        text = collapse_ws(&text);
                    }
                }
                if !text.is_empty() {
                    return text;
                }
            }
        }
        FALLBACK_TITLE.to_string()
    }

    /// Price precedence: structured `content` attribute, then `data-price`,
    /// then the longest digit-bearing text among price-classed elements.
    fn extract_price(&self, doc: &Html) -> (Option<u64>, String) {
        for selector in &self.price {
            for el in doc.select(selector) {
                if let Some(content) = el.value().attr("content") {
                    if let Some(amount) = parse_price(content) {
                        return (Some(amount), content.trim().to_string());
                    }
                }
                if let Some(attr) = el.value().attr("data-price") {
                    if let Some(amount) = parse_price(attr) {
                        return (Some(amount), attr.trim().to_string());
                    }
                }
            }
        }

        let mut best = String::new();
        for selector in &self.price {
            for el in doc.select(selector) {
                let text = collapse_ws(&el.text().collect::<String>());
                let looks_pricey = text.contains('₸') || text.chars().any(|c| c.is_ascii_digit());
                if looks_pricey && text.chars().count() > best.chars().count() {
                    best = text;
                }
            }
        }
        (parse_price(&best), best)
    }

    fn extract_description(&self, doc: &Html) -> String {
        for selector in &self.description {
            if let Some(el) = doc.select(selector).next() {
                let text = sanitize_text(&el.text().collect::<String>());
                if text.chars().count() > 10 {
                    return clamp_sentences(&text, DESCRIPTION_SENTENCE_CAP);
                }
            }
        }

        // structured meta before the whole-document scan
        for meta in [&self.meta_description, &self.og_description] {
            if let Some(el) = doc.select(meta).next() {
                if let Some(content) = el.value().attr("content") {
                    let text = sanitize_text(content);
                    if text.chars().count() > 10 {
                        return clamp_sentences(&text, DESCRIPTION_SENTENCE_CAP);
                    }
                }
            }
        }

        // last resort: the longest paragraph anywhere on the page
        let mut best = String::new();
        for p in doc.select(&self.paragraph) {
            let text = sanitize_text(&p.text().collect::<String>());
            if text.chars().count() > best.chars().count() {
                best = text;
            }
        }
        clamp_sentences(&best, DESCRIPTION_SENTENCE_CAP)
    }

    fn extract_brand(&self, doc: &Html) -> Option<String> {
        for selector in &self.brand {
            if let Some(el) = doc.select(selector).next() {
                let text = collapse_ws(&el.text().collect::<String>());
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    /// Characteristic pairs from tables, definition lists, feature blocks
    /// and two-span list items. First-seen value wins per key.
    pub fn extract_specs(&self, doc: &Html) -> BTreeMap<String, String> {
        let mut specs = BTreeMap::new();

        // tables immediately following a characteristics header are the
        // highest-signal source, scan them first
        for header in doc.select(&self.spec_headers) {
            let text = header.text().collect::<String>();
            if !SPEC_HEADER.is_match(&text) {
                continue;
            }
            if let Some(table) = header
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "table")
            {
                self.specs_from_rows(&table, &mut specs);
            }
        }

        for selector in &self.spec_tables {
            for container in doc.select(selector) {
                match container.value().name() {
                    "table" => {
                        let rows = container.select(&self.row).count();
                        if rows > 0 && rows <= MAX_SPEC_TABLE_ROWS {
                            self.specs_from_rows(&container, &mut specs);
                        }
                    }
                    _ => {
                        // definition list: pair dt[i] with dd[i]
                        let terms: Vec<_> = container.select(&self.dt).collect();
                        let defs: Vec<_> = container.select(&self.dd).collect();
                        for (term, def) in terms.iter().zip(defs.iter()) {
                            add_spec(
                                &mut specs,
                                &term.text().collect::<String>(),
                                &def.text().collect::<String>(),
                            );
                        }
                    }
                }
            }
        }

        for selector in &self.feature_blocks {
            for block in doc.select(selector) {
                let key = block
                    .select(&self.feature_name)
                    .next()
                    .map(|el| el.text().collect::<String>())
                    .unwrap_or_default();
                let value = block
                    .select(&self.feature_value)
                    .next()
                    .map(|el| el.text().collect::<String>())
                    .unwrap_or_default();
                add_spec(&mut specs, &key, &value);
            }
        }

        for item in doc.select(&self.list_item) {
            let spans: Vec<_> = item.select(&self.span).collect();
            if spans.len() >= 2 {
                add_spec(
                    &mut specs,
                    &spans[0].text().collect::<String>(),
                    &spans[1].text().collect::<String>(),
                );
            }
        }

        specs
    }

    fn specs_from_rows(&self, table: &ElementRef<'_>, specs: &mut BTreeMap<String, String>) {
        for row in table.select(&self.row) {
            let cells: Vec<_> = row.select(&self.cell).collect();
            if cells.len() >= 2 {
                add_spec(
                    specs,
                    &cells[0].text().collect::<String>(),
                    &cells[1].text().collect::<String>(),
                );
            }
        }
    }

    /// Gather gallery image URLs: structured meta first, then known gallery
    /// containers, then a product-container scan. Absolute, deduplicated,
    /// noise-filtered, capped.
    pub fn collect_images(&self, doc: &Html, page_url: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();

        let mut push = |candidate: &str, out: &mut Vec<String>| {
            if out.len() >= MAX_IMAGES {
                return;
            }
            let Some(abs) = absolutize(candidate, page_url) else {
                return;
            };
            if IMAGE_NOISE.is_match(&abs) || LOGO_PATH.is_match(&abs) {
                return;
            }
            if !out.contains(&abs) {
                out.push(abs);
            }
        };

        for meta in doc.select(&self.og_image) {
            if let Some(content) = meta.value().attr("content") {
                push(content, &mut out);
            }
        }
        for el in doc.select(&self.itemprop_image) {
            if let Some(u) = el.value().attr("content").or_else(|| el.value().attr("src")) {
                push(u, &mut out);
            }
        }

        let mut gallery_matched = false;
        for selector in &self.gallery {
            for container in doc.select(selector) {
                gallery_matched = true;
                for img in container.select(&self.img) {
                    self.push_img_sources(&img, page_url, &mut push, &mut out);
                }
                for anchor in container.select(&self.image_anchor) {
                    if let Some(href) = anchor.value().attr("href") {
                        push(href, &mut out);
                    }
                }
            }
        }

        if !gallery_matched && out.is_empty() {
            for selector in &self.product_containers {
                for container in doc.select(selector) {
                    for img in container.select(&self.img) {
                        self.push_img_sources(&img, page_url, &mut push, &mut out);
                    }
                }
                if !out.is_empty() {
                    break;
                }
            }
        }

        out
    }

    fn push_img_sources(
        &self,
        img: &ElementRef<'_>,
        _page_url: &str,
        push: &mut impl FnMut(&str, &mut Vec<String>),
        out: &mut Vec<String>,
    ) {
        let value = img.value();
        if let Some(srcset) = value.attr("srcset") {
            for part in srcset.split(',') {
                if let Some(candidate) = part.trim().split(' ').next() {
                    push(candidate, out);
                }
            }
        }
        for attr in ["data-ca-image-path", "data-large-src", "data-src", "src"] {
            if let Some(candidate) = value.attr(attr) {
                push(candidate, out);
            }
        }
    }

    /// Breadcrumb trail as (slug, name) pairs, outermost first. JSON-LD is
    /// authoritative, then microdata, then breadcrumb link classes.
    pub fn parse_breadcrumbs(&self, doc: &Html) -> Vec<(String, String)> {
        let mut out = Vec::new();

        for script in doc.select(&self.ld_json) {
            let text = script.text().collect::<String>();
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                continue;
            };
            let items: Vec<&serde_json::Value> = match &value {
                serde_json::Value::Array(list) => list.iter().collect(),
                other => vec![other],
            };
            for item in items {
                if item.get("@type").and_then(|t| t.as_str()) != Some("BreadcrumbList") {
                    continue;
                }
                let Some(elements) = item.get("itemListElement").and_then(|e| e.as_array()) else {
                    continue;
                };
                for element in elements {
                    let href = element
                        .get("item")
                        .map(|it| match it {
                            serde_json::Value::String(s) => s.clone(),
                            other => ["@id", "id", "url"]
                                .into_iter()
                                .find_map(|k| other.get(k).and_then(|v| v.as_str()))
                                .unwrap_or_default()
                                .to_string(),
                        })
                        .unwrap_or_default();
                    let name = element
                        .get("name")
                        .and_then(|n| n.as_str())
                        .or_else(|| {
                            element
                                .get("item")
                                .and_then(|it| it.get("name"))
                                .and_then(|n| n.as_str())
                        })
                        .unwrap_or_default();
                    push_crumb(&mut out, &href, name);
                }
            }
        }
        if !out.is_empty() {
            return out;
        }

        for item in doc.select(&self.micro_breadcrumb_items) {
            if let Some(link) = item.select(&self.micro_breadcrumb_link).next() {
                let name = link
                    .value()
                    .attr("title")
                    .map(str::to_string)
                    .unwrap_or_else(|| link.text().collect::<String>());
                let href = link
                    .value()
                    .attr("href")
                    .or_else(|| link.value().attr("content"))
                    .unwrap_or_default();
                push_crumb(&mut out, href, &name);
            }
        }
        if !out.is_empty() {
            return out;
        }

        for selector in &self.breadcrumb_links {
            for link in doc.select(selector) {
                let name = link
                    .value()
                    .attr("title")
                    .map(str::to_string)
                    .unwrap_or_else(|| link.text().collect::<String>());
                let href = link.value().attr("href").unwrap_or_default();
                push_crumb(&mut out, href, &name);
            }
            if !out.is_empty() {
                break;
            }
        }
        out
    }
}

fn push_crumb(out: &mut Vec<(String, String)>, href: &str, name: &str) {
    let (_, _, path) = category_from_url(href);
    let Some(slug) = path.last() else { return };
    let name = collapse_ws(name);
    if slug == "catalog" || slug.is_empty() || name.is_empty() {
        return;
    }
    if !out.iter().any(|(s, _)| s == slug) {
        out.push((slug.clone(), name));
    }
}

fn trail_from_path(path: &[String]) -> Vec<(String, String)> {
    path.iter()
        .filter(|slug| slug.as_str() != "catalog")
        .map(|slug| (slug.clone(), prettify_slug(slug)))
        .collect()
}

fn spec_lookup(specs: &BTreeMap<String, String>, key: &str) -> Option<String> {
    specs
        .get(key)
        .or_else(|| specs.iter().find(|(k, _)| k.contains(key)).map(|(_, v)| v))
        .filter(|v| !v.trim().is_empty())
        .cloned()
}

fn add_spec(specs: &mut BTreeMap<String, String>, key: &str, value: &str) {
    let key = collapse_ws(key);
    let value = sanitize_text(value);
    if key.is_empty() || value.is_empty() {
        return;
    }
    if key.chars().count() > MAX_SPEC_KEY_CHARS || value.chars().count() > MAX_SPEC_VALUE_CHARS {
        return;
    }
    if MENU_KEY.is_match(&key) {
        return;
    }
    specs.entry(key).or_insert(value);
}

/// Resolve a possibly relative URL against the page it appeared on.
fn absolutize(candidate: &str, page_url: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    if let Ok(parsed) = Url::parse(candidate) {
        return Some(parsed.to_string());
    }
    Url::parse(page_url)
        .ok()?
        .join(candidate)
        .ok()
        .map(|u| u.to_string())
}

/// Category and subcategory slugs from the path segments following
/// `catalog`, plus the full category path for trail registration.
pub fn category_from_url(url: &str) -> (Option<String>, Option<String>, Vec<String>) {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(idx) = parts.iter().position(|p| *p == "catalog") {
        if let Some(category) = parts.get(idx + 1) {
            let subcategory = parts.get(idx + 2).map(|s| s.to_string());
            let mut trail = vec![category.to_string()];
            if let Some(sub) = &subcategory {
                trail.push(sub.clone());
            }
            return (Some(category.to_string()), subcategory, trail);
        }
    }
    (None, None, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_HTML: &str = r#"<!doctype html><html><head>
        <title>Тарелка глубокая 25 см | Магазин</title>
        <meta name="description" content="Глубокая тарелка из фарфора для подачи первых блюд.">
        <script type="application/ld+json">
        [{"@type":"Product","name":"Тарелка глубокая 25 см"},
         {"@type":"BreadcrumbList","itemListElement":[
            {"name":"Столовая посуда","item":"https://supplier.example/catalog/stolovaya-posuda/"},
            {"name":"Тарелки","item":{"@id":"https://supplier.example/catalog/stolovaya-posuda/tarelki/"}}]}]
        </script></head><body>
        <h1>Тарелка глубокая 25 см</h1>
        <div class="product-price">12 500 ₸</div>
        <div class="product-gallery">
          <img src="/images/detailed/1/plate_main.jpg" srcset="/images/detailed/1/plate_2x.jpg 2x">
          <img data-src="//cdn.supplier.example/plate_alt.jpg">
          <img src="/images/logos/logo.png">
          <img src="/images/sprite.svg">
        </div>
        <h2>Характеристики</h2>
        <table>
          <tr><td>Материал</td><td>Фарфор</td></tr>
          <tr><td>Цвет</td><td>БЕЛЫЙ</td></tr>
          <tr><td>Диаметр</td><td>25 см</td></tr>
        </table>
        <div id="content_description"><p>Классическая глубокая тарелка. Подходит для СВЧ. Выдерживает мойку. Ещё фраза. Пятая фраза. Шестая фраза. Седьмая фраза.</p></div>
        </body></html>"#;

    #[test]
    fn recognizes_product_pages() {
        let parser = ProductPageParser::new().unwrap();
        let doc = Html::parse_document(PRODUCT_HTML);
        assert!(parser.is_product_page(&doc));

        let listing = Html::parse_document("<html><body><h1>Каталог</h1></body></html>");
        assert!(!parser.is_product_page(&listing));
    }

    #[test]
    fn extracts_all_core_fields() {
        let parser = ProductPageParser::new().unwrap();
        let raw = parser
            .parse(
                "https://supplier.example/catalog/stolovaya-posuda/tarelki/product/plate-25",
                PRODUCT_HTML,
            )
            .unwrap();

        assert_eq!(raw.title, "Тарелка глубокая 25 см");
        assert_eq!(raw.slug, "tarelka-glubokaya-25-sm");
        assert_eq!(raw.price, Some(12500));
        assert_eq!(raw.specs.get("Материал").map(String::as_str), Some("Фарфор"));
        // ALL CAPS values are case-normalized
        assert_eq!(raw.specs.get("Цвет").map(String::as_str), Some("Белый"));
        assert_eq!(raw.material.as_deref(), Some("Фарфор"));
        assert_eq!(raw.category_slug.as_deref(), Some("stolovaya-posuda"));
        assert_eq!(raw.subcategory_slug.as_deref(), Some("tarelki"));
        assert!(raw.description.contains("Классическая"));
    }

    #[test]
    fn gallery_images_filter_logos_and_sprites() {
        let parser = ProductPageParser::new().unwrap();
        let raw = parser
            .parse("https://supplier.example/catalog/x/product/p", PRODUCT_HTML)
            .unwrap();
        assert!(raw
            .image_urls
            .iter()
            .any(|u| u.ends_with("/images/detailed/1/plate_main.jpg")));
        assert!(raw.image_urls.iter().any(|u| u.contains("plate_alt.jpg")));
        assert!(!raw.image_urls.iter().any(|u| u.contains("logo")));
        assert!(!raw.image_urls.iter().any(|u| u.ends_with(".svg")));
        // srcset first token was taken too, order preserved, no duplicates
        let unique: std::collections::HashSet<_> = raw.image_urls.iter().collect();
        assert_eq!(unique.len(), raw.image_urls.len());
    }

    #[test]
    fn breadcrumbs_come_from_json_ld() {
        let parser = ProductPageParser::new().unwrap();
        let raw = parser
            .parse("https://supplier.example/catalog/x/product/p", PRODUCT_HTML)
            .unwrap();
        assert_eq!(
            raw.category_trail,
            vec![
                ("stolovaya-posuda".to_string(), "Столовая посуда".to_string()),
                ("tarelki".to_string(), "Тарелки".to_string()),
            ]
        );
    }

    #[test]
    fn description_is_clamped_to_sentence_cap() {
        let parser = ProductPageParser::new().unwrap();
        let raw = parser
            .parse("https://supplier.example/catalog/x/product/p", PRODUCT_HTML)
            .unwrap();
        let periods = raw.description.matches(['.', '!', '?']).count();
        assert!(periods <= 6, "description kept too many sentences: {}", raw.description);
    }

    #[test]
    fn missing_title_falls_back_to_placeholder() {
        let parser = ProductPageParser::new().unwrap();
        let raw = parser
            .parse(
                "https://supplier.example/catalog/kruzhki/product/x1",
                "<html><body><div class=\"price\">100</div></body></html>",
            )
            .unwrap();
        assert_eq!(raw.title, FALLBACK_TITLE);
        assert_eq!(raw.slug, "tovar");
    }

    #[test]
    fn category_from_url_splits_after_catalog_segment() {
        let (cat, sub, trail) =
            category_from_url("https://supplier.example/catalog/stolovaya-posuda/tarelki/");
        assert_eq!(cat.as_deref(), Some("stolovaya-posuda"));
        assert_eq!(sub.as_deref(), Some("tarelki"));
        assert_eq!(trail.len(), 2);

        let (cat, _, _) = category_from_url("https://supplier.example/blog/post/");
        assert_eq!(cat, None);
    }
}
