//! CSS selector cascades for the supplier's page layouts
//!
//! Every extracted field has an ordered list of selectors, first non-empty
//! match wins. The lists are plain strings in configuration form so the
//! brittle site-specific parts stay in one reviewable place; they compile
//! into `scraper::Selector` values once, at parser construction.

use super::error::{ParsingError, ParsingResult};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Selector cascades for product detail pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub title: Vec<String>,
    pub price: Vec<String>,
    pub description: Vec<String>,
    /// Known gallery containers, searched before any document-wide scan.
    pub gallery: Vec<String>,
    /// Containers scanned for images when no gallery matched.
    pub product_containers: Vec<String>,
    /// Key/value characteristic containers.
    pub spec_tables: Vec<String>,
    pub feature_blocks: Vec<String>,
    pub breadcrumb_links: Vec<String>,
    pub brand: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            title: vec!["h1".into(), "[itemprop=\"name\"]".into(), "title".into()],
            price: vec![
                "[itemprop=\"price\"]".into(),
                "[data-price]".into(),
                "[class*=\"price\"]".into(),
                ".price".into(),
                ".product-price".into(),
            ],
            description: vec![
                "#content_description".into(),
                ".ty-wysiwyg-content".into(),
                ".product-description".into(),
                "[itemprop=\"description\"]".into(),
            ],
            gallery: vec![
                ".product-gallery".into(),
                ".swiper-wrapper".into(),
                ".cm-image-gallery".into(),
                ".ty-product-img".into(),
                ".ty-product-images".into(),
                "#product_images".into(),
                ".product-main-image".into(),
                ".splide__list".into(),
                ".slick-track".into(),
                "[data-gallery]".into(),
                ".thumbnails".into(),
                ".product-images".into(),
            ],
            product_containers: vec![
                "[itemtype*=\"Product\"]".into(),
                ".product".into(),
                ".product-page".into(),
                "main".into(),
            ],
            spec_tables: vec!["table".into(), "dl".into()],
            feature_blocks: vec!["[class*=\"product-feature\"]".into()],
            breadcrumb_links: vec![
                ".breadcrumb a".into(),
                "nav[aria-label*=\"bread\"] a".into(),
                ".ty-breadcrumbs a".into(),
            ],
            brand: vec![
                "[itemprop=\"brand\"]".into(),
                "a[href*=\"brand\"]".into(),
                ".brand".into(),
            ],
        }
    }
}

/// Compile a cascade, skipping (and logging) individual selectors the
/// engine cannot parse. An entirely unusable cascade is a configuration
/// error and aborts construction.
pub fn compile_selectors(cascade: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut compiled = Vec::with_capacity(cascade.len());
    let mut last_error = String::new();

    for raw in cascade {
        match Selector::parse(raw) {
            Ok(selector) => compiled.push(selector),
            Err(err) => {
                warn!("skipping invalid selector '{}': {}", raw, err);
                last_error = err.to_string();
            }
        }
    }

    if compiled.is_empty() && !cascade.is_empty() {
        return Err(ParsingError::InvalidSelector {
            selector: cascade.join(", "),
            reason: last_error,
        });
    }
    Ok(compiled)
}
