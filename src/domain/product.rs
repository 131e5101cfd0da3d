//! Core product entities and the merge/richness rules built on them
//!
//! `ProductRecord` is the persisted shape shared by both store backends;
//! `RawProduct` is what the extractor emits before images are materialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persisted catalog product, keyed by slug.
///
/// Field order matters: the flat-file store serializes records in this exact
/// order so repeated runs produce diff-friendly output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub slug: String,
    pub title: String,
    /// Parsed price in tenge. `None` means "price unknown" and is never
    /// collapsed to zero.
    pub price: Option<u64>,
    #[serde(default)]
    pub description: String,
    /// Free-form characteristic name -> value pairs, source-language keys.
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    /// Content-relative local paths only, e.g. `/products/<slug>/main.jpg`.
    /// Externally-hosted URLs are never persisted here.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_slug: Option<String>,
    /// Originating supplier page, kept for later re-fetch and repair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Set once on first insert, preserved across every later update.
    pub created_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Merge non-empty fields of `incoming` over this record.
    ///
    /// Populated fields are never blanked out by sparser data: a field moves
    /// only when the current value is empty and the incoming one is not.
    /// Specs merge pairwise with the same rule. `created_at` never changes.
    pub fn merge_from(&mut self, incoming: &ProductRecord) {
        if self.title.trim().is_empty() && !incoming.title.trim().is_empty() {
            self.title = incoming.title.clone();
        }
        if self.price.is_none() {
            self.price = incoming.price;
        }
        if self.description.trim().is_empty() && !incoming.description.trim().is_empty() {
            self.description = incoming.description.clone();
        }
        for (key, value) in &incoming.specs {
            if value.trim().is_empty() {
                continue;
            }
            self.specs
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if self.images.is_empty() && !incoming.images.is_empty() {
            self.images = incoming.images.clone();
        }
        merge_opt(&mut self.brand, &incoming.brand);
        merge_opt(&mut self.material, &incoming.material);
        merge_opt(&mut self.color, &incoming.color);
        merge_opt(&mut self.category_slug, &incoming.category_slug);
        merge_opt(&mut self.subcategory_slug, &incoming.subcategory_slug);
        merge_opt(&mut self.source_url, &incoming.source_url);
    }

    /// Upsert semantics: every non-empty incoming field overwrites the
    /// stored one, but an empty incoming field never blanks a populated
    /// value. Incoming spec pairs overwrite same-key values; stored keys the
    /// incoming record lacks are kept. `slug` and `created_at` stay as they
    /// are.
    pub fn merge_update(&mut self, incoming: &ProductRecord) {
        if !incoming.title.trim().is_empty() {
            self.title = incoming.title.clone();
        }
        if incoming.price.is_some() {
            self.price = incoming.price;
        }
        if !incoming.description.trim().is_empty() {
            self.description = incoming.description.clone();
        }
        for (key, value) in &incoming.specs {
            if !value.trim().is_empty() {
                self.specs.insert(key.clone(), value.clone());
            }
        }
        if !incoming.images.is_empty() {
            self.images = incoming.images.clone();
        }
        overwrite_opt(&mut self.brand, &incoming.brand);
        overwrite_opt(&mut self.material, &incoming.material);
        overwrite_opt(&mut self.color, &incoming.color);
        overwrite_opt(&mut self.category_slug, &incoming.category_slug);
        overwrite_opt(&mut self.subcategory_slug, &incoming.subcategory_slug);
        overwrite_opt(&mut self.source_url, &incoming.source_url);
    }

    /// Richness comparison used by the dedup cascade: more specs wins, then
    /// more images, then the longer description.
    pub fn is_richer_than(&self, other: &ProductRecord) -> bool {
        let specs = (self.non_empty_spec_count(), other.non_empty_spec_count());
        if specs.0 != specs.1 {
            return specs.0 > specs.1;
        }
        if self.images.len() != other.images.len() {
            return self.images.len() > other.images.len();
        }
        self.description.chars().count() > other.description.chars().count()
    }

    /// Count of spec pairs with both a key and a value.
    pub fn non_empty_spec_count(&self) -> usize {
        self.specs
            .iter()
            .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
            .count()
    }

    /// Minimum-validity check applied before a record may enter or remain in
    /// the store: slug, title, at least one image, at least two spec pairs
    /// and a description longer than ten characters.
    pub fn meets_minimum_validity(&self) -> bool {
        !self.slug.is_empty()
            && !self.title.trim().is_empty()
            && !self.images.is_empty()
            && self.non_empty_spec_count() >= 2
            && self.description.chars().count() > 10
    }

    /// Records below this threshold are candidates for the enrichment pass.
    pub fn needs_enrichment(&self) -> bool {
        self.non_empty_spec_count() < 2
            || self.description.chars().count() <= 60
            || self.images.is_empty()
    }
}

fn overwrite_opt(current: &mut Option<String>, incoming: &Option<String>) {
    if let Some(v) = incoming {
        if !v.trim().is_empty() {
            *current = Some(v.clone());
        }
    }
}

fn merge_opt(current: &mut Option<String>, incoming: &Option<String>) {
    let empty = current
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);
    if empty {
        if let Some(v) = incoming {
            if !v.trim().is_empty() {
                *current = Some(v.clone());
            }
        }
    }
}

/// Extraction result for a single supplier page, before any image has been
/// downloaded. `image_urls` still point at the supplier's CDN.
#[derive(Debug, Clone, Default)]
pub struct RawProduct {
    pub source_url: String,
    pub title: String,
    pub slug: String,
    pub price: Option<u64>,
    pub price_raw: String,
    pub description: String,
    pub specs: BTreeMap<String, String>,
    pub image_urls: Vec<String>,
    pub brand: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub category_slug: Option<String>,
    pub subcategory_slug: Option<String>,
    /// Breadcrumb trail as (slug, name) pairs, outermost first. The import
    /// engine feeds these into the category registry.
    pub category_trail: Vec<(String, String)>,
}

impl RawProduct {
    /// Turn an extraction into a persistable record with the given local
    /// image paths. `created_at` is stamped by the store on first insert but
    /// needs a value here for the insert case.
    pub fn into_record(self, images: Vec<String>, now: DateTime<Utc>) -> ProductRecord {
        ProductRecord {
            slug: self.slug,
            title: self.title,
            price: self.price,
            description: self.description,
            specs: self.specs,
            images,
            brand: none_if_blank(self.brand),
            material: none_if_blank(self.material),
            color: none_if_blank(self.color),
            category_slug: self.category_slug,
            subcategory_slug: self.subcategory_slug,
            source_url: Some(self.source_url),
            created_at: now,
        }
    }
}

fn none_if_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slug: &str) -> ProductRecord {
        ProductRecord {
            slug: slug.to_string(),
            title: "Тарелка".to_string(),
            price: None,
            description: String::new(),
            specs: BTreeMap::new(),
            images: Vec::new(),
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
    fn merge_never_blanks_populated_fields() {
        let mut a = record("tarelka");
        a.description = "Описание из первого прохода.".to_string();
        a.price = Some(4500);
        a.specs.insert("Материал".into(), "Фарфор".into());

        let mut sparse = record("tarelka");
        sparse.specs.insert("Материал".into(), String::new());

        a.merge_from(&sparse);
        assert_eq!(a.description, "Описание из первого прохода.");
        assert_eq!(a.price, Some(4500));
        assert_eq!(a.specs.get("Материал").map(String::as_str), Some("Фарфор"));
    }

    #[test]
    fn merge_fills_missing_fields() {
        let mut a = record("tarelka");
        let mut b = record("tarelka");
        b.price = Some(12500);
        b.brand = Some("Luminarc".into());
        b.specs.insert("Цвет".into(), "Белый".into());

        a.merge_from(&b);
        assert_eq!(a.price, Some(12500));
        assert_eq!(a.brand.as_deref(), Some("Luminarc"));
        assert_eq!(a.specs.get("Цвет").map(String::as_str), Some("Белый"));
    }

    #[test]
    fn merge_update_overwrites_with_fresh_data_but_not_with_blanks() {
        let mut stored = record("tarelka");
        stored.description = "Старое описание товара.".to_string();
        stored.price = Some(1000);
        stored.images.push("/products/tarelka/main.jpg".into());
        stored.specs.insert("Материал".into(), "Фаянс".into());
        let created = stored.created_at;

        let mut fresh = record("tarelka");
        fresh.price = Some(1200);
        fresh.specs.insert("Материал".into(), "Фарфор".into());

        stored.merge_update(&fresh);
        assert_eq!(stored.price, Some(1200));
        assert_eq!(stored.specs.get("Материал").map(String::as_str), Some("Фарфор"));
        // fresh record had no description/images: stored values survive
        assert_eq!(stored.description, "Старое описание товара.");
        assert_eq!(stored.images.len(), 1);
        assert_eq!(stored.created_at, created);
    }

    #[test]
    fn richness_cascade_prefers_specs_then_images_then_description() {
        // A: 3 specs, 1 image, 50-char description
        let mut a = record("x");
        for i in 0..3 {
            a.specs.insert(format!("k{i}"), "v".into());
        }
        a.images.push("/products/x/main.jpg".into());
        a.description = "a".repeat(50);

        // B: 5 specs, 1 image, 30-char description; specs win first
        let mut b = record("x");
        for i in 0..5 {
            b.specs.insert(format!("k{i}"), "v".into());
        }
        b.images.push("/products/x/main.jpg".into());
        b.description = "a".repeat(30);

        assert!(b.is_richer_than(&a));
        assert!(!a.is_richer_than(&b));

        // Equal specs: image count decides
        let mut c = a.clone();
        c.images.push("/products/x/alt1.jpg".into());
        assert!(c.is_richer_than(&a));

        // Equal specs and images: description length decides
        let mut d = a.clone();
        d.description = "a".repeat(60);
        assert!(d.is_richer_than(&a));
    }

    #[test]
    fn minimum_validity_requires_all_fields() {
        let mut r = record("x");
        assert!(!r.meets_minimum_validity());
        r.images.push("/products/x/main.jpg".into());
        r.specs.insert("Материал".into(), "Фарфор".into());
        r.specs.insert("Цвет".into(), "Белый".into());
        r.description = "Достаточно длинное описание.".into();
        assert!(r.meets_minimum_validity());

        let mut no_images = r.clone();
        no_images.images.clear();
        assert!(!no_images.meets_minimum_validity());

        let mut one_spec = r.clone();
        one_spec.specs.remove("Цвет");
        assert!(!one_spec.meets_minimum_validity());
    }
}
