//! Read interface consumed by the storefront
//!
//! The storefront never writes; it reads persisted records through these
//! filter and facet functions. This is the one contract the pipeline keeps
//! stable for downstream consumers.

use crate::domain::product::ProductRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter criteria mirroring the storefront's query parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub brand: Option<String>,
    pub price_min: Option<u64>,
    pub price_max: Option<u64>,
    /// Case-insensitive substring match over title and description.
    pub query: Option<String>,
}

impl ProductFilter {
    fn matches(&self, record: &ProductRecord) -> bool {
        if let Some(category) = &self.category {
            if record.category_slug.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(subcategory) = &self.subcategory {
            if record.subcategory_slug.as_deref() != Some(subcategory.as_str()) {
                return false;
            }
        }
        if !opt_eq_ignore_case(&self.material, &record.material) {
            return false;
        }
        if !opt_eq_ignore_case(&self.color, &record.color) {
            return false;
        }
        if !opt_eq_ignore_case(&self.brand, &record.brand) {
            return false;
        }
        if let Some(min) = self.price_min {
            match record.price {
                Some(price) if price >= min => {}
                _ => return false,
            }
        }
        if let Some(max) = self.price_max {
            match record.price {
                Some(price) if price <= max => {}
                _ => return false,
            }
        }
        if let Some(q) = &self.query {
            let needle = q.trim().to_lowercase();
            if !needle.is_empty() {
                let haystack =
                    format!("{} {}", record.title, record.description).to_lowercase();
                if !haystack.contains(&needle) {
                    return false;
                }
            }
        }
        true
    }
}

fn opt_eq_ignore_case(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        None => true,
        Some(w) => actual
            .as_deref()
            .map(|a| a.eq_ignore_ascii_case(w) || a.to_lowercase() == w.to_lowercase())
            .unwrap_or(false),
    }
}

/// Apply a filter over the full record set, preserving store order.
pub fn filter_products<'a>(
    records: &'a [ProductRecord],
    filter: &ProductFilter,
) -> Vec<&'a ProductRecord> {
    records.iter().filter(|r| filter.matches(r)).collect()
}

pub fn find_by_slug<'a>(records: &'a [ProductRecord], slug: &str) -> Option<&'a ProductRecord> {
    records.iter().find(|r| r.slug == slug)
}

/// Value -> count aggregates for each filterable dimension.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FacetCounts {
    pub categories: BTreeMap<String, usize>,
    pub materials: BTreeMap<String, usize>,
    pub colors: BTreeMap<String, usize>,
    pub brands: BTreeMap<String, usize>,
}

/// Count facet values across the record set. Material, color and brand are
/// lowercased so differently-cased source values land in one bucket.
pub fn facet_counts(records: &[ProductRecord]) -> FacetCounts {
    let mut facets = FacetCounts::default();
    for record in records {
        if let Some(category) = &record.category_slug {
            *facets.categories.entry(category.clone()).or_default() += 1;
        }
        for (field, bucket) in [
            (&record.material, &mut facets.materials),
            (&record.color, &mut facets.colors),
            (&record.brand, &mut facets.brands),
        ] {
            if let Some(value) = field {
                let normalized = value.trim().to_lowercase();
                if !normalized.is_empty() {
                    *bucket.entry(normalized).or_default() += 1;
                }
            }
        }
    }
    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample(slug: &str, material: &str, price: Option<u64>) -> ProductRecord {
        ProductRecord {
            slug: slug.to_string(),
            title: format!("Товар {slug}"),
            price,
            description: "Описание товара для витрины.".to_string(),
            specs: BTreeMap::new(),
            images: vec![format!("/products/{slug}/main.jpg")],
            brand: Some("Luminarc".to_string()),
            material: Some(material.to_string()),
            color: Some("Белый".to_string()),
            category_slug: Some("plates".to_string()),
            subcategory_slug: None,
            source_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn filters_by_material_case_insensitive() {
        let records = vec![sample("a", "Фарфор", Some(1000)), sample("b", "Стекло", None)];
        let filter = ProductFilter {
            material: Some("фарфор".to_string()),
            ..Default::default()
        };
        let hits = filter_products(&records, &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "a");
    }

    #[test]
    fn price_range_excludes_unknown_prices() {
        let records = vec![sample("a", "Фарфор", Some(1000)), sample("b", "Стекло", None)];
        let filter = ProductFilter {
            price_min: Some(500),
            ..Default::default()
        };
        let hits = filter_products(&records, &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "a");
    }

    #[test]
    fn text_query_searches_title_and_description() {
        let records = vec![sample("tarelka", "Фарфор", None)];
        let filter = ProductFilter {
            query: Some("ТОВАР".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_products(&records, &filter).len(), 1);
    }

    #[test]
    fn facets_bucket_case_variants_together() {
        let mut records = vec![sample("a", "Фарфор", None), sample("b", "фарфор", None)];
        records[1].brand = Some("LUMINARC".to_string());
        let facets = facet_counts(&records);
        assert_eq!(facets.materials.get("фарфор"), Some(&2));
        assert_eq!(facets.brands.get("luminarc"), Some(&2));
        assert_eq!(facets.categories.get("plates"), Some(&2));
    }
}
