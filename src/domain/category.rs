//! Category forest discovered from breadcrumbs and URL paths
//!
//! The registry is an explicit state object threaded through the pipeline
//! rather than a module-level map, so a run owns exactly one instance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of the category forest. `parent_slug` is `None` for top-level
/// categories; a parent referenced here is not guaranteed to exist in the
/// registry yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub slug: String,
    pub name: String,
    pub parent_slug: Option<String>,
}

/// Append-only slug -> node map. The first registration of a slug wins;
/// later encounters never overwrite the stored name or parent.
#[derive(Debug, Default)]
pub struct CategoryRegistry {
    nodes: BTreeMap<String, CategoryNode>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single category. Returns true when the slug was new.
    pub fn register(&mut self, slug: &str, name: &str, parent_slug: Option<&str>) -> bool {
        if slug.is_empty() || self.nodes.contains_key(slug) {
            return false;
        }
        self.nodes.insert(
            slug.to_string(),
            CategoryNode {
                slug: slug.to_string(),
                name: name.to_string(),
                parent_slug: parent_slug.map(str::to_string),
            },
        );
        true
    }

    /// Register a breadcrumb trail of (slug, name) pairs, outermost first.
    /// Each crumb's parent is its immediate predecessor in the trail.
    pub fn register_trail(&mut self, trail: &[(String, String)]) {
        let mut parent: Option<&str> = None;
        for (slug, name) in trail {
            self.register(slug, name, parent);
            parent = Some(slug.as_str());
        }
    }

    pub fn get(&self, slug: &str) -> Option<&CategoryNode> {
        self.nodes.get(slug)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Snapshot of all nodes, ordered by slug for stable serialization.
    pub fn nodes(&self) -> Vec<CategoryNode> {
        self.nodes.values().cloned().collect()
    }
}

/// Build a display name from a slug when no breadcrumb name is available:
/// hyphens and underscores become spaces, each word capitalized.
pub fn prettify_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_wins() {
        let mut registry = CategoryRegistry::new();
        assert!(registry.register("plates", "Тарелки", None));
        assert!(!registry.register("plates", "Другое имя", Some("posuda")));

        let node = registry.get("plates").unwrap();
        assert_eq!(node.name, "Тарелки");
        assert_eq!(node.parent_slug, None);
    }

    #[test]
    fn trail_links_parents_in_order() {
        let mut registry = CategoryRegistry::new();
        registry.register_trail(&[
            ("stolovaya-posuda".into(), "Столовая посуда".into()),
            ("plates".into(), "Тарелки".into()),
        ]);

        assert_eq!(registry.get("stolovaya-posuda").unwrap().parent_slug, None);
        assert_eq!(
            registry.get("plates").unwrap().parent_slug.as_deref(),
            Some("stolovaya-posuda")
        );
    }

    #[test]
    fn prettify_slug_capitalizes_words() {
        assert_eq!(prettify_slug("stolovaya-posuda"), "Stolovaya Posuda");
        assert_eq!(prettify_slug("kruzhki"), "Kruzhki");
    }
}
