//! Domain module - core catalog entities and rules
//!
//! This module contains the product record, slug derivation, the category
//! registry and the storefront-facing query functions. Nothing here touches
//! the network or the filesystem.

pub mod category;
pub mod product;
pub mod query;
pub mod slug;

// Re-export commonly used items for convenience
pub use category::{CategoryNode, CategoryRegistry};
pub use product::{ProductRecord, RawProduct};
pub use query::{facet_counts, filter_products, FacetCounts, ProductFilter};
pub use slug::slugify;
