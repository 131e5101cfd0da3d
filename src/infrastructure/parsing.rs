//! HTML extraction for the supplier's catalog
//!
//! Selector cascades, text sanitation and the two page parsers (product
//! detail and listing). Parsing is fully synchronous; fetch first, then
//! hand the HTML string over.

pub mod error;
pub mod listing_parser;
pub mod product_parser;
pub mod selectors;
pub mod text;

pub use error::{ParsingError, ParsingResult};
pub use listing_parser::{ListingParser, TileCandidate};
pub use product_parser::{category_from_url, ProductPageParser, FALLBACK_TITLE};
pub use selectors::SelectorConfig;
pub use text::{clamp_sentences, collapse_ws, normalize_case, parse_price, sanitize_text};
