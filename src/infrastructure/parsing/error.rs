//! Typed errors for HTML extraction
//!
//! Extraction shortfalls (missing specs, short descriptions) are validity
//! flags, not errors; these variants cover the cases where a page cannot be
//! treated as a product source at all.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParsingError {
    #[error("required field '{field}' not found in HTML")]
    RequiredFieldMissing { field: String },

    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("page at {url} is not a product page")]
    NotAProductPage { url: String },

    #[error("URL resolution failed for '{url}': {reason}")]
    UrlResolutionFailed { url: String, reason: String },
}

impl ParsingError {
    pub fn required_field_missing(field: &str) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
        }
    }

    pub fn not_a_product_page(url: &str) -> Self {
        Self::NotAProductPage {
            url: url.to_string(),
        }
    }

    /// Whether a caller may keep going with other pages after this error.
    /// Selector configuration problems are programming/config errors and
    /// abort the run; everything else is a per-page condition.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidSelector { .. })
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
