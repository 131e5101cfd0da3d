//! Sitemap discovery strategy
//!
//! Streams the supplier's sitemap XML (including sitemap-of-sitemaps
//! indirection) and returns the page URLs whose path falls under the
//! configured catalog prefix.

use crate::infrastructure::http_client::HttpClient;
use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{info, warn};
use url::Url;

/// Parsed `<loc>` entries of one sitemap document, split into page URLs and
/// nested sitemap URLs.
#[derive(Debug, Default, PartialEq)]
pub struct SitemapDocument {
    pub pages: Vec<String>,
    pub nested: Vec<String>,
}

/// Stream-parse a sitemap or sitemap index. Namespaced element names are
/// matched by suffix so `sm:loc` and `loc` both count.
pub fn parse_sitemap(xml: &str) -> SitemapDocument {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_loc = false;
    let mut saw_index = false;
    let mut locs: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.name().as_ref().ends_with(b"sitemapindex") {
                    saw_index = true;
                } else if e.name().as_ref().ends_with(b"loc") {
                    in_loc = true;
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref().ends_with(b"loc") {
                    in_loc = false;
                }
            }
            Ok(Event::Text(t)) => {
                if in_loc {
                    if let Ok(text) = t.unescape() {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            locs.push(text);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                warn!("sitemap XML error, keeping entries parsed so far: {}", err);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    if saw_index {
        SitemapDocument {
            pages: Vec::new(),
            nested: locs,
        }
    } else {
        SitemapDocument {
            pages: locs,
            nested: Vec::new(),
        }
    }
}

/// Whether a URL's path starts with the scope prefix. Unparseable URLs fall
/// back to a substring check, mirroring lenient sitemap entries.
pub fn in_scope(url: &str, prefix: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().starts_with(prefix),
        Err(_) => url.contains(prefix),
    }
}

/// Fetch the sitemap entry point and resolve one level of index
/// indirection, returning the deduplicated in-scope URL set.
pub async fn collect_product_urls(
    http: &HttpClient,
    sitemap_url: &str,
    prefix: &str,
) -> Result<Vec<String>> {
    let root_xml = http.fetch_text(sitemap_url).await?;
    let root = parse_sitemap(&root_xml);

    let mut urls: Vec<String> = Vec::new();
    let push_unique = |candidate: String, urls: &mut Vec<String>| {
        if in_scope(&candidate, prefix) && !urls.contains(&candidate) {
            urls.push(candidate);
        }
    };

    for page in root.pages {
        push_unique(page, &mut urls);
    }

    for shard_url in root.nested {
        match http.fetch_text(&shard_url).await {
            Ok(xml) => {
                for page in parse_sitemap(&xml).pages {
                    push_unique(page, &mut urls);
                }
            }
            // partial-failure tolerant: a broken shard loses its URLs only
            Err(err) => warn!("skipping sitemap shard {}: {:#}", shard_url, err),
        }
    }

    info!("sitemap yielded {} in-scope URLs", urls.len());
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_pages() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://supplier.example/catalog/plates/</loc></url>
              <url><loc>https://supplier.example/about/</loc></url>
            </urlset>"#;
        let doc = parse_sitemap(xml);
        assert_eq!(doc.pages.len(), 2);
        assert!(doc.nested.is_empty());
    }

    #[test]
    fn parses_sitemap_index_as_nested() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://supplier.example/sitemap-products.xml.gz</loc></sitemap>
              <sitemap><loc>https://supplier.example/sitemap-pages.xml</loc></sitemap>
            </sitemapindex>"#;
        let doc = parse_sitemap(xml);
        assert!(doc.pages.is_empty());
        assert_eq!(doc.nested.len(), 2);
        assert!(doc.nested[0].ends_with(".gz"));
    }

    #[test]
    fn scope_filter_uses_url_path() {
        assert!(in_scope("https://supplier.example/catalog/plates/", "/catalog/"));
        assert!(!in_scope("https://supplier.example/blog/post/", "/catalog/"));
        // unparseable input falls back to substring
        assert!(in_scope("not a url /catalog/ thing", "/catalog/"));
    }

    #[test]
    fn malformed_xml_keeps_prior_entries() {
        let xml = "<urlset><url><loc>https://supplier.example/catalog/a/</loc></url><url><loc>";
        let doc = parse_sitemap(xml);
        assert_eq!(doc.pages, vec!["https://supplier.example/catalog/a/".to_string()]);
    }
}
