//! Image pipeline: download, transcode, write under the product slug
//!
//! Every materialized image is decoded, resized to a bounded width (never
//! upscaled) and re-encoded as JPEG at a fixed quality. When no network
//! source works the fallback tiers kick in: a keyword image endpoint, then
//! a locally synthesized neutral placeholder, so a persisted product always
//! owns at least one raster asset on disk.

use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::retry::{run_with_retry, RetryPolicy};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_WIDTH: u32 = 800;
const JPEG_QUALITY: u8 = 82;
/// Neutral gray used for synthesized placeholders (#e5e7eb).
const PLACEHOLDER_RGB: [u8; 3] = [229, 231, 235];
/// Canonical file name per image slot.
const SLOT_NAMES: [&str; 3] = ["main.jpg", "alt1.jpg", "alt2.jpg"];

/// Downloads and transcodes product images into
/// `<asset_root>/products/<slug>/<slot>.jpg`.
pub struct ImagePipeline {
    asset_root: PathBuf,
    max_images: usize,
    /// Keyword-search endpoint used as the first fallback tier; `{query}`
    /// is replaced with the URL-encoded product name. Empty disables it.
    fallback_endpoint: String,
    retry: RetryPolicy,
}

impl ImagePipeline {
    pub fn new(asset_root: &Path, max_images: usize) -> Self {
        Self {
            asset_root: asset_root.to_path_buf(),
            max_images: max_images.clamp(1, SLOT_NAMES.len()),
            fallback_endpoint: "https://source.unsplash.com/featured/800x800/?{query}".to_string(),
            retry: RetryPolicy::new(3, Duration::from_millis(300)),
        }
    }

    pub fn without_network_fallback(mut self) -> Self {
        self.fallback_endpoint.clear();
        self
    }

    /// Materialize up to `max_images` local assets for a product.
    ///
    /// Returns content-relative paths (`/products/<slug>/main.jpg`, ...),
    /// each of which exists on disk at return time. The list is non-empty
    /// as long as the placeholder can be written.
    pub async fn materialize(
        &self,
        http: &HttpClient,
        image_urls: &[String],
        slug: &str,
        title: &str,
    ) -> Vec<String> {
        let dir = self.product_dir(slug);
        let mut written: Vec<String> = Vec::new();

        for url in image_urls {
            if written.len() >= self.max_images {
                break;
            }
            let slot = SLOT_NAMES[written.len()];
            match self.download_transcoded(http, url, &dir.join(slot)).await {
                Ok(()) => written.push(self.relative_path(slug, slot)),
                Err(err) => {
                    // one bad image never fails the product
                    warn!("image failed for {}: {} ({:#})", slug, url, err);
                }
            }
        }

        if written.is_empty() && !self.fallback_endpoint.is_empty() {
            let query: String = url_encode(title);
            let url = self.fallback_endpoint.replace("{query}", &query);
            let slot = SLOT_NAMES[0];
            if self
                .download_transcoded(http, &url, &dir.join(slot))
                .await
                .is_ok()
            {
                debug!("fallback image used for {}", slug);
                written.push(self.relative_path(slug, slot));
            }
        }

        if written.is_empty() {
            let slot = SLOT_NAMES[0];
            match self.write_placeholder(&dir.join(slot)).await {
                Ok(()) => {
                    debug!("placeholder synthesized for {}", slug);
                    written.push(self.relative_path(slug, slot));
                }
                Err(err) => warn!("placeholder write failed for {}: {:#}", slug, err),
            }
        }

        written
    }

    /// Resolve a content-relative image path to its on-disk location.
    pub fn disk_path(&self, relative: &str) -> PathBuf {
        self.asset_root.join(relative.trim_start_matches('/'))
    }

    fn product_dir(&self, slug: &str) -> PathBuf {
        self.asset_root.join("products").join(slug)
    }

    fn relative_path(&self, slug: &str, slot: &str) -> String {
        format!("/products/{slug}/{slot}")
    }

    async fn download_transcoded(
        &self,
        http: &HttpClient,
        url: &str,
        dest: &Path,
    ) -> Result<()> {
        let bytes = http.fetch_bytes(url).await?;
        let encoded = transcode(&bytes)
            .with_context(|| format!("failed to transcode image from {url}"))?;
        write_atomic(dest, &encoded, &self.retry).await
    }

    async fn write_placeholder(&self, dest: &Path) -> Result<()> {
        let encoded = encode_placeholder()?;
        write_atomic(dest, &encoded, &self.retry).await
    }
}

/// Decode, bound the width at `MAX_WIDTH` without upscaling, re-encode as
/// JPEG at the fixed quality.
pub fn transcode(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).context("failed to decode image")?;
    let resized = if decoded.width() > MAX_WIDTH {
        let height = (decoded.height() as u64 * MAX_WIDTH as u64 / decoded.width() as u64) as u32;
        decoded.resize(MAX_WIDTH, height.max(1), FilterType::Triangle)
    } else {
        decoded
    };

    encode_jpeg(&resized)
}

/// Synthesize the neutral solid-color placeholder entirely locally.
pub fn encode_placeholder() -> Result<Vec<u8>> {
    let buffer = RgbImage::from_pixel(MAX_WIDTH, MAX_WIDTH, Rgb(PLACEHOLDER_RGB));
    encode_jpeg(&DynamicImage::ImageRgb8(buffer))
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
        .context("failed to encode JPEG")?;
    Ok(out.into_inner())
}

async fn write_atomic(dest: &Path, bytes: &[u8], retry: &RetryPolicy) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp = dest.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    run_with_retry(retry, "image rename", || async {
        tokio::fs::rename(&tmp, dest).await
    })
    .await
    .with_context(|| format!("failed to move image into place at {}", dest.display()))?;
    Ok(())
}

fn url_encode(text: &str) -> String {
    let mut out = String::new();
    for byte in text.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
