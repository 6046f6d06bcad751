//! External-image validation
//!
//! Before any markup reaches the browser, every external image it references
//! is checked against an extension allow-list and a guarded fetch. The policy
//! is reject-by-default: a missing extension, a redirect, a missing or
//! non-image content type, or an oversized (or unbounded) body all fail the
//! request with the offending URL, rather than letting the browser fetch
//! whatever it likes.

use crate::{Error, Result};
use futures::future::try_join_all;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Largest external image the service will let the browser load (500 MB)
pub const MAX_IMAGE_BYTES: u64 = 500 * 1024 * 1024;

/// Overall time budget for a single validation fetch, connection included
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// URL path extensions accepted for external images
pub const ALLOWED_EXTENSIONS: [&str; 8] =
    ["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico"];

/// Content types accepted from external image servers
pub const ALLOWED_MIME_TYPES: [&str; 9] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "image/x-icon",
    "image/vnd.microsoft.icon",
];

/// Validator for external images referenced by request HTML
pub struct ImageValidator {
    client: reqwest::Client,
    max_bytes: u64,
}

impl ImageValidator {
    pub fn new() -> Result<Self> {
        Self::with_limits(MAX_IMAGE_BYTES, FETCH_TIMEOUT)
    }

    /// Construct with a custom size cap (tests use a small one)
    pub fn with_max_bytes(max_bytes: u64) -> Result<Self> {
        Self::with_limits(max_bytes, FETCH_TIMEOUT)
    }

    /// Construct with custom size and time limits
    pub fn with_limits(max_bytes: u64, fetch_timeout: Duration) -> Result<Self> {
        // Redirects are never followed: a 3xx during validation rejects the
        // URL outright instead of chasing the chain. The overall timeout
        // covers the whole request including the body, so a stalled or
        // trickling server cannot hold a conversion open.
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| Error::Init(format!("Failed to build validation client: {}", e)))?;

        Ok(Self { client, max_bytes })
    }

    /// Extract external image URLs from markup
    ///
    /// Looks at `img[src]`, `img[srcset]` and `source[srcset]`. Only absolute
    /// `http`/`https` URLs count as external; `data:` URIs and relative
    /// references are left for the browser to resolve. Duplicates are dropped
    /// while preserving first-seen order.
    pub fn extract_image_urls(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let img = Selector::parse("img[src]").expect("static selector");
        let img_srcset = Selector::parse("img[srcset]").expect("static selector");
        let source_srcset = Selector::parse("source[srcset]").expect("static selector");

        let mut candidates: Vec<String> = Vec::new();

        for element in document.select(&img) {
            if let Some(src) = element.value().attr("src") {
                candidates.push(src.trim().to_string());
            }
        }
        for element in document.select(&img_srcset).chain(document.select(&source_srcset)) {
            if let Some(srcset) = element.value().attr("srcset") {
                // Each srcset entry is "<url> <descriptor>?", comma-separated
                for entry in srcset.split(',') {
                    if let Some(url) = entry.split_whitespace().next() {
                        candidates.push(url.to_string());
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| is_external(c))
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }

    /// Validate every external image referenced by `html`
    ///
    /// URLs are checked concurrently; the first failure fails the request.
    pub async fn validate_html(&self, html: &str) -> Result<()> {
        let urls = Self::extract_image_urls(html);
        if urls.is_empty() {
            return Ok(());
        }
        debug!("Validating {} external image(s)", urls.len());
        try_join_all(urls.iter().map(|u| self.validate_url(u))).await?;
        Ok(())
    }

    /// Validate a single external image URL
    pub async fn validate_url(&self, url: &str) -> Result<()> {
        check_extension(url)?;
        let result = self.check_remote(url).await;
        match &result {
            Ok(()) => debug!("Accepted external image: {}", url),
            Err(e) => warn!("Rejected external image: {}", e),
        }
        result
    }

    async fn check_remote(&self, url: &str) -> Result<()> {
        let response = self.client.get(url).send().await.map_err(|e| reject(url, format!("fetch failed: {}", e)))?;

        let status = response.status();
        if status.is_redirection() {
            return Err(reject(url, format!("redirected with status {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(reject(url, format!("fetch returned status {}", status.as_u16())));
        }

        // Content type must be present and in the allowed image family;
        // parameters like charset are stripped before the comparison.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase());
        match content_type {
            None => return Err(reject(url, "missing content type".to_string())),
            Some(ct) if !ALLOWED_MIME_TYPES.contains(&ct.as_str()) => {
                return Err(reject(url, format!("content type '{}' is not an allowed image type", ct)));
            }
            Some(_) => {}
        }

        // Declared length settles the size question without reading the body
        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(reject(
                    url,
                    format!("declared size {} exceeds the {} byte limit", declared, self.max_bytes),
                ));
            }
            return Ok(());
        }

        // No declared length: stream and count, bailing as soon as the
        // running total passes the cap
        let mut response = response;
        let mut total: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| reject(url, format!("error reading body: {}", e)))?
        {
            total += chunk.len() as u64;
            if total > self.max_bytes {
                return Err(reject(
                    url,
                    format!("streamed size exceeds the {} byte limit", self.max_bytes),
                ));
            }
        }

        Ok(())
    }
}

fn reject(url: &str, reason: String) -> Error {
    Error::DisallowedResource {
        url: url.to_string(),
        reason,
    }
}

/// Whether a reference is an absolute http/https URL
fn is_external(reference: &str) -> bool {
    match Url::parse(reference) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Check the URL path extension against the allow-list (no network)
///
/// Query strings and fragments do not count toward the extension; a URL
/// without one is rejected.
fn check_extension(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| reject(url, format!("invalid URL: {}", e)))?;
    let extension = std::path::Path::new(parsed.path())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(reject(url, format!("extension '{}' is not an allowed image format", ext))),
        None => Err(reject(url, "missing file extension".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_img_src() {
        let html = r#"<html><body>
            <img src="https://example.com/a.png">
            <img src="http://example.com/b.jpg" alt="b">
        </body></html>"#;
        let urls = ImageValidator::extract_image_urls(html);
        assert_eq!(
            urls,
            vec![
                "https://example.com/a.png".to_string(),
                "http://example.com/b.jpg".to_string()
            ]
        );
    }

    #[test]
    fn test_extract_srcset() {
        let html = r#"<picture>
            <source srcset="https://example.com/wide.webp 1024w, https://example.com/narrow.webp 640w">
            <img srcset="https://example.com/a.png 2x" src="https://example.com/a.png">
        </picture>"#;
        let urls = ImageValidator::extract_image_urls(html);
        assert!(urls.contains(&"https://example.com/wide.webp".to_string()));
        assert!(urls.contains(&"https://example.com/narrow.webp".to_string()));
        // src and srcset point at the same URL; deduplicated
        assert_eq!(
            urls.iter().filter(|u| u.ends_with("a.png")).count(),
            1
        );
    }

    #[test]
    fn test_extract_skips_non_external() {
        let html = r#"<body>
            <img src="data:image/png;base64,iVBORw0KGgo=">
            <img src="/relative/logo.png">
            <img src="logo.png">
        </body>"#;
        assert!(ImageValidator::extract_image_urls(html).is_empty());
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(check_extension("https://example.com/a.png").is_ok());
        assert!(check_extension("https://example.com/a.JPG").is_ok());
        assert!(check_extension("https://example.com/a.svg?v=2#frag").is_ok());

        assert!(check_extension("https://example.com/a.exe").is_err());
        assert!(check_extension("https://example.com/a").is_err());
        // The extension must come from the path, not the query string
        assert!(check_extension("https://example.com/a?name=b.png").is_err());
    }

    #[tokio::test]
    async fn test_disallowed_extension_rejects_without_fetch() {
        let validator = ImageValidator::new().unwrap();
        // Unroutable host: reaching the network would fail differently
        let err = validator
            .validate_url("https://invalid.invalid/file.txt")
            .await
            .unwrap_err();
        match err {
            Error::DisallowedResource { reason, .. } => {
                assert!(reason.contains("not an allowed image format"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
