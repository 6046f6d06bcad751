//! ImageFlow
//!
//! An HTML-to-image conversion service backed by headless Chrome. The library
//! exposes the pieces the `imageflow` binary wires together: bearer-token
//! authentication, validation of external images referenced by the markup,
//! and a worker pool that drives Chrome to rasterize HTML into PNG or JPEG.
//!
//! # Example
//!
//! ```no_run
//! use imageflow::{ImageFormat, RenderConfig, RenderOptions};
//! use imageflow::pool::RenderPool;
//!
//! # async fn run() -> imageflow::Result<()> {
//! let pool = RenderPool::new(RenderConfig::default(), 2);
//! let options = RenderOptions::new(800, 600, ImageFormat::Png, 90)?;
//! let bytes = pool.render("<h1>Hello</h1>".to_string(), options).await?;
//! assert_eq!(&bytes[0..8], b"\x89PNG\r\n\x1a\n");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

pub mod error;
pub use error::{Error, Result};

pub mod auth;
pub mod pool;
pub mod render;
pub mod server;
pub mod validate;

/// Largest viewport dimension the service will render
pub const MAX_DIMENSION: u32 = 8192;

/// Quality applied to JPEG output when the request does not specify one
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Configuration for the Chrome render backend
///
/// The defaults mirror what the hosted service ships with: a mainstream
/// desktop user agent and request headers that keep image CDNs from serving
/// bot-detection pages instead of pixels.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// User agent string the browser presents while loading external resources
    pub user_agent: String,
    /// Extra HTTP headers applied to every browser request
    pub headers: HashMap<String, String>,
    /// Time budget for a single render in milliseconds
    pub timeout_ms: u64,
    /// Poll interval while waiting for external images to finish loading
    pub settle_ms: u64,
    /// Explicit Chrome binary path; `None` lets the launcher discover one
    pub chrome_path: Option<PathBuf>,
    /// Disable the Chrome sandbox (required inside most containers)
    pub no_sandbox: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8".to_string(),
        );
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.9".to_string());

        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            headers,
            timeout_ms: 30000,
            settle_ms: 500,
            chrome_path: None,
            no_sandbox: false,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Parse a wire format name, case-insensitively
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(Error::InvalidParam(format!(
                "Invalid format '{}'. Must be one of: png, jpeg",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// Content type of the rendered bytes
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Validated options for a single render
///
/// Built from the wire request once per conversion; `quality` is only
/// retained for JPEG output since PNG capture does not take one.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub viewport: Viewport,
    pub format: ImageFormat,
    pub quality: Option<u8>,
}

impl RenderOptions {
    /// Validate raw request parameters into render options
    pub fn new(width: u32, height: u32, format: ImageFormat, quality: u8) -> Result<Self> {
        if width == 0 || width > MAX_DIMENSION {
            return Err(Error::InvalidParam(format!(
                "Width must be between 1 and {}",
                MAX_DIMENSION
            )));
        }
        if height == 0 || height > MAX_DIMENSION {
            return Err(Error::InvalidParam(format!(
                "Height must be between 1 and {}",
                MAX_DIMENSION
            )));
        }
        if !(1..=100).contains(&quality) {
            return Err(Error::InvalidParam(
                "Quality must be between 1 and 100".to_string(),
            ));
        }

        Ok(Self {
            viewport: Viewport { width, height },
            format,
            quality: match format {
                ImageFormat::Jpeg => Some(quality),
                ImageFormat::Png => None,
            },
        })
    }
}
