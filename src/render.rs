//! Headless Chrome render backend
//!
//! Synchronous, one browser per job: the worker pool calls [`render_html`]
//! from dedicated threads, so blocking here never stalls the async server.

use crate::{Error, ImageFormat, RenderConfig, RenderOptions, Result};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use std::ffi::OsStr;
use std::time::{Duration, Instant};

/// Render HTML into image bytes with the requested viewport and format
///
/// Launches a fresh Chrome, loads the markup through a `data:` URL so the
/// browser's own network stack resolves external resources, and captures a
/// screenshot clipped to exactly the requested dimensions. The browser and
/// tab are owned by this call and dropped on every path, so no Chrome
/// process outlives the job.
pub fn render_html(config: &RenderConfig, html: &str, options: &RenderOptions) -> Result<Vec<u8>> {
    let args: Vec<&OsStr> = vec![
        OsStr::new("--disable-gpu"),
        OsStr::new("--disable-dev-shm-usage"),
    ];

    let mut builder = LaunchOptions::default_builder();
    builder
        .headless(true)
        .sandbox(!config.no_sandbox)
        .window_size(Some((options.viewport.width, options.viewport.height)))
        .args(args);
    if let Some(path) = &config.chrome_path {
        builder.path(Some(path.clone()));
    }
    let launch_options = builder
        .build()
        .map_err(|e| Error::Render(format!("Failed to build launch options: {}", e)))?;

    let browser = Browser::new(launch_options)
        .map_err(|e| Error::Render(format!("Failed to launch browser: {}", e)))?;

    let tab = browser
        .new_tab()
        .map_err(|e| Error::Render(format!("Failed to create tab: {}", e)))?;

    tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

    tab.set_user_agent(&config.user_agent, None, None)
        .map_err(|e| Error::Render(format!("Failed to set user agent: {}", e)))?;

    if !config.headers.is_empty() {
        // headless_chrome expects a HashMap<&str, &str>
        let headers: std::collections::HashMap<&str, &str> = config
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        tab.set_extra_http_headers(headers)
            .map_err(|e| Error::Render(format!("Failed to set headers: {}", e)))?;
    }

    // Carry the markup in a base64 data URL; the explicit charset keeps
    // non-ASCII content intact through the round trip.
    let encoded = base64::engine::general_purpose::STANDARD.encode(html);
    let data_url = format!("data:text/html;charset=utf-8;base64,{}", encoded);

    tab.navigate_to(&data_url)
        .map_err(|e| Error::Render(format!("Navigation failed: {}", e)))?;

    tab.wait_until_navigated()
        .map_err(|e| Error::Render(format!("Wait for navigation failed: {}", e)))?;

    // External images keep loading after navigation settles; capture only
    // once they have all finished (or the render budget runs out)
    wait_for_images(&tab, config)?;

    let (cdp_format, quality) = match options.format {
        ImageFormat::Png => (Page::CaptureScreenshotFormatOption::Png, None),
        ImageFormat::Jpeg => (
            Page::CaptureScreenshotFormatOption::Jpeg,
            options.quality.map(u32::from),
        ),
    };

    // Clip to the requested viewport so output dimensions always equal the
    // request, regardless of how tall the document laid out.
    let clip = Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: options.viewport.width as f64,
        height: options.viewport.height as f64,
        scale: 1.0,
    };

    let bytes = tab
        .capture_screenshot(cdp_format, quality, Some(clip), true)
        .map_err(|e| Error::Render(format!("Screenshot failed: {}", e)))?;

    debug!(
        "Rendered {}x{} {} ({} bytes)",
        options.viewport.width,
        options.viewport.height,
        options.format.as_str(),
        bytes.len()
    );

    Ok(bytes)
}

/// Poll until every image in the document has finished loading
///
/// `complete` is true once an image has loaded or errored, so a broken
/// reference cannot wait forever. `settle_ms` is the poll interval; passing
/// the render budget while images are still pending is a timeout.
fn wait_for_images(tab: &Tab, config: &RenderConfig) -> Result<()> {
    let poll = Duration::from_millis(config.settle_ms.max(50));
    let deadline = Instant::now() + Duration::from_millis(config.timeout_ms);

    loop {
        let eval = tab
            .evaluate("Array.from(document.images).every(i => i.complete)", false)
            .map_err(|e| Error::Render(format!("Image readiness check failed: {}", e)))?;
        let complete = eval.value.as_ref().and_then(|v| v.as_bool()).unwrap_or(true);
        if complete {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(config.timeout_ms));
        }
        std::thread::sleep(poll);
    }
}
