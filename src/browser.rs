use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use tracing::{debug, warn};

/// Full-page captures taller than this are cut off.
const MAX_CAPTURE_HEIGHT: f64 = 16_384.0;

/// Shared headless Chrome used for screenshots.
///
/// The browser is launched on first use and relaunched once when it stops
/// handing out tabs. All methods block; async callers go through
/// [`BrowserPool::screenshot`], which moves the work to the blocking pool.
#[derive(Clone, Default)]
pub struct BrowserPool {
    browser: Arc<Mutex<Option<Browser>>>,
}

fn launch() -> Result<Browser> {
    Browser::new(
        LaunchOptionsBuilder::default()
            .headless(true)
            .window_size(Some((1280, 800)))
            .args(vec![
                std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
                std::ffi::OsStr::new("--hide-scrollbars"),
                std::ffi::OsStr::new("--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"),
            ])
            .build()
            .context("Invalid Chrome launch options")?,
    )
    .context("Failed to launch headless Chrome")
}

impl BrowserPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_tab(&self) -> Result<Arc<Tab>> {
        let mut guard = self
            .browser
            .lock()
            .map_err(|_| anyhow!("Browser lock poisoned"))?;

        if guard.is_none() {
            debug!("Launching headless browser");
            *guard = Some(launch()?);
        }
        let Some(browser) = guard.as_ref() else {
            return Err(anyhow!("Browser unavailable"));
        };

        match browser.new_tab() {
            Ok(tab) => Ok(tab),
            Err(e) => {
                warn!("Failed to create tab, attempting to recreate browser: {}", e);
                let browser = launch().context("Failed to recreate browser")?;
                let tab = browser
                    .new_tab()
                    .context("Failed to create new browser tab after recreation")?;
                *guard = Some(browser);
                debug!("Browser recreated successfully");
                Ok(tab)
            }
        }
    }

    /// Captures `url` (http(s) or `file://`) as a full-page PNG at `path`.
    pub async fn screenshot(&self, url: String, path: PathBuf) -> Result<PathBuf> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.capture(&url, path))
            .await
            .context("Screenshot task failed")?
    }

    fn capture(&self, url: &str, path: PathBuf) -> Result<PathBuf> {
        let tab = self.open_tab()?;

        let result = (|| -> Result<PathBuf> {
            tab.navigate_to(url)
                .with_context(|| format!("Failed to navigate to {}", url))?;
            tab.wait_until_navigated()
                .with_context(|| format!("Timed out loading {}", url))?;
            wait_for_page_load(&tab);

            let png = tab
                .capture_screenshot(
                    Page::CaptureScreenshotFormatOption::Png,
                    None,
                    full_page_clip(&tab),
                    true,
                )
                .context("Failed to capture screenshot")?;
            std::fs::write(&path, png)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(path)
        })();

        // Always close the tab, even if there was an error
        let _ = tab.close_target();

        result
    }
}

fn wait_for_page_load(tab: &Tab) {
    let _ = tab.wait_for_element("body");
    let _ = tab.evaluate(
        "new Promise(resolve => {
            if (document.readyState === 'complete') {
                resolve(true);
            } else {
                window.addEventListener('load', () => resolve(true));
                setTimeout(() => resolve(false), 5000);
            }
        })",
        true,
    );
    // late images and web fonts
    std::thread::sleep(Duration::from_millis(500));
}

/// Clip covering the whole document, or `None` to fall back to the viewport.
fn full_page_clip(tab: &Tab) -> Option<Page::Viewport> {
    let value = tab
        .evaluate(
            "JSON.stringify([
                Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0),
                Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)
            ])",
            false,
        )
        .ok()?
        .value?;
    let [width, height]: [f64; 2] = serde_json::from_str(value.as_str()?).ok()?;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some(Page::Viewport {
        x: 0.0,
        y: 0.0,
        width,
        height: height.min(MAX_CAPTURE_HEIGHT),
        scale: 1.0,
    })
}
