//! Rendered-fetch tier: load the profile in headless Chromium.
//!
//! Slowest and heaviest tier. Each attempt launches its own browser, blocks
//! images, fonts and stylesheets, gives client-side rendering a moment to
//! settle, then reads back the rendered document.
//!
//! The browser process and its CDP handler task are owned by
//! [`BrowserSession`]; dropping the session (normal return, error, or the
//! attempt's timeout dropping the in-flight future) tears both down.

use super::{BROWSER_USER_AGENT, FetchOutcome, ProfileSource, check_markup};
use crate::error::FetchError;
use crate::models::Tier;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};
use url::Url;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(20);
const SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Whole-attempt budget: launch, navigation, settle and read-back.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(40);

const BLOCKED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "css", "woff", "woff2", "ttf"];

pub struct RenderedFetch {
    chromium_path: Option<PathBuf>,
    min_bytes: usize,
}

impl RenderedFetch {
    pub fn new(chromium_path: Option<PathBuf>, min_bytes: usize) -> Self {
        Self {
            chromium_path,
            min_bytes,
        }
    }

    async fn render(&self, url: &str) -> FetchOutcome {
        let session = match BrowserSession::launch(self.chromium_path.as_deref()).await {
            Ok(s) => s,
            Err(e) => return FetchOutcome::Failed(e),
        };
        let outcome = session.load(url, self.min_bytes).await;
        session.close().await;
        outcome
    }
}

#[async_trait]
impl ProfileSource for RenderedFetch {
    fn tier(&self) -> Tier {
        Tier::RenderedFetch
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let outcome = match timeout(ATTEMPT_TIMEOUT, self.render(url)).await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::Failed(FetchError::Timeout(ATTEMPT_TIMEOUT.as_secs())),
        };
        if let FetchOutcome::Failed(e) = &outcome {
            info!(error = %e, "rendered fetch failed");
        }
        outcome
    }
}

/// A running headless browser scoped to one tier attempt.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(chromium_path: Option<&Path>) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if let Some(path) = chromium_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(FetchError::RendererUnavailable)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::RendererUnavailable(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn load(&self, url: &str, min_bytes: usize) -> FetchOutcome {
        let page = match self.browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => return FetchOutcome::Failed(FetchError::Transport(e.to_string())),
        };

        let outcome = match load_page(&page, url, min_bytes).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Failed(FetchError::Transport(e.to_string())),
        };
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed");
        }
        outcome
    }

    /// Graceful shutdown for the normal path; `Drop` covers the rest.
    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "browser close failed");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "browser process did not exit cleanly");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn load_page(page: &Page, url: &str, min_bytes: usize) -> Result<FetchOutcome, CdpError> {
    page.execute(SetUserAgentOverrideParams::new(BROWSER_USER_AGENT)).await?;
    page.execute(SetBlockedUrLsParams::new(blocked_patterns())).await?;

    match timeout(NAVIGATION_TIMEOUT, page.goto(url)).await {
        Ok(result) => {
            result?;
        }
        Err(_) => return Ok(FetchOutcome::Failed(FetchError::Timeout(NAVIGATION_TIMEOUT.as_secs()))),
    }
    sleep(SETTLE_DELAY).await;

    let current = page.url().await?.unwrap_or_else(|| url.to_string());
    let path = Url::parse(&current)
        .map(|u| u.path().to_string())
        .unwrap_or(current);
    let html = page.content().await?;
    debug!(bytes = html.len(), %path, "rendered page read back");

    Ok(check_markup(&path, html, min_bytes))
}

fn blocked_patterns() -> Vec<String> {
    BLOCKED_EXTENSIONS
        .iter()
        .flat_map(|ext| [format!("*.{ext}"), format!("*.{ext}?*")])
        .collect()
}
