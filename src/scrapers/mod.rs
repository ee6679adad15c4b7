//! Profile sources, one per acquisition tier.
//!
//! Every source implements [`ProfileSource`]: given a canonical URL it
//! reports a typed [`FetchOutcome`] and never lets a transport error escape.
//!
//! # Tiers
//!
//! | Tier | Module | Method | Notes |
//! |------|--------|--------|-------|
//! | `api-tier` | [`api`] | Third-party profile API | Needs a key; returns a finished record |
//! | `direct-fetch-tier` | [`direct`] | Plain HTTP GET | Browser-like headers, 15s timeout |
//! | `rendered-fetch-tier` | [`rendered`] | Headless Chromium | Blocks images/fonts/CSS, 20s budget |
//!
//! The manual tier is not a source: pasted text goes straight to the
//! extractor from the orchestrator.
//!
//! The order of sources is configuration; [`build_sources`] turns the
//! configured list into the chain the orchestrator walks.

pub mod api;
pub mod direct;
pub mod rendered;

use crate::config::{Settings, TierKind};
use crate::error::FetchError;
use crate::models::{ProfileRecord, Tier};
use async_trait::async_trait;
use crate::utils::truncate_for_log;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/125.0.0.0 Safari/537.36";

/// Below this many bytes a page is assumed to be a block page.
pub const DEFAULT_MIN_CONTENT_BYTES: usize = 500;

/// What a single tier attempt produced.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A finished record that bypasses the extractor.
    Profile(ProfileRecord),
    /// Raw markup for the extractor.
    Markup(String),
    Failed(FetchError),
}

/// A single tier of the acquisition chain.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// The label records from this source carry.
    fn tier(&self) -> Tier;

    /// Attempt to fetch `url`. Implementations apply their own timeout.
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Headers that make a plain GET look like a desktop browser.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers
}

/// True when a final URL or path points at a sign-in wall.
pub fn is_auth_wall(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.contains("authwall") || lower.contains("login")
}

/// Shared post-fetch checks for the markup tiers.
pub fn check_markup(final_path: &str, body: String, min_bytes: usize) -> FetchOutcome {
    if is_auth_wall(final_path) {
        return FetchOutcome::Failed(FetchError::AuthWallRedirect);
    }
    if body.len() < min_bytes {
        debug!(bytes = body.len(), preview = %truncate_for_log(&body, 200), "body under minimum size");
        return FetchOutcome::Failed(FetchError::ResponseTooShort(body.len()));
    }
    FetchOutcome::Markup(body)
}

/// Build the configured tier chain, in order.
///
/// Fails when an HTTP client cannot be constructed.
pub fn build_sources(settings: &Settings) -> Result<Vec<Box<dyn ProfileSource>>, reqwest::Error> {
    settings
        .tiers
        .iter()
        .map(|kind| -> Result<Box<dyn ProfileSource>, reqwest::Error> {
            let source: Box<dyn ProfileSource> = match kind {
                TierKind::Api => Box::new(api::ProfileApi::new(
                    settings.profile_api_endpoint.clone(),
                    settings.profile_api_key.clone(),
                )?),
                TierKind::Direct => Box::new(direct::DirectFetch::new(settings.min_content_bytes)?),
                TierKind::Rendered => Box::new(rendered::RenderedFetch::new(
                    settings.chromium_path.clone(),
                    settings.min_content_bytes,
                )),
            };
            Ok(source)
        })
        .collect()
}
