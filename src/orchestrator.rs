//! Tiered fallback for a single profile URL.
//!
//! One [`Orchestrator`] walks its sources strictly in order, stops at the
//! first record with a non-empty name, and otherwise returns a failed record
//! whose `error` lists every tier's reason in attempt order. Tier failures are
//! values here, never errors: the only way out of [`Orchestrator::acquire`] is
//! a [`ProfileRecord`].

use crate::error::FetchError;
use crate::extract::extract;
use crate::gate::RateGate;
use crate::models::{ProfileRecord, Tier};
use crate::scrapers::{FetchOutcome, ProfileSource};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Joins per-tier reasons in a failed record's `error`.
pub const REASON_SEPARATOR: &str = " → ";

static PROFILE_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://(?:www\.|[a-z]{2}\.)?linkedin\.com").unwrap());
static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").unwrap());

/// Normalize a profile URL: https scheme, one canonical host, no trailing slash.
///
/// Idempotent: canonicalizing a canonical URL returns it unchanged.
pub fn canonicalize(url: &str) -> String {
    let trimmed = url.trim();
    // Trailing slashes come off the part after the scheme only.
    let rest = SCHEME
        .find(trimmed)
        .map_or(trimmed, |m| &trimmed[m.end()..])
        .trim_end_matches('/');
    let with_scheme = format!("https://{rest}");
    PROFILE_HOST
        .replace(&with_scheme, "https://www.linkedin.com")
        .into_owned()
}

pub struct Orchestrator {
    gate: Arc<RateGate>,
    sources: Vec<Box<dyn ProfileSource>>,
}

impl Orchestrator {
    pub fn new(gate: Arc<RateGate>, sources: Vec<Box<dyn ProfileSource>>) -> Self {
        Self { gate, sources }
    }

    /// Tiers in the order they are attempted.
    pub fn tiers(&self) -> Vec<Tier> {
        self.sources.iter().map(|s| s.tier()).collect()
    }

    /// Acquire one profile.
    ///
    /// Manual text short-circuits the chain: no rate-gate wait, no network.
    /// Otherwise the gate is passed once and each source tried in turn.
    #[instrument(level = "info", skip(self, manual_text), fields(manual = manual_text.is_some()))]
    pub async fn acquire(&self, url: &str, manual_text: Option<&str>) -> ProfileRecord {
        let url = canonicalize(url);

        if let Some(text) = manual_text.filter(|t| !t.trim().is_empty()) {
            let record = extract(text, &url, Tier::Manual);
            if record.has_name() {
                info!(%url, name = %record.name, "profile taken from manual text");
                return record;
            }
            warn!(%url, "manual text produced no name");
            return ProfileRecord::failed(url, format!("{}: {}", Tier::Manual, FetchError::ParseProducedNoName));
        }

        self.gate.acquire().await;

        let mut reasons = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let tier = source.tier();
            let t0 = Instant::now();
            let outcome = source.fetch(&url).await;
            let elapsed_ms = t0.elapsed().as_millis() as u64;

            let failure = match outcome {
                FetchOutcome::Profile(record) if record.has_name() => {
                    info!(%url, %tier, elapsed_ms, name = %record.name, "profile acquired");
                    return record;
                }
                FetchOutcome::Profile(_) => FetchError::ParseProducedNoName,
                FetchOutcome::Markup(content) => {
                    let record = extract(&content, &url, tier);
                    if record.has_name() {
                        info!(%url, %tier, elapsed_ms, name = %record.name, "profile acquired");
                        return record;
                    }
                    FetchError::ParseProducedNoName
                }
                FetchOutcome::Failed(e) => e,
            };

            debug!(%url, %tier, elapsed_ms, reason = %failure, "tier failed; moving on");
            reasons.push(format!("{tier}: {failure}"));
        }

        let detail = if reasons.is_empty() {
            "all tiers failed".to_string()
        } else {
            reasons.iter().join(REASON_SEPARATOR)
        };
        warn!(%url, %detail, "every tier failed");
        ProfileRecord::failed(url, detail)
    }
}
