//! Data models for acquired profiles and generated openers.
//!
//! - [`Tier`]: which source produced a profile (or that every source failed)
//! - [`ProfileRecord`]: the normalized result of acquiring one URL
//! - [`ResearchResult`]: search snippets gathered for one query
//! - [`OpenerResult`]: the per-URL output of a full run
//! - [`BatchReport`]: everything written out at the end of a run

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of tier labels a [`ProfileRecord`] can carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "api-tier")]
    Api,
    #[serde(rename = "direct-fetch-tier")]
    DirectFetch,
    #[serde(rename = "rendered-fetch-tier")]
    RenderedFetch,
    #[serde(rename = "manual")]
    Manual,
    #[default]
    #[serde(rename = "failed")]
    Failed,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Api => "api-tier",
            Tier::DirectFetch => "direct-fetch-tier",
            Tier::RenderedFetch => "rendered-fetch-tier",
            Tier::Manual => "manual",
            Tier::Failed => "failed",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized profile, built once per URL per run.
///
/// A record with [`Tier::Failed`] has an empty `name` and a non-empty `error`
/// holding the ordered diagnostic chain. Any other tier implies a non-empty
/// `name` and an empty `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Canonical profile URL.
    pub url: String,
    pub name: String,
    pub headline: String,
    pub summary: String,
    pub experience: String,
    pub education: String,
    pub skills: String,
    /// Visible text kept for diagnostics, capped at 2000 characters.
    pub raw_text: String,
    pub tier: Tier,
    /// Ordered failure reasons joined with a visible separator.
    pub error: String,
}

impl ProfileRecord {
    /// Terminal record for a URL that no tier could acquire.
    pub fn failed(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tier: Tier::Failed,
            error: detail.into(),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.tier == Tier::Failed
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Snippets returned by the search collector for a single query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchResult {
    pub query: String,
    pub snippets: Vec<String>,
}

/// What a run produces for one input URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenerResult {
    pub url: String,
    pub name: String,
    pub opener: String,
    pub research_snippets: Vec<String>,
    pub tier: Tier,
    pub error: String,
}

/// The document written at the end of a run.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchReport {
    /// RFC 3339 timestamp of when the report was assembled.
    pub generated_at: String,
    pub results: Vec<OpenerResult>,
}

/// Acquisition-only output, one record per input URL.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileReport {
    pub generated_at: String,
    pub profiles: Vec<ProfileRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_record_shape() {
        let record = ProfileRecord::failed("https://www.linkedin.com/in/x", "api-tier: no API key configured");
        assert!(record.is_failed());
        assert!(!record.has_name());
        assert_eq!(record.name, "");
        assert!(!record.error.is_empty());
        assert_eq!(record.tier.label(), "failed");
    }

    #[test]
    fn test_tier_serializes_to_label() {
        let json = serde_json::to_string(&Tier::DirectFetch).unwrap();
        assert_eq!(json, "\"direct-fetch-tier\"");
        let tier: Tier = serde_json::from_str("\"rendered-fetch-tier\"").unwrap();
        assert_eq!(tier, Tier::RenderedFetch);
    }

    #[test]
    fn test_tier_display_matches_serde() {
        for tier in [Tier::Api, Tier::DirectFetch, Tier::RenderedFetch, Tier::Manual, Tier::Failed] {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json.trim_matches('"'), tier.to_string());
        }
    }

    #[test]
    fn test_whitespace_name_is_not_a_name() {
        let record = ProfileRecord {
            name: "   ".to_string(),
            ..Default::default()
        };
        assert!(!record.has_name());
    }

    #[test]
    fn test_batch_report_serialization() {
        let report = BatchReport {
            generated_at: "2025-05-06T20:30:00Z".to_string(),
            results: vec![OpenerResult {
                url: "https://www.linkedin.com/in/alice".to_string(),
                name: "Alice Chen".to_string(),
                tier: Tier::DirectFetch,
                ..Default::default()
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("Alice Chen"));
        assert!(json.contains("direct-fetch-tier"));
    }
}
