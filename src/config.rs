//! Runtime settings for the acquisition pipeline.
//!
//! Settings come from an optional YAML file; every field has a default so an
//! empty or missing file is valid. CLI flags override individual fields after
//! loading (see `main`).
//!
//! ```yaml
//! rate_limit_delay_secs: 3.0
//! max_concurrency: 3
//! max_urls_per_batch: 10
//! tiers: [api, direct, rendered]
//! profile_api_key: null
//! chromium_path: /usr/bin/chromium
//! ```

use crate::batch::DEFAULT_CONCURRENCY;
use crate::gate::DEFAULT_MIN_DELAY;
use crate::research::DEFAULT_SEARCH_ENDPOINT;
use crate::scrapers::DEFAULT_MIN_CONTENT_BYTES;
use crate::scrapers::api::DEFAULT_ENDPOINT;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

/// Longest accepted gap between acquisitions.
pub const MAX_RATE_LIMIT_DELAY_SECS: f64 = 3600.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// A network tier that can appear in the configured chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Api,
    Direct,
    Rendered,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minimum spacing between acquisitions against the profile host.
    pub rate_limit_delay_secs: f64,
    /// How many URLs may be mid-acquisition at once.
    pub max_concurrency: usize,
    pub max_urls_per_batch: usize,
    /// Credential for the structured-API tier. Absence is reported per URL.
    pub profile_api_key: Option<String>,
    pub profile_api_endpoint: String,
    /// Tier chain, highest priority first.
    pub tiers: Vec<TierKind>,
    pub chromium_path: Option<PathBuf>,
    pub min_content_bytes: usize,
    pub search_endpoint: String,
    /// Name of the `awful_aj` chat template used for openers.
    pub llm_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rate_limit_delay_secs: DEFAULT_MIN_DELAY.as_secs_f64(),
            max_concurrency: DEFAULT_CONCURRENCY,
            max_urls_per_batch: 10,
            profile_api_key: None,
            profile_api_endpoint: DEFAULT_ENDPOINT.to_string(),
            tiers: vec![TierKind::Api, TierKind::Direct, TierKind::Rendered],
            chromium_path: None,
            min_content_bytes: DEFAULT_MIN_CONTENT_BYTES,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            llm_template: "opener".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let path_str = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path_str.clone(),
            source,
        })?;
        let settings = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path_str.clone(),
            source,
        })?;
        info!(path = %path_str, tiers = ?settings.tiers, "Loaded settings");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate_limit_delay_secs.is_finite() || self.rate_limit_delay_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rate_limit_delay_secs must be a non-negative number, got {}",
                self.rate_limit_delay_secs
            )));
        }
        if self.rate_limit_delay_secs > MAX_RATE_LIMIT_DELAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "rate_limit_delay_secs must be at most {MAX_RATE_LIMIT_DELAY_SECS}, got {}",
                self.rate_limit_delay_secs
            )));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".to_string()));
        }
        if self.max_urls_per_batch == 0 {
            return Err(ConfigError::Invalid("max_urls_per_batch must be at least 1".to_string()));
        }
        if self.tiers.is_empty() {
            return Err(ConfigError::Invalid("at least one tier must be configured".to_string()));
        }
        let unique: HashSet<_> = self.tiers.iter().collect();
        if unique.len() != self.tiers.len() {
            return Err(ConfigError::Invalid(format!("duplicate tier in {:?}", self.tiers)));
        }
        Ok(())
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_delay_secs)
    }
}
