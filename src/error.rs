//! Typed failure reasons for a single acquisition tier.
//!
//! Every variant is recoverable: a tier that reports one of these simply hands
//! control to the next tier. The `Display` text is what ends up in a failed
//! record's diagnostic chain, so it stays short and free of raw transport
//! dumps.

use std::time::Duration;
use thiserror::Error;

/// Why a tier could not produce a usable profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The structured-API tier has no credential configured.
    #[error("no API key configured")]
    CredentialMissing,

    /// The provider reported that no such profile exists.
    #[error("profile not found (HTTP 404)")]
    NotFound,

    /// The provider refused the credential.
    #[error("credential rejected (HTTP {0})")]
    AuthRejected(u16),

    /// The provider throttled us.
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    /// Any other non-success status.
    #[error("HTTP {0}")]
    UnexpectedStatus(u16),

    /// The site bounced the request to a sign-in page.
    #[error("authwall redirect (cloud IP blocked)")]
    AuthWallRedirect,

    /// Body under the minimum size; almost certainly a block page.
    #[error("response too short ({0} bytes, likely blocked)")]
    ResponseTooShort(usize),

    /// The body arrived but could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    /// The headless browser runtime could not be started.
    #[error("renderer unavailable: {0}")]
    RendererUnavailable(String),

    /// Content was fetched but no extraction strategy found a name.
    #[error("got content but could not parse name")]
    ParseProducedNoName,

    /// A programming error caught at the per-URL boundary.
    #[error("internal fault: {0}")]
    InternalFault(String),
}

impl FetchError {
    /// Fold a `reqwest` error into a short, URL-free reason.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(timeout.as_secs())
        } else if e.is_decode() {
            FetchError::MalformedResponse(e.without_url().to_string())
        } else {
            FetchError::Transport(e.without_url().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_short_and_specific() {
        assert_eq!(FetchError::NotFound.to_string(), "profile not found (HTTP 404)");
        assert_eq!(FetchError::UnexpectedStatus(999).to_string(), "HTTP 999");
        assert_eq!(
            FetchError::ResponseTooShort(42).to_string(),
            "response too short (42 bytes, likely blocked)"
        );
        assert_eq!(
            FetchError::ParseProducedNoName.to_string(),
            "got content but could not parse name"
        );
    }

    #[test]
    fn test_timeout_reports_seconds() {
        assert_eq!(FetchError::Timeout(15).to_string(), "timed out after 15s");
    }
}
