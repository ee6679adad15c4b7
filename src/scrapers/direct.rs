//! Direct-fetch tier: a plain GET dressed up as a desktop browser.
//!
//! Public profile pages are sometimes served to anonymous clients with full
//! markup. More often, cloud IPs get bounced to an authwall or served a tiny
//! block page; both are detected and reported as typed failures.

use super::{FetchOutcome, ProfileSource, browser_headers, check_markup};
use crate::error::FetchError;
use crate::models::Tier;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};

const TIMEOUT: Duration = Duration::from_secs(15);

pub struct DirectFetch {
    client: reqwest::Client,
    min_bytes: usize,
}

impl DirectFetch {
    pub fn new(min_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .timeout(TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client, min_bytes })
    }

    async fn get(&self, url: &str) -> FetchOutcome {
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return FetchOutcome::Failed(FetchError::from_reqwest(e, TIMEOUT)),
        };

        let status = resp.status();
        if !status.is_success() {
            return FetchOutcome::Failed(FetchError::UnexpectedStatus(status.as_u16()));
        }

        let final_path = resp.url().path().to_string();
        match resp.text().await {
            Ok(body) => {
                debug!(bytes = body.len(), %final_path, "direct fetch returned body");
                check_markup(&final_path, body, self.min_bytes)
            }
            Err(e) => FetchOutcome::Failed(FetchError::from_reqwest(e, TIMEOUT)),
        }
    }
}

#[async_trait]
impl ProfileSource for DirectFetch {
    fn tier(&self) -> Tier {
        Tier::DirectFetch
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let outcome = self.get(url).await;
        if let FetchOutcome::Failed(e) = &outcome {
            info!(error = %e, "direct fetch failed");
        }
        outcome
    }
}
