//! Structured profile API tier.
//!
//! Calls a third-party lookup endpoint that returns already-structured JSON:
//!
//! ```text
//! GET {endpoint}?url={profile_url}
//! Authorization: Bearer {key}
//! ```
//!
//! A successful lookup is mapped straight to a [`ProfileRecord`] and never
//! passes through the extractor. A missing key is a normal, reported failure.

use super::{FetchOutcome, ProfileSource};
use crate::error::FetchError;
use crate::models::{ProfileRecord, Tier};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_ENDPOINT: &str = "https://nubela.co/proxycurl/api/v2/linkedin";
const TIMEOUT: Duration = Duration::from_secs(60);

/// Response body of the lookup endpoint. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiProfile {
    full_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    headline: Option<String>,
    occupation: Option<String>,
    summary: Option<String>,
    experiences: Vec<ApiExperience>,
    education: Vec<ApiEducation>,
    skills: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiExperience {
    title: Option<String>,
    company: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiEducation {
    school: Option<String>,
    degree_name: Option<String>,
    field_of_study: Option<String>,
}

pub struct ProfileApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ProfileApi {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    async fn lookup(&self, url: &str, key: &str) -> Result<ProfileRecord, FetchError> {
        let request_url = format!("{}?url={}", self.endpoint, urlencoding::encode(url));
        let resp = self
            .client
            .get(&request_url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, TIMEOUT))?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound),
            s @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                return Err(FetchError::AuthRejected(s.as_u16()));
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
            s => return Err(FetchError::UnexpectedStatus(s.as_u16())),
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, TIMEOUT))?;
        let profile: ApiProfile = serde_json::from_str(&body).map_err(|e| {
            debug!(error = %e, body_preview = %truncate_for_log(&body, 300), "undecodable profile API body");
            FetchError::MalformedResponse(e.to_string())
        })?;
        debug!(bytes = body.len(), "decoded profile API response");

        Ok(profile.into_record(url))
    }
}

impl ApiProfile {
    fn into_record(self, url: &str) -> ProfileRecord {
        let name = match self.full_name.filter(|n| !n.trim().is_empty()) {
            Some(full) => full.trim().to_string(),
            None => [self.first_name, self.last_name]
                .into_iter()
                .flatten()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };

        let experience = self
            .experiences
            .iter()
            .filter_map(|e| match (e.title.as_deref(), e.company.as_deref()) {
                (Some(t), Some(c)) => Some(format!("{t} at {c}")),
                (Some(t), None) => Some(t.to_string()),
                (None, Some(c)) => Some(c.to_string()),
                (None, None) => None,
            })
            .collect::<Vec<_>>()
            .join("; ");

        let education = self
            .education
            .iter()
            .filter_map(|e| {
                let degree = [e.degree_name.as_deref(), e.field_of_study.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", ");
                match (degree.is_empty(), e.school.as_deref()) {
                    (false, Some(school)) => Some(format!("{degree} – {school}")),
                    (true, Some(school)) => Some(school.to_string()),
                    (false, None) => Some(degree),
                    (true, None) => None,
                }
            })
            .collect::<Vec<_>>()
            .join("; ");

        ProfileRecord {
            url: url.to_string(),
            name,
            headline: self
                .headline
                .filter(|h| !h.trim().is_empty())
                .or(self.occupation)
                .unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            experience,
            education,
            skills: self.skills.join(", "),
            raw_text: String::new(),
            tier: Tier::Api,
            error: String::new(),
        }
    }
}

#[async_trait]
impl ProfileSource for ProfileApi {
    fn tier(&self) -> Tier {
        Tier::Api
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let Some(key) = self.api_key.as_deref() else {
            return FetchOutcome::Failed(FetchError::CredentialMissing);
        };

        match self.lookup(url, key).await {
            Ok(record) => FetchOutcome::Profile(record),
            Err(e) => {
                info!(error = %e, "profile API lookup failed");
                FetchOutcome::Failed(e)
            }
        }
    }
}
