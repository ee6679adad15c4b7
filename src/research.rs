//! Best-effort web research for an acquired profile.
//!
//! Builds a handful of search queries from the profile's name and headline
//! and scrapes result snippets from a lightweight HTML search endpoint. Any
//! failure yields an empty result; research never blocks an opener.

use crate::models::{ProfileRecord, ResearchResult};
use clap::ValueEnum;
use futures::future::join_all;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_SNIPPETS_PER_QUERY: usize = 3;
const TIMEOUT: Duration = Duration::from_secs(15);

static SNIPPET: Lazy<Selector> = Lazy::new(|| Selector::parse(".result__snippet").unwrap());

/// How much searching to do per profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    /// No searching at all.
    Light,
    /// One query on name and headline.
    #[default]
    Medium,
    /// Name/headline plus news and interview queries.
    Deep,
}

/// Search queries for `profile` at `depth`.
pub fn build_queries(profile: &ProfileRecord, depth: ResearchDepth) -> Vec<String> {
    let name = profile.name.trim();
    let headline = profile.headline.trim();
    if name.is_empty() || depth == ResearchDepth::Light {
        return Vec::new();
    }

    let mut queries = vec![if headline.is_empty() {
        format!("\"{name}\"")
    } else {
        format!("\"{name}\" {headline}")
    }];

    if depth == ResearchDepth::Deep {
        if headline.is_empty() {
            queries.push(format!("\"{name}\" professional"));
            queries.push(format!("\"{name}\" news"));
        } else {
            queries.push(format!("\"{name}\" recent news OR announcement"));
            queries.push(format!("\"{name}\" interview OR podcast OR article"));
        }
    }
    queries
}

pub struct Researcher {
    client: reqwest::Client,
    endpoint: String,
}

impl Researcher {
    pub fn new(endpoint: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .default_headers(crate::scrapers::browser_headers())
            .timeout(TIMEOUT)
            .build()?;
        Ok(Self { client, endpoint })
    }

    /// Run every query for `profile` concurrently; keep those with snippets.
    #[instrument(level = "info", skip_all, fields(name = %profile.name, ?depth))]
    pub async fn research(&self, profile: &ProfileRecord, depth: ResearchDepth) -> Vec<ResearchResult> {
        let queries = build_queries(profile, depth);
        if queries.is_empty() {
            return Vec::new();
        }

        let results: Vec<ResearchResult> = join_all(queries.into_iter().map(|q| self.search(q)))
            .await
            .into_iter()
            .filter(|r| !r.snippets.is_empty())
            .collect();
        info!(queries_with_hits = results.len(), "Research complete");
        results
    }

    async fn search(&self, query: String) -> ResearchResult {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(&query));
        let body = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                debug!(%query, status = resp.status().as_u16(), "search returned non-success");
                String::new()
            }
            Err(e) => {
                debug!(%query, error = %e.without_url(), "search request failed");
                String::new()
            }
        };
        ResearchResult {
            snippets: parse_snippets(&body, MAX_SNIPPETS_PER_QUERY),
            query,
        }
    }
}

/// Snippet texts from a search results page.
pub fn parse_snippets(html: &str, max: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&SNIPPET)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| crate::utils::squash_whitespace(&text))
        .filter(|text| !text.is_empty())
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile(name: &str, headline: &str) -> ProfileRecord {
        ProfileRecord {
            name: name.to_string(),
            headline: headline.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_light_depth_has_no_queries() {
        assert!(build_queries(&profile("Alice Chen", "Engineer"), ResearchDepth::Light).is_empty());
    }

    #[test]
    fn test_medium_depth_single_query() {
        assert_eq!(
            build_queries(&profile("Alice Chen", "Staff Engineer"), ResearchDepth::Medium),
            vec!["\"Alice Chen\" Staff Engineer"]
        );
        assert_eq!(
            build_queries(&profile("Alice Chen", ""), ResearchDepth::Medium),
            vec!["\"Alice Chen\""]
        );
    }

    #[test]
    fn test_deep_depth_three_queries() {
        let with_headline = build_queries(&profile("Alice Chen", "Staff Engineer"), ResearchDepth::Deep);
        assert_eq!(with_headline.len(), 3);
        assert!(with_headline[1].contains("recent news"));

        let without = build_queries(&profile("Alice Chen", ""), ResearchDepth::Deep);
        assert_eq!(without[1], "\"Alice Chen\" professional");
    }

    #[test]
    fn test_nameless_profile_has_no_queries() {
        assert!(build_queries(&profile("  ", "Engineer"), ResearchDepth::Deep).is_empty());
    }

    #[test]
    fn test_parse_snippets_caps_and_cleans() {
        let html = r#"<div>
            <a class="result__snippet">First  <b>hit</b></a>
            <a class="result__snippet">Second hit</a>
            <a class="result__snippet">   </a>
            <a class="result__snippet">Third hit</a>
            <a class="result__snippet">Fourth hit</a>
        </div>"#;
        assert_eq!(parse_snippets(html, 3), vec!["First hit", "Second hit", "Third hit"]);
    }

    #[tokio::test]
    async fn test_research_against_mock_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "\"Alice Chen\" Staff Engineer"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<a class="result__snippet">Alice spoke at RustConf</a>"#),
            )
            .mount(&server)
            .await;

        let researcher = Researcher::new(format!("{}/html/", server.uri())).unwrap();
        let results = researcher
            .research(&profile("Alice Chen", "Staff Engineer"), ResearchDepth::Medium)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippets, vec!["Alice spoke at RustConf"]);
    }

    #[tokio::test]
    async fn test_search_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let researcher = Researcher::new(format!("{}/html/", server.uri())).unwrap();
        let results = researcher
            .research(&profile("Alice Chen", "Staff Engineer"), ResearchDepth::Deep)
            .await;
        assert!(results.is_empty());
    }
}
