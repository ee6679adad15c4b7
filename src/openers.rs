//! Research and opener generation for an acquired batch.
//!
//! Runs after [`crate::batch`] has produced one [`ProfileRecord`] per URL.
//! Failed records short-circuit to an error result asking for pasted
//! profile text; every other record is researched and handed to the LLM.
//! A long LLM call holds only its own slot; results come back in input order.

use crate::llm::{AskAsync, OpenerStyle, generate_opener};
use crate::models::{OpenerResult, ProfileRecord};
use crate::research::{ResearchDepth, Researcher};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{error, info, instrument};

/// Research snippets surfaced per result.
const MAX_RESULT_SNIPPETS: usize = 5;

pub struct OpenerRun<'a, A> {
    pub client: &'a A,
    pub researcher: &'a Researcher,
    pub depth: ResearchDepth,
    pub style: &'a OpenerStyle,
}

impl<'a, A> OpenerRun<'a, A>
where
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(count = profiles.len(), concurrency_limit = concurrency_limit))]
    pub async fn generate_all(&self, profiles: &[ProfileRecord], concurrency_limit: usize) -> Vec<OpenerResult> {
        let t0 = Instant::now();
        let mut indexed: Vec<(usize, OpenerResult)> = stream::iter(profiles.iter().enumerate())
            .map(|(index, profile)| async move { (index, self.generate_one(profile).await) })
            .buffer_unordered(concurrency_limit.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<OpenerResult> = indexed.into_iter().map(|(_, result)| result).collect();

        let failed = results.iter().filter(|r| !r.error.is_empty()).count();
        info!(
            total = results.len(),
            failed,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Opener generation complete"
        );
        results
    }

    async fn generate_one(&self, profile: &ProfileRecord) -> OpenerResult {
        if profile.is_failed() {
            let detail = if profile.error.is_empty() {
                "all tiers failed"
            } else {
                profile.error.as_str()
            };
            return OpenerResult {
                url: profile.url.clone(),
                tier: profile.tier,
                error: format!("Scrape failed: {detail}. Please paste profile text manually."),
                ..Default::default()
            };
        }

        let research = self.researcher.research(profile, self.depth).await;
        let snippets: Vec<String> = research
            .iter()
            .flat_map(|r| r.snippets.iter().cloned())
            .take(MAX_RESULT_SNIPPETS)
            .collect();

        match generate_opener(self.client, profile, &research, self.style).await {
            Ok(opener) => OpenerResult {
                url: profile.url.clone(),
                name: profile.name.clone(),
                opener,
                research_snippets: snippets,
                tier: profile.tier,
                error: String::new(),
            },
            Err(e) => {
                error!(url = %profile.url, error = %e, "Opener generation failed");
                OpenerResult {
                    url: profile.url.clone(),
                    name: profile.name.clone(),
                    research_snippets: snippets,
                    tier: profile.tier,
                    error: e.to_string(),
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::Canned;
    use crate::models::Tier;
    use std::cell::RefCell;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn acquired(slug: &str, name: &str) -> ProfileRecord {
        ProfileRecord {
            url: format!("https://www.linkedin.com/in/{slug}"),
            name: name.to_string(),
            headline: "Engineer".to_string(),
            tier: Tier::DirectFetch,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_failed_profiles_skip_llm() {
        let client = Canned::new(vec![Ok("Loved your talk on lock-free queues.")]);
        let researcher = Researcher::new("http://127.0.0.1:9/html/".to_string()).unwrap();
        let style = OpenerStyle::default();
        let run = OpenerRun {
            client: &client,
            researcher: &researcher,
            depth: ResearchDepth::Light,
            style: &style,
        };
        let profiles = vec![
            ProfileRecord::failed(
                "https://www.linkedin.com/in/ghost",
                "api-tier: no API key configured → direct-fetch-tier: HTTP 999",
            ),
            acquired("alice", "Alice Chen"),
        ];

        let results = run.generate_all(&profiles, 3).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tier, Tier::Failed);
        assert_eq!(
            results[0].error,
            "Scrape failed: api-tier: no API key configured → direct-fetch-tier: HTTP 999. \
             Please paste profile text manually."
        );
        assert!(results[0].opener.is_empty());
        assert_eq!(results[1].name, "Alice Chen");
        assert_eq!(results[1].opener, "Loved your talk on lock-free queues.");
        assert_eq!(results[1].tier, Tier::DirectFetch);
        assert_eq!(client.prompts.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_is_reported_per_profile() {
        let client = Canned::new(vec![Ok("First opener."), Err("model overloaded")]);
        let researcher = Researcher::new("http://127.0.0.1:9/html/".to_string()).unwrap();
        let style = OpenerStyle::default();
        let run = OpenerRun {
            client: &client,
            researcher: &researcher,
            depth: ResearchDepth::Light,
            style: &style,
        };
        let profiles = vec![acquired("a", "Ann"), acquired("b", "Ben")];

        let results = run.generate_all(&profiles, 1).await;

        assert_eq!(results[0].opener, "First opener.");
        assert_eq!(results[1].name, "Ben");
        assert_eq!(results[1].error, "model overloaded");
        assert!(results[1].opener.is_empty());
    }

    /// Replies after 60s for the prospect named `Slow`, 1s for everyone
    /// else, noting when each call started.
    struct Stalling {
        t0: tokio::time::Instant,
        started: RefCell<Vec<(String, Duration)>>,
    }

    impl AskAsync for Stalling {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn std::error::Error>> {
            let name = text
                .lines()
                .find_map(|line| line.strip_prefix("- Name: "))
                .unwrap_or_default()
                .to_string();
            self.started.borrow_mut().push((name.clone(), self.t0.elapsed()));
            let delay = if name == "Slow" { 60 } else { 1 };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            Ok(format!("Hi {name}."))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_llm_call_does_not_hold_back_later_profiles() {
        let client = Stalling {
            t0: tokio::time::Instant::now(),
            started: RefCell::new(Vec::new()),
        };
        let researcher = Researcher::new("http://127.0.0.1:9/html/".to_string()).unwrap();
        let style = OpenerStyle::default();
        let run = OpenerRun {
            client: &client,
            researcher: &researcher,
            depth: ResearchDepth::Light,
            style: &style,
        };
        let names = ["Slow", "Ann", "Ben", "Cat", "Dan", "Eve"];
        let profiles: Vec<ProfileRecord> = names.iter().map(|n| acquired(&n.to_lowercase(), n)).collect();

        let results = run.generate_all(&profiles, 3).await;

        let got: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(got, names);
        assert_eq!(results[0].opener, "Hi Slow.");

        let started = client.started.borrow();
        assert_eq!(started.len(), 6);
        for (name, at) in started.iter().filter(|(name, _)| name != "Slow") {
            assert!(*at < Duration::from_secs(60), "{name} waited for the slow call (started at {at:?})");
        }
    }

    #[tokio::test]
    async fn test_research_snippets_capped() {
        let server = MockServer::start().await;
        let page = (1..=3)
            .map(|i| format!(r#"<a class="result__snippet">hit {i}</a>"#))
            .collect::<String>();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let client = Canned::new(vec![Ok("Opener.")]);
        let researcher = Researcher::new(format!("{}/html/", server.uri())).unwrap();
        let style = OpenerStyle::default();
        let run = OpenerRun {
            client: &client,
            researcher: &researcher,
            depth: ResearchDepth::Deep,
            style: &style,
        };

        let results = run.generate_all(&[acquired("alice", "Alice Chen")], 3).await;

        assert_eq!(results[0].research_snippets.len(), MAX_RESULT_SNIPPETS);
        assert!(client.prompts.borrow()[0].contains("WEB RESEARCH FINDINGS"));
    }
}
