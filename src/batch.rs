//! Concurrent acquisition of a whole batch of URLs.
//!
//! Runs one orchestrator acquisition per URL with at most `concurrency_limit`
//! in flight. A slot frees as soon as its run finishes, whatever position it
//! holds in the input; records are put back in input order at the end.
//!
//! A panic inside one URL's run is caught at that URL's boundary and becomes
//! a failed record; it never takes down the batch.

use crate::error::FetchError;
use crate::models::ProfileRecord;
use crate::orchestrator::{Orchestrator, canonicalize};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{error, info, instrument};

pub const DEFAULT_CONCURRENCY: usize = 3;

impl Orchestrator {
    /// Acquire every URL in `urls`, preserving order.
    ///
    /// `manual_text_by_url` may be keyed by the URL as given or by its
    /// canonical form.
    #[instrument(level = "info", skip_all, fields(count = urls.len(), concurrency_limit = concurrency_limit))]
    pub async fn acquire_all(
        &self,
        urls: &[String],
        manual_text_by_url: &HashMap<String, String>,
        concurrency_limit: usize,
    ) -> Vec<ProfileRecord> {
        let t0 = Instant::now();
        let limit = concurrency_limit.max(1);

        let mut indexed: Vec<(usize, ProfileRecord)> = stream::iter(urls.iter().enumerate())
            .map(|(index, url)| {
                let manual = manual_text_by_url
                    .get(url)
                    .or_else(|| manual_text_by_url.get(&canonicalize(url)))
                    .map(String::as_str);
                async move {
                    let record = match AssertUnwindSafe(self.acquire(url, manual)).catch_unwind().await {
                        Ok(record) => record,
                        Err(panic) => {
                            let description = panic_message(panic.as_ref());
                            error!(index, %url, %description, "internal fault while acquiring profile");
                            ProfileRecord::failed(
                                canonicalize(url),
                                FetchError::InternalFault(description).to_string(),
                            )
                        }
                    };
                    (index, record)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        let records: Vec<ProfileRecord> = indexed.into_iter().map(|(_, record)| record).collect();

        let failed = records.iter().filter(|r| r.is_failed()).count();
        info!(
            total = records.len(),
            succeeded = records.len() - failed,
            failed,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Batch acquisition complete"
        );
        records
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::RateGate;
    use crate::models::Tier;
    use crate::orchestrator::tests::{Scripted, alice_markup};
    use crate::scrapers::{FetchOutcome, ProfileSource};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn gate() -> Arc<RateGate> {
        Arc::new(RateGate::new(Duration::ZERO))
    }

    /// Echoes the URL's last path segment as the name after a fixed delay,
    /// tracking how many fetches overlap.
    struct Slow {
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProfileSource for Slow {
        fn tier(&self) -> Tier {
            Tier::DirectFetch
        }

        async fn fetch(&self, url: &str) -> FetchOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let slug = url.rsplit('/').next().unwrap_or_default();
            if slug.starts_with("missing") {
                return FetchOutcome::Failed(FetchError::NotFound);
            }
            FetchOutcome::Profile(ProfileRecord {
                url: url.to_string(),
                name: slug.to_string(),
                tier: Tier::DirectFetch,
                ..Default::default()
            })
        }
    }

    /// Panics for one specific URL.
    struct Faulty;

    #[async_trait]
    impl ProfileSource for Faulty {
        fn tier(&self) -> Tier {
            Tier::DirectFetch
        }

        async fn fetch(&self, url: &str) -> FetchOutcome {
            if url.ends_with("/boom") {
                panic!("selector table corrupted");
            }
            alice_markup(url)
        }
    }

    fn urls(slugs: &[&str]) -> Vec<String> {
        slugs.iter().map(|s| format!("linkedin.com/in/{s}")).collect()
    }

    #[tokio::test]
    async fn test_output_matches_input_order_and_length() {
        let peak = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::new(
            gate(),
            vec![Box::new(Slow {
                delay: Duration::from_millis(20),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&peak),
            })],
        );
        let input = urls(&["a", "missing-b", "c", "d", "missing-e", "f"]);

        let records = orch.acquire_all(&input, &HashMap::new(), 3).await;

        assert_eq!(records.len(), input.len());
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "", "c", "d", "", "f"]);
        assert_eq!(records[1].tier, Tier::Failed);
        assert_eq!(records[1].url, "https://www.linkedin.com/in/missing-b");
        assert_eq!(records[4].error, "direct-fetch-tier: profile not found (HTTP 404)");
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        let peak = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::new(
            gate(),
            vec![Box::new(Slow {
                delay: Duration::from_millis(50),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&peak),
            })],
        );
        let input: Vec<String> = (0..10).map(|i| format!("linkedin.com/in/p{i}")).collect();

        let records = orch.acquire_all(&input, &HashMap::new(), 3).await;

        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.has_name()));
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 2, "runs never overlapped (peak {peak})");
    }

    #[tokio::test]
    async fn test_zero_limit_is_treated_as_one() {
        let peak = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::new(
            gate(),
            vec![Box::new(Slow {
                delay: Duration::from_millis(5),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&peak),
            })],
        );
        let records = orch.acquire_all(&urls(&["a", "b"]), &HashMap::new(), 0).await;
        assert_eq!(records.len(), 2);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_internal_fault_is_contained() {
        let orch = Orchestrator::new(gate(), vec![Box::new(Faulty)]);
        let input = urls(&["alice", "boom", "alice2"]);

        let records = orch.acquire_all(&input, &HashMap::new(), 3).await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "Alice Chen");
        assert_eq!(records[2].name, "Alice Chen");
        assert_eq!(records[1].tier, Tier::Failed);
        assert_eq!(records[1].name, "");
        assert_eq!(records[1].error, "internal fault: selector table corrupted");
        assert_eq!(records[1].url, "https://www.linkedin.com/in/boom");
    }

    #[tokio::test]
    async fn test_manual_text_lookup_by_raw_or_canonical_url() {
        let (direct, direct_calls) = Scripted::new(Tier::DirectFetch, alice_markup);
        let orch = Orchestrator::new(gate(), vec![Box::new(direct)]);

        let input = urls(&["raw", "canon", "network"]);
        let mut manual = HashMap::new();
        manual.insert("linkedin.com/in/raw".to_string(), "Raw Person\nEngineer".to_string());
        manual.insert(
            "https://www.linkedin.com/in/canon".to_string(),
            "Canon Person\nDesigner".to_string(),
        );

        let records = orch.acquire_all(&input, &manual, 3).await;

        assert_eq!(records[0].name, "Raw Person");
        assert_eq!(records[0].tier, Tier::Manual);
        assert_eq!(records[1].name, "Canon Person");
        assert_eq!(records[1].tier, Tier::Manual);
        assert_eq!(records[2].name, "Alice Chen");
        assert_eq!(direct_calls.load(Ordering::SeqCst), 1);
    }

    /// Sleeps longer for URLs whose slug starts with `slow`, recording when
    /// each fetch started.
    struct Uneven {
        started: Arc<std::sync::Mutex<Vec<(String, Duration)>>>,
        t0: tokio::time::Instant,
    }

    #[async_trait]
    impl ProfileSource for Uneven {
        fn tier(&self) -> Tier {
            Tier::DirectFetch
        }

        async fn fetch(&self, url: &str) -> FetchOutcome {
            let slug = url.rsplit('/').next().unwrap_or_default().to_string();
            self.started.lock().unwrap().push((slug.clone(), self.t0.elapsed()));
            let delay = if slug.starts_with("slow") { 60 } else { 1 };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            FetchOutcome::Profile(ProfileRecord {
                url: url.to_string(),
                name: slug,
                tier: Tier::DirectFetch,
                ..Default::default()
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_head_does_not_hold_back_later_urls() {
        let started = Arc::new(std::sync::Mutex::new(Vec::new()));
        let orch = Orchestrator::new(
            gate(),
            vec![Box::new(Uneven {
                started: Arc::clone(&started),
                t0: tokio::time::Instant::now(),
            })],
        );
        let input = urls(&["slow", "a", "b", "c", "d", "e"]);

        let records = orch.acquire_all(&input, &HashMap::new(), 3).await;

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "a", "b", "c", "d", "e"]);

        let started = started.lock().unwrap();
        assert_eq!(started.len(), 6);
        for (slug, at) in started.iter().filter(|(slug, _)| slug != "slow") {
            assert!(*at < Duration::from_secs(60), "{slug} waited for the slow run (started at {at:?})");
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let orch = Orchestrator::new(gate(), vec![]);
        let records = orch.acquire_all(&[], &HashMap::new(), 3).await;
        assert!(records.is_empty());
    }
}
