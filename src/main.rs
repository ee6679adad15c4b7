//! # Opener Forge
//!
//! Acquires LinkedIn profiles through a tiered fallback chain and turns each
//! one into a short, personalized cold-outreach opener.
//!
//! ## Usage
//!
//! ```sh
//! opener_forge linkedin.com/in/alice linkedin.com/in/bob -o report.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Acquisition**: each URL walks the configured tiers (profile API,
//!    direct fetch, headless render) behind a shared rate gate, with pasted
//!    text short-circuiting the chain ([`orchestrator`], [`batch`])
//! 2. **Extraction**: markup becomes a normalized profile ([`extract`])
//! 3. **Research**: best-effort search snippets per profile ([`research`])
//! 4. **Openers**: one LLM call per profile ([`llm`], [`openers`])
//! 5. **Output**: a single JSON report to a file or stdout ([`outputs`])

use chrono::Utc;
use clap::Parser;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod batch;
mod cli;
mod config;
mod error;
mod extract;
mod gate;
mod llm;
mod models;
mod openers;
mod orchestrator;
mod outputs;
mod research;
mod scrapers;
mod utils;

use cli::Cli;
use config::Settings;
use gate::RateGate;
use llm::{AskFnWrapper, OpenerStyle, RetryAsk};
use models::{BatchReport, ProfileReport};
use openers::OpenerRun;
use orchestrator::{Orchestrator, canonicalize};
use outputs::json;
use research::Researcher;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init (stderr; stdout may carry the report) ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("opener_forge starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.output, urls = args.urls.len(), "Parsed CLI arguments");

    // ---- Settings ----
    let mut settings = Settings::load(args.config.as_deref())?;
    apply_overrides(&mut settings, &args);
    settings.validate()?;

    // ---- Inputs ----
    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read URL list {}: {e}", path.display()))?;
        urls.extend(cli::parse_url_list(&raw));
    }
    // A URL given only through --manual is still part of the batch.
    urls.extend(args.manual.iter().map(|(url, _)| url.clone()));
    let urls = dedupe_urls(urls);

    if urls.is_empty() {
        return Err("no profile URLs given".into());
    }
    if urls.len() > settings.max_urls_per_batch {
        return Err(format!(
            "{} URLs given; maximum {} URLs per batch",
            urls.len(),
            settings.max_urls_per_batch
        )
        .into());
    }
    let manual = read_manual_texts(&args.manual).await?;

    // ---- Acquisition ----
    let gate = Arc::new(RateGate::new(settings.rate_limit_delay()));
    let orchestrator = Orchestrator::new(Arc::clone(&gate), scrapers::build_sources(&settings)?);
    info!(
        count = urls.len(),
        manual = manual.len(),
        tiers = ?orchestrator.tiers(),
        min_delay = ?gate.min_delay(),
        concurrency = settings.max_concurrency,
        "Acquiring profiles"
    );
    let profiles = orchestrator
        .acquire_all(&urls, &manual, settings.max_concurrency)
        .await;

    if args.profiles_only {
        let report = ProfileReport {
            generated_at: Utc::now().to_rfc3339(),
            profiles,
        };
        json::write_report(&report, args.output.as_deref()).await?;
        info!(elapsed = ?start_time.elapsed(), "Execution complete");
        return Ok(());
    }

    // ---- Load template & config ----
    let template = awful_aj::template::load_template(&settings.llm_template).await?;
    info!(template = %settings.llm_template, "Loaded template");
    let conf_file = awful_aj::config_dir()?.join("config.yaml");
    let config_path = conf_file.to_str().ok_or("Not a valid config filename")?;
    let llm_config = awful_aj::config::load_config(config_path)?;
    info!(config_path, "Loaded configuration");

    // ---- Research & openers ----
    let client = RetryAsk::new(
        AskFnWrapper {
            config: &llm_config,
            template: &template,
        },
        5,
        Duration::from_secs(1),
    );
    let researcher = Researcher::new(settings.search_endpoint.clone())?;
    let style = OpenerStyle {
        tone: args.tone.clone(),
        char_limit: usize::from(args.char_limit),
        must_include: args.must_include.clone(),
    };
    let run = OpenerRun {
        client: &client,
        researcher: &researcher,
        depth: args.research_depth,
        style: &style,
    };
    let results = run.generate_all(&profiles, settings.max_concurrency).await;

    let report = BatchReport {
        generated_at: Utc::now().to_rfc3339(),
        results,
    };
    json::write_report(&report, args.output.as_deref()).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &Cli) {
    if let Some(key) = args.profile_api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        settings.profile_api_key = Some(key.clone());
    }
    if let Some(delay) = args.rate_limit_delay {
        settings.rate_limit_delay_secs = delay;
    }
    if let Some(concurrency) = args.concurrency {
        settings.max_concurrency = concurrency;
    }
}

/// Drop repeats of the same profile, keeping first-seen order.
fn dedupe_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(canonicalize(url)))
        .collect()
}

async fn read_manual_texts(pairs: &[(String, PathBuf)]) -> Result<HashMap<String, String>, Box<dyn Error>> {
    let mut texts = HashMap::with_capacity(pairs.len());
    for (url, path) in pairs {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read manual profile text {}: {e}", path.display()))?;
        texts.insert(canonicalize(url), text);
    }
    Ok(texts)
}
