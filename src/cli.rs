//! Command-line interface definitions for Opener Forge.
//!
//! Flags override the matching fields of the settings file; secrets can also
//! come from the environment.

use crate::research::ResearchDepth;
use clap::Parser;
use std::path::PathBuf;

/// Acquire LinkedIn profiles and write personalized outreach openers.
///
/// ```sh
/// opener_forge linkedin.com/in/alice linkedin.com/in/bob -o report.json
/// opener_forge --urls-file prospects.txt --manual linkedin.com/in/carol=carol.txt
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Profile URLs to process
    pub urls: Vec<String>,

    /// File with one profile URL per line (blank lines and `#` comments ignored)
    #[arg(short = 'f', long)]
    pub urls_file: Option<PathBuf>,

    /// Pasted profile text for a URL, as URL=PATH; repeatable
    #[arg(short, long = "manual", value_parser = parse_manual)]
    pub manual: Vec<(String, PathBuf)>,

    /// Optional path to a settings YAML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Structured profile API key
    #[arg(long, env = "PROFILE_API_KEY", hide_env_values = true)]
    pub profile_api_key: Option<String>,

    /// Seconds between acquisitions against the profile host
    #[arg(long)]
    pub rate_limit_delay: Option<f64>,

    /// Maximum URLs processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop after acquisition and report the normalized profiles
    #[arg(long)]
    pub profiles_only: bool,

    /// Tone of the opener
    #[arg(long, default_value = crate::llm::DEFAULT_TONE)]
    pub tone: String,

    /// Maximum opener length in characters
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u16).range(50..=1000))]
    pub char_limit: u16,

    /// Something every opener has to mention
    #[arg(long, default_value = "")]
    pub must_include: String,

    /// How much web research to do per prospect
    #[arg(long, value_enum, default_value_t = ResearchDepth::Medium)]
    pub research_depth: ResearchDepth,
}

/// Profile URLs from a URL-list file: one per line, `#` starts a comment.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_manual(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.rsplit_once('=') {
        Some((url, path)) if !url.trim().is_empty() && !path.trim().is_empty() => {
            Ok((url.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected URL=PATH, got `{raw}`")),
    }
}
