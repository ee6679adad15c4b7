//! Opener generation through an OpenAI-compatible LLM.
//!
//! - [`AskAsync`]: async "send text, get text back" seam
//! - [`AskFnWrapper`]: the `awful_aj` backed client
//! - [`RetryAsk`]: exponential backoff with jitter around any [`AskAsync`]
//!
//! The system prompt lives in the `awful_aj` chat template; this module only
//! builds the per-prospect user prompt and post-processes the reply.
//!
//! Backoff: `delay = min(base * 2^(attempt-1), 30s) + jitter(0..=250ms)`.

use crate::models::{ProfileRecord, ResearchResult};
use crate::utils::truncate_chars;
use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use rand::{Rng, rng};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_CHAR_LIMIT: usize = 300;
pub const DEFAULT_TONE: &str = "professional";
/// Snippets per research query that make it into the prompt.
const PROMPT_SNIPPETS_PER_QUERY: usize = 3;

/// Async LLM interaction.
///
/// Implemented by the real client, by [`RetryAsk`] around any other
/// implementation, and by test doubles.
pub trait AskAsync {
    type Response;

    /// Send `text` as the user message and return the model's reply.
    ///
    /// # Arguments
    ///
    /// * `text` - The full user prompt
    ///
    /// # Returns
    ///
    /// The reply, or the transport/API error.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Exponential backoff with jitter around any [`AskAsync`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + jitter(0..=250ms)
/// ```
pub struct RetryAsk<T> {
    /// Wrapped client.
    inner: T,
    /// Retries after the first attempt before giving up.
    max_retries: usize,
    /// Initial delay; doubles per failed attempt.
    base_delay: StdDuration,
    /// Cap on the backoff before jitter.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Wrap `inner` with retries.
    ///
    /// # Arguments
    ///
    /// * `inner` - The client to retry
    /// * `max_retries` - Retries after the first attempt
    /// * `base_delay` - Delay before the first retry
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = AskFnWrapper { config, template };
    /// let retry_client = RetryAsk::new(client, 5, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        self.base_delay
            .saturating_mul(1 << shift)
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.backoff(attempt) + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// [`AskAsync`] over `awful_aj::api::ask`.
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// Endpoint, model and key.
    pub config: &'a AwfulJadeConfig,
    /// System prompt and sampling settings.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

/// What the caller wants the opener to look like.
#[derive(Debug, Clone)]
pub struct OpenerStyle {
    pub tone: String,
    pub char_limit: usize,
    /// Free text the opener has to mention; empty for none.
    pub must_include: String,
}

impl Default for OpenerStyle {
    fn default() -> Self {
        Self {
            tone: DEFAULT_TONE.to_string(),
            char_limit: DEFAULT_CHAR_LIMIT,
            must_include: String::new(),
        }
    }
}

/// The user message for one prospect: profile facts, numbered research
/// findings, then tone and length constraints.
///
/// # Arguments
///
/// * `profile` - The acquired profile; empty fields are left out
/// * `research` - Search results; queries without snippets are left out
/// * `style` - Tone, length limit and required mention
///
/// # Returns
///
/// The prompt text, sections separated by newlines.
pub fn build_user_prompt(profile: &ProfileRecord, research: &[ResearchResult], style: &OpenerStyle) -> String {
    let mut parts = vec![format!("PROSPECT PROFILE:\n- Name: {}", profile.name)];
    for (label, value) in [
        ("Headline", &profile.headline),
        ("Summary", &profile.summary),
        ("Experience", &profile.experience),
        ("Education", &profile.education),
        ("Skills", &profile.skills),
    ] {
        if !value.is_empty() {
            parts.push(format!("- {label}: {value}"));
        }
    }

    if research.iter().any(|r| !r.snippets.is_empty()) {
        parts.push("\nWEB RESEARCH FINDINGS:".to_string());
        let mut idx = 1;
        for r in research.iter().filter(|r| !r.snippets.is_empty()) {
            parts.push(format!("\n[Source: {}]", r.query));
            for snippet in r.snippets.iter().take(PROMPT_SNIPPETS_PER_QUERY) {
                parts.push(format!("{idx}. {snippet}"));
                idx += 1;
            }
        }
    }

    parts.push(format!("\nTONE: {}", style.tone));
    parts.push(format!("MAX CHARACTERS: {}", style.char_limit));
    if !style.must_include.is_empty() {
        parts.push(format!("MUST INCLUDE: {}", style.must_include));
    }
    parts.push(
        "\nWrite a single personalized cold outreach opener for this prospect. \
         Prioritize recent company news, personal posts, or unique career moves \
         over generic profile facts."
            .to_string(),
    );
    parts.join("\n")
}

/// Strip wrapping quotes and fit `text` into `limit` characters.
///
/// Over-long text is cut at a sentence boundary (`". "`, `"! "`, `"? "`,
/// tried in that order) when one falls past a third of the limit, else at
/// the last such space with `...` appended, else hard-cut with `...`.
///
/// # Arguments
///
/// * `text` - Raw model reply
/// * `limit` - Maximum length in characters
///
/// # Returns
///
/// The cleaned opener, never longer than `limit + 3` characters.
pub fn enforce_char_limit(text: &str, limit: usize) -> String {
    let text = text.trim().trim_matches('"').trim_matches('\'').trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let truncated = truncate_chars(text, limit);
    let floor = limit / 3;
    let char_pos = |byte_idx: usize| truncated[..byte_idx].chars().count();

    for sep in [". ", "! ", "? "] {
        if let Some(idx) = truncated.rfind(sep) {
            if char_pos(idx) > floor {
                return truncated[..idx + 1].to_string();
            }
        }
    }
    if let Some(idx) = truncated.rfind(' ') {
        if char_pos(idx) > floor {
            return format!("{}...", &truncated[..idx]);
        }
    }
    format!("{truncated}...")
}

/// Generate one opener through `client`.
///
/// # Arguments
///
/// * `client` - Any [`AskAsync`]; retries come from wrapping it in [`RetryAsk`]
/// * `profile` - The acquired profile
/// * `research` - Search results for the profile, possibly empty
/// * `style` - Tone, length limit and required mention
///
/// # Returns
///
/// The opener trimmed to `style.char_limit`, or the client's error.
#[instrument(level = "info", skip_all, fields(name = %profile.name))]
pub async fn generate_opener<A>(
    client: &A,
    profile: &ProfileRecord,
    research: &[ResearchResult],
    style: &OpenerStyle,
) -> Result<String, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    let t0 = Instant::now();
    let prompt = build_user_prompt(profile, research, style);
    let raw = client.ask(&prompt).await?;
    let opener = enforce_char_limit(&raw, style.char_limit);
    info!(
        elapsed_ms = t0.elapsed().as_millis() as u64,
        chars = opener.chars().count(),
        "Opener generated"
    );
    Ok(opener)
}
