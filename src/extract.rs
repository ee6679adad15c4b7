//! Turn fetched markup or pasted text into a normalized [`ProfileRecord`].
//!
//! Three strategies run in a fixed order and the first one that yields a
//! non-empty name wins:
//!
//! 1. **JSON-LD**: a `Person` object in a `<script type="application/ld+json">` block
//! 2. **Social meta tags**: `og:title` / `og:description` (Twitter card fallback)
//! 3. **Plain text**: first visible lines plus section scans for
//!    Experience, Education and Skills
//!
//! Manual input skips straight to strategy 3. Extraction is a pure function of
//! its input, so re-extracting identical content yields an identical record.

use crate::models::{ProfileRecord, Tier};
use crate::utils::{squash_whitespace, truncate_chars};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use tracing::debug;

const RAW_TEXT_LIMIT: usize = 2000;
const EXPERIENCE_LIMIT: usize = 500;
const EDUCATION_LIMIT: usize = 300;
const SKILLS_LIMIT: usize = 300;

/// Elements whose text never counts as visible profile content.
const HIDDEN_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static OG_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static OG_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static TWITTER_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="twitter:title"]"#).unwrap());
static TWITTER_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="twitter:description"]"#).unwrap());
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());

static EXPERIENCE_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Work Experience|Experience)\s*\n([\s\S]*?)(?:\n(?:Education|Skills)|\z)").unwrap()
});
static EDUCATION_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Education\s*\n([\s\S]*?)(?:\n(?:Skills|Interests)|\z)").unwrap()
});
static SKILLS_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Skills\s*\n([\s\S]*?)(?:\n(?:Interests|Languages|Recommendations)|\z)").unwrap()
});

/// Extract a profile from `content` fetched by `tier` for `url`.
///
/// The returned record may have an empty name; callers decide whether that
/// counts as a failure of the tier.
pub fn extract(content: &str, url: &str, tier: Tier) -> ProfileRecord {
    if tier == Tier::Manual {
        return from_plain_text(content, url, tier);
    }

    let document = Html::parse_document(content);
    let text = visible_text(&document);

    if let Some(mut record) = from_json_ld(&document, url, tier) {
        debug!(%url, "profile extracted from JSON-LD");
        record.raw_text = truncate_chars(&text, RAW_TEXT_LIMIT).to_string();
        return record;
    }

    if let Some(mut record) = from_meta_tags(&document, url, tier) {
        debug!(%url, "profile extracted from meta tags");
        record.raw_text = truncate_chars(&text, RAW_TEXT_LIMIT).to_string();
        return record;
    }

    debug!(%url, "falling back to plain-text extraction");
    from_plain_text(&text, url, tier)
}

// ── Strategy 1: JSON-LD ─────────────────────────────────────────────────────

fn from_json_ld(document: &Html, url: &str, tier: Tier) -> Option<ProfileRecord> {
    document
        .select(&JSON_LD)
        .filter_map(|script| {
            let body = script.inner_html();
            serde_json::from_str::<Value>(body.trim()).ok()
        })
        .filter_map(|value| find_person(&value).cloned())
        .map(|person| person_to_record(&person, url, tier))
        .find(ProfileRecord::has_name)
}

/// First `Person` object in a block that may be an object, a list, or an `@graph`.
fn find_person(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find(|item| is_person(item)),
        Value::Object(map) => {
            if is_person(value) {
                Some(value)
            } else {
                map.get("@graph").and_then(find_person)
            }
        }
        _ => None,
    }
}

fn is_person(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "Person",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Person")),
        _ => false,
    }
}

fn person_to_record(person: &Value, url: &str, tier: Tier) -> ProfileRecord {
    let description = string_field(person, "description");
    let headline = match string_field(person, "jobTitle") {
        title if !title.is_empty() => title,
        _ => description.clone(),
    };

    let experience = match person.get("interactionStatistic") {
        Some(Value::Array(stats)) => stats
            .iter()
            .filter(|s| s.is_object())
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("; "),
        Some(stat @ Value::Object(_)) => stat.to_string(),
        _ => String::new(),
    };

    ProfileRecord {
        url: url.to_string(),
        name: string_field(person, "name"),
        headline,
        summary: description,
        experience,
        tier,
        ..Default::default()
    }
}

/// A JSON-LD property as plain text; lists contribute their first string.
fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

// ── Strategy 2: social meta tags ────────────────────────────────────────────

fn from_meta_tags(document: &Html, url: &str, tier: Tier) -> Option<ProfileRecord> {
    let title = meta_content(document, &[&*OG_TITLE, &*TWITTER_TITLE])?;
    let description =
        meta_content(document, &[&*OG_DESCRIPTION, &*TWITTER_DESCRIPTION, &*META_DESCRIPTION]).unwrap_or_default();

    let (name, headline) = split_preview_title(&title);
    if name.is_empty() {
        return None;
    }

    Some(ProfileRecord {
        url: url.to_string(),
        name,
        headline,
        summary: description,
        tier,
        ..Default::default()
    })
}

/// Content of the first listed meta tag that is present and non-blank.
fn meta_content(document: &Html, selectors: &[&Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        document
            .select(sel)
            .filter_map(|el| el.value().attr("content"))
            .map(squash_whitespace)
            .find(|c| !c.is_empty())
    })
}

/// Split `"Name - Headline - Company | Site"` into name and headline.
pub fn split_preview_title(title: &str) -> (String, String) {
    let without_site = match title.rfind(" | ") {
        Some(idx) => &title[..idx],
        None => title,
    };

    let mut parts = without_site.split(" - ");
    let name = parts.next().unwrap_or_default().trim().to_string();
    let headline = parts.map(str::trim).collect::<Vec<_>>().join(" - ");
    (name, headline)
}

// ── Strategy 3: plain text ──────────────────────────────────────────────────

fn from_plain_text(text: &str, url: &str, tier: Tier) -> ProfileRecord {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let full_text = lines.join("\n");

    let summary = if lines.len() > 2 {
        lines[2..lines.len().min(6)].join("\n")
    } else {
        String::new()
    };

    ProfileRecord {
        url: url.to_string(),
        name: lines.first().map(|l| l.to_string()).unwrap_or_default(),
        headline: lines.get(1).map(|l| l.to_string()).unwrap_or_default(),
        summary,
        experience: section(&EXPERIENCE_SECTION, &full_text, EXPERIENCE_LIMIT),
        education: section(&EDUCATION_SECTION, &full_text, EDUCATION_LIMIT),
        skills: section(&SKILLS_SECTION, &full_text, SKILLS_LIMIT),
        raw_text: truncate_chars(&full_text, RAW_TEXT_LIMIT).to_string(),
        tier,
        error: String::new(),
    }
}

fn section(pattern: &Regex, text: &str, limit: usize) -> String {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| truncate_chars(m.as_str().trim(), limit).to_string())
        .unwrap_or_default()
}

/// Visible text of the page body, one text node per line.
fn visible_text(document: &Html) -> String {
    let mut lines = Vec::new();
    collect_text(document.root_element(), &mut lines);
    lines.join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    if HIDDEN_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    collect_text(el, out);
                }
            }
            _ => {}
        }
    }
}
