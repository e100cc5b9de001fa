//! candidate.rs: Candidate records as they arrive from sourcing.
//!
//! `RawCandidate` is the tolerant on-disk row (every column optional);
//! `Candidate` is the validated shape the engine works with. Sourcing owns
//! these fields: the engine never rewrites them, it only derives new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Topical bucket a candidate was sourced for (or reassigned to by the model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Upstream,
    General,
    AiAutomation,
    Regulation,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Upstream,
        Bucket::General,
        Bucket::AiAutomation,
        Bucket::Regulation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Upstream => "upstream",
            Bucket::General => "general",
            Bucket::AiAutomation => "ai_automation",
            Bucket::Regulation => "regulation",
        }
    }

    /// Case-insensitive parse. Accepts the snake_case key as well as display
    /// spellings such as "AI & Automation" or "ai-automation".
    pub fn parse(s: &str) -> Option<Bucket> {
        let key = s
            .trim()
            .to_ascii_lowercase()
            .replace('&', " and ")
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");
        match key.as_str() {
            "upstream" => Some(Bucket::Upstream),
            "general" => Some(Bucket::General),
            "ai_automation" | "ai_and_automation" => Some(Bucket::AiAutomation),
            "regulation" => Some(Bucket::Regulation),
            _ => None,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row shape written by sourcing (`raw_candidates.jsonl`). Column names follow
/// the sheet headers the sourcing step produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub source_date: Option<String>,
    /// Discovery timestamp (RFC 3339).
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Why a raw row could not become a `Candidate`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("missing or blank field `{0}`")]
    Missing(&'static str),
    #[error("unknown bucket `{0}`")]
    UnknownBucket(String),
}

/// A validated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifying key, exactly as sourced.
    pub url: String,
    /// Bucket whose query produced this candidate.
    pub bucket: Bucket,
    pub title: String,
    pub source_name: String,
    pub snippet: String,
    pub full_text: Option<String>,
    /// Publish-date hint as reported by the search provider (free-form).
    pub source_date: Option<String>,
    pub discovered_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawCandidate> for Candidate {
    type Error = InputError;

    fn try_from(raw: RawCandidate) -> Result<Self, Self::Error> {
        let url = non_blank(raw.url).ok_or(InputError::Missing("url"))?;
        let bucket_raw = non_blank(raw.bucket).ok_or(InputError::Missing("bucket"))?;
        let bucket =
            Bucket::parse(&bucket_raw).ok_or_else(|| InputError::UnknownBucket(bucket_raw))?;
        let title = non_blank(raw.title).ok_or(InputError::Missing("title"))?;
        let source_name = non_blank(raw.source_name).unwrap_or_else(|| source_name_from_url(&url));
        let discovered_at = raw
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(Candidate {
            url,
            bucket,
            title,
            source_name,
            snippet: raw.snippet.unwrap_or_default(),
            full_text: non_blank(raw.full_text),
            source_date: non_blank(raw.source_date),
            discovered_at,
        })
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Display name derived from the host: `https://www.reuters.com/x` → "Reuters".
pub fn source_name_from_url(raw: &str) -> String {
    let host = url::Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
    let Some(host) = host else {
        return "Unknown".to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let label = host.split('.').next().unwrap_or_default();
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_string(),
    }
}
