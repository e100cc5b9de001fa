//! Strict parsing of the oracle's scoring response.
//!
//! The response must carry `final_bucket` and all five scores; anything else
//! is a `JudgmentError`. There is no partially-filled judgment.

use serde::{Deserialize, Serialize};

use super::SubScores;
use crate::candidate::Bucket;

/// Bucket suggestion of a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketVerdict {
    Assign(Bucket),
    Reject,
}

impl BucketVerdict {
    pub fn parse(s: &str) -> Option<BucketVerdict> {
        if s.trim().eq_ignore_ascii_case("reject") {
            return Some(BucketVerdict::Reject);
        }
        Bucket::parse(s).map(BucketVerdict::Assign)
    }

    pub fn is_reject(self) -> bool {
        self == BucketVerdict::Reject
    }
}

/// One oracle verdict for one candidate in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub scores: SubScores,
    pub verdict: BucketVerdict,
    pub reason: String,
    /// Pass 2 only; ordered as returned.
    pub evidence: Vec<String>,
}

impl Judgment {
    /// Degraded judgment used for every scoring failure.
    pub fn failed(detail: impl std::fmt::Display) -> Self {
        Self {
            scores: SubScores::floor(),
            verdict: BucketVerdict::Reject,
            reason: format!("Scoring error: {detail}"),
            evidence: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JudgmentError {
    #[error("empty response")]
    Empty,
    #[error("invalid judgment json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("score `{field}` is not a finite number")]
    NonFinite { field: &'static str },
    #[error("unknown bucket `{0}`")]
    UnknownBucket(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EvidenceField {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct Wire {
    final_bucket: String,
    #[serde(default)]
    bucket_reason: Option<String>,
    relevance_score: f64,
    freshness_score: f64,
    credibility_score: f64,
    practicality_score: f64,
    #[serde(alias = "shareworthiness_score")]
    linkedin_worthiness_score: f64,
    #[serde(default)]
    evidence_notes: Option<EvidenceField>,
}

/// Remove a surrounding ```json / ``` fence if the payload is wrapped in one.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let body = if let Some((_, rest)) = trimmed.split_once("```json") {
        rest
    } else if let Some((_, rest)) = trimmed.split_once("```") {
        rest
    } else {
        return trimmed;
    };
    body.split("```").next().unwrap_or(body).trim()
}

fn score(field: &'static str, v: f64) -> Result<u8, JudgmentError> {
    if !v.is_finite() {
        return Err(JudgmentError::NonFinite { field });
    }
    Ok(v.round().clamp(SubScores::MIN as f64, SubScores::MAX as f64) as u8)
}

/// Parse a raw oracle response into a validated `Judgment`.
/// Scores are rounded and clamped into `[1, 5]`.
pub fn parse_judgment(response: &str) -> Result<Judgment, JudgmentError> {
    let payload = strip_code_fence(response);
    if payload.is_empty() {
        return Err(JudgmentError::Empty);
    }
    let wire: Wire = serde_json::from_str(payload)?;

    let verdict = BucketVerdict::parse(&wire.final_bucket)
        .ok_or_else(|| JudgmentError::UnknownBucket(wire.final_bucket.clone()))?;

    let scores = SubScores {
        relevance: score("relevance_score", wire.relevance_score)?,
        freshness: score("freshness_score", wire.freshness_score)?,
        credibility: score("credibility_score", wire.credibility_score)?,
        practicality: score("practicality_score", wire.practicality_score)?,
        shareworthiness: score("linkedin_worthiness_score", wire.linkedin_worthiness_score)?,
    };

    let evidence = match wire.evidence_notes {
        Some(EvidenceField::List(v)) => v
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(EvidenceField::Text(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };

    Ok(Judgment {
        scores,
        verdict,
        reason: wire.bucket_reason.unwrap_or_default().trim().to_string(),
        evidence,
    })
}
