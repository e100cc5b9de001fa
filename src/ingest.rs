// src/ingest.rs
//! Input-side filtering: URL canonicalization, historical dedupe, blocked
//! sources and per-bucket keyword guardrails. Everything here is pure.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::candidate::{Bucket, Candidate, RawCandidate};
use crate::history::History;
use crate::select::{Disposition, RejectStage};

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "source",
    "fbclid",
    "gclid",
    "_ga",
];

/// Filters applied before any scoring happens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    /// Lowercase domains; a candidate is blocked when its host contains one.
    pub blocked_domains: Vec<String>,
    pub guardrails: BTreeMap<Bucket, Vec<String>>,
    pub title_similarity_threshold: Option<f64>,
    pub max_age_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Accept,
    Reject { stage: RejectStage, reason: String },
}

impl Admission {
    fn reject(stage: RejectStage, reason: impl Into<String>) -> Self {
        Admission::Reject {
            stage,
            reason: reason.into(),
        }
    }
}

/// Canonical dedupe key: lowercase scheme/host (via `url`), no fragment, no
/// tracking params, no trailing slash on non-root paths. `None` when the input
/// is not an absolute http(s) URL with a host.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut parsed = url::Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    parsed.set_fragment(None);

    if parsed.query().is_some() {
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            parsed.set_query(None);
        } else {
            parsed.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    let mut out = parsed.to_string();
    // `Url` renders an empty root path as "/"; drop it so "a.test" == "a.test/".
    if parsed.path() == "/" && parsed.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    Some(out)
}

fn host_of(raw: &str) -> Option<String> {
    url::Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

pub fn is_blocked<S: AsRef<str>>(host: &str, blocked: &[S]) -> bool {
    let host = host.to_ascii_lowercase();
    blocked.iter().any(|d| {
        let d = d.as_ref();
        !d.is_empty() && host.contains(&d.to_ascii_lowercase())
    })
}

/// `true` when the bucket has no guardrail or any term occurs in title + snippet.
pub fn passes_guardrail(c: &Candidate, guardrails: &BTreeMap<Bucket, Vec<String>>) -> bool {
    let Some(terms) = guardrails.get(&c.bucket) else {
        return true;
    };
    if terms.is_empty() {
        return true;
    }
    let combined = format!("{} {}", c.title, c.snippet).to_lowercase();
    terms.iter().any(|t| combined.contains(&t.to_lowercase()))
}

/// Best-effort parse of a publish-date hint (RFC 3339, RFC 2822, `YYYY-MM-DD...`).
pub fn parse_date_hint(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(s) {
        return Some(t.with_timezone(&Utc));
    }
    let head = s.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Accept/reject one candidate. No side effects.
pub fn admit(c: &Candidate, history: &History, filters: &Filters, now: DateTime<Utc>) -> Admission {
    let Some(key) = canonical_url(&c.url) else {
        return Admission::reject(RejectStage::Input, "malformed url");
    };
    if history.contains_url(&key) || history.contains_url(&c.url) {
        return Admission::reject(RejectStage::Duplicate, "already processed");
    }
    if let Some(threshold) = filters.title_similarity_threshold {
        if let Some(prev) = history.similar_title(&c.title, threshold) {
            return Admission::reject(RejectStage::Duplicate, format!("similar title: {prev}"));
        }
    }
    let host = host_of(&c.url).unwrap_or_default();
    if is_blocked(&host, &filters.blocked_domains) {
        return Admission::reject(RejectStage::BlockedDomain, format!("blocked source {host}"));
    }
    if !passes_guardrail(c, &filters.guardrails) {
        return Admission::reject(
            RejectStage::Guardrail,
            format!("no {} keyword in title/snippet", c.bucket),
        );
    }
    if let Some(max_days) = filters.max_age_days {
        if let Some(published) = c.source_date.as_deref().and_then(parse_date_hint) {
            if now.signed_duration_since(published) > chrono::Duration::days(max_days) {
                return Admission::reject(RejectStage::Stale, format!("older than {max_days}d"));
            }
        }
    }
    Admission::Accept
}

/// Result of input-side filtering of one batch.
#[derive(Debug, Default)]
pub struct FreshBatch {
    /// Admitted candidates in input order.
    pub admitted: Vec<Candidate>,
    pub rejected: Vec<Disposition>,
}

/// Validate raw rows, then `admit` each; later duplicates of a canonical key
/// within the batch are dropped (first-seen wins).
pub fn filter_fresh(
    raw: Vec<RawCandidate>,
    history: &History,
    filters: &Filters,
    now: DateTime<Utc>,
) -> FreshBatch {
    let mut out = FreshBatch::default();
    let mut seen: HashSet<String> = HashSet::new();

    for row in raw {
        let url = row.url.clone().unwrap_or_default();
        let candidate = match Candidate::try_from(row) {
            Ok(c) => c,
            Err(e) => {
                out.rejected
                    .push(Disposition::rejected(url, None, RejectStage::Input, e.to_string()));
                continue;
            }
        };

        match admit(&candidate, history, filters, now) {
            Admission::Accept => {}
            Admission::Reject { stage, reason } => {
                out.rejected.push(Disposition::rejected(
                    candidate.url,
                    Some(candidate.bucket),
                    stage,
                    reason,
                ));
                continue;
            }
        }

        // `admit` already guaranteed the URL canonicalizes.
        let key = canonical_url(&candidate.url).unwrap_or_else(|| candidate.url.clone());
        if !seen.insert(key) {
            out.rejected.push(Disposition::rejected(
                candidate.url,
                Some(candidate.bucket),
                RejectStage::Duplicate,
                "duplicate within batch",
            ));
            continue;
        }
        out.admitted.push(candidate);
    }

    out
}
