//! # Two-pass selection engine
//!
//! Per source bucket (first-seen order):
//! Pass 1 scores every admitted candidate on its snippet, drops rejects and
//! keeps the top `shortlist_count` by composite. Pass 2 fetches full text for
//! the first `fulltext_fetch_limit` of the shortlist, rescores with it, and
//! pools survivors. The pool's best item is the winner, the next K are backups.
//!
//! Sorting is always stable and descending, so ties keep input order.
//! Collaborator calls are awaited one after another.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info};

use crate::candidate::{Bucket, Candidate};
use crate::config::run::PipelineConfig;
use crate::fetch::FullTextFetcher;
use crate::metrics::FETCH_FAILURES_TOTAL;
use crate::scoring::judgment::BucketVerdict;
use crate::scoring::prompt::truncate_chars;
use crate::scoring::{Judgment, ScorePass, ScoringAdapter, SubScores};
use crate::store::{SelectionRecord, SelectionRole};

/// Where a candidate left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectStage {
    Input,
    Duplicate,
    BlockedDomain,
    Guardrail,
    Stale,
    Pass1,
    NotShortlisted,
    BeyondFetchBudget,
    FetchFailed,
    Pass2,
}

impl RejectStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectStage::Input => "input",
            RejectStage::Duplicate => "duplicate",
            RejectStage::BlockedDomain => "blocked_domain",
            RejectStage::Guardrail => "guardrail",
            RejectStage::Stale => "stale",
            RejectStage::Pass1 => "pass1",
            RejectStage::NotShortlisted => "not_shortlisted",
            RejectStage::BeyondFetchBudget => "beyond_fetch_budget",
            RejectStage::FetchFailed => "fetch_failed",
            RejectStage::Pass2 => "pass2",
        }
    }
}

impl fmt::Display for RejectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    Pooled,
    Rejected { stage: RejectStage, reason: String },
}

/// Audit entry: final state of one input candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disposition {
    pub url: String,
    /// `None` when the row never became a valid candidate.
    pub source_bucket: Option<Bucket>,
    pub outcome: Outcome,
}

impl Disposition {
    pub fn rejected(
        url: String,
        source_bucket: Option<Bucket>,
        stage: RejectStage,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            url,
            source_bucket,
            outcome: Outcome::Rejected {
                stage,
                reason: reason.into(),
            },
        }
    }

    pub fn pooled(url: String, source_bucket: Bucket) -> Self {
        Self {
            url,
            source_bucket: Some(source_bucket),
            outcome: Outcome::Pooled,
        }
    }

    pub fn stage(&self) -> Option<RejectStage> {
        match &self.outcome {
            Outcome::Rejected { stage, .. } => Some(*stage),
            Outcome::Pooled => None,
        }
    }
}

/// A candidate plus everything the engine derived for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub source_bucket: Bucket,
    /// Latest non-reject verdict.
    pub assigned_bucket: Bucket,
    pub scores: SubScores,
    pub pass1_score: f64,
    pub pass2_score: Option<f64>,
    pub provenance: ScorePass,
    pub reason: String,
    pub evidence: Vec<String>,
    /// SHA-256 hex of the full fetched text (Pass 2 only).
    pub article_hash: Option<String>,
    pub article_text: Option<String>,
    /// Position in the admitted batch.
    pub input_index: usize,
}

impl ScoredCandidate {
    /// Pass-2 composite when present, else Pass-1.
    pub fn final_score(&self) -> f64 {
        self.pass2_score.unwrap_or(self.pass1_score)
    }
}

/// Winner and backups for one source bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSelection {
    pub source_bucket: Bucket,
    pub winner: ScoredCandidate,
    pub backups: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionOutcome {
    /// In bucket processing order.
    pub selections: Vec<BucketSelection>,
    pub dispositions: Vec<Disposition>,
}

impl SelectionOutcome {
    pub fn pooled_count(&self) -> usize {
        self.dispositions
            .iter()
            .filter(|d| d.outcome == Outcome::Pooled)
            .count()
    }

    /// Winner then backups per bucket, all stamped with `selected_at`.
    /// Readiness is left `false`; see `readiness::apply_readiness`.
    pub fn to_records(&self, selected_at: DateTime<Utc>) -> Vec<SelectionRecord> {
        let mut out = Vec::new();
        for sel in &self.selections {
            out.push(SelectionRecord::from_scored(
                &sel.winner,
                SelectionRole::Winner,
                selected_at,
            ));
            for b in &sel.backups {
                out.push(SelectionRecord::from_scored(
                    b,
                    SelectionRole::Backup,
                    selected_at,
                ));
            }
        }
        out
    }
}

/// Per-run knobs resolved from `PipelineConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub shortlist_count: usize,
    pub fulltext_fetch_limit: usize,
    pub backups_per_bucket: usize,
    pub stored_text_chars: usize,
}

impl From<&PipelineConfig> for EngineSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            shortlist_count: cfg.shortlist_count(),
            fulltext_fetch_limit: cfg.fulltext_fetch_limit(),
            backups_per_bucket: cfg.backups_per_bucket,
            stored_text_chars: cfg.stored_text_char_limit,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from(&PipelineConfig::default())
    }
}

pub struct SelectionEngine<'a> {
    adapter: &'a ScoringAdapter,
    fetcher: &'a dyn FullTextFetcher,
    settings: EngineSettings,
}

impl<'a> SelectionEngine<'a> {
    pub fn new(
        adapter: &'a ScoringAdapter,
        fetcher: &'a dyn FullTextFetcher,
        settings: EngineSettings,
    ) -> Self {
        Self {
            adapter,
            fetcher,
            settings,
        }
    }

    /// Run both passes over an admitted batch.
    pub async fn run(&self, candidates: Vec<Candidate>) -> SelectionOutcome {
        let mut outcome = SelectionOutcome::default();
        for (bucket, group) in group_by_source_bucket(candidates) {
            let (selection, dispositions) = self.run_bucket(bucket, group).await;
            outcome.dispositions.extend(dispositions);
            if let Some(sel) = selection {
                outcome.selections.push(sel);
            }
        }
        outcome
    }

    async fn run_bucket(
        &self,
        bucket: Bucket,
        group: Vec<(usize, Candidate)>,
    ) -> (Option<BucketSelection>, Vec<Disposition>) {
        let mut dispositions = Vec::new();
        let total = group.len();

        // Pass 1
        let mut scored = Vec::with_capacity(total);
        for (idx, c) in group {
            let j = self.adapter.evaluate(&c, ScorePass::Pass1, None).await;
            match j.verdict {
                BucketVerdict::Reject => {
                    reject(&mut dispositions, &c, bucket, RejectStage::Pass1, j.reason);
                }
                BucketVerdict::Assign(assigned) => {
                    scored.push(pass1_scored(c, bucket, assigned, idx, j));
                }
            }
        }
        sort_desc(&mut scored);

        let shortlist_len = self.settings.shortlist_count.min(scored.len());
        for sc in scored.split_off(shortlist_len) {
            let reason = format!("pass-1 score {:.2} below shortlist", sc.pass1_score);
            reject(
                &mut dispositions,
                &sc.candidate,
                bucket,
                RejectStage::NotShortlisted,
                reason,
            );
        }
        let shortlisted = scored.len();

        // Pass 2
        let mut pool = Vec::new();
        for (rank, mut sc) in scored.into_iter().enumerate() {
            if rank >= self.settings.fulltext_fetch_limit {
                reject(
                    &mut dispositions,
                    &sc.candidate,
                    bucket,
                    RejectStage::BeyondFetchBudget,
                    format!("fetch budget {} exhausted", self.settings.fulltext_fetch_limit),
                );
                continue;
            }

            let text = self.full_text_for(&sc.candidate).await;
            if text.trim().is_empty() {
                counter!(FETCH_FAILURES_TOTAL).increment(1);
                reject(
                    &mut dispositions,
                    &sc.candidate,
                    bucket,
                    RejectStage::FetchFailed,
                    "no article text",
                );
                continue;
            }

            let j = self
                .adapter
                .evaluate_with_hint(&sc.candidate, sc.assigned_bucket, ScorePass::Pass2, Some(&text))
                .await;
            let assigned = match j.verdict {
                BucketVerdict::Reject => {
                    reject(&mut dispositions, &sc.candidate, bucket, RejectStage::Pass2, j.reason);
                    continue;
                }
                BucketVerdict::Assign(b) => b,
            };

            let scores = j.scores.with_freshness(sc.scores.freshness);
            sc.assigned_bucket = assigned;
            sc.scores = scores;
            sc.pass2_score = Some(scores.composite());
            sc.provenance = ScorePass::Pass2;
            sc.reason = j.reason;
            sc.evidence = j.evidence;
            sc.article_hash = Some(sha256_hex(&text));
            sc.article_text =
                Some(truncate_chars(&text, self.settings.stored_text_chars).to_string());

            dispositions.push(Disposition::pooled(sc.candidate.url.clone(), bucket));
            pool.push(sc);
        }

        info!(
            target: "select",
            %bucket,
            total,
            shortlisted,
            pooled = pool.len(),
            "bucket scored"
        );

        if pool.is_empty() {
            return (None, dispositions);
        }
        sort_desc(&mut pool);
        let mut rest = pool.split_off(1);
        rest.truncate(self.settings.backups_per_bucket);
        let winner = pool.remove(0);

        (
            Some(BucketSelection {
                source_bucket: bucket,
                winner,
                backups: rest,
            }),
            dispositions,
        )
    }

    /// Pre-sourced text wins; otherwise a single fetch.
    async fn full_text_for(&self, c: &Candidate) -> String {
        match c.full_text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(t) => t.to_string(),
            None => self.fetcher.fetch(&c.url).await,
        }
    }
}

fn pass1_scored(
    candidate: Candidate,
    source_bucket: Bucket,
    assigned_bucket: Bucket,
    input_index: usize,
    j: Judgment,
) -> ScoredCandidate {
    ScoredCandidate {
        candidate,
        source_bucket,
        assigned_bucket,
        scores: j.scores,
        pass1_score: j.scores.composite(),
        pass2_score: None,
        provenance: ScorePass::Pass1,
        reason: j.reason,
        evidence: Vec::new(),
        article_hash: None,
        article_text: None,
        input_index,
    }
}

fn reject(
    out: &mut Vec<Disposition>,
    c: &Candidate,
    bucket: Bucket,
    stage: RejectStage,
    reason: impl Into<String>,
) {
    let reason = reason.into();
    debug!(target: "select", url = %c.url, %bucket, %stage, %reason, "candidate rejected");
    out.push(Disposition::rejected(c.url.clone(), Some(bucket), stage, reason));
}

/// Stable descending sort by final score; equal scores keep input order.
fn sort_desc(items: &mut [ScoredCandidate]) {
    items.sort_by(|a, b| b.final_score().total_cmp(&a.final_score()));
}

/// Groups keep input order; groups come in first-seen bucket order.
fn group_by_source_bucket(candidates: Vec<Candidate>) -> Vec<(Bucket, Vec<(usize, Candidate)>)> {
    let mut groups: Vec<(Bucket, Vec<(usize, Candidate)>)> = Vec::new();
    for (idx, c) in candidates.into_iter().enumerate() {
        match groups.iter_mut().find(|(b, _)| *b == c.bucket) {
            Some((_, g)) => g.push((idx, c)),
            None => groups.push((c.bucket, vec![(idx, c)])),
        }
    }
    groups
}

pub fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
