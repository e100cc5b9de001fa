//! Scoring oracle adapter.
//!
//! Builds a deterministic prompt per pass, asks the completion oracle at
//! temperature 0 and parses a strict `Judgment`. Every failure (oracle error,
//! parse error, missing text) degrades to a reject judgment with floor scores,
//! so scoring never aborts the batch.
//!
//! Composite = (relevance*2.0 + freshness*1.0 + credibility*1.5
//!              + practicality*1.5 + shareworthiness*1.0) / 7.0

pub mod judgment;
pub mod prompt;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use judgment::{parse_judgment, BucketVerdict, Judgment, JudgmentError};
pub use prompt::{PromptSet, TextLimits};

use crate::candidate::{Bucket, Candidate};
use crate::metrics::{ORACLE_CALLS_TOTAL, ORACLE_FAILURES_TOTAL};
use crate::oracle::DynOracle;

/// Scoring always runs deterministic.
pub const SCORING_TEMPERATURE: f32 = 0.0;

pub const W_RELEVANCE: f64 = 2.0;
pub const W_FRESHNESS: f64 = 1.0;
pub const W_CREDIBILITY: f64 = 1.5;
pub const W_PRACTICALITY: f64 = 1.5;
pub const W_SHAREWORTHINESS: f64 = 1.0;
pub const WEIGHT_SUM: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePass {
    Pass1,
    Pass2,
}

/// Five integer sub-scores, each within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub relevance: u8,
    pub freshness: u8,
    pub credibility: u8,
    pub practicality: u8,
    pub shareworthiness: u8,
}

impl SubScores {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Safe constructor with clamping.
    pub fn new(
        relevance: u8,
        freshness: u8,
        credibility: u8,
        practicality: u8,
        shareworthiness: u8,
    ) -> Self {
        fn c(x: u8) -> u8 {
            x.clamp(SubScores::MIN, SubScores::MAX)
        }
        Self {
            relevance: c(relevance),
            freshness: c(freshness),
            credibility: c(credibility),
            practicality: c(practicality),
            shareworthiness: c(shareworthiness),
        }
    }

    pub fn uniform(v: u8) -> Self {
        Self::new(v, v, v, v, v)
    }

    /// All minimum; what a failed scoring call reports.
    pub fn floor() -> Self {
        Self::uniform(Self::MIN)
    }

    /// Same scores with freshness replaced (Pass 2 keeps Pass-1 freshness).
    pub fn with_freshness(self, freshness: u8) -> Self {
        Self {
            freshness: freshness.clamp(Self::MIN, Self::MAX),
            ..self
        }
    }

    pub fn composite(&self) -> f64 {
        composite(self)
    }
}

/// Weighted average of the five sub-scores.
pub fn composite(s: &SubScores) -> f64 {
    (f64::from(s.relevance) * W_RELEVANCE
        + f64::from(s.freshness) * W_FRESHNESS
        + f64::from(s.credibility) * W_CREDIBILITY
        + f64::from(s.practicality) * W_PRACTICALITY
        + f64::from(s.shareworthiness) * W_SHAREWORTHINESS)
        / WEIGHT_SUM
}

/// Wraps the completion oracle with prompt building and judgment parsing.
#[derive(Clone)]
pub struct ScoringAdapter {
    oracle: DynOracle,
    prompts: PromptSet,
    limits: TextLimits,
}

impl ScoringAdapter {
    pub fn new(oracle: DynOracle, prompts: PromptSet, limits: TextLimits) -> Self {
        Self {
            oracle,
            prompts,
            limits,
        }
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    /// `evaluate(candidate, pass, full_text?)` with the candidate's own bucket as hint.
    pub async fn evaluate(
        &self,
        c: &Candidate,
        pass: ScorePass,
        full_text: Option<&str>,
    ) -> Judgment {
        self.evaluate_with_hint(c, c.bucket, pass, full_text).await
    }

    /// Same as `evaluate`, with an explicit bucket hint (Pass 2 passes the
    /// bucket assigned in Pass 1).
    pub async fn evaluate_with_hint(
        &self,
        c: &Candidate,
        bucket_hint: Bucket,
        pass: ScorePass,
        full_text: Option<&str>,
    ) -> Judgment {
        let text = match pass {
            ScorePass::Pass1 => None,
            ScorePass::Pass2 => {
                match full_text
                    .or(c.full_text.as_deref())
                    .filter(|t| !t.trim().is_empty())
                {
                    Some(t) => Some(t),
                    None => return Judgment::failed("pass 2 requires full text"),
                }
            }
        };

        let prompt = self.prompts.build(c, bucket_hint, pass, text, self.limits);
        counter!(ORACLE_CALLS_TOTAL).increment(1);

        let response = match self.oracle.complete(&prompt, SCORING_TEMPERATURE).await {
            Ok(r) => r,
            Err(e) => {
                counter!(ORACLE_FAILURES_TOTAL).increment(1);
                warn!(target: "scoring", url = %c.url, ?pass, error = %e, "oracle call failed");
                return Judgment::failed(e);
            }
        };

        match parse_judgment(&response) {
            Ok(j) => j,
            Err(e) => {
                counter!(ORACLE_FAILURES_TOTAL).increment(1);
                warn!(target: "scoring", url = %c.url, ?pass, error = %e, "unparseable judgment");
                Judgment::failed(e)
            }
        }
    }
}
