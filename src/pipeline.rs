//! One batch invocation: load → filter → two-pass selection → readiness →
//! append. Only persistence (and reading the input) can fail the run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::candidate::RawCandidate;
use crate::config::run::PipelineConfig;
use crate::fetch::FullTextFetcher;
use crate::history::History;
use crate::ingest::filter_fresh;
use crate::metrics::{
    ensure_metrics_described, mark_run, record_emitted, record_rejected, CANDIDATES_TOTAL,
    POOLED_TOTAL,
};
use crate::readiness::apply_readiness;
use crate::scoring::ScoringAdapter;
use crate::select::{Disposition, EngineSettings, Outcome, RejectStage, SelectionEngine};
use crate::store::{CandidateSource, SelectionRecord, SelectionSink};

/// What one invocation produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub selected_at: DateTime<Utc>,
    pub candidates_in: usize,
    pub records: Vec<SelectionRecord>,
    /// Every input row, in the order its fate was decided.
    pub dispositions: Vec<Disposition>,
}

impl RunReport {
    pub fn rejected_at(&self, stage: RejectStage) -> usize {
        self.dispositions
            .iter()
            .filter(|d| d.stage() == Some(stage))
            .count()
    }

    pub fn ready_count(&self) -> usize {
        self.records.iter().filter(|r| r.ready_for_write).count()
    }
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    adapter: &'a ScoringAdapter,
    fetcher: &'a dyn FullTextFetcher,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        adapter: &'a ScoringAdapter,
        fetcher: &'a dyn FullTextFetcher,
    ) -> Self {
        Self {
            config,
            adapter,
            fetcher,
        }
    }

    /// Selection without persistence.
    pub async fn select(
        &self,
        raw: Vec<RawCandidate>,
        history: &History,
        now: DateTime<Utc>,
    ) -> RunReport {
        ensure_metrics_described();
        let candidates_in = raw.len();
        counter!(CANDIDATES_TOTAL).increment(candidates_in as u64);

        let fresh = filter_fresh(raw, history, &self.config.filters(), now);
        info!(
            target: "pipeline",
            candidates_in,
            admitted = fresh.admitted.len(),
            history = history.len(),
            mode = %self.config.run_size,
            "input filtered"
        );

        let engine = SelectionEngine::new(
            self.adapter,
            self.fetcher,
            EngineSettings::from(self.config),
        );
        let outcome = engine.run(fresh.admitted).await;

        let mut records = outcome.to_records(now);
        apply_readiness(&mut records, self.config.run_size);

        let mut dispositions = fresh.rejected;
        dispositions.extend(outcome.dispositions);
        for d in &dispositions {
            match &d.outcome {
                Outcome::Rejected { stage, .. } => record_rejected(*stage),
                Outcome::Pooled => counter!(POOLED_TOTAL).increment(1),
            }
        }
        for r in &records {
            record_emitted(r.selection_role);
        }
        mark_run(now.timestamp());

        let report = RunReport {
            selected_at: now,
            candidates_in,
            records,
            dispositions,
        };
        info!(
            target: "pipeline",
            records = report.records.len(),
            ready = report.ready_count(),
            "selection complete"
        );
        report
    }

    /// Full invocation. Sink failures are returned as errors.
    pub async fn run_once(
        &self,
        source: &dyn CandidateSource,
        history: &History,
        sink: &dyn SelectionSink,
        now: DateTime<Utc>,
    ) -> Result<RunReport> {
        let raw = source.load().await.context("loading candidates")?;
        let report = self.select(raw, history, now).await;

        if report.records.is_empty() {
            warn!(target: "pipeline", "no selections this run");
        }
        sink.append(&report.records)
            .await
            .context("appending selection records")?;
        Ok(report)
    }
}
