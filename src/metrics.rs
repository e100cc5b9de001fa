//! Metric names and one-time descriptions.
//!
//! Counters are plain `metrics` macros; without an installed recorder they are
//! no-ops. The binary does not install an exporter.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::select::RejectStage;
use crate::store::SelectionRole;

pub const CANDIDATES_TOTAL: &str = "selection_candidates_total";
pub const REJECTED_TOTAL: &str = "selection_rejected_total";
pub const POOLED_TOTAL: &str = "selection_pooled_total";
pub const RECORDS_TOTAL: &str = "selection_records_total";
pub const ORACLE_CALLS_TOTAL: &str = "oracle_calls_total";
pub const ORACLE_FAILURES_TOTAL: &str = "oracle_failures_total";
pub const FETCH_FAILURES_TOTAL: &str = "fulltext_fetch_failures_total";
pub const LAST_RUN_TS: &str = "selection_last_run_ts";

/// One-time metrics registration (so series carry help text once exported).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(CANDIDATES_TOTAL, "Raw candidates read from the source.");
        describe_counter!(
            REJECTED_TOTAL,
            "Candidates rejected, labelled by pipeline stage."
        );
        describe_counter!(POOLED_TOTAL, "Candidates that survived both scoring passes.");
        describe_counter!(
            RECORDS_TOTAL,
            "Selection records emitted, labelled by role."
        );
        describe_counter!(ORACLE_CALLS_TOTAL, "Scoring prompts sent to the oracle.");
        describe_counter!(
            ORACLE_FAILURES_TOTAL,
            "Oracle calls that errored or returned an unparseable judgment."
        );
        describe_counter!(FETCH_FAILURES_TOTAL, "Full-text fetches that returned nothing.");
        describe_gauge!(LAST_RUN_TS, "Unix ts when the selection pipeline last ran.");
    });
}

pub fn record_rejected(stage: RejectStage) {
    record_rejected_n(stage, 1);
}

pub fn record_rejected_n(stage: RejectStage, n: u64) {
    counter!(REJECTED_TOTAL, "stage" => stage.as_str()).increment(n);
}

pub fn record_emitted(role: SelectionRole) {
    counter!(RECORDS_TOTAL, "role" => role.as_str()).increment(1);
}

pub fn mark_run(ts: i64) {
    gauge!(LAST_RUN_TS).set(ts as f64);
}
