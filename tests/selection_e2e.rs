// tests/selection_e2e.rs
mod common;

use chrono::Utc;
use std::sync::Arc;

use common::{adapter, judgment, raw, reject, RecordingFetcher, PASS1, PASS2};
use content_curator::history::History;
use content_curator::oracle::ScriptedOracle;
use content_curator::select::{sha256_hex, Outcome};
use content_curator::store::{MemorySink, StaticSource};
use content_curator::{Bucket, Pipeline, PipelineConfig, RejectStage, RunSize, SelectionRole};

const A: &str = "https://news.test/upstream/alpha";
const B: &str = "https://news.test/upstream/bravo";
const C: &str = "https://news.test/upstream/charlie";

fn upstream_oracle() -> Arc<ScriptedOracle> {
    Arc::new(
        ScriptedOracle::new(Err("unexpected prompt".into()))
            .on(&[PASS1, "Title: Alpha"], judgment("upstream", [5, 5, 5, 5, 5], &[]))
            .on(&[PASS1, "Title: Bravo"], judgment("upstream", [3, 3, 3, 3, 3], &[]))
            .on(&[PASS1, "Title: Charlie"], reject())
            // Pass-2 freshness of 1 must be ignored in favour of pass 1's 5.
            .on(
                &[PASS2, "Title: Alpha"],
                judgment("upstream", [4, 1, 4, 4, 4], &["rig count up", "operator quote"]),
            ),
    )
}

fn input() -> StaticSource {
    StaticSource {
        rows: vec![
            raw(A, "upstream", "Alpha rig record"),
            raw(B, "upstream", "Bravo lease sale"),
            raw(C, "upstream", "Charlie press note"),
        ],
    }
}

#[tokio::test]
async fn upstream_scenario_selects_alpha_alone() {
    let oracle = upstream_oracle();
    let adapter = adapter(oracle.clone());
    let body = "Alpha drilled a record lateral. ".repeat(50);
    let fetcher = RecordingFetcher::default().with_page(A, &body);
    let cfg = PipelineConfig::default();
    assert_eq!(cfg.shortlist_count(), 2);
    assert_eq!(cfg.fulltext_fetch_limit(), 1);

    let sink = MemorySink::new();
    let report = Pipeline::new(&cfg, &adapter, &fetcher)
        .run_once(&input(), &History::new(), &sink, Utc::now())
        .await
        .unwrap();

    // Only A was fetched; B fell outside the budget.
    assert_eq!(fetcher.requested(), vec![A.to_string()]);

    assert_eq!(report.records.len(), 1, "pool of one yields no backups");
    let w = &report.records[0];
    assert_eq!(w.url, A);
    assert_eq!(w.selection_role, SelectionRole::Winner);
    assert_eq!(w.bucket, Bucket::Upstream);
    assert_eq!(w.source_bucket, Bucket::Upstream);
    assert!((w.final_score - 29.0 / 7.0).abs() < 1e-9);
    assert!(w.ready_for_write);
    assert_eq!(w.key_evidence_notes, "rig count up; operator quote");
    assert_eq!(w.article_text_hash, sha256_hex(&body));
    assert_eq!(w.article_text_truncated, body);
    assert_eq!(w.bucket_reason, "upstream fit");

    assert_eq!(report.rejected_at(RejectStage::Pass1), 1);
    assert_eq!(report.rejected_at(RejectStage::BeyondFetchBudget), 1);
    let b = report.dispositions.iter().find(|d| d.url == B).unwrap();
    assert_eq!(b.stage(), Some(RejectStage::BeyondFetchBudget));
    let a = report.dispositions.iter().find(|d| d.url == A).unwrap();
    assert_eq!(a.outcome, Outcome::Pooled);

    // The sink got exactly this run's records in one batch.
    assert_eq!(sink.batches.lock().unwrap().len(), 1);
    assert_eq!(sink.records(), report.records);
}

#[tokio::test]
async fn every_scoring_call_is_deterministic() {
    let oracle = upstream_oracle();
    let adapter = adapter(oracle.clone());
    let fetcher = RecordingFetcher::default().with_page(A, "text");
    let cfg = PipelineConfig::default();
    Pipeline::new(&cfg, &adapter, &fetcher)
        .select(input().rows, &History::new(), Utc::now())
        .await;

    let calls = oracle.calls();
    // 3 pass-1 prompts + 1 pass-2 prompt.
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|(_, t)| *t == 0.0));
}

#[tokio::test]
async fn winners_and_backups_are_ranked_per_bucket() {
    let oracle = Arc::new(
        ScriptedOracle::new(Err("unexpected".into()))
            .on(&[PASS1], judgment("general", [3, 3, 3, 3, 3], &[]))
            .on(&[PASS2, "Title: G1"], judgment("general", [3, 3, 3, 3, 3], &[]))
            .on(&[PASS2, "Title: G2"], judgment("general", [5, 3, 5, 5, 5], &[]))
            .on(&[PASS2, "Title: G3"], judgment("general", [4, 3, 4, 4, 4], &[]))
            .on(&[PASS2, "Title: G4"], judgment("general", [3, 3, 3, 3, 3], &[]))
            .on(&[PASS2, "Title: R1"], judgment("regulation", [5, 3, 5, 5, 5], &[])),
    );
    let adapter = adapter(oracle);
    let mut fetcher = RecordingFetcher::default();
    let mut rows = Vec::new();
    for t in ["G1", "G2", "G3", "G4"] {
        let url = format!("https://news.test/general/{t}");
        fetcher = fetcher.with_page(&url, "body");
        rows.push(raw(&url, "general", t));
    }
    fetcher = fetcher.with_page("https://news.test/reg/R1", "body");
    rows.push(raw("https://news.test/reg/R1", "regulation", "R1"));

    let mut cfg = PipelineConfig::default();
    cfg.run_size = RunSize::Prod;
    cfg.shortlist_count_prod = 5;
    cfg.fulltext_fetch_per_bucket_prod = 5;
    cfg.backups_per_bucket = 2;

    let report = Pipeline::new(&cfg, &adapter, &fetcher)
        .select(rows, &History::new(), Utc::now())
        .await;

    let got: Vec<(&str, SelectionRole, bool)> = report
        .records
        .iter()
        .map(|r| (r.title.as_str(), r.selection_role, r.ready_for_write))
        .collect();
    // G1 and G4 tie; G1 came first so it is the second backup.
    assert_eq!(
        got,
        vec![
            ("G2", SelectionRole::Winner, true),
            ("G3", SelectionRole::Backup, false),
            ("G1", SelectionRole::Backup, false),
            ("R1", SelectionRole::Winner, true),
        ]
    );
    let selected_at = report.records[0].selected_at;
    assert!(report.records.iter().all(|r| r.selected_at == selected_at));
    // Backups never outrank their winner.
    assert!(report.records[1].final_score <= report.records[0].final_score);
    assert!(report.records[2].final_score <= report.records[1].final_score);
}
