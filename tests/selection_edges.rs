// tests/selection_edges.rs
mod common;

use std::sync::Arc;

use common::{adapter, judgment, raw, reject, RecordingFetcher, PASS1, PASS2};
use content_curator::oracle::ScriptedOracle;
use content_curator::select::{EngineSettings, Outcome, SelectionEngine};
use content_curator::{Bucket, Candidate, RejectStage};

fn cand(url: &str, bucket: &str, title: &str) -> Candidate {
    Candidate::try_from(raw(url, bucket, title)).unwrap()
}

fn settings(shortlist: usize, fetch: usize) -> EngineSettings {
    EngineSettings {
        shortlist_count: shortlist,
        fulltext_fetch_limit: fetch,
        backups_per_bucket: 2,
        stored_text_chars: 45_000,
    }
}

#[tokio::test]
async fn pass2_keeps_pass1_freshness() {
    let oracle = Arc::new(
        ScriptedOracle::new(Err("unexpected".into()))
            .on(&[PASS1], judgment("general", [3, 2, 3, 3, 3], &[]))
            .on(&[PASS2], judgment("general", [5, 5, 5, 5, 5], &[])),
    );
    let adapter = adapter(oracle);
    let fetcher = RecordingFetcher::default().with_page("https://a.test/1", "full text");
    let engine = SelectionEngine::new(&adapter, &fetcher, settings(2, 1));

    let out = engine
        .run(vec![cand("https://a.test/1", "general", "One")])
        .await;
    let w = &out.selections[0].winner;
    assert_eq!(w.scores.freshness, 2);
    // (5*2 + 2 + 5*1.5 + 5*1.5 + 5) / 7
    assert!((w.final_score() - 32.0 / 7.0).abs() < 1e-9);
    assert!((w.pass1_score - 20.0 / 7.0).abs() < 1e-9);
}

#[tokio::test]
async fn sole_fetch_failure_leaves_bucket_without_winner() {
    let oracle = Arc::new(
        ScriptedOracle::new(Err("unexpected".into()))
            .on(&[PASS1], judgment("upstream", [5, 5, 5, 5, 5], &[])),
    );
    let adapter = adapter(oracle.clone());
    let fetcher = RecordingFetcher::default().with_page("https://a.test/1", "   \n ");
    let engine = SelectionEngine::new(&adapter, &fetcher, settings(2, 1));

    let out = engine
        .run(vec![cand("https://a.test/1", "upstream", "One")])
        .await;
    assert!(out.selections.is_empty());
    assert_eq!(out.dispositions.len(), 1);
    assert_eq!(out.dispositions[0].stage(), Some(RejectStage::FetchFailed));
    assert_eq!(
        out.dispositions[0].outcome,
        Outcome::Rejected {
            stage: RejectStage::FetchFailed,
            reason: "no article text".into(),
        }
    );
    // No retry, no pass-2 prompt.
    assert_eq!(fetcher.requested().len(), 1);
    assert_eq!(oracle.calls().len(), 1);
}

#[tokio::test]
async fn pass1_reject_never_reaches_pass2_or_fetch() {
    let oracle = Arc::new(
        ScriptedOracle::new(Err("unexpected".into()))
            .on(&[PASS1, "Title: Bad"], reject())
            .on(&[PASS1], judgment("general", [2, 2, 2, 2, 2], &[]))
            .on(&[PASS2], judgment("general", [2, 2, 2, 2, 2], &[])),
    );
    let adapter = adapter(oracle.clone());
    let fetcher = RecordingFetcher::default()
        .with_page("https://a.test/bad", "t")
        .with_page("https://a.test/ok", "t");
    let engine = SelectionEngine::new(&adapter, &fetcher, settings(5, 5));

    let out = engine
        .run(vec![
            cand("https://a.test/bad", "general", "Bad"),
            cand("https://a.test/ok", "general", "Ok"),
        ])
        .await;

    assert_eq!(fetcher.requested(), vec!["https://a.test/ok".to_string()]);
    let pass2_prompts = oracle
        .calls()
        .into_iter()
        .filter(|(p, _)| p.contains(PASS2))
        .count();
    assert_eq!(pass2_prompts, 1);
    assert_eq!(out.selections.len(), 1);
    assert_eq!(out.selections[0].winner.candidate.url, "https://a.test/ok");
}

#[tokio::test]
async fn pass1_reject_with_top_scores_is_never_shortlisted() {
    let oracle = Arc::new(
        ScriptedOracle::new(Err("unexpected".into()))
            .on(&[PASS1, "Title: Loud"], judgment("reject", [5, 5, 5, 5, 5], &[]))
            .on(&[PASS1], judgment("general", [2, 2, 2, 2, 2], &[]))
            .on(&[PASS2], judgment("general", [2, 2, 2, 2, 2], &[])),
    );
    let adapter = adapter(oracle.clone());
    let fetcher = RecordingFetcher::default()
        .with_page("https://a.test/loud", "t")
        .with_page("https://a.test/quiet", "t");
    let engine = SelectionEngine::new(&adapter, &fetcher, settings(1, 1));

    let out = engine
        .run(vec![
            cand("https://a.test/loud", "general", "Loud"),
            cand("https://a.test/quiet", "general", "Quiet"),
        ])
        .await;

    // The low scorer takes the only shortlist slot.
    assert_eq!(out.dispositions[0].url, "https://a.test/loud");
    assert_eq!(out.dispositions[0].stage(), Some(RejectStage::Pass1));
    assert_eq!(fetcher.requested(), vec!["https://a.test/quiet".to_string()]);
    assert!(oracle
        .calls()
        .iter()
        .all(|(p, _)| !(p.contains(PASS2) && p.contains("Title: Loud"))));
    assert_eq!(out.selections[0].winner.candidate.url, "https://a.test/quiet");
}

#[tokio::test]
async fn oracle_failures_reject_without_aborting_the_batch() {
    let oracle = Arc::new(
        ScriptedOracle::new(Ok("not json at all".into()))
            .on(&[PASS1, "Title: Good"], judgment("general", [4, 4, 4, 4, 4], &[]))
            .on(&[PASS2, "Title: Good"], judgment("general", [4, 4, 4, 4, 4], &[])),
    );
    let adapter = adapter(oracle);
    let fetcher = RecordingFetcher::default().with_page("https://a.test/good", "t");
    let engine = SelectionEngine::new(&adapter, &fetcher, settings(2, 2));

    let out = engine
        .run(vec![
            cand("https://a.test/garbled", "general", "Garbled"),
            cand("https://a.test/good", "general", "Good"),
        ])
        .await;
    assert_eq!(out.dispositions[0].stage(), Some(RejectStage::Pass1));
    assert_eq!(out.selections.len(), 1);
    assert_eq!(out.pooled_count(), 1);
}

#[tokio::test]
async fn pass2_reject_and_bucket_reassignment() {
    let oracle = Arc::new(
        ScriptedOracle::new(Err("unexpected".into()))
            .on(&[PASS1, "Title: Drop"], judgment("general", [5, 5, 5, 5, 5], &[]))
            .on(&[PASS1, "Title: Move"], judgment("regulation", [4, 4, 4, 4, 4], &[]))
            .on(&[PASS2, "Title: Drop"], reject())
            .on(
                &[PASS2, "Title: Move", "Query Bucket Hint: regulation"],
                judgment("regulation", [4, 4, 4, 4, 4], &["EPA docket"]),
            ),
    );
    let adapter = adapter(oracle);
    let fetcher = RecordingFetcher::default()
        .with_page("https://a.test/drop", "t")
        .with_page("https://a.test/move", "t");
    let engine = SelectionEngine::new(&adapter, &fetcher, settings(2, 2));

    let out = engine
        .run(vec![
            cand("https://a.test/drop", "general", "Drop"),
            cand("https://a.test/move", "general", "Move"),
        ])
        .await;

    assert_eq!(out.dispositions[0].stage(), Some(RejectStage::Pass2));
    let sel = &out.selections[0];
    // Grouped by the bucket that sourced it, labelled with the one assigned.
    assert_eq!(sel.source_bucket, Bucket::General);
    assert_eq!(sel.winner.assigned_bucket, Bucket::Regulation);
    assert_eq!(sel.winner.evidence, vec!["EPA docket".to_string()]);
}

#[tokio::test]
async fn stored_text_is_truncated_but_hash_covers_everything() {
    let oracle = Arc::new(
        ScriptedOracle::new(Err("unexpected".into()))
            .on(&[], judgment("general", [3, 3, 3, 3, 3], &[])),
    );
    let adapter = adapter(oracle);
    let long = "é".repeat(50_000);
    let fetcher = RecordingFetcher::default().with_page("https://a.test/1", &long);
    let engine = SelectionEngine::new(&adapter, &fetcher, settings(1, 1));

    let out = engine
        .run(vec![cand("https://a.test/1", "general", "One")])
        .await;
    let w = &out.selections[0].winner;
    assert_eq!(w.article_text.as_ref().unwrap().chars().count(), 45_000);
    assert_eq!(
        w.article_hash.as_deref(),
        Some(content_curator::select::sha256_hex(&long).as_str())
    );
}
