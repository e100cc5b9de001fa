//! store.rs: candidate source and selection sink.
//!
//! Both sides are JSON Lines files in production: `raw_candidates.jsonl` in,
//! `selected.jsonl` out (append-only). The selection file doubles as the
//! historical exclusion set of the next run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::candidate::{Bucket, RawCandidate};
use crate::history::History;
use crate::select::{RejectStage, ScoredCandidate};

pub const DEFAULT_CANDIDATES_PATH: &str = "data/raw_candidates.jsonl";
pub const DEFAULT_SELECTED_PATH: &str = "data/selected.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRole {
    Winner,
    Backup,
}

impl SelectionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionRole::Winner => "winner",
            SelectionRole::Backup => "backup",
        }
    }
}

/// One emitted row per winner or backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub selected_at: DateTime<Utc>,
    /// Bucket assigned by the last scoring pass.
    pub bucket: Bucket,
    /// Bucket whose query produced the candidate.
    pub source_bucket: Bucket,
    pub selection_role: SelectionRole,
    pub final_score: f64,
    pub ready_for_write: bool,
    pub bucket_reason: String,
    pub url: String,
    pub title: String,
    pub source_name: String,
    #[serde(default)]
    pub source_date: Option<String>,
    pub key_evidence_notes: String,
    pub article_text_truncated: String,
    pub article_text_hash: String,
}

impl SelectionRecord {
    pub fn from_scored(sc: &ScoredCandidate, role: SelectionRole, selected_at: DateTime<Utc>) -> Self {
        let c = &sc.candidate;
        Self {
            selected_at,
            bucket: sc.assigned_bucket,
            source_bucket: sc.source_bucket,
            selection_role: role,
            final_score: sc.final_score(),
            ready_for_write: false,
            bucket_reason: sc.reason.clone(),
            url: c.url.clone(),
            title: c.title.clone(),
            source_name: c.source_name.clone(),
            source_date: c.source_date.clone(),
            key_evidence_notes: sc.evidence.join("; "),
            article_text_truncated: sc.article_text.clone().unwrap_or_default(),
            article_text_hash: sc.article_hash.clone().unwrap_or_default(),
        }
    }

    pub fn is_winner(&self) -> bool {
        self.selection_role == SelectionRole::Winner
    }
}

/// Persistence failure. Always fatal for the invocation.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encoding selection record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SelectionSink: Send + Sync {
    /// Append a whole run's records.
    async fn append(&self, records: &[SelectionRecord]) -> Result<(), SinkError>;
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn load(&self) -> anyhow::Result<Vec<RawCandidate>>;
}

// ------------------------------------------------------------
// JSONL selection store
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JsonlSelectionStore {
    path: PathBuf,
}

impl JsonlSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows written so far. Missing file = no rows; malformed rows are
    /// skipped with a warning.
    pub fn load_records(&self) -> Result<Vec<SelectionRecord>, SinkError> {
        let Some(content) = self.read_existing()? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SelectionRecord>(line) {
                Ok(r) => out.push(r),
                Err(e) => warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping malformed selection row"),
            }
        }
        Ok(out)
    }

    /// Historical exclusion set: every URL (and title) ever written.
    /// Only `url`/`title` are read, so rows from older layouts still count.
    pub fn load_history(&self) -> Result<History, SinkError> {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default)]
            url: Option<String>,
            #[serde(default)]
            title: Option<String>,
        }

        let mut history = History::new();
        let Some(content) = self.read_existing()? else {
            return Ok(history);
        };
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            if let Ok(Row { url: Some(url), title }) = serde_json::from_str::<Row>(line) {
                history.record(&url, title.as_deref());
            }
        }
        Ok(history)
    }

    fn read_existing(&self) -> Result<Option<String>, SinkError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SinkError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn io_err(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SelectionSink for JsonlSelectionStore {
    async fn append(&self, records: &[SelectionRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for r in records {
            buf.push_str(&serde_json::to_string(r)?);
            buf.push('\n');
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_err(e))?;
        }
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        f.write_all(buf.as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        f.flush().await.map_err(|e| self.io_err(e))?;

        info!(path = %self.path.display(), rows = records.len(), "selection rows appended");
        Ok(())
    }
}

// --- Test helper ---
#[derive(Default)]
pub struct MemorySink {
    pub batches: Mutex<Vec<Vec<SelectionRecord>>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every append fails.
    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn records(&self) -> Vec<SelectionRecord> {
        self.batches
            .lock()
            .map(|g| g.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SelectionSink for MemorySink {
    async fn append(&self, records: &[SelectionRecord]) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Unavailable("memory sink set to fail".into()));
        }
        self.batches
            .lock()
            .map_err(|_| SinkError::Unavailable("poisoned".into()))?
            .push(records.to_vec());
        Ok(())
    }
}

// ------------------------------------------------------------
// Candidate sources
// ------------------------------------------------------------

/// Reads `raw_candidates.jsonl`. Malformed lines are skipped and counted
/// as `input` rejections.
#[derive(Debug, Clone)]
pub struct JsonlCandidateSource {
    path: PathBuf,
}

impl JsonlCandidateSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for JsonlCandidateSource {
    async fn load(&self) -> anyhow::Result<Vec<RawCandidate>> {
        use anyhow::Context;

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading candidates from {}", self.path.display()))?;
        let (rows, skipped) = parse_candidate_lines(&content);
        if skipped > 0 {
            crate::metrics::record_rejected_n(RejectStage::Input, skipped as u64);
            warn!(path = %self.path.display(), skipped, "skipped malformed candidate lines");
        }
        Ok(rows)
    }
}

/// Parse JSONL rows; returns `(rows, malformed_line_count)`.
pub fn parse_candidate_lines(content: &str) -> (Vec<RawCandidate>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<RawCandidate>(line) {
            Ok(r) => rows.push(r),
            Err(_) => skipped += 1,
        }
    }
    (rows, skipped)
}

/// In-memory source for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pub rows: Vec<RawCandidate>,
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn load(&self) -> anyhow::Result<Vec<RawCandidate>> {
        Ok(self.rows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, role: SelectionRole) -> SelectionRecord {
        SelectionRecord {
            selected_at: Utc::now(),
            bucket: Bucket::Upstream,
            source_bucket: Bucket::Upstream,
            selection_role: role,
            final_score: 4.0,
            ready_for_write: false,
            bucket_reason: "r".into(),
            url: url.into(),
            title: format!("title {url}"),
            source_name: "S".into(),
            source_date: None,
            key_evidence_notes: "a; b".into(),
            article_text_truncated: "text".into(),
            article_text_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlSelectionStore::new(dir.path().join("nested/selected.jsonl"));
        assert!(store.load_records().unwrap().is_empty());

        store
            .append(&[
                record("https://a.test/1", SelectionRole::Winner),
                record("https://a.test/2", SelectionRole::Backup),
            ])
            .await
            .unwrap();
        store
            .append(&[record("https://a.test/3", SelectionRole::Winner)])
            .await
            .unwrap();

        let rows = store.load_records().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_winner());
        let h = store.load_history().unwrap();
        assert!(h.contains_url("https://a.test/2/"));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn history_tolerates_partial_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selected.jsonl");
        fs::write(
            &path,
            "{\"url\":\"https://old.test/x\"}\nnot json\n\n{\"title\":\"no url\"}\n",
        )
        .unwrap();
        let store = JsonlSelectionStore::new(&path);
        let h = store.load_history().unwrap();
        assert_eq!(h.len(), 1);
        assert!(h.contains_url("https://old.test/x"));
        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn candidate_lines_count_malformed() {
        let (rows, skipped) = parse_candidate_lines(
            "{\"url\":\"https://a.test/1\",\"bucket\":\"general\",\"title\":\"T\"}\n{oops\n\n",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn failing_sink_errors() {
        let sink = MemorySink::failing();
        let err = sink
            .append(&[record("https://a.test/1", SelectionRole::Winner)])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }
}
