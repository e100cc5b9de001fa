// tests/common/mod.rs
// Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use content_curator::fetch::FullTextFetcher;
use content_curator::oracle::ScriptedOracle;
use content_curator::scoring::{PromptSet, ScoringAdapter, TextLimits};
use content_curator::RawCandidate;

/// Needles that tell the two prompt templates apart.
pub const PASS1: &str = "# Pass 1";
pub const PASS2: &str = "# Pass 2";

pub fn judgment(bucket: &str, s: [u8; 5], evidence: &[&str]) -> Result<String, String> {
    Ok(serde_json::json!({
        "final_bucket": bucket,
        "bucket_reason": format!("{bucket} fit"),
        "relevance_score": s[0],
        "freshness_score": s[1],
        "credibility_score": s[2],
        "practicality_score": s[3],
        "linkedin_worthiness_score": s[4],
        "evidence_notes": evidence,
    })
    .to_string())
}

pub fn reject() -> Result<String, String> {
    judgment("reject", [1, 1, 1, 1, 1], &[])
}

pub fn raw(url: &str, bucket: &str, title: &str) -> RawCandidate {
    RawCandidate {
        url: Some(url.into()),
        bucket: Some(bucket.into()),
        title: Some(title.into()),
        source_name: Some("Wire".into()),
        snippet: Some(format!("{title} snippet")),
        ..Default::default()
    }
}

pub fn adapter(oracle: Arc<ScriptedOracle>) -> ScoringAdapter {
    ScoringAdapter::new(oracle, PromptSet::default(), TextLimits::default())
}

/// Serves fixed pages and records every URL it was asked for.
#[derive(Default)]
pub struct RecordingFetcher {
    pages: Vec<(String, String)>,
    pub requested: Mutex<Vec<String>>,
}

impl RecordingFetcher {
    pub fn with_page(mut self, url: &str, text: &str) -> Self {
        self.pages.push((url.into(), text.into()));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FullTextFetcher for RecordingFetcher {
    async fn fetch(&self, url: &str) -> String {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, t)| t.clone())
            .unwrap_or_default()
    }
}
