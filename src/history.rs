//! history.rs: historical exclusion set built from prior selection output.
//!
//! Keys are canonical URLs (see `ingest::canonical_url`); rows whose URL does
//! not parse are kept by their trimmed stored form so exact matches still hit.

use std::collections::HashSet;

use strsim::normalized_levenshtein;

use crate::ingest::canonical_url;
use crate::store::SelectionRecord;

#[derive(Debug, Clone, Default)]
pub struct History {
    keys: HashSet<String>,
    titles: Vec<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows previously written to the selection sink.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a SelectionRecord>,
    {
        let mut h = Self::new();
        for r in records {
            h.record(&r.url, Some(&r.title));
        }
        h
    }

    pub fn record(&mut self, url: &str, title: Option<&str>) {
        self.keys.insert(history_key(url));
        if let Some(t) = title.map(str::trim).filter(|t| !t.is_empty()) {
            let t = t.to_lowercase();
            if !self.titles.contains(&t) {
                self.titles.push(t);
            }
        }
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.keys.contains(&history_key(url))
    }

    /// First historical title more than `threshold` similar to `title`.
    pub fn similar_title(&self, title: &str, threshold: f64) -> Option<&str> {
        let needle = title.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.titles
            .iter()
            .find(|t| normalized_levenshtein(&needle, t) > threshold)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn history_key(url: &str) -> String {
    canonical_url(url).unwrap_or_else(|| url.trim().to_string())
}
