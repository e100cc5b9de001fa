// src/config/run.rs
//! Run configuration: one `PipelineConfig` is built per invocation and passed
//! by reference into every component.
//!
//! Load order:
//! 1) $PIPELINE_CONFIG_PATH (must exist when set)
//! 2) config/pipeline.toml (optional)
//! 3) built-in defaults
//!
//! Then environment overrides: `RUN_SIZE`, `SHORTLIST_COUNT_<MODE>`,
//! `FULLTEXT_FETCH_PER_BUCKET_<MODE>`, `BACKUPS_PER_BUCKET`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::candidate::Bucket;
use crate::config::oracle::OracleConfig;
use crate::ingest::Filters;
use crate::scoring::TextLimits;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

pub const ENV_RUN_SIZE: &str = "RUN_SIZE";
pub const ENV_BACKUPS_PER_BUCKET: &str = "BACKUPS_PER_BUCKET";

/// Run-size mode. `Test` is the constrained mode, `Prod` the unconstrained one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RunSize {
    #[default]
    Test,
    Prod,
}

impl RunSize {
    pub fn parse(s: &str) -> Option<RunSize> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" | "constrained" => Some(RunSize::Test),
            "prod" | "unconstrained" => Some(RunSize::Prod),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunSize::Test => "TEST",
            RunSize::Prod => "PROD",
        }
    }

    pub fn is_constrained(self) -> bool {
        self == RunSize::Test
    }
}

impl fmt::Display for RunSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RunSize {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        RunSize::parse(&s).ok_or_else(|| format!("unknown run size `{s}` (expected TEST or PROD)"))
    }
}

impl From<RunSize> for String {
    fn from(r: RunSize) -> String {
        r.as_str().to_string()
    }
}

fn default_blocked_domains() -> Vec<String> {
    [
        "businesswire.com",
        "prnewswire.com",
        "globenewswire.com",
        "accesswire.com",
        "newswire.ca",
        "einpresswire.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_guardrails() -> BTreeMap<Bucket, Vec<String>> {
    let mut m = BTreeMap::new();
    m.insert(
        Bucket::AiAutomation,
        vec!["ai".into(), "intelligence".into(), "automation".into()],
    );
    m
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub run_size: RunSize,
    pub shortlist_count_test: usize,
    pub shortlist_count_prod: usize,
    pub fulltext_fetch_per_bucket_test: usize,
    pub fulltext_fetch_per_bucket_prod: usize,
    pub backups_per_bucket: usize,
    /// Pass-1 snippet cap (chars).
    pub snippet_char_limit: usize,
    /// Pass-2 full-text cap in the prompt (chars).
    pub fulltext_char_limit: usize,
    /// Cap for the article copy kept on the selection record (chars).
    pub stored_text_char_limit: usize,
    pub blocked_domains: Vec<String>,
    /// Extra blocklist file (TOML `domains = [...]` or JSON array), merged in.
    pub blocked_domains_path: Option<PathBuf>,
    /// Per-bucket keyword guardrail; a candidate needs at least one term.
    pub guardrails: BTreeMap<Bucket, Vec<String>>,
    /// Drop candidates whose title is at least this similar to a historical title.
    pub title_similarity_threshold: Option<f64>,
    /// Drop candidates whose publish-date hint is older than this.
    pub max_age_days: Option<i64>,
    pub oracle: OracleConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_size: RunSize::Test,
            shortlist_count_test: 2,
            shortlist_count_prod: 5,
            fulltext_fetch_per_bucket_test: 1,
            fulltext_fetch_per_bucket_prod: 1,
            backups_per_bucket: 2,
            snippet_char_limit: 2_000,
            fulltext_char_limit: 5_000,
            stored_text_char_limit: 45_000,
            blocked_domains: default_blocked_domains(),
            blocked_domains_path: None,
            guardrails: default_guardrails(),
            title_similarity_threshold: None,
            max_age_days: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Shortlist size for the active run size.
    pub fn shortlist_count(&self) -> usize {
        match self.run_size {
            RunSize::Test => self.shortlist_count_test,
            RunSize::Prod => self.shortlist_count_prod,
        }
    }

    /// Pass-2 fetch budget per bucket for the active run size.
    pub fn fulltext_fetch_limit(&self) -> usize {
        match self.run_size {
            RunSize::Test => self.fulltext_fetch_per_bucket_test,
            RunSize::Prod => self.fulltext_fetch_per_bucket_prod,
        }
    }

    /// Prompt content caps.
    pub fn text_limits(&self) -> TextLimits {
        TextLimits {
            snippet_chars: self.snippet_char_limit,
            fulltext_chars: self.fulltext_char_limit,
        }
    }

    /// Input-side filters derived from this config.
    pub fn filters(&self) -> Filters {
        Filters {
            blocked_domains: self.blocked_domains.clone(),
            guardrails: self.guardrails.clone(),
            title_similarity_threshold: self.title_similarity_threshold,
            max_age_days: self.max_age_days,
        }
    }

    /// Parse a TOML file. Does not apply env overrides.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let mut cfg: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;

        if let Some(extra) = cfg.blocked_domains_path.clone() {
            let extra = if extra.is_relative() {
                path.parent().map(|p| p.join(&extra)).unwrap_or(extra)
            } else {
                extra
            };
            let more = read_blocklist(&extra)?;
            cfg.blocked_domains.extend(more);
        }
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolve the file via env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!("{ENV_PIPELINE_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        info!("no pipeline config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// `load_default()` followed by process-env overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::load_default()?;
        cfg.apply_overrides(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    /// Apply overrides from a key lookup (process env in production).
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_RUN_SIZE) {
            match RunSize::parse(&v) {
                Some(r) => self.run_size = r,
                None => warn!(key = ENV_RUN_SIZE, value = %v, "ignoring invalid override"),
            }
        }

        let usize_keys: [(&str, &mut usize); 5] = [
            ("SHORTLIST_COUNT_TEST", &mut self.shortlist_count_test),
            ("SHORTLIST_COUNT_PROD", &mut self.shortlist_count_prod),
            (
                "FULLTEXT_FETCH_PER_BUCKET_TEST",
                &mut self.fulltext_fetch_per_bucket_test,
            ),
            (
                "FULLTEXT_FETCH_PER_BUCKET_PROD",
                &mut self.fulltext_fetch_per_bucket_prod,
            ),
            (ENV_BACKUPS_PER_BUCKET, &mut self.backups_per_bucket),
        ];
        for (key, slot) in usize_keys {
            if let Some(v) = lookup(key) {
                match v.trim().parse::<usize>() {
                    Ok(n) => *slot = n,
                    Err(_) => warn!(key, value = %v, "ignoring invalid override"),
                }
            }
        }
    }

    fn sanitize(&mut self) {
        self.blocked_domains = clean_domains(std::mem::take(&mut self.blocked_domains));
        for terms in self.guardrails.values_mut() {
            *terms = terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(t) = self.title_similarity_threshold {
            if !(0.0..=1.0).contains(&t) {
                self.title_similarity_threshold = None;
            }
        }
    }
}

/// Extra blocked domains: `domains = [...]` in TOML, or in JSON either that
/// table or a bare array. Files ending in `.json` are read as JSON.
#[derive(Deserialize)]
#[serde(untagged)]
enum BlocklistFile {
    Table { domains: Vec<String> },
    List(Vec<String>),
}

impl BlocklistFile {
    fn into_domains(self) -> Vec<String> {
        match self {
            BlocklistFile::Table { domains } | BlocklistFile::List(domains) => domains,
        }
    }
}

fn read_blocklist(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading blocklist from {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let file: BlocklistFile = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("parsing JSON blocklist {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("parsing TOML blocklist {}", path.display()))?
    };
    Ok(file.into_domains())
}

/// Lowercase, trim, drop `www.`, dedupe (sorted).
fn clean_domains(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim().to_ascii_lowercase();
        let t = t.strip_prefix("www.").unwrap_or(&t).to_string();
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}
