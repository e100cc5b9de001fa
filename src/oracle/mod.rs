//! Text-completion oracle: provider abstraction + file cache + daily limit.
//!
//! The engine only sees `CompletionOracle`; which concrete provider sits
//! behind it is decided once per run by `build_oracle`.

pub mod cache;
pub mod openai;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

pub use cache::CachingOracle;
pub use openai::OpenAiOracle;

use crate::config::oracle::OracleConfig;

/// `complete(prompt, temperature) -> text`. Errors cover transport, auth,
/// rate limits and empty bodies alike; callers decide how to degrade.
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynOracle = Arc<dyn CompletionOracle>;

pub const ENV_ORACLE_TEST_MODE: &str = "ORACLE_TEST_MODE";

/// Factory: build an oracle according to config and environment.
///
/// * If `ORACLE_TEST_MODE=mock`, returns a scripted oracle that rejects
///   everything with neutral scores (no network).
/// * Else if `config.enabled == false`, returns a disabled oracle.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_oracle(config: &OracleConfig) -> Result<DynOracle> {
    if std::env::var(ENV_ORACLE_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(ScriptedOracle::new(Ok(NEUTRAL_REJECT.to_string()))));
    }

    if !config.enabled {
        return Ok(Arc::new(DisabledOracle));
    }

    match config.provider.as_str() {
        "openai" => {
            let provider = OpenAiOracle::new(
                config.api_key.clone(),
                config.model.clone(),
                config.timeout_secs,
            )?;
            let client =
                CachingOracle::new(provider, config.cache_dir.clone(), config.daily_limit);
            Ok(Arc::new(client))
        }
        other => Err(anyhow!("unsupported oracle provider `{other}`")),
    }
}

const NEUTRAL_REJECT: &str = r#"{"final_bucket":"reject","bucket_reason":"mock oracle","relevance_score":3,"freshness_score":3,"credibility_score":3,"practicality_score":3,"linkedin_worthiness_score":3}"#;

/// Always fails; used when the oracle is disabled in config.
pub struct DisabledOracle;

#[async_trait]
impl CompletionOracle for DisabledOracle {
    async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        Err(anyhow!("oracle disabled"))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

type Scripted = std::result::Result<String, String>;

struct Rule {
    needles: Vec<String>,
    reply: Scripted,
}

/// Canned-response oracle for tests and dry runs.
///
/// Rules are checked in insertion order; the first rule whose needles all
/// occur in the prompt answers. Unmatched prompts get the fallback.
/// Every call is recorded as `(prompt, temperature)`.
pub struct ScriptedOracle {
    rules: Vec<Rule>,
    fallback: Scripted,
    calls: Mutex<Vec<(String, f32)>>,
}

impl ScriptedOracle {
    pub fn new(fallback: Scripted) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer prompts containing every needle with `reply`.
    pub fn on(mut self, needles: &[&str], reply: Scripted) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            reply,
        });
        self
    }

    pub fn calls(&self) -> Vec<(String, f32)> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn reply_for(&self, prompt: &str) -> Scripted {
        self.rules
            .iter()
            .find(|r| r.needles.iter().all(|n| prompt.contains(n.as_str())))
            .map(|r| r.reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl CompletionOracle for ScriptedOracle {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        if let Ok(mut g) = self.calls.lock() {
            g.push((prompt.to_string(), temperature));
        }
        self.reply_for(prompt).map_err(|e| anyhow!(e))
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}
