//! Caching wrapper: file cache keyed by prompt + temperature, plus a daily
//! limit on real provider calls (cache hits do not count).

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::CompletionOracle;

pub struct CachingOracle<O: CompletionOracle> {
    inner: O,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    budget: Mutex<CallBudget>,
}

impl<O: CompletionOracle> CachingOracle<O> {
    pub fn new(inner: O, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let budget = Mutex::new(CallBudget::load(&cache_dir));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            budget,
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        self.budget.lock().map(|b| b.used).unwrap_or(0)
    }

    /// Roll the budget over at UTC midnight and report whether it is spent.
    fn limit_reached(&self) -> bool {
        let Ok(mut b) = self.budget.lock() else {
            return true;
        };
        if b.roll_to(Utc::now().date_naive()) {
            b.persist(&self.cache_dir);
        }
        b.used >= self.daily_limit_max
    }

    fn count_call(&self) {
        if let Ok(mut b) = self.budget.lock() {
            b.used = b.used.saturating_add(1);
            b.persist(&self.cache_dir);
        }
    }
}

#[async_trait]
impl<O: CompletionOracle> CompletionOracle for CachingOracle<O> {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let path = entry_path(&self.cache_dir, prompt, temperature);
        if let Some(hit) = read_json::<CacheEntry>(&path) {
            debug!(target: "oracle", path = %path.display(), "cache hit");
            return Ok(hit.content);
        }

        if self.limit_reached() {
            bail!("daily oracle limit of {} calls reached", self.daily_limit_max);
        }

        let content = self.inner.complete(prompt, temperature).await?;
        self.count_call();
        let entry = CacheEntry { content };
        if let Err(e) = write_json_atomic(&path, &entry) {
            debug!(target: "oracle", error = %e, "cache write skipped");
        }
        Ok(entry.content)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    content: String,
}

/// `<dir>/<first 16 bytes of sha256(temperature bits ++ prompt)>.json`
fn entry_path(dir: &Path, prompt: &str, temperature: f32) -> PathBuf {
    let digest = Sha256::new()
        .chain_update(temperature.to_bits().to_le_bytes())
        .chain_update(prompt.as_bytes())
        .finalize();
    let key: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
    dir.join(format!("{key}.json"))
}

/// Calls spent on one UTC day, persisted as `daily_count.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CallBudget {
    day: NaiveDate,
    used: u32,
}

impl CallBudget {
    const FILE: &'static str = "daily_count.json";

    /// Missing or unreadable state starts today at zero.
    fn load(dir: &Path) -> Self {
        read_json(&dir.join(Self::FILE)).unwrap_or_else(|| Self {
            day: Utc::now().date_naive(),
            used: 0,
        })
    }

    /// Returns true when `day` differs and the count was reset.
    fn roll_to(&mut self, day: NaiveDate) -> bool {
        if self.day == day {
            return false;
        }
        self.day = day;
        self.used = 0;
        true
    }

    fn persist(&self, dir: &Path) {
        if let Err(e) = write_json_atomic(&dir.join(Self::FILE), self) {
            debug!(target: "oracle", error = %e, "daily count not saved");
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let s = fs::read_to_string(path).ok()?;
    serde_json::from_str(&s).ok()
}

/// Write to a sibling temp file, then rename over the target.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec(value).map_err(io::Error::other)?;
    fs::File::create(&tmp)?.write_all(&json)?;
    fs::rename(tmp, path)
}
