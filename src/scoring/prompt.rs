//! Prompt templates and the deterministic article-context block.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::ScorePass;
use crate::candidate::{Bucket, Candidate};

pub const PASS1_TEMPLATE: &str = include_str!("../../prompts/pass1_scoring.md");
pub const PASS2_TEMPLATE: &str = include_str!("../../prompts/pass2_scoring.md");

const PASS1_FILE: &str = "pass1_scoring.md";
const PASS2_FILE: &str = "pass2_scoring.md";

/// Character caps for the content section of the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLimits {
    pub snippet_chars: usize,
    pub fulltext_chars: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            snippet_chars: 2_000,
            fulltext_chars: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub pass1: String,
    pub pass2: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            pass1: PASS1_TEMPLATE.to_string(),
            pass2: PASS2_TEMPLATE.to_string(),
        }
    }
}

impl PromptSet {
    /// Load `pass1_scoring.md` / `pass2_scoring.md` from a directory.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let p = dir.join(name);
            fs::read_to_string(&p).with_context(|| format!("reading prompt {}", p.display()))
        };
        Ok(Self {
            pass1: read(PASS1_FILE)?,
            pass2: read(PASS2_FILE)?,
        })
    }

    pub fn template(&self, pass: ScorePass) -> &str {
        match pass {
            ScorePass::Pass1 => &self.pass1,
            ScorePass::Pass2 => &self.pass2,
        }
    }

    /// Template + separator + metadata block. Pass 1 carries the snippet,
    /// pass 2 the fetched text; both truncated by chars.
    pub fn build(
        &self,
        c: &Candidate,
        bucket_hint: Bucket,
        pass: ScorePass,
        full_text: Option<&str>,
        limits: TextLimits,
    ) -> String {
        let content = match pass {
            ScorePass::Pass1 => truncate_chars(&c.snippet, limits.snippet_chars),
            ScorePass::Pass2 => truncate_chars(full_text.unwrap_or_default(), limits.fulltext_chars),
        };
        let rule = "-".repeat(60);
        let title = or_na(&c.title);
        let source = or_na(&c.source_name);
        let date = or_na(c.source_date.as_deref().unwrap_or_default());

        format!(
            "{template}\n\n{rule}\nARTICLE TO SCORE:\n{rule}\n\n\
             \nTitle: {title}\nSource: {source}\nPublish Date: {date}\nQuery Bucket Hint: {bucket_hint}\n\
             \nSnippet/Content:\n{content}\n",
            template = self.template(pass),
        )
    }
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() {
        "N/A"
    } else {
        s
    }
}

/// First `max` chars of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
