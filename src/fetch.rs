//! Full-text fetcher: article body for Pass 2.
//!
//! Contract: `fetch(url)` returns the article text, or an empty string on any
//! failure (HTTP error, paywall stub, unparseable page). No retries.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait FullTextFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> String;
}

/// Plain HTTP GET + paragraph extraction.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; content-curator/0.1)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_inner(&self, url: &str) -> anyhow::Result<String> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("status {status}");
        }
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        let body = resp.text().await?;
        Ok(if is_html {
            extract_article_text(&body)
        } else {
            collapse_ws(&body)
        })
    }
}

#[async_trait]
impl FullTextFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> String {
        match self.fetch_inner(url).await {
            Ok(text) => text,
            Err(e) => {
                warn!(target: "fetch", %url, error = %e, "full-text fetch failed");
                String::new()
            }
        }
    }
}

/// Fixed url → text map (tests, dry runs). Unknown URLs fetch as empty.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }
}

#[async_trait]
impl FullTextFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> String {
        self.pages.get(url).cloned().unwrap_or_default()
    }
}

/// Paragraph text of `<article>` if it has any, else of the whole page.
/// Paragraphs are joined with blank lines.
pub fn extract_article_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let scoped = paragraphs(&doc, "article p");
    let paras = if scoped.is_empty() {
        paragraphs(&doc, "p")
    } else {
        scoped
    };
    paras.join("\n\n")
}

fn paragraphs(doc: &Html, selector: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    doc.select(&sel)
        .map(|p| collapse_ws(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Collapse runs of whitespace and trim.
pub fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    let decoded = html_escape::decode_html_entities(s);
    re.replace_all(&decoded, " ").trim().to_string()
}
