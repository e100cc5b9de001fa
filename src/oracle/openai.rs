//! OpenAI provider (Chat Completions API).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::CompletionOracle;

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiOracle {
    pub fn new(api_key: String, model: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("content-curator/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            api_key,
            model,
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}
#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}
#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionOracle for OpenAiOracle {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        if self.api_key.trim().is_empty() {
            bail!("OPENAI_API_KEY not set");
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        let resp = self
            .http
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let head: String = body.chars().take(200).collect();
            bail!("openai returned {status}: {head}");
        }

        let body: Resp = resp.json().await.context("decoding openai response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(anyhow!("openai returned an empty completion"));
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
