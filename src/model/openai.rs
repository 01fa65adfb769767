use super::{ChatMessage, ChatReply, InferParams, LlmBackend};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Client for any OpenAI-compatible `/chat/completions` endpoint.
struct Inner {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiBackend {
    inner: Arc<Inner>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    /// Some gateways report their own server-side timing.
    #[serde(default, alias = "latency")]
    latency_ms: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

impl ChatResponse {
    pub(crate) fn into_reply(self, measured: Duration) -> ChatReply {
        ChatReply {
            choices: self
                .choices
                .into_iter()
                .map(|c| c.message.and_then(|m| m.content))
                .collect(),
            prompt_tokens: self.usage.as_ref().and_then(|u| u.prompt_tokens),
            completion_tokens: self.usage.as_ref().and_then(|u| u.completion_tokens),
            latency_ms: Some(self.latency_ms.unwrap_or_else(|| measured.as_secs_f64() * 1000.0)),
        }
    }
}

impl OpenAiBackend {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()
            .context("build http client")?;
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            inner: Arc::new(Inner { client, url, api_key }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

#[async_trait::async_trait]
impl LlmBackend for OpenAiBackend {
    async fn chat(&self, model_id: &str, messages: &[ChatMessage], params: &InferParams) -> Result<ChatReply> {
        let body = ChatRequest {
            model: model_id,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            cache: params.caching.then_some(true),
        };

        let mut req = self.inner.client.post(&self.inner.url).json(&body);
        if let Some(key) = &self.inner.api_key {
            req = req.bearer_auth(key);
        }

        let t0 = Instant::now();
        let res = req.send().await.with_context(|| format!("POST {}", self.inner.url))?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("endpoint returned {status}: {text}"));
        }
        let parsed: ChatResponse = res.json().await.context("decode chat completion")?;
        Ok(parsed.into_reply(t0.elapsed()))
    }
}
