use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Sampling parameters sent with every request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the endpoint to serve repeated requests from its response cache.
    #[serde(default)]
    pub caching: bool,
}

/// One dataset row: the question plus an optional system instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PromptRecord {
    pub user_prompt: String,
    pub system_prompt: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl PromptRecord {
    /// System instruction first (when present), then the user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let system = self.system_prompt.iter().map(|s| ChatMessage {
            role: Role::System,
            content: s.clone(),
        });
        system
            .chain(std::iter::once(ChatMessage {
                role: Role::User,
                content: self.user_prompt.clone(),
            }))
            .collect()
    }
}

/// What a backend hands back for one chat request, before normalisation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatReply {
    /// Message content of each returned choice, in endpoint order.
    pub choices: Vec<Option<String>>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub latency_ms: Option<f64>,
}

#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync + 'static {
    async fn chat(&self, model_id: &str, messages: &[ChatMessage], params: &InferParams) -> Result<ChatReply>;
}

pub mod openai;
