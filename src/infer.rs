//! One (model, prompt) invocation, normalised into an [`InferenceResult`].

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{ChatReply, InferParams, LlmBackend, PromptRecord};

/// Outcome of asking one model one prompt. Identified by
/// `(model_id, user_prompt, system_prompt)`; metric fields are unset when `error` is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InferenceResult {
    pub model_id: String,
    pub user_prompt: String,
    pub system_prompt: Option<String>,
    pub completion: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub error: Option<String>,
}

impl InferenceResult {
    /// An errored result that still carries the prompt identity, so it joins like any other row.
    pub fn failed(model_id: &str, record: &PromptRecord, error: impl Into<String>) -> Self {
        Self {
            model_id: model_id.to_string(),
            user_prompt: record.user_prompt.clone(),
            system_prompt: record.system_prompt.clone(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// First choice with non-empty content; later choices never override an earlier one.
pub fn select_completion(choices: Vec<Option<String>>) -> Option<String> {
    choices.into_iter().flatten().find(|c| !c.is_empty())
}

/// Call `backend` once for `record`. Failures are captured in the result, never returned.
pub async fn invoke<B: LlmBackend + ?Sized>(
    backend: &B,
    model_id: &str,
    record: &PromptRecord,
    params: &InferParams,
) -> InferenceResult {
    let messages = record.messages();
    match backend.chat(model_id, &messages, params).await {
        Ok(ChatReply { choices, prompt_tokens, completion_tokens, latency_ms }) => {
            let completion = select_completion(choices);
            if completion.is_none() {
                debug!(model = model_id, prompt = %record.user_prompt, "no non-empty choice returned");
            }
            InferenceResult {
                model_id: model_id.to_string(),
                user_prompt: record.user_prompt.clone(),
                system_prompt: record.system_prompt.clone(),
                completion,
                elapsed_seconds: latency_ms.map(|ms| ms / 1000.0),
                prompt_tokens,
                completion_tokens,
                error: None,
            }
        }
        Err(e) => {
            warn!(model = model_id, prompt = %record.user_prompt, error = %format!("{e:#}"), "invocation failed");
            InferenceResult::failed(model_id, record, format!("{e:#}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_choice_wins() {
        let picked = select_completion(vec![None, Some(String::new()), Some("a".into()), Some("b".into())]);
        assert_eq!(picked.as_deref(), Some("a"));
        assert_eq!(select_completion(vec![Some(String::new())]), None);
    }
}
