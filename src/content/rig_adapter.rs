//! Bridges rig-core's `CompletionModel` to the engine's `ContentModel`.

use async_trait::async_trait;

use rig::completion::{AssistantContent, CompletionError, CompletionModel, Message};

use crate::content::provider::{CompletionRequest, CompletionResponse, ContentModel};
use crate::error::GenerateError;

/// Adapter wrapping a concrete rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> ContentModel for RigAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GenerateError> {
        let response = self
            .model
            .completion_request(Message::user(request.user))
            .preamble(request.system)
            .temperature(f64::from(request.temperature))
            .max_tokens(u64::from(request.max_tokens))
            .send()
            .await
            .map_err(map_rig_error)?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse { content })
    }
}

/// Map rig's completion errors onto the engine taxonomy. Rate limiting is
/// surfaced distinctly so the harness can treat it as transient.
fn map_rig_error(e: CompletionError) -> GenerateError {
    let reason = e.to_string();
    let lowered = reason.to_lowercase();
    if lowered.contains("429") || lowered.contains("rate limit") {
        GenerateError::RateLimited { retry_after: None }
    } else {
        GenerateError::RequestFailed { reason }
    }
}
