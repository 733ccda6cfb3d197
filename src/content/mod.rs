//! Content generation.
//!
//! A campaign strategy builds the prompt, a `ContentModel` (rig-core
//! Anthropic/OpenAI behind the `RigAdapter`) produces the text, and the
//! `EmailComposer` parses it into a subject/body draft.

pub mod generator;
pub mod provider;
mod rig_adapter;
pub mod strategies;

pub use generator::{ComposerConfig, EmailComposer};
pub use provider::{CompletionRequest, CompletionResponse, ContentModel};
pub use rig_adapter::RigAdapter;
pub use strategies::{OutreachStrategy, PromptParts, StrategyRegistry};

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::GenerateError;

/// Supported model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a content model.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create a content model from configuration.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn ContentModel>, GenerateError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_model(config),
        LlmBackend::OpenAi => create_openai_model(config),
    }
}

fn create_anthropic_model(config: &LlmConfig) -> Result<Arc<dyn ContentModel>, GenerateError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            GenerateError::RequestFailed {
                reason: format!("Failed to create Anthropic client: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_model(config: &LlmConfig) -> Result<Arc<dyn ContentModel>, GenerateError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            GenerateError::RequestFailed {
                reason: format!("Failed to create OpenAI client: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_anthropic_model_accepts_any_key_at_construction() {
        // rig clients accept any string as API key; auth fails at request
        // time, not here.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-sonnet-latest".to_string(),
        };
        let model = create_model(&config);
        assert!(model.is_ok());
        assert_eq!(model.unwrap().model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn create_openai_model_constructs() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let model = create_model(&config);
        assert!(model.is_ok());
        assert_eq!(model.unwrap().model_name(), "gpt-4o");
    }
}
