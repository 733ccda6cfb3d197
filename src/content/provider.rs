//! Model provider contract for content generation.

use async_trait::async_trait;

use crate::error::GenerateError;

/// A single system + user completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 600,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Raw completion text from the model.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Backend-agnostic completion interface.
///
/// The engine never interprets the prose; it only parses the structured
/// draft out of `content`.
#[async_trait]
pub trait ContentModel: Send + Sync {
    /// Model identifier for logging.
    fn model_name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, request: CompletionRequest)
    -> Result<CompletionResponse, GenerateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_applies_overrides() {
        let request = CompletionRequest::new("sys", "user")
            .with_temperature(0.2)
            .with_max_tokens(128);
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, 128);
        assert_eq!(request.system, "sys");
        assert_eq!(request.user, "user");
    }
}
