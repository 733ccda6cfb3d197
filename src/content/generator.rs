//! Email composer — turns a prospect + strategy into a subject/body draft.

use std::sync::Arc;

use tracing::{info, warn};

use crate::content::provider::{CompletionRequest, ContentModel};
use crate::content::strategies::OutreachStrategy;
use crate::error::GenerateError;
use crate::model::{EmailDraft, Prospect};

/// Output contract appended to every strategy's system prompt.
const OUTPUT_CONTRACT: &str = "Respond with a single JSON object:\n\
     {\"subject\": \"<email subject line>\", \"body\": \"<email body>\"}\n\
     ONLY output the JSON object. No other text.";

/// Tuning for draft generation.
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 600,
        }
    }
}

/// Generates outreach drafts through a `ContentModel`.
pub struct EmailComposer {
    model: Arc<dyn ContentModel>,
    config: ComposerConfig,
}

impl EmailComposer {
    pub fn new(model: Arc<dyn ContentModel>, config: ComposerConfig) -> Self {
        Self { model, config }
    }

    /// Compose one draft. The engine only checks that both fields came
    /// back non-empty; the prose is the model's business.
    pub async fn compose(
        &self,
        prospect: &Prospect,
        strategy: &dyn OutreachStrategy,
    ) -> Result<EmailDraft, GenerateError> {
        let parts = strategy.build_prompt(prospect);
        let system = format!("{}\n\n{}", parts.system, OUTPUT_CONTRACT);

        let request = CompletionRequest::new(system, parts.user)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let response = self.model.complete(request).await?;
        let draft = parse_draft(&response.content)?;

        info!(
            prospect = %prospect.name,
            strategy = strategy.key(),
            model = self.model.model_name(),
            subject = %draft.subject,
            "Draft composed"
        );
        Ok(draft)
    }
}

/// Parse the model output into a draft, tolerating markdown fences and
/// surrounding prose. Missing or empty fields are a permanent error —
/// retrying the same prompt buys the same malformed answer.
fn parse_draft(raw: &str) -> Result<EmailDraft, GenerateError> {
    let json_str = extract_json_object(raw);

    let draft: EmailDraft =
        serde_json::from_str(&json_str).map_err(|e| {
            warn!(error = %e, response = raw, "Failed to parse draft JSON");
            GenerateError::MalformedOutput {
                reason: format!("invalid draft JSON: {e}"),
            }
        })?;

    let draft = EmailDraft {
        subject: draft.subject.trim().to_string(),
        body: draft.body.trim().to_string(),
    };

    if draft.subject.is_empty() {
        return Err(GenerateError::MalformedOutput {
            reason: "empty subject".to_string(),
        });
    }
    if draft.body.is_empty() {
        return Err(GenerateError::MalformedOutput {
            reason: "empty body".to_string(),
        });
    }
    Ok(draft)
}

/// Extract a JSON object from model output that might contain markdown
/// fences or extra text.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::content::provider::CompletionResponse;
    use crate::content::strategies::StrategyRegistry;
    use crate::model::ProspectStage;

    use super::*;

    #[test]
    fn parse_draft_direct_json() {
        let draft = parse_draft(r#"{"subject": "Quick intro", "body": "Hi Dana,"}"#).unwrap();
        assert_eq!(draft.subject, "Quick intro");
        assert_eq!(draft.body, "Hi Dana,");
    }

    #[test]
    fn parse_draft_markdown_fenced() {
        let raw = "```json\n{\"subject\": \"Hello\", \"body\": \"World\"}\n```";
        let draft = parse_draft(raw).unwrap();
        assert_eq!(draft.subject, "Hello");
    }

    #[test]
    fn parse_draft_embedded_in_prose() {
        let raw = "Here you go: {\"subject\": \"S\", \"body\": \"B\"} hope it helps";
        let draft = parse_draft(raw).unwrap();
        assert_eq!(draft.body, "B");
    }

    #[test]
    fn parse_draft_missing_body_is_malformed() {
        let err = parse_draft(r#"{"subject": "S"}"#).unwrap_err();
        assert!(matches!(err, GenerateError::MalformedOutput { .. }));
    }

    #[test]
    fn parse_draft_blank_subject_is_malformed() {
        let err = parse_draft(r#"{"subject": "  ", "body": "B"}"#).unwrap_err();
        assert!(matches!(err, GenerateError::MalformedOutput { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn parse_draft_garbage_is_malformed() {
        let err = parse_draft("I cannot help with that.").unwrap_err();
        assert!(matches!(err, GenerateError::MalformedOutput { .. }));
    }

    // ── Composer with mock model ────────────────────────────────────

    struct MockModel {
        response: String,
    }

    #[async_trait]
    impl ContentModel for MockModel {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, GenerateError> {
            Ok(CompletionResponse {
                content: self.response.clone(),
            })
        }
    }

    fn prospect() -> Prospect {
        Prospect {
            id: Uuid::new_v4(),
            name: "Dana Riva".into(),
            company: Some("Hotel Riva".into()),
            contact_email: Some("dana@hotelriva.com".into()),
            stage: ProspectStage::New,
            score: 80,
            archived: false,
            tags: vec![],
            contacted_at: None,
        }
    }

    #[tokio::test]
    async fn composer_returns_parsed_draft() {
        let model = Arc::new(MockModel {
            response: r#"{"subject": "Intro", "body": "Hi Dana"}"#.into(),
        });
        let composer = EmailComposer::new(model, ComposerConfig::default());
        let registry = StrategyRegistry::with_defaults();
        let strategy = registry.resolve("direct-intro").unwrap();

        let draft = composer.compose(&prospect(), strategy.as_ref()).await.unwrap();
        assert_eq!(draft.subject, "Intro");
        assert_eq!(draft.body, "Hi Dana");
    }

    #[tokio::test]
    async fn composer_surfaces_malformed_output() {
        let model = Arc::new(MockModel {
            response: "sorry, no".into(),
        });
        let composer = EmailComposer::new(model, ComposerConfig::default());
        let registry = StrategyRegistry::with_defaults();
        let strategy = registry.resolve("pain-point").unwrap();

        let err = composer.compose(&prospect(), strategy.as_ref()).await.unwrap_err();
        assert!(matches!(err, GenerateError::MalformedOutput { .. }));
    }
}
