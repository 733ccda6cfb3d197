//! Messaging strategies.
//!
//! A campaign's `strategy_key` selects one of these. Each strategy only
//! builds the prompt; the composer owns the output contract and parsing.
//! Strategies are registered in a lookup table at startup — an unknown
//! key is a typed configuration error, never a crash.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::model::Prospect;

/// System/user prompt pair produced by a strategy.
#[derive(Debug, Clone)]
pub struct PromptParts {
    pub system: String,
    pub user: String,
}

/// A named prompt-building strategy.
pub trait OutreachStrategy: std::fmt::Debug + Send + Sync {
    /// Registry key, matched against `Campaign::strategy_key`.
    fn key(&self) -> &'static str;

    /// Build the prompt for one prospect.
    fn build_prompt(&self, prospect: &Prospect) -> PromptParts;
}

/// Lookup table of registered strategies.
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn OutreachStrategy>>,
}

impl StrategyRegistry {
    /// Empty registry (for tests).
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with the built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(DirectIntro));
        registry.register(Arc::new(PainPoint));
        registry.register(Arc::new(CaseStudy));
        registry
    }

    /// Register a strategy under its key. Later registrations win.
    pub fn register(&mut self, strategy: Arc<dyn OutreachStrategy>) {
        self.strategies.insert(strategy.key(), strategy);
    }

    /// Resolve a campaign's strategy key.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn OutreachStrategy>, ConfigError> {
        self.strategies
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownStrategy {
                key: key.to_string(),
            })
    }

    pub fn count(&self) -> usize {
        self.strategies.len()
    }
}

/// Prospect context block shared by the built-in strategies.
fn prospect_context(prospect: &Prospect) -> String {
    let mut lines = vec![format!("Name: {}", prospect.name)];
    if let Some(ref company) = prospect.company {
        lines.push(format!("Company: {company}"));
    }
    if !prospect.tags.is_empty() {
        lines.push(format!("Notes: {}", prospect.tags.join(", ")));
    }
    lines.join("\n")
}

// ── Built-in strategies ─────────────────────────────────────────────

/// Short, direct first touch. Who we are, why we're writing, one ask.
#[derive(Debug)]
struct DirectIntro;

impl OutreachStrategy for DirectIntro {
    fn key(&self) -> &'static str {
        "direct-intro"
    }

    fn build_prompt(&self, prospect: &Prospect) -> PromptParts {
        PromptParts {
            system: "You write short, direct first-touch sales emails. \
                     Introduce the sender in one sentence, say why this \
                     specific prospect is relevant, and close with a single \
                     low-friction ask. 4-6 sentences, no buzzwords, no \
                     pleasantries padding."
                .to_string(),
            user: format!(
                "Write a first outreach email to this prospect:\n{}",
                prospect_context(prospect)
            ),
        }
    }
}

/// Leads with a concrete pain the prospect's segment usually has.
#[derive(Debug)]
struct PainPoint;

impl OutreachStrategy for PainPoint {
    fn key(&self) -> &'static str {
        "pain-point"
    }

    fn build_prompt(&self, prospect: &Prospect) -> PromptParts {
        PromptParts {
            system: "You write first-touch sales emails that open with a \
                     concrete operational pain the recipient's business \
                     likely has, then offer one specific way to remove it. \
                     Never claim knowledge you don't have; phrase the pain \
                     as a question. 5-7 sentences."
                .to_string(),
            user: format!(
                "Write a pain-point outreach email to this prospect:\n{}",
                prospect_context(prospect)
            ),
        }
    }
}

/// Anchors on a (generic) customer result, invites comparison.
#[derive(Debug)]
struct CaseStudy;

impl OutreachStrategy for CaseStudy {
    fn key(&self) -> &'static str {
        "case-study"
    }

    fn build_prompt(&self, prospect: &Prospect) -> PromptParts {
        PromptParts {
            system: "You write first-touch sales emails built around a short \
                     anonymized customer story: situation, what changed, \
                     measurable result. End by asking whether the prospect \
                     sees themselves in the story. 5-7 sentences, concrete \
                     numbers over adjectives."
                .to_string(),
            user: format!(
                "Write a case-study outreach email to this prospect:\n{}",
                prospect_context(prospect)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::model::ProspectStage;

    use super::*;

    fn prospect() -> Prospect {
        Prospect {
            id: Uuid::new_v4(),
            name: "Dana Riva".into(),
            company: Some("Hotel Riva".into()),
            contact_email: Some("dana@hotelriva.com".into()),
            stage: ProspectStage::New,
            score: 80,
            archived: false,
            tags: vec!["boutique".into(), "34 rooms".into()],
            contacted_at: None,
        }
    }

    #[test]
    fn default_registry_resolves_builtins() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.count(), 3);
        for key in ["direct-intro", "pain-point", "case-study"] {
            assert_eq!(registry.resolve(key).unwrap().key(), key);
        }
    }

    #[test]
    fn unknown_key_is_a_typed_config_error() {
        let registry = StrategyRegistry::with_defaults();
        let err = registry.resolve("hyper-growth-ninja").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy { key } if key == "hyper-growth-ninja"));
    }

    #[test]
    fn prompts_carry_prospect_context() {
        let registry = StrategyRegistry::with_defaults();
        let strategy = registry.resolve("direct-intro").unwrap();
        let parts = strategy.build_prompt(&prospect());
        assert!(parts.user.contains("Dana Riva"));
        assert!(parts.user.contains("Hotel Riva"));
        assert!(parts.user.contains("boutique"));
    }

    #[test]
    fn later_registration_wins() {
        #[derive(Debug)]
        struct Override;
        impl OutreachStrategy for Override {
            fn key(&self) -> &'static str {
                "direct-intro"
            }
            fn build_prompt(&self, _prospect: &Prospect) -> PromptParts {
                PromptParts {
                    system: "override".into(),
                    user: "override".into(),
                }
            }
        }

        let mut registry = StrategyRegistry::with_defaults();
        registry.register(Arc::new(Override));
        assert_eq!(registry.count(), 3);
        let parts = registry
            .resolve("direct-intro")
            .unwrap()
            .build_prompt(&prospect());
        assert_eq!(parts.system, "override");
    }
}
