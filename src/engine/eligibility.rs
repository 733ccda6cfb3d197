//! Prospect eligibility rules.
//!
//! Decides which prospects may legally receive a new outbound email:
//! - never a prospect that already has an outbound EmailRecord (the
//!   at-most-once invariant, any campaign, any status, ever),
//! - never a placeholder/disposable-looking address,
//! - never a generic role address (`info@`, `sales@`, …) — those don't
//!   reach a decision-maker and drag deliverability metrics down.
//!
//! Pure and side-effect free: the same snapshot always yields the same
//! candidate set. Fails closed — an address we cannot parse is excluded.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::model::Prospect;

/// A compiled exclusion pattern with its reason.
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    /// Human-readable pattern description.
    pub pattern: String,
    /// Compiled regex, matched against the full address.
    pub regex: Regex,
    /// Why this rule excludes.
    pub reason: String,
}

/// Role prefixes that never reach a decision-maker.
const ROLE_PREFIXES: &[&str] = &[
    "info",
    "sales",
    "reservations",
    "reservation",
    "contact",
    "support",
    "admin",
    "office",
    "hello",
    "booking",
    "bookings",
    "frontdesk",
    "enquiries",
    "inquiries",
    "reception",
    "marketing",
    "billing",
    "accounts",
    "team",
    "mail",
    "postmaster",
    "webmaster",
    "noreply",
    "no-reply",
];

/// Filters the ranked candidate pool down to sendable prospects.
pub struct EligibilityFilter {
    placeholder_rules: Vec<ExclusionRule>,
}

impl EligibilityFilter {
    /// Filter with the built-in placeholder patterns.
    pub fn new() -> Self {
        let placeholder_rules = vec![
            ExclusionRule {
                pattern: "placeholder domains".into(),
                regex: Regex::new(r"(?i)@(example|test|sample|invalid|acme-test)\.").unwrap(),
                reason: "placeholder domain".into(),
            },
            ExclusionRule {
                pattern: "placeholder local parts".into(),
                regex: Regex::new(r"(?i)^(test|testing|demo|fake|placeholder|asdf|foo|bar|none|null|noemail|nomail|unknown)@").unwrap(),
                reason: "placeholder address".into(),
            },
            ExclusionRule {
                pattern: "disposable providers".into(),
                regex: Regex::new(
                    r"(?i)@(mailinator|guerrillamail|10minutemail|tempmail|temp-mail|trashmail|yopmail|sharklasers|dispostable)\.",
                )
                .unwrap(),
                reason: "disposable mail provider".into(),
            },
            ExclusionRule {
                pattern: "reserved TLDs".into(),
                regex: Regex::new(r"(?i)\.(test|invalid|localhost|local|example)$").unwrap(),
                reason: "reserved test TLD".into(),
            },
        ];

        Self { placeholder_rules }
    }

    /// Apply all exclusions to a ranked candidate pool.
    ///
    /// `already_emailed` is the set of prospect ids with any outbound
    /// EmailRecord; candidates keep their incoming (score-descending)
    /// order.
    pub fn filter(
        &self,
        candidates: Vec<Prospect>,
        already_emailed: &HashSet<Uuid>,
    ) -> Vec<Prospect> {
        candidates
            .into_iter()
            .filter(|prospect| {
                if already_emailed.contains(&prospect.id) {
                    debug!(prospect = %prospect.name, "Excluded: already emailed");
                    return false;
                }
                let Some(email) = prospect.contact_email.as_deref() else {
                    debug!(prospect = %prospect.name, "Excluded: no contact email");
                    return false;
                };
                match self.exclusion_reason(email) {
                    Some(reason) => {
                        debug!(prospect = %prospect.name, email, reason = %reason, "Excluded");
                        false
                    }
                    None => true,
                }
            })
            .collect()
    }

    /// Why an address is excluded, or `None` if it is sendable.
    pub fn exclusion_reason(&self, email: &str) -> Option<String> {
        let email = email.trim();

        // Fails closed: anything we can't split into local@domain with a
        // dotted domain is excluded, never sent to.
        let Some((local, _domain)) = parse_address(email) else {
            return Some("malformed address".to_string());
        };

        let local_lower = local.to_lowercase();
        if ROLE_PREFIXES.contains(&local_lower.as_str()) {
            return Some(format!("generic role address ({local_lower}@)"));
        }

        for rule in &self.placeholder_rules {
            if rule.regex.is_match(email) {
                return Some(rule.reason.clone());
            }
        }

        None
    }
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Split an address into (local, domain), requiring exactly one `@`, a
/// non-empty local part, and a dotted domain.
fn parse_address(email: &str) -> Option<(&str, &str)> {
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }
    let (head, tail) = domain.split_once('.')?;
    if head.is_empty() || tail.is_empty() {
        return None;
    }
    Some((local, domain))
}
