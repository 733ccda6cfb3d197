//! Domain types shared across the engine.
//!
//! Prospects and campaigns are owned by the CRM core — the engine reads
//! their current state and produces EmailRecords, mailbox counter updates,
//! and activity entries. Everything here is plain data; behavior lives in
//! the `engine` modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Prospect ────────────────────────────────────────────────────────

/// Lifecycle stage of a prospect on the kanban board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectStage {
    New,
    Researching,
    Outreach,
    Engaged,
    Meeting,
    Proposal,
    Won,
    Lost,
}

impl ProspectStage {
    /// Short label for logging and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Researching => "researching",
            Self::Outreach => "outreach",
            Self::Engaged => "engaged",
            Self::Meeting => "meeting",
            Self::Proposal => "proposal",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    /// Parse a stored stage label.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "researching" => Some(Self::Researching),
            "outreach" => Some(Self::Outreach),
            "engaged" => Some(Self::Engaged),
            "meeting" => Some(Self::Meeting),
            "proposal" => Some(Self::Proposal),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

/// A sales prospect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prospect {
    pub id: Uuid,
    pub name: String,
    pub company: Option<String>,
    /// Contact address; prospects without one never enter the send queue.
    pub contact_email: Option<String>,
    pub stage: ProspectStage,
    /// Priority score 0–100, set by the CRM's research pipeline.
    pub score: u8,
    pub archived: bool,
    pub tags: Vec<String>,
    /// Stamped by the engine when the first outbound email goes out.
    pub contacted_at: Option<DateTime<Utc>>,
}

// ── Campaign ────────────────────────────────────────────────────────

/// An outreach campaign. `emails_sent` is cumulative over the campaign's
/// lifetime; the daily count is derived from today's EmailRecords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    /// Selects the content-generation strategy from the registry.
    pub strategy_key: String,
    pub active: bool,
    pub daily_limit: u32,
    pub emails_sent: u64,
    /// Timezone the campaign's calendar day is measured in.
    pub utc_offset_minutes: i32,
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// Operational status of a sender mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxStatus {
    Active,
    Paused,
    Disabled,
}

impl MailboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// A sender identity in the pool.
///
/// The daily limit is not stored — it is derived from `warmup_stage`
/// through the configured `WarmupSchedule`. `sent_today` is reset at the
/// day boundary by an external process; the engine only increments it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: Uuid,
    pub address: String,
    /// Position in the warm-up ramp, 1..=5.
    pub warmup_stage: u8,
    pub sent_today: u32,
    /// Deliverability health 0–100; decreases on failures, never raised
    /// by the engine.
    pub health_score: u8,
    pub status: MailboxStatus,
    pub last_used_at: Option<DateTime<Utc>>,
}

// ── Email record ────────────────────────────────────────────────────

/// Message direction. The engine only writes `Outbound`; inbound records
/// come from the reply-ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "outbound" => Some(Self::Outbound),
            "inbound" => Some(Self::Inbound),
            _ => None,
        }
    }
}

/// Terminal status of a send attempt. `Bounced` is set later by the
/// external bounce-processing pipeline, never by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Sent,
    Bounced,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Bounced => "bounced",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "bounced" => Some(Self::Bounced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One outbound send, written once per attempt that reached the transport
/// layer with a terminal outcome. The Email table is the single source of
/// truth for the at-most-once-per-prospect invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub campaign_id: Uuid,
    pub mailbox_id: Uuid,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub direction: Direction,
    pub status: EmailStatus,
    pub sent_at: DateTime<Utc>,
}

// ── Activity ────────────────────────────────────────────────────────

/// Audit entry on a prospect's timeline, written alongside each send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub kind: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Activity entry for a successful outbound email.
    pub fn email_sent(prospect_id: Uuid, campaign_name: &str, from: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            prospect_id,
            kind: "email_sent".to_string(),
            detail: format!("Outbound email sent from {from} (campaign: {campaign_name})"),
            created_at: Utc::now(),
        }
    }
}

// ── Email draft ─────────────────────────────────────────────────────

/// Subject/body pair from the content generator. The engine checks both
/// fields are present and non-empty, never interprets the prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_round_trip() {
        for stage in [
            ProspectStage::New,
            ProspectStage::Researching,
            ProspectStage::Outreach,
            ProspectStage::Engaged,
            ProspectStage::Meeting,
            ProspectStage::Proposal,
            ProspectStage::Won,
            ProspectStage::Lost,
        ] {
            assert_eq!(ProspectStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(ProspectStage::parse("contacted"), None);
    }

    #[test]
    fn mailbox_status_labels_round_trip() {
        for status in [
            MailboxStatus::Active,
            MailboxStatus::Paused,
            MailboxStatus::Disabled,
        ] {
            assert_eq!(MailboxStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn email_status_labels_round_trip() {
        for status in [EmailStatus::Sent, EmailStatus::Bounced, EmailStatus::Failed] {
            assert_eq!(EmailStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn stage_serializes_snake_case() {
        let json = serde_json::to_value(ProspectStage::Researching).unwrap();
        assert_eq!(json, "researching");
    }

    #[test]
    fn activity_email_sent_mentions_campaign() {
        let prospect = Uuid::new_v4();
        let activity = Activity::email_sent(prospect, "Q3 Hotels", "reach@acme.io");
        assert_eq!(activity.kind, "email_sent");
        assert!(activity.detail.contains("Q3 Hotels"));
        assert!(activity.detail.contains("reach@acme.io"));
    }
}
