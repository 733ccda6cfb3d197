//! Persistence layer.
//!
//! The engine treats storage as a transactional keyed store with the
//! filtered queries below. `LibSqlStore` is the production backend;
//! `MemoryStore` backs tests and demos with the same contract.

pub mod libsql_backend;
pub mod memory;
mod migrations;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Activity, Campaign, EmailRecord, Mailbox, MailboxStatus, Prospect};

/// Backend-agnostic store contract.
///
/// Prospects and campaigns are written by the CRM core; the engine only
/// needs the upserts for seeding and tests. The recording operations are
/// the engine's own writes and must be atomic per call.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run pending schema migrations. No-op for backends without DDL.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    // ── Prospects ───────────────────────────────────────────────────

    /// Candidate pool for outreach: stage `new` or `researching`, not
    /// archived, has a contact email, `score >= min_score`; ordered by
    /// score descending (id ascending on ties, for determinism).
    async fn outreach_candidates(&self, min_score: u8) -> Result<Vec<Prospect>, StoreError>;

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>, StoreError>;

    async fn upsert_prospect(&self, prospect: &Prospect) -> Result<(), StoreError>;

    // ── Campaigns ───────────────────────────────────────────────────

    async fn active_campaigns(&self) -> Result<Vec<Campaign>, StoreError>;

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    async fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    /// Count of outbound EmailRecords for a campaign since `since`.
    async fn campaign_sends_since(
        &self,
        campaign_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    // ── Mailboxes ───────────────────────────────────────────────────

    async fn list_mailboxes(&self) -> Result<Vec<Mailbox>, StoreError>;

    async fn get_mailbox(&self, id: Uuid) -> Result<Option<Mailbox>, StoreError>;

    async fn upsert_mailbox(&self, mailbox: &Mailbox) -> Result<(), StoreError>;

    /// Persist a health-tracker update. Never touches counters.
    async fn update_mailbox_health(
        &self,
        id: Uuid,
        health_score: u8,
        status: MailboxStatus,
    ) -> Result<(), StoreError>;

    // ── Emails ──────────────────────────────────────────────────────

    /// Prospect ids that already have any outbound EmailRecord — the
    /// source of truth for the at-most-once invariant.
    async fn emailed_prospect_ids(&self) -> Result<HashSet<Uuid>, StoreError>;

    async fn emails_for_prospect(&self, prospect_id: Uuid)
    -> Result<Vec<EmailRecord>, StoreError>;

    /// Insert a bare EmailRecord (failed attempts, recovery fallback).
    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StoreError>;

    /// Record a successful send as one logical unit: insert the
    /// EmailRecord, increment the mailbox counter **only if**
    /// `sent_today < mailbox_daily_limit` (quota invariant under races),
    /// stamp `last_used_at`, flip the prospect to `outreach` with
    /// `contacted_at`, bump the campaign's cumulative counter, and write
    /// the activity entry. Fails with `StoreError::Constraint` and
    /// persists nothing if the mailbox was already at its limit.
    async fn record_sent(
        &self,
        record: &EmailRecord,
        activity: &Activity,
        mailbox_daily_limit: u32,
    ) -> Result<(), StoreError>;

    // ── Activities ──────────────────────────────────────────────────

    async fn activities_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<Activity>, StoreError>;
}
