//! In-memory `Store` — HashMaps behind RwLocks.
//!
//! Backs the test suite and demo setups with the same contract as the
//! libSQL store, including the conditional mailbox counter update.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Activity, Campaign, Direction, EmailRecord, Mailbox, MailboxStatus, Prospect, ProspectStage,
};
use crate::store::Store;

#[derive(Default)]
pub struct MemoryStore {
    prospects: RwLock<HashMap<Uuid, Prospect>>,
    campaigns: RwLock<HashMap<Uuid, Campaign>>,
    mailboxes: RwLock<HashMap<Uuid, Mailbox>>,
    emails: RwLock<Vec<EmailRecord>>,
    activities: RwLock<Vec<Activity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn outreach_candidates(&self, min_score: u8) -> Result<Vec<Prospect>, StoreError> {
        let prospects = self.prospects.read().await;
        let mut candidates: Vec<Prospect> = prospects
            .values()
            .filter(|p| {
                matches!(p.stage, ProspectStage::New | ProspectStage::Researching)
                    && !p.archived
                    && p.contact_email.is_some()
                    && p.score >= min_score
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        Ok(candidates)
    }

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>, StoreError> {
        Ok(self.prospects.read().await.get(&id).cloned())
    }

    async fn upsert_prospect(&self, prospect: &Prospect) -> Result<(), StoreError> {
        self.prospects
            .write()
            .await
            .insert(prospect.id, prospect.clone());
        Ok(())
    }

    async fn active_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let campaigns = self.campaigns.read().await;
        let mut active: Vec<Campaign> = campaigns.values().filter(|c| c.active).cloned().collect();
        active.sort_by_key(|c| c.id);
        Ok(active)
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        Ok(self.campaigns.read().await.get(&id).cloned())
    }

    async fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        self.campaigns
            .write()
            .await
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn campaign_sends_since(
        &self,
        campaign_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let emails = self.emails.read().await;
        let count = emails
            .iter()
            .filter(|e| {
                e.campaign_id == campaign_id
                    && e.direction == Direction::Outbound
                    && e.sent_at >= since
            })
            .count();
        Ok(count as u32)
    }

    async fn list_mailboxes(&self) -> Result<Vec<Mailbox>, StoreError> {
        let mailboxes = self.mailboxes.read().await;
        let mut all: Vec<Mailbox> = mailboxes.values().cloned().collect();
        all.sort_by_key(|m| m.id);
        Ok(all)
    }

    async fn get_mailbox(&self, id: Uuid) -> Result<Option<Mailbox>, StoreError> {
        Ok(self.mailboxes.read().await.get(&id).cloned())
    }

    async fn upsert_mailbox(&self, mailbox: &Mailbox) -> Result<(), StoreError> {
        self.mailboxes
            .write()
            .await
            .insert(mailbox.id, mailbox.clone());
        Ok(())
    }

    async fn update_mailbox_health(
        &self,
        id: Uuid,
        health_score: u8,
        status: MailboxStatus,
    ) -> Result<(), StoreError> {
        let mut mailboxes = self.mailboxes.write().await;
        let mailbox = mailboxes.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "mailbox".into(),
            id,
        })?;
        mailbox.health_score = health_score;
        mailbox.status = status;
        Ok(())
    }

    async fn emailed_prospect_ids(&self) -> Result<HashSet<Uuid>, StoreError> {
        let emails = self.emails.read().await;
        Ok(emails
            .iter()
            .filter(|e| e.direction == Direction::Outbound)
            .map(|e| e.prospect_id)
            .collect())
    }

    async fn emails_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<EmailRecord>, StoreError> {
        let emails = self.emails.read().await;
        Ok(emails
            .iter()
            .filter(|e| e.prospect_id == prospect_id)
            .cloned()
            .collect())
    }

    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StoreError> {
        self.emails.write().await.push(record.clone());
        Ok(())
    }

    async fn record_sent(
        &self,
        record: &EmailRecord,
        activity: &Activity,
        mailbox_daily_limit: u32,
    ) -> Result<(), StoreError> {
        // Lock everything up front so the recording is atomic with
        // respect to other store calls.
        let mut mailboxes = self.mailboxes.write().await;
        let mut prospects = self.prospects.write().await;
        let mut campaigns = self.campaigns.write().await;
        let mut emails = self.emails.write().await;
        let mut activities = self.activities.write().await;

        let mailbox = mailboxes
            .get_mut(&record.mailbox_id)
            .ok_or(StoreError::NotFound {
                entity: "mailbox".into(),
                id: record.mailbox_id,
            })?;
        // Same conditional update as the libSQL backend.
        if mailbox.sent_today >= mailbox_daily_limit {
            return Err(StoreError::Constraint(format!(
                "mailbox {} already at daily limit {mailbox_daily_limit}",
                mailbox.address
            )));
        }
        mailbox.sent_today += 1;
        mailbox.last_used_at = Some(record.sent_at);

        if let Some(prospect) = prospects.get_mut(&record.prospect_id) {
            prospect.stage = ProspectStage::Outreach;
            prospect.contacted_at = Some(record.sent_at);
        }
        if let Some(campaign) = campaigns.get_mut(&record.campaign_id) {
            campaign.emails_sent += 1;
        }

        emails.push(record.clone());
        activities.push(activity.clone());
        Ok(())
    }

    async fn activities_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<Activity>, StoreError> {
        let activities = self.activities.read().await;
        Ok(activities
            .iter()
            .filter(|a| a.prospect_id == prospect_id)
            .cloned()
            .collect())
    }
}
