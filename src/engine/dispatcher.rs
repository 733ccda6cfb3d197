//! The dispatcher — one send per invocation.
//!
//! Advances through selection, generation, transmission, and recording in
//! strict order; there is no branching back and no internal loop. An
//! external trigger calls `run_once` per tick, and the stagger delay at
//! the end spaces sends out to a human cadence instead of bursting.
//!
//! Every failure is caught here and folded into the structured
//! `DispatchReport`; nothing escapes as an unhandled fault.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::content::strategies::StrategyRegistry;
use crate::content::EmailComposer;
use crate::day;
use crate::engine::campaigns::{CampaignAllocator, CampaignUsage, PlannedCampaign};
use crate::engine::eligibility::EligibilityFilter;
use crate::engine::health::{self, HealthPolicy, SendOutcome};
use crate::engine::mailboxes::MailboxPool;
use crate::error::StoreError;
use crate::model::{Activity, Direction, EmailDraft, EmailRecord, EmailStatus, Mailbox, Prospect};
use crate::retry::{run_with_retry, CallError};
use crate::store::Store;
use crate::transport::MailTransport;

/// Stage a dispatch pass failed in, for the structured report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    SelectingProspect,
    SelectingCampaign,
    SelectingMailbox,
    GeneratingContent,
    Sending,
    Recording,
}

impl DispatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectingProspect => "selecting_prospect",
            Self::SelectingCampaign => "selecting_campaign",
            Self::SelectingMailbox => "selecting_mailbox",
            Self::GeneratingContent => "generating_content",
            Self::Sending => "sending",
            Self::Recording => "recording",
        }
    }
}

/// Why a pass ended with nothing to do. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoEligibleProspects,
    NoCampaignCapacity,
    NoMailboxCapacity,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoEligibleProspects => "no eligible prospects",
            Self::NoCampaignCapacity => "no campaign capacity",
            Self::NoMailboxCapacity => "no mailbox capacity",
        }
    }
}

/// Terminal outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Skipped(SkipReason),
    Failed {
        stage: DispatchStage,
        reason: String,
    },
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped(_) => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Structured result handed back to the trigger for observability.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub prospect_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub mailbox: Option<String>,
}

impl DispatchReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: DispatchOutcome::Skipped(reason),
            prospect_id: None,
            campaign_id: None,
            mailbox: None,
        }
    }
}

/// Orchestrates one email send per invocation.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    composer: EmailComposer,
    transport: Arc<dyn MailTransport>,
    filter: EligibilityFilter,
    allocator: CampaignAllocator,
    pool: MailboxPool,
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        composer: EmailComposer,
        transport: Arc<dyn MailTransport>,
        registry: Arc<StrategyRegistry>,
        config: EngineConfig,
    ) -> Self {
        let pool = MailboxPool::new(config.warmup.clone(), config.min_health_score);
        Self {
            store,
            composer,
            transport,
            filter: EligibilityFilter::new(),
            allocator: CampaignAllocator::new(registry),
            pool,
            config,
        }
    }

    fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            penalty: self.config.health_penalty,
            pause_floor: self.config.pause_floor,
        }
    }

    /// Run exactly one dispatch pass. Never returns an error: every
    /// fault is folded into the report.
    pub async fn run_once(&self) -> DispatchReport {
        // ── Selecting prospect ──────────────────────────────────────
        let prospect = match self.select_prospect().await {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!(reason = SkipReason::NoEligibleProspects.as_str(), "Skipped");
                return DispatchReport::skipped(SkipReason::NoEligibleProspects);
            }
            Err(e) => return self.store_failed(DispatchStage::SelectingProspect, e),
        };

        // ── Selecting campaign ──────────────────────────────────────
        let planned = match self.select_campaign().await {
            Ok(Some(c)) => c,
            Ok(None) => {
                info!(reason = SkipReason::NoCampaignCapacity.as_str(), "Skipped");
                return DispatchReport::skipped(SkipReason::NoCampaignCapacity);
            }
            Err(e) => return self.store_failed(DispatchStage::SelectingCampaign, e),
        };

        // ── Selecting mailbox ───────────────────────────────────────
        let mailbox = match self.select_mailbox().await {
            Ok(Some(mb)) => mb,
            Ok(None) => {
                info!(reason = SkipReason::NoMailboxCapacity.as_str(), "Skipped");
                return DispatchReport::skipped(SkipReason::NoMailboxCapacity);
            }
            Err(e) => return self.store_failed(DispatchStage::SelectingMailbox, e),
        };

        let mut report = DispatchReport {
            outcome: DispatchOutcome::Sent,
            prospect_id: Some(prospect.id),
            campaign_id: Some(planned.campaign.id),
            mailbox: Some(mailbox.address.clone()),
        };

        info!(
            prospect = %prospect.name,
            campaign = %planned.campaign.name,
            mailbox = %mailbox.address,
            strategy = planned.strategy.key(),
            "Dispatching"
        );

        // ── Generating content ──────────────────────────────────────
        let draft = match self.generate_content(&prospect, &planned).await {
            Ok(draft) => draft,
            Err(reason) => {
                warn!(prospect = %prospect.name, %reason, "Content generation failed");
                report.outcome = DispatchOutcome::Failed {
                    stage: DispatchStage::GeneratingContent,
                    reason,
                };
                self.stagger().await;
                return report;
            }
        };

        // ── Sending ─────────────────────────────────────────────────
        let to_email = prospect
            .contact_email
            .clone()
            .unwrap_or_default();
        let send_result = self.send(&mailbox, &to_email, &draft).await;

        match send_result {
            Ok(()) => {
                // ── Recording ───────────────────────────────────────
                let record = build_record(&prospect, &planned, &mailbox, &draft, EmailStatus::Sent);
                let activity =
                    Activity::email_sent(prospect.id, &planned.campaign.name, &mailbox.address);
                let limit = self.pool.daily_limit(&mailbox);

                if let Err(e) = self.store.record_sent(&record, &activity, limit).await {
                    error!(error = %e, "Recording failed after a successful send");
                    // Best effort: persist the email row alone so the
                    // at-most-once check still sees this prospect.
                    if let Err(e2) = self.store.insert_email(&record).await {
                        error!(error = %e2, "Fallback email insert also failed");
                    }
                    report.outcome = DispatchOutcome::Failed {
                        stage: DispatchStage::Recording,
                        reason: e.to_string(),
                    };
                } else {
                    info!(
                        prospect = %prospect.name,
                        mailbox = %mailbox.address,
                        subject = %draft.subject,
                        "Sent"
                    );
                }
            }
            Err((reason, outcome)) => {
                warn!(prospect = %prospect.name, mailbox = %mailbox.address, %reason, "Send failed");

                // Health is penalized exactly once per failed pass, and
                // never for recipient-side rejections.
                if let Some(update) = health::assess(&mailbox, outcome, self.health_policy()) {
                    warn!(
                        mailbox = %mailbox.address,
                        health = update.health_score,
                        status = update.status.as_str(),
                        "Penalizing mailbox health"
                    );
                    if let Err(e) = self
                        .store
                        .update_mailbox_health(mailbox.id, update.health_score, update.status)
                        .await
                    {
                        error!(error = %e, "Failed to persist health update");
                    }
                }

                // The attempt reached the transport layer with a terminal
                // outcome, so it gets an EmailRecord.
                let record = build_record(&prospect, &planned, &mailbox, &draft, EmailStatus::Failed);
                if let Err(e) = self.store.insert_email(&record).await {
                    error!(error = %e, "Failed to persist failed-send record");
                }

                report.outcome = DispatchOutcome::Failed {
                    stage: DispatchStage::Sending,
                    reason,
                };
            }
        }

        self.stagger().await;
        report
    }

    /// Head of the ranked, filtered eligibility queue.
    async fn select_prospect(&self) -> Result<Option<Prospect>, StoreError> {
        let candidates = self
            .store
            .outreach_candidates(self.config.min_prospect_score)
            .await?;
        let emailed = self.store.emailed_prospect_ids().await?;
        Ok(self.filter.filter(candidates, &emailed).into_iter().next())
    }

    /// Best campaign with remaining daily capacity, strategy resolved.
    async fn select_campaign(&self) -> Result<Option<PlannedCampaign>, StoreError> {
        let now = Utc::now();
        let campaigns = self.store.active_campaigns().await?;

        let mut usage = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            let since = day::start_of_day(now, campaign.utc_offset_minutes);
            let sent_today = self.store.campaign_sends_since(campaign.id, since).await?;
            usage.push(CampaignUsage {
                campaign,
                sent_today,
            });
        }

        Ok(self.allocator.allocate(usage).into_iter().next())
    }

    /// Best usable mailbox that also has credentials configured.
    ///
    /// A mailbox without credentials is a configuration error for that
    /// mailbox only — it is skipped for this invocation, not the run.
    async fn select_mailbox(&self) -> Result<Option<Mailbox>, StoreError> {
        let mailboxes = self.store.list_mailboxes().await?;
        for candidate in self.pool.ranked(&mailboxes) {
            if self.config.account_for(&candidate.address).is_some() {
                return Ok(Some(candidate));
            }
            warn!(
                mailbox = %candidate.address,
                "Skipping mailbox with no configured credentials"
            );
        }
        Ok(None)
    }

    /// Compose through the harness. Transient model errors retry within
    /// the budget; malformed output fails immediately.
    async fn generate_content(
        &self,
        prospect: &Prospect,
        planned: &PlannedCampaign,
    ) -> Result<EmailDraft, String> {
        run_with_retry(
            &self.config.content_retry,
            || self.composer.compose(prospect, planned.strategy.as_ref()),
            |e| match e {
                CallError::Failed(g) => g.is_transient(),
                CallError::Timeout { .. } => false,
            },
        )
        .await
        .map_err(|e| e.to_string())
    }

    /// Transmit through the harness. Returns the failure reason plus the
    /// health-tracker outcome classification on error.
    async fn send(
        &self,
        mailbox: &Mailbox,
        to_email: &str,
        draft: &EmailDraft,
    ) -> Result<(), (String, SendOutcome)> {
        let Some(account) = self.config.account_for(&mailbox.address) else {
            // Selection only yields mailboxes with credentials.
            return Err((
                format!("no credentials for {}", mailbox.address),
                SendOutcome::Skipped,
            ));
        };

        let result = run_with_retry(
            &self.config.transport_retry,
            || {
                self.transport
                    .send(account, to_email, &draft.subject, &draft.body)
            },
            |e| match e {
                CallError::Failed(t) => t.is_transient(),
                CallError::Timeout { .. } => false,
            },
        )
        .await;

        match result {
            Ok(_receipt) => Ok(()),
            Err(call_err) => {
                let outcome = match &call_err {
                    CallError::Failed(t) if !t.is_mailbox_fault() => SendOutcome::RecipientRejected,
                    _ => SendOutcome::MailboxFault,
                };
                Err((call_err.to_string(), outcome))
            }
        }
    }

    /// Bounded random pause imitating human sending cadence.
    async fn stagger(&self) {
        let max = self.config.stagger.max;
        if max.is_zero() {
            return;
        }
        let min = self.config.stagger.min.min(max);
        let delay = {
            let mut rng = rand::thread_rng();
            let millis = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
            std::time::Duration::from_millis(millis)
        };
        info!(delay_secs = delay.as_secs(), "Stagger delay");
        tokio::time::sleep(delay).await;
    }

    fn store_failed(&self, stage: DispatchStage, e: StoreError) -> DispatchReport {
        error!(stage = stage.as_str(), error = %e, "Store failure during selection");
        DispatchReport {
            outcome: DispatchOutcome::Failed {
                stage,
                reason: e.to_string(),
            },
            prospect_id: None,
            campaign_id: None,
            mailbox: None,
        }
    }
}

fn build_record(
    prospect: &Prospect,
    planned: &PlannedCampaign,
    mailbox: &Mailbox,
    draft: &EmailDraft,
    status: EmailStatus,
) -> EmailRecord {
    EmailRecord {
        id: Uuid::new_v4(),
        prospect_id: prospect.id,
        campaign_id: planned.campaign.id,
        mailbox_id: mailbox.id,
        from_email: mailbox.address.clone(),
        to_email: prospect.contact_email.clone().unwrap_or_default(),
        subject: draft.subject.clone(),
        body: draft.body.clone(),
        direction: Direction::Outbound,
        status,
        sent_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::config::StaggerConfig;
    use crate::content::provider::{CompletionRequest, CompletionResponse, ContentModel};
    use crate::content::ComposerConfig;
    use crate::error::{GenerateError, TransportError};
    use crate::store::MemoryStore;
    use crate::transport::SendReceipt;

    use super::*;

    struct StaticModel;

    #[async_trait]
    impl ContentModel for StaticModel {
        fn model_name(&self) -> &str {
            "static"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, GenerateError> {
            Ok(CompletionResponse {
                content: r#"{"subject": "Hi", "body": "Hello"}"#.into(),
            })
        }
    }

    struct NoopTransport;

    #[async_trait]
    impl MailTransport for NoopTransport {
        async fn send(
            &self,
            _account: &crate::config::SmtpAccount,
            _to: &str,
            _subject: &str,
            _body: &str,
        ) -> Result<SendReceipt, TransportError> {
            Ok(SendReceipt {
                message_id: "<test@acme.io>".into(),
            })
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            stagger: StaggerConfig {
                min: std::time::Duration::ZERO,
                max: std::time::Duration::ZERO,
            },
            ..EngineConfig::default()
        }
    }

    fn dispatcher(store: Arc<dyn Store>, config: EngineConfig) -> Dispatcher {
        Dispatcher::new(
            store,
            EmailComposer::new(Arc::new(StaticModel), ComposerConfig::default()),
            Arc::new(NoopTransport),
            Arc::new(StrategyRegistry::with_defaults()),
            config,
        )
    }

    #[tokio::test]
    async fn empty_store_skips_with_no_eligible_prospects() {
        let store = Arc::new(MemoryStore::new());
        let report = dispatcher(store, test_config()).run_once().await;
        assert_eq!(
            report.outcome,
            DispatchOutcome::Skipped(SkipReason::NoEligibleProspects)
        );
        assert!(report.prospect_id.is_none());
    }

    #[tokio::test]
    async fn skip_reasons_have_stable_wire_strings() {
        assert_eq!(
            SkipReason::NoEligibleProspects.as_str(),
            "no eligible prospects"
        );
        assert_eq!(SkipReason::NoCampaignCapacity.as_str(), "no campaign capacity");
        assert_eq!(SkipReason::NoMailboxCapacity.as_str(), "no mailbox capacity");
    }

    #[tokio::test]
    async fn outcome_labels_are_stable() {
        assert_eq!(DispatchOutcome::Sent.label(), "sent");
        assert_eq!(
            DispatchOutcome::Skipped(SkipReason::NoCampaignCapacity).label(),
            "skipped"
        );
        assert_eq!(
            DispatchOutcome::Failed {
                stage: DispatchStage::Sending,
                reason: "x".into()
            }
            .label(),
            "failed"
        );
    }
}
