//! Mailbox pool selection.
//!
//! Picks exactly one usable sender identity per dispatch, or reports that
//! the pool has no capacity. Selection is deterministic over a snapshot:
//! active status → daily quota → health floor → lowest usage ratio, ties
//! broken by longest-idle mailbox, then id.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::WarmupSchedule;
use crate::engine::campaigns::usage_ratio_cmp;
use crate::model::{Mailbox, MailboxStatus};

/// Selects sender mailboxes against the warm-up schedule and health floor.
pub struct MailboxPool {
    warmup: WarmupSchedule,
    min_health: u8,
}

impl MailboxPool {
    pub fn new(warmup: WarmupSchedule, min_health: u8) -> Self {
        Self { warmup, min_health }
    }

    /// Daily limit a mailbox's warm-up stage currently permits.
    pub fn daily_limit(&self, mailbox: &Mailbox) -> u32 {
        self.warmup.daily_limit(mailbox.warmup_stage)
    }

    /// All usable mailboxes, best candidate first.
    pub fn ranked(&self, mailboxes: &[Mailbox]) -> Vec<Mailbox> {
        let mut usable: Vec<Mailbox> = mailboxes
            .iter()
            .filter(|mb| {
                if mb.status != MailboxStatus::Active {
                    return false;
                }
                let limit = self.daily_limit(mb);
                if limit == 0 || mb.sent_today >= limit {
                    debug!(mailbox = %mb.address, sent_today = mb.sent_today, limit, "Mailbox at daily quota");
                    return false;
                }
                if mb.health_score < self.min_health {
                    debug!(mailbox = %mb.address, health = mb.health_score, floor = self.min_health, "Mailbox below health floor");
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        usable.sort_by(|a, b| {
            usage_ratio_cmp(
                a.sent_today,
                self.daily_limit(a),
                b.sent_today,
                self.daily_limit(b),
            )
            .then_with(|| idle_key(a).cmp(&idle_key(b)))
            .then_with(|| a.id.cmp(&b.id))
        });

        usable
    }

    /// The single best usable mailbox, or `None` when the pool has no
    /// capacity.
    pub fn select(&self, mailboxes: &[Mailbox]) -> Option<Mailbox> {
        self.ranked(mailboxes).into_iter().next()
    }
}

/// Ordering key for the idle tie-break: a never-used mailbox sorts before
/// any used one, then older `last_used_at` first.
fn idle_key(mb: &Mailbox) -> DateTime<Utc> {
    mb.last_used_at.unwrap_or(DateTime::<Utc>::MIN_UTC)
}
