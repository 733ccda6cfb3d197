//! Mailbox health tracking.
//!
//! Pure mapping from send outcomes to health updates. Engine activity can
//! only lower a score or leave it alone; recovery is an explicit external
//! reset. A mailbox crossing the pause floor is taken out of rotation.

use crate::model::{Mailbox, MailboxStatus};

/// Penalty size and auto-pause threshold.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    /// Health deducted per mailbox-attributable failure.
    pub penalty: u8,
    /// Scores below this pause the mailbox.
    pub pause_floor: u8,
}

/// New health state to persist for a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthUpdate {
    pub health_score: u8,
    pub status: MailboxStatus,
}

/// Outcome of one dispatch pass, as seen by the health tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transport accepted the message.
    Delivered,
    /// Transport failed in a way attributable to the sender identity
    /// (auth, connection, exhausted transient failures).
    MailboxFault,
    /// Transport rejected the recipient; the sender is fine.
    RecipientRejected,
    /// Nothing reached the transport layer.
    Skipped,
}

/// Health update for an outcome, or `None` when health is untouched.
pub fn assess(mailbox: &Mailbox, outcome: SendOutcome, policy: HealthPolicy) -> Option<HealthUpdate> {
    match outcome {
        SendOutcome::MailboxFault => Some(penalize(mailbox, policy)),
        SendOutcome::Delivered | SendOutcome::RecipientRejected | SendOutcome::Skipped => None,
    }
}

/// Apply one penalty, auto-pausing below the floor. Saturates at zero.
pub fn penalize(mailbox: &Mailbox, policy: HealthPolicy) -> HealthUpdate {
    let health_score = mailbox.health_score.saturating_sub(policy.penalty);
    let status = if health_score < policy.pause_floor && mailbox.status == MailboxStatus::Active {
        MailboxStatus::Paused
    } else {
        mailbox.status
    };
    HealthUpdate {
        health_score,
        status,
    }
}
