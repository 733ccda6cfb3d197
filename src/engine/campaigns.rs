//! Campaign allocation.
//!
//! Selects which active campaigns still have daily capacity and resolves
//! each one's messaging strategy. Ordering spreads load evenly: the
//! campaign with the lowest used fraction of its daily limit goes first,
//! instead of exhausting one campaign before starting another.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::content::strategies::{OutreachStrategy, StrategyRegistry};
use crate::model::Campaign;

/// A campaign paired with its sends so far today (derived from
/// EmailRecords in the campaign's timezone, never a stored counter).
#[derive(Debug, Clone)]
pub struct CampaignUsage {
    pub campaign: Campaign,
    pub sent_today: u32,
}

/// A campaign cleared to send, with its strategy resolved.
#[derive(Clone)]
pub struct PlannedCampaign {
    pub campaign: Campaign,
    pub sent_today: u32,
    pub strategy: Arc<dyn OutreachStrategy>,
}

/// Allocates daily campaign capacity.
pub struct CampaignAllocator {
    registry: Arc<StrategyRegistry>,
}

impl CampaignAllocator {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    /// Order campaigns with remaining capacity by ascending usage ratio.
    ///
    /// A campaign whose strategy key is unknown is a configuration error
    /// for that campaign only: logged and skipped, never a process abort.
    pub fn allocate(&self, usage: Vec<CampaignUsage>) -> Vec<PlannedCampaign> {
        let mut open: Vec<CampaignUsage> = usage
            .into_iter()
            .filter(|u| {
                if !u.campaign.active {
                    return false;
                }
                if u.campaign.daily_limit == 0 || u.sent_today >= u.campaign.daily_limit {
                    debug!(
                        campaign = %u.campaign.name,
                        sent_today = u.sent_today,
                        daily_limit = u.campaign.daily_limit,
                        "Campaign at daily capacity"
                    );
                    return false;
                }
                true
            })
            .collect();

        open.sort_by(|a, b| {
            usage_ratio_cmp(
                a.sent_today,
                a.campaign.daily_limit,
                b.sent_today,
                b.campaign.daily_limit,
            )
            .then_with(|| a.sent_today.cmp(&b.sent_today))
            .then_with(|| a.campaign.id.cmp(&b.campaign.id))
        });

        open.into_iter()
            .filter_map(|u| match self.registry.resolve(&u.campaign.strategy_key) {
                Ok(strategy) => Some(PlannedCampaign {
                    campaign: u.campaign,
                    sent_today: u.sent_today,
                    strategy,
                }),
                Err(e) => {
                    warn!(
                        campaign = %u.campaign.name,
                        error = %e,
                        "Skipping campaign with unresolvable strategy"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Compare `a_sent/a_limit` against `b_sent/b_limit` without floats:
/// cross-multiplied in u64 so the ordering is exact and deterministic.
pub(crate) fn usage_ratio_cmp(
    a_sent: u32,
    a_limit: u32,
    b_sent: u32,
    b_limit: u32,
) -> std::cmp::Ordering {
    let lhs = u64::from(a_sent) * u64::from(b_limit);
    let rhs = u64::from(b_sent) * u64::from(a_limit);
    lhs.cmp(&rhs)
}
