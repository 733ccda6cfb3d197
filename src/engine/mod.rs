//! The send engine: eligibility, allocation, pool selection, health, and
//! the dispatcher that strings them together.

pub mod campaigns;
pub mod dispatcher;
pub mod eligibility;
pub mod health;
pub mod mailboxes;

pub use campaigns::{CampaignAllocator, CampaignUsage, PlannedCampaign};
pub use dispatcher::{DispatchOutcome, DispatchReport, DispatchStage, Dispatcher, SkipReason};
pub use eligibility::EligibilityFilter;
pub use health::{HealthPolicy, HealthUpdate, SendOutcome};
pub use mailboxes::MailboxPool;
