//! Engine configuration.
//!
//! Everything is loaded once at process start into an immutable
//! `EngineConfig` and passed into components explicitly. Business logic
//! never reads the environment.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Maps a mailbox's warm-up stage (1..=5) to its permitted daily volume.
///
/// The mapping is configuration, but the invariant is structural: limits
/// never decrease as the stage increases, validated at construction.
#[derive(Debug, Clone)]
pub struct WarmupSchedule {
    limits: [u32; 5],
}

impl WarmupSchedule {
    pub fn new(limits: [u32; 5]) -> Result<Self, ConfigError> {
        for i in 1..limits.len() {
            if limits[i] < limits[i - 1] {
                return Err(ConfigError::NonMonotonicWarmup {
                    stage: (i + 1) as u8,
                    limit: limits[i],
                    prev_stage: i as u8,
                    prev_limit: limits[i - 1],
                });
            }
        }
        Ok(Self { limits })
    }

    /// Daily limit for a warm-up stage. Stages outside 1..=5 clamp to the
    /// nearest edge so a bad row degrades instead of panicking.
    pub fn daily_limit(&self, stage: u8) -> u32 {
        let idx = stage.clamp(1, 5) as usize - 1;
        self.limits[idx]
    }
}

impl Default for WarmupSchedule {
    fn default() -> Self {
        Self {
            limits: [10, 20, 40, 70, 100],
        }
    }
}

/// SMTP credentials for one sender mailbox, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SmtpAccount {
    pub address: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Bounds for the human-cadence stagger delay applied after each pass
/// that reached the transport layer.
#[derive(Debug, Clone, Copy)]
pub struct StaggerConfig {
    pub min: Duration,
    pub max: Duration,
}

impl Default for StaggerConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(45),
            max: Duration::from_secs(180),
        }
    }
}

/// Immutable engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prospects below this score never enter the candidate pool.
    pub min_prospect_score: u8,
    /// Mailboxes below this health score are skipped by selection.
    pub min_health_score: u8,
    /// Health deducted per mailbox-attributable send failure.
    pub health_penalty: u8,
    /// A mailbox falling below this score is auto-paused.
    pub pause_floor: u8,
    pub warmup: WarmupSchedule,
    pub stagger: StaggerConfig,
    pub content_retry: RetryPolicy,
    pub transport_retry: RetryPolicy,
    /// Sender pool credentials, keyed by address.
    pub accounts: Vec<SmtpAccount>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_prospect_score: 40,
            min_health_score: 50,
            health_penalty: 15,
            pause_floor: 30,
            warmup: WarmupSchedule::default(),
            stagger: StaggerConfig::default(),
            content_retry: RetryPolicy {
                attempts: 2,
                attempt_timeout: Duration::from_secs(30),
                backoff: Duration::from_secs(2),
            },
            transport_retry: RetryPolicy {
                attempts: 3,
                attempt_timeout: Duration::from_secs(15),
                backoff: Duration::from_secs(5),
            },
            accounts: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables, falling back to defaults
    /// for unset tunables. Strict about the warm-up schedule: a malformed
    /// or non-monotonic `WARMUP_DAILY_LIMITS` aborts startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            min_prospect_score: env_u8("ENGINE_MIN_PROSPECT_SCORE", 40),
            min_health_score: env_u8("ENGINE_MIN_HEALTH_SCORE", 50),
            health_penalty: env_u8("ENGINE_HEALTH_PENALTY", 15),
            pause_floor: env_u8("ENGINE_PAUSE_FLOOR", 30),
            stagger: StaggerConfig {
                min: Duration::from_secs(env_u64("ENGINE_STAGGER_MIN_SECS", 45)),
                max: Duration::from_secs(env_u64("ENGINE_STAGGER_MAX_SECS", 180)),
            },
            ..Self::default()
        };

        if let Ok(raw) = std::env::var("WARMUP_DAILY_LIMITS") {
            config.warmup = parse_warmup(&raw)?;
        }

        config.accounts = load_accounts()?;
        Ok(config)
    }

    /// Credentials for a mailbox address, if configured.
    pub fn account_for(&self, address: &str) -> Option<&SmtpAccount> {
        self.accounts
            .iter()
            .find(|a| a.address.eq_ignore_ascii_case(address))
    }
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse `"10,20,40,70,100"` into a validated schedule.
fn parse_warmup(raw: &str) -> Result<WarmupSchedule, ConfigError> {
    let parts: Vec<u32> = raw
        .split(',')
        .map(|p| p.trim().parse())
        .collect::<Result<_, _>>()
        .map_err(|e| ConfigError::InvalidValue {
            key: "WARMUP_DAILY_LIMITS".to_string(),
            message: format!("expected comma-separated integers: {e}"),
        })?;

    let limits: [u32; 5] = parts
        .try_into()
        .map_err(|v: Vec<u32>| ConfigError::InvalidValue {
            key: "WARMUP_DAILY_LIMITS".to_string(),
            message: format!("expected exactly 5 values, got {}", v.len()),
        })?;

    WarmupSchedule::new(limits)
}

/// Read numbered `MAILBOX_n_*` env groups into the sender pool.
///
/// Stops at the first missing `MAILBOX_n_ADDRESS`; a group with an address
/// but no password is a hard error rather than a silently dead sender.
fn load_accounts() -> Result<Vec<SmtpAccount>, ConfigError> {
    let mut accounts = Vec::new();

    for n in 1.. {
        let Ok(address) = std::env::var(format!("MAILBOX_{n}_ADDRESS")) else {
            break;
        };

        let host = std::env::var(format!("MAILBOX_{n}_SMTP_HOST"))
            .map_err(|_| ConfigError::MissingEnvVar(format!("MAILBOX_{n}_SMTP_HOST")))?;
        let port: u16 = std::env::var(format!("MAILBOX_{n}_SMTP_PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);
        let username =
            std::env::var(format!("MAILBOX_{n}_USERNAME")).unwrap_or_else(|_| address.clone());
        let password = std::env::var(format!("MAILBOX_{n}_PASSWORD")).map_err(|_| {
            ConfigError::MissingCredentials {
                address: address.clone(),
            }
        })?;

        accounts.push(SmtpAccount {
            address,
            host,
            port,
            username,
            password: SecretString::from(password),
        });
    }

    Ok(accounts)
}
