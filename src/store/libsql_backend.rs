//! libSQL backend — async `Store` implementation.
//!
//! Supports local file and in-memory databases. All writes the engine
//! owns go through here; `record_sent` is a single transaction so a
//! half-recorded send can never exist.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Activity, Campaign, Direction, EmailRecord, EmailStatus, Mailbox, MailboxStatus, Prospect,
    ProspectStage,
};
use crate::store::{Store, migrations};

/// libSQL store.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create data directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        Ok(store)
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, entity: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Serialization(format!("bad {entity} id {s}: {e}")))
}

fn map_err(e: libsql::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn clamp_u8(v: i64) -> u8 {
    v.clamp(0, u8::MAX as i64) as u8
}

fn clamp_u32(v: i64) -> u32 {
    v.clamp(0, u32::MAX as i64) as u32
}

fn row_to_prospect(row: &libsql::Row) -> Result<Prospect, StoreError> {
    let id: String = row.get(0).map_err(map_err)?;
    let name: String = row.get(1).map_err(map_err)?;
    let company: Option<String> = row.get(2).map_err(map_err)?;
    let contact_email: Option<String> = row.get(3).map_err(map_err)?;
    let stage: String = row.get(4).map_err(map_err)?;
    let score: i64 = row.get(5).map_err(map_err)?;
    let archived: i64 = row.get(6).map_err(map_err)?;
    let tags_json: String = row.get(7).map_err(map_err)?;
    let contacted_at: Option<String> = row.get(8).map_err(map_err)?;

    Ok(Prospect {
        id: parse_uuid(&id, "prospect")?,
        name,
        company,
        contact_email,
        stage: ProspectStage::parse(&stage).unwrap_or(ProspectStage::New),
        score: clamp_u8(score),
        archived: archived != 0,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        contacted_at: contacted_at.as_deref().map(parse_datetime),
    })
}

const PROSPECT_COLUMNS: &str =
    "id, name, company, contact_email, stage, score, archived, tags, contacted_at";

fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, StoreError> {
    let id: String = row.get(0).map_err(map_err)?;
    let name: String = row.get(1).map_err(map_err)?;
    let strategy_key: String = row.get(2).map_err(map_err)?;
    let active: i64 = row.get(3).map_err(map_err)?;
    let daily_limit: i64 = row.get(4).map_err(map_err)?;
    let emails_sent: i64 = row.get(5).map_err(map_err)?;
    let utc_offset_minutes: i64 = row.get(6).map_err(map_err)?;

    Ok(Campaign {
        id: parse_uuid(&id, "campaign")?,
        name,
        strategy_key,
        active: active != 0,
        daily_limit: clamp_u32(daily_limit),
        emails_sent: emails_sent.max(0) as u64,
        utc_offset_minutes: utc_offset_minutes as i32,
    })
}

const CAMPAIGN_COLUMNS: &str =
    "id, name, strategy_key, active, daily_limit, emails_sent, utc_offset_minutes";

fn row_to_mailbox(row: &libsql::Row) -> Result<Mailbox, StoreError> {
    let id: String = row.get(0).map_err(map_err)?;
    let address: String = row.get(1).map_err(map_err)?;
    let warmup_stage: i64 = row.get(2).map_err(map_err)?;
    let sent_today: i64 = row.get(3).map_err(map_err)?;
    let health_score: i64 = row.get(4).map_err(map_err)?;
    let status: String = row.get(5).map_err(map_err)?;
    let last_used_at: Option<String> = row.get(6).map_err(map_err)?;

    Ok(Mailbox {
        id: parse_uuid(&id, "mailbox")?,
        address,
        warmup_stage: clamp_u8(warmup_stage),
        sent_today: clamp_u32(sent_today),
        health_score: clamp_u8(health_score),
        status: MailboxStatus::parse(&status).unwrap_or(MailboxStatus::Disabled),
        last_used_at: last_used_at.as_deref().map(parse_datetime),
    })
}

const MAILBOX_COLUMNS: &str =
    "id, address, warmup_stage, sent_today, health_score, status, last_used_at";

fn row_to_email(row: &libsql::Row) -> Result<EmailRecord, StoreError> {
    let id: String = row.get(0).map_err(map_err)?;
    let prospect_id: String = row.get(1).map_err(map_err)?;
    let campaign_id: String = row.get(2).map_err(map_err)?;
    let mailbox_id: String = row.get(3).map_err(map_err)?;
    let from_email: String = row.get(4).map_err(map_err)?;
    let to_email: String = row.get(5).map_err(map_err)?;
    let subject: String = row.get(6).map_err(map_err)?;
    let body: String = row.get(7).map_err(map_err)?;
    let direction: String = row.get(8).map_err(map_err)?;
    let status: String = row.get(9).map_err(map_err)?;
    let sent_at: String = row.get(10).map_err(map_err)?;

    Ok(EmailRecord {
        id: parse_uuid(&id, "email")?,
        prospect_id: parse_uuid(&prospect_id, "prospect")?,
        campaign_id: parse_uuid(&campaign_id, "campaign")?,
        mailbox_id: parse_uuid(&mailbox_id, "mailbox")?,
        from_email,
        to_email,
        subject,
        body,
        direction: Direction::parse(&direction).unwrap_or(Direction::Outbound),
        status: EmailStatus::parse(&status).unwrap_or(EmailStatus::Failed),
        sent_at: parse_datetime(&sent_at),
    })
}

const EMAIL_COLUMNS: &str = "id, prospect_id, campaign_id, mailbox_id, from_email, to_email, \
     subject, body, direction, status, sent_at";

/// SQL fragment inserting one email row; placeholders ?1..?11 match
/// `EMAIL_COLUMNS`.
const INSERT_EMAIL_SQL: &str = "INSERT INTO emails (id, prospect_id, campaign_id, mailbox_id, \
     from_email, to_email, subject, body, direction, status, sent_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

fn email_params(record: &EmailRecord) -> impl libsql::params::IntoParams {
    params![
        record.id.to_string(),
        record.prospect_id.to_string(),
        record.campaign_id.to_string(),
        record.mailbox_id.to_string(),
        record.from_email.clone(),
        record.to_email.clone(),
        record.subject.clone(),
        record.body.clone(),
        record.direction.as_str(),
        record.status.as_str(),
        record.sent_at.to_rfc3339(),
    ]
}

// ── Store implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlStore {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(&self.conn).await
    }

    async fn outreach_candidates(&self, min_score: u8) -> Result<Vec<Prospect>, StoreError> {
        let sql = format!(
            "SELECT {PROSPECT_COLUMNS} FROM prospects \
             WHERE stage IN ('new', 'researching') \
               AND archived = 0 \
               AND contact_email IS NOT NULL \
               AND score >= ?1 \
             ORDER BY score DESC, id ASC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![i64::from(min_score)])
            .await
            .map_err(map_err)?;

        let mut prospects = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            prospects.push(row_to_prospect(&row)?);
        }
        Ok(prospects)
    }

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>, StoreError> {
        let sql = format!("SELECT {PROSPECT_COLUMNS} FROM prospects WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(map_err)?;
        match rows.next().await.map_err(map_err)? {
            Some(row) => Ok(Some(row_to_prospect(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_prospect(&self, prospect: &Prospect) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&prospect.tags)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO prospects (id, name, company, contact_email, stage, score, archived, tags, contacted_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(id) DO UPDATE SET \
                   name = excluded.name, company = excluded.company, \
                   contact_email = excluded.contact_email, stage = excluded.stage, \
                   score = excluded.score, archived = excluded.archived, \
                   tags = excluded.tags, contacted_at = excluded.contacted_at, \
                   updated_at = datetime('now')",
                params![
                    prospect.id.to_string(),
                    prospect.name.clone(),
                    prospect.company.clone(),
                    prospect.contact_email.clone(),
                    prospect.stage.as_str(),
                    i64::from(prospect.score),
                    i64::from(prospect.archived),
                    tags,
                    prospect.contacted_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn active_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE active = 1 ORDER BY id ASC"
        );
        let mut rows = self.conn.query(&sql, ()).await.map_err(map_err)?;

        let mut campaigns = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            campaigns.push(row_to_campaign(&row)?);
        }
        Ok(campaigns)
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(map_err)?;
        match rows.next().await.map_err(map_err)? {
            Some(row) => Ok(Some(row_to_campaign(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO campaigns (id, name, strategy_key, active, daily_limit, emails_sent, utc_offset_minutes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(id) DO UPDATE SET \
                   name = excluded.name, strategy_key = excluded.strategy_key, \
                   active = excluded.active, daily_limit = excluded.daily_limit, \
                   emails_sent = excluded.emails_sent, \
                   utc_offset_minutes = excluded.utc_offset_minutes, \
                   updated_at = datetime('now')",
                params![
                    campaign.id.to_string(),
                    campaign.name.clone(),
                    campaign.strategy_key.clone(),
                    i64::from(campaign.active),
                    i64::from(campaign.daily_limit),
                    campaign.emails_sent as i64,
                    i64::from(campaign.utc_offset_minutes),
                ],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn campaign_sends_since(
        &self,
        campaign_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM emails \
                 WHERE campaign_id = ?1 AND direction = 'outbound' AND sent_at >= ?2",
                params![campaign_id.to_string(), since.to_rfc3339()],
            )
            .await
            .map_err(map_err)?;
        match rows.next().await.map_err(map_err)? {
            Some(row) => {
                let count: i64 = row.get(0).map_err(map_err)?;
                Ok(clamp_u32(count))
            }
            None => Ok(0),
        }
    }

    async fn list_mailboxes(&self) -> Result<Vec<Mailbox>, StoreError> {
        let sql = format!("SELECT {MAILBOX_COLUMNS} FROM mailboxes ORDER BY id ASC");
        let mut rows = self.conn.query(&sql, ()).await.map_err(map_err)?;

        let mut mailboxes = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            mailboxes.push(row_to_mailbox(&row)?);
        }
        Ok(mailboxes)
    }

    async fn get_mailbox(&self, id: Uuid) -> Result<Option<Mailbox>, StoreError> {
        let sql = format!("SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(map_err)?;
        match rows.next().await.map_err(map_err)? {
            Some(row) => Ok(Some(row_to_mailbox(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_mailbox(&self, mailbox: &Mailbox) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO mailboxes (id, address, warmup_stage, sent_today, health_score, status, last_used_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(id) DO UPDATE SET \
                   address = excluded.address, warmup_stage = excluded.warmup_stage, \
                   sent_today = excluded.sent_today, health_score = excluded.health_score, \
                   status = excluded.status, last_used_at = excluded.last_used_at, \
                   updated_at = datetime('now')",
                params![
                    mailbox.id.to_string(),
                    mailbox.address.clone(),
                    i64::from(mailbox.warmup_stage),
                    i64::from(mailbox.sent_today),
                    i64::from(mailbox.health_score),
                    mailbox.status.as_str(),
                    mailbox.last_used_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn update_mailbox_health(
        &self,
        id: Uuid,
        health_score: u8,
        status: MailboxStatus,
    ) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute(
                "UPDATE mailboxes SET health_score = ?1, status = ?2, updated_at = datetime('now') \
                 WHERE id = ?3",
                params![i64::from(health_score), status.as_str(), id.to_string()],
            )
            .await
            .map_err(map_err)?;
        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "mailbox".into(),
                id,
            });
        }
        Ok(())
    }

    async fn emailed_prospect_ids(&self) -> Result<HashSet<Uuid>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT prospect_id FROM emails WHERE direction = 'outbound'",
                (),
            )
            .await
            .map_err(map_err)?;

        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            let id: String = row.get(0).map_err(map_err)?;
            ids.insert(parse_uuid(&id, "prospect")?);
        }
        Ok(ids)
    }

    async fn emails_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<EmailRecord>, StoreError> {
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE prospect_id = ?1 ORDER BY sent_at ASC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![prospect_id.to_string()])
            .await
            .map_err(map_err)?;

        let mut emails = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            emails.push(row_to_email(&row)?);
        }
        Ok(emails)
    }

    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StoreError> {
        self.conn
            .execute(INSERT_EMAIL_SQL, email_params(record))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn record_sent(
        &self,
        record: &EmailRecord,
        activity: &Activity,
        mailbox_daily_limit: u32,
    ) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to begin transaction: {e}")))?;

        tx.execute(INSERT_EMAIL_SQL, email_params(record))
            .await
            .map_err(map_err)?;

        // Conditional increment: the quota invariant holds even if a
        // concurrent invocation raced us between snapshot and write.
        let affected = tx
            .execute(
                "UPDATE mailboxes SET sent_today = sent_today + 1, last_used_at = ?1, \
                   updated_at = datetime('now') \
                 WHERE id = ?2 AND sent_today < ?3",
                params![
                    record.sent_at.to_rfc3339(),
                    record.mailbox_id.to_string(),
                    i64::from(mailbox_daily_limit),
                ],
            )
            .await
            .map_err(map_err)?;
        if affected == 0 {
            tx.rollback()
                .await
                .map_err(|e| StoreError::Query(format!("Rollback failed: {e}")))?;
            return Err(StoreError::Constraint(format!(
                "mailbox {} already at daily limit {mailbox_daily_limit}",
                record.mailbox_id
            )));
        }

        tx.execute(
            "UPDATE prospects SET stage = 'outreach', contacted_at = ?1, \
               updated_at = datetime('now') \
             WHERE id = ?2",
            params![record.sent_at.to_rfc3339(), record.prospect_id.to_string()],
        )
        .await
        .map_err(map_err)?;

        tx.execute(
            "UPDATE campaigns SET emails_sent = emails_sent + 1, updated_at = datetime('now') \
             WHERE id = ?1",
            params![record.campaign_id.to_string()],
        )
        .await
        .map_err(map_err)?;

        tx.execute(
            "INSERT INTO activities (id, prospect_id, kind, detail, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                activity.id.to_string(),
                activity.prospect_id.to_string(),
                activity.kind.clone(),
                activity.detail.clone(),
                activity.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(map_err)?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("Commit failed: {e}")))?;
        Ok(())
    }

    async fn activities_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<Activity>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, prospect_id, kind, detail, created_at FROM activities \
                 WHERE prospect_id = ?1 ORDER BY created_at ASC",
                params![prospect_id.to_string()],
            )
            .await
            .map_err(map_err)?;

        let mut activities = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            let id: String = row.get(0).map_err(map_err)?;
            let pid: String = row.get(1).map_err(map_err)?;
            let kind: String = row.get(2).map_err(map_err)?;
            let detail: String = row.get(3).map_err(map_err)?;
            let created_at: String = row.get(4).map_err(map_err)?;
            activities.push(Activity {
                id: parse_uuid(&id, "activity")?,
                prospect_id: parse_uuid(&pid, "prospect")?,
                kind,
                detail,
                created_at: parse_datetime(&created_at),
            });
        }
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_datetime_rfc3339() {
        let dt = parse_datetime("2025-06-15T12:30:00+00:00");
        assert_eq!(dt.to_rfc3339(), "2025-06-15T12:30:00+00:00");
    }

    #[test]
    fn parse_datetime_sqlite_format() {
        let dt = parse_datetime("2025-06-15 12:30:00");
        assert_eq!(dt.timestamp(), 1_749_990_600);
    }

    #[test]
    fn parse_datetime_garbage_degrades_to_min() {
        assert_eq!(parse_datetime("not a date"), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn clamps_protect_narrow_fields() {
        assert_eq!(clamp_u8(-5), 0);
        assert_eq!(clamp_u8(300), 255);
        assert_eq!(clamp_u32(-1), 0);
    }
}
