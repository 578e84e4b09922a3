//! # Audit Repository
//!
//! Append-only log of destructive prescription writes.
//!
//! Every entry is written twice: as a row in `audit_log` (same transaction as
//! the write it describes) and as a `tracing` event under the `audit` target.
//! A rolled-back transaction therefore leaves no audit row behind, while the
//! log line still shows the attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use crate::error::DbResult;
use apotek_core::Id;

/// What happened to the audited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Modify,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Modify => "modify",
            AuditAction::Delete => "delete",
        }
    }
}

/// A stored audit entry.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: String,
    pub action: String,
    pub entity: String,
    pub actor_user_id: Id,
    pub entity_id: Id,
    /// JSON document (`{"previous": ...}`, `{"row": ...}`, ...).
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Parses the stored payload.
    pub fn payload_json(&self) -> DbResult<serde_json::Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Repository for the audit log.
pub struct AuditRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AuditRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        AuditRepository { conn }
    }

    /// Appends one entry.
    ///
    /// ## Arguments
    /// * `entity` - Table name of the audited row (`prescription`, `eticket`, ...)
    /// * `entity_id` - Id of the audited row, or of its owning prescription
    /// * `payload` - Serialized into the `payload` column as JSON
    pub async fn record<T: Serialize>(
        &mut self,
        action: AuditAction,
        entity: &str,
        entity_id: Id,
        actor_user_id: Id,
        payload: &T,
    ) -> DbResult<()> {
        let payload = serde_json::to_string(payload)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        info!(
            target: "audit",
            action = action.as_str(),
            entity,
            entity_id,
            actor = actor_user_id,
            %payload,
            "audit"
        );

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, action, entity, actor_user_id, entity_id, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&id)
        .bind(action.as_str())
        .bind(entity)
        .bind(actor_user_id)
        .bind(entity_id)
        .bind(&payload)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Entries for one entity, oldest first.
    pub async fn entries_for(&mut self, entity: &str, entity_id: Id) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, action, entity, actor_user_id, entity_id, payload, created_at
            FROM audit_log
            WHERE entity = ?1 AND entity_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(entity)
        .bind(entity_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use serde_json::json;

    #[tokio::test]
    async fn test_record_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let mut audit = AuditRepository::new(&mut conn);
        audit
            .record(AuditAction::Delete, "prescription", 9, 1, &json!({ "row": { "number": 7 } }))
            .await
            .unwrap();
        audit
            .record(AuditAction::Modify, "prescription", 9, 2, &json!({ "previous": {} }))
            .await
            .unwrap();

        let entries = audit.entries_for("prescription", 9).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "delete");
        assert_eq!(entries[0].actor_user_id, 1);
        assert_eq!(entries[0].payload_json().unwrap()["row"]["number"], 7);
        assert_eq!(entries[1].action, "modify");

        assert!(audit.entries_for("eticket", 9).await.unwrap().is_empty());
    }
}
