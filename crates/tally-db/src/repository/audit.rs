//! # Audit Log Repository
//!
//! Explicit audit trail for mutations.
//!
//! No trait magic or model hooks: every repository that mutates state
//! inserts its audit row itself, inside
//! the same transaction as the mutation, so the trail can never disagree
//! with committed state.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use crate::repository::new_id;
use tally_core::RequestContext;

/// A recorded audit event.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor_id: String,
    pub detail: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
}

/// Inserts an audit row on an existing transaction/connection.
///
/// Called by the other repositories from inside their transactions.
pub(crate) async fn record_tx(
    conn: &mut SqliteConnection,
    ctx: &RequestContext,
    entity_type: &str,
    entity_id: &str,
    action: &str,
    detail: Option<serde_json::Value>,
) -> DbResult<()> {
    let detail = detail.map(|v| v.to_string());
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_type, entity_id, action, actor_id, detail, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(new_id())
    .bind(entity_type)
    .bind(entity_id)
    .bind(action)
    .bind(&ctx.actor_id)
    .bind(detail)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

/// Repository for reading the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Lists audit entries for one entity, newest first.
    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: u32,
    ) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, entity_type, entity_id, action, actor_id, detail, created_at
            FROM audit_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at DESC
            LIMIT ?3
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Counts entries for an entity (diagnostics and tests).
    pub async fn count_for_entity(&self, entity_type: &str, entity_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
