use serde_json::Value;
use uuid::Uuid;

use crate::db::DbPool;

const INSERT_AUDIT_SQL: &str =
    "INSERT INTO audit_logs (id, user_id, action, resource, metadata) VALUES ($1, $2, $3, $4, $5)";

pub async fn log_audit(
    pool: &DbPool,
    user_id: Uuid,
    action: &str,
    resource: &str,
    metadata: Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(INSERT_AUDIT_SQL)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(action)
        .bind(resource)
        .bind(metadata)
        .execute(pool)
        .await
        .map(|_| ())
}

/// Audit without failing the caller; a lost audit row is only worth a warning.
pub async fn record(pool: &DbPool, user_id: Uuid, action: &str, resource: &str, metadata: Value) {
    if let Err(err) = log_audit(pool, user_id, action, resource, metadata).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
