use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Moderation action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
pub enum AuditAction {
    Ban,
    Unban,
    UserDeletion,
    SwapRejection,
}

/// Represents the 'audit_logs' table. Entries outlive the users they mention.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub action: AuditAction,
    pub admin_id: i64,
    pub target_user_id: Option<i64>,
    pub target_swap_id: Option<i64>,
    pub reason: Option<String>,
    /// Whether the moderated operation went through.
    pub succeeded: bool,
    /// Failure message when `succeeded` is false.
    pub detail: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub admin_id: i64,
    pub target_user_id: Option<i64>,
    pub target_swap_id: Option<i64>,
    pub reason: Option<String>,
    pub succeeded: bool,
    pub detail: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Network and client information of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Query parameters for reading the audit log.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogParams {
    pub target_user_id: Option<i64>,
    pub limit: Option<i64>,
}
