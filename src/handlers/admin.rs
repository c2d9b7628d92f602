// src/handlers/admin.rs

//! Moderation endpoints. Every route requires `AdminUser`, and every
//! moderation attempt is written to the audit log whatever its outcome.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde_json::json;

use crate::{
    error::AppError,
    handlers::{swaps::swap_views, users::delete_account},
    models::{
        audit::{AuditAction, AuditLogParams, ClientMeta},
        swap::{ModerationReason, SwapRequest},
        user::User,
    },
    services::{
        moderation::{self, Attempt, BanMode, plan_ban, plan_force_reject},
        swap_lifecycle::Caller,
    },
    store::{AuditStore, Store, SwapStore, UserStore},
    utils::{
        extract::{OptionalJson, QueryParams},
        guard::AdminUser,
    },
};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;

fn clean_reason(reason: Option<String>) -> Option<String> {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

/// Platform counters. "This week" covers the last seven days.
pub async fn stats(
    State(store): State<Arc<dyn Store>>,
    AdminUser(_admin): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let since = Utc::now() - Duration::days(7);
    Ok(Json(store.stats(since).await?))
}

pub async fn list_users(
    State(store): State<Arc<dyn Store>>,
    AdminUser(_admin): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.list_users().await?))
}

pub async fn list_swaps(
    State(store): State<Arc<dyn Store>>,
    AdminUser(_admin): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let swaps = store.list_all_swaps().await?;
    Ok(Json(swap_views(store.as_ref(), swaps).await?))
}

async fn apply_ban(
    store: &dyn Store,
    target: Option<&User>,
    mode: BanMode,
) -> Result<User, AppError> {
    let change = plan_ban(target, mode)?;
    store
        .set_banned(&change)
        .await?
        .ok_or_else(|| change.stale())
}

async fn moderate_ban(
    store: &dyn Store,
    admin: &User,
    meta: ClientMeta,
    id: i64,
    reason: Option<String>,
    mode: BanMode,
) -> Result<User, AppError> {
    let target = store.find_user(id).await?;

    let action = match (mode, target.as_ref()) {
        (BanMode::Toggle, Some(user)) if !user.is_banned => AuditAction::Ban,
        (BanMode::Toggle, None) => AuditAction::Ban,
        _ => AuditAction::Unban,
    };
    let attempt = Attempt {
        action,
        admin_id: admin.id,
        target_user_id: Some(id),
        target_swap_id: None,
        reason: clean_reason(reason),
        meta,
    };

    let outcome = apply_ban(store, target.as_ref(), mode).await;
    moderation::record(store, &attempt, &outcome).await;

    let user = outcome?;
    tracing::info!(
        "Admin {} set banned={} on user {}",
        admin.id,
        user.is_banned,
        user.id
    );
    Ok(user)
}

/// Flips the ban flag of a non-admin user.
pub async fn toggle_ban(
    State(store): State<Arc<dyn Store>>,
    AdminUser(admin): AdminUser,
    meta: ClientMeta,
    Path(id): Path<i64>,
    OptionalJson(body): OptionalJson<ModerationReason>,
) -> Result<impl IntoResponse, AppError> {
    let user = moderate_ban(store.as_ref(), &admin, meta, id, body.reason, BanMode::Toggle).await?;
    let message = if user.is_banned {
        "User banned successfully"
    } else {
        "User unbanned successfully"
    };
    Ok(Json(json!({ "message": message, "user": user })))
}

pub async fn unban_user(
    State(store): State<Arc<dyn Store>>,
    AdminUser(admin): AdminUser,
    meta: ClientMeta,
    Path(id): Path<i64>,
    OptionalJson(body): OptionalJson<ModerationReason>,
) -> Result<impl IntoResponse, AppError> {
    let user = moderate_ban(store.as_ref(), &admin, meta, id, body.reason, BanMode::Unban).await?;
    Ok(Json(json!({ "message": "User unbanned successfully", "user": user })))
}

/// Deletes a non-admin user and every swap request involving them.
pub async fn delete_user(
    State(store): State<Arc<dyn Store>>,
    AdminUser(admin): AdminUser,
    meta: ClientMeta,
    Path(id): Path<i64>,
    OptionalJson(body): OptionalJson<ModerationReason>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = Attempt {
        action: AuditAction::UserDeletion,
        admin_id: admin.id,
        target_user_id: Some(id),
        target_swap_id: None,
        reason: clean_reason(body.reason),
        meta,
    };

    let outcome = delete_account(store.as_ref(), id).await;
    moderation::record(store.as_ref(), &attempt, &outcome).await;
    outcome?;

    Ok(Json(json!({ "message": "User deleted successfully" })))
}

async fn apply_force_reject(
    store: &dyn Store,
    swap: Option<&SwapRequest>,
    admin: &User,
) -> Result<SwapRequest, AppError> {
    let change = plan_force_reject(swap, Caller::from(admin), Utc::now())?;
    store
        .apply_status_change(&change)
        .await?
        .ok_or_else(|| change.stale())
}

/// Rejects a pending request regardless of who the parties are.
pub async fn force_reject_swap(
    State(store): State<Arc<dyn Store>>,
    AdminUser(admin): AdminUser,
    meta: ClientMeta,
    Path(id): Path<i64>,
    OptionalJson(body): OptionalJson<ModerationReason>,
) -> Result<impl IntoResponse, AppError> {
    let swap = store.find_swap(id).await?;

    let attempt = Attempt {
        action: AuditAction::SwapRejection,
        admin_id: admin.id,
        target_user_id: swap.as_ref().map(|s| s.from_id),
        target_swap_id: Some(id),
        reason: clean_reason(body.reason),
        meta,
    };

    let outcome = apply_force_reject(store.as_ref(), swap.as_ref(), &admin).await;
    moderation::record(store.as_ref(), &attempt, &outcome).await;
    let swap = outcome?;

    tracing::info!("Admin {} force-rejected swap {}", admin.id, swap.id);
    let view = swap_views(store.as_ref(), vec![swap]).await?;
    Ok(Json(json!({
        "message": "Swap request rejected",
        "swap": view.first(),
    })))
}

/// Audit entries, newest first, optionally for one target user.
pub async fn audit_logs(
    State(store): State<Arc<dyn Store>>,
    AdminUser(_admin): AdminUser,
    QueryParams(params): QueryParams<AuditLogParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    Ok(Json(store.list_audit(params.target_user_id, limit).await?))
}
