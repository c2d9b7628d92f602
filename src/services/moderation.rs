//! Admin moderation planning and audit recording.

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        audit::{AuditAction, ClientMeta, NewAuditEntry},
        swap::SwapRequest,
        user::User,
    },
    services::swap_lifecycle::{Caller, StatusChange, SwapAction, plan_transition},
    store::AuditStore,
};

/// How a ban request treats the current flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanMode {
    Toggle,
    Unban,
}

/// Compare-and-set on a user's ban flag: applies only while the flag still
/// equals `expected`, so two concurrent toggles cannot both land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanChange {
    pub user_id: i64,
    pub expected: bool,
    pub is_banned: bool,
    pub action: AuditAction,
}

impl BanChange {
    /// Error for a change whose precondition no longer held at write time.
    pub fn stale(&self) -> AppError {
        AppError::InvalidState("User ban status changed; reload and retry".to_string())
    }
}

pub fn plan_ban(target: Option<&User>, mode: BanMode) -> Result<BanChange, AppError> {
    let target = target.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if target.is_admin() {
        return Err(AppError::BadRequest("Cannot ban admin users".to_string()));
    }

    let is_banned = match mode {
        BanMode::Toggle => !target.is_banned,
        BanMode::Unban => false,
    };

    Ok(BanChange {
        user_id: target.id,
        expected: target.is_banned,
        is_banned,
        action: if is_banned {
            AuditAction::Ban
        } else {
            AuditAction::Unban
        },
    })
}

/// Returns the id to delete. Admin accounts are never deleted.
pub fn plan_delete(target: Option<&User>) -> Result<i64, AppError> {
    let target = target.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if target.is_admin() {
        return Err(AppError::BadRequest(
            "Cannot delete admin users".to_string(),
        ));
    }

    Ok(target.id)
}

pub fn plan_force_reject(
    swap: Option<&SwapRequest>,
    admin: Caller,
    now: DateTime<Utc>,
) -> Result<StatusChange, AppError> {
    let swap = swap.ok_or_else(|| AppError::NotFound("Swap request not found".to_string()))?;
    plan_transition(swap, SwapAction::ForceReject, admin, now)
}

/// Describes one moderation attempt. Built before the outcome is known.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub action: AuditAction,
    pub admin_id: i64,
    pub target_user_id: Option<i64>,
    pub target_swap_id: Option<i64>,
    pub reason: Option<String>,
    pub meta: ClientMeta,
}

impl Attempt {
    /// Turns the attempt into an audit record for the given outcome.
    pub fn entry<T>(&self, outcome: &Result<T, AppError>) -> NewAuditEntry {
        NewAuditEntry {
            action: self.action,
            admin_id: self.admin_id,
            target_user_id: self.target_user_id,
            target_swap_id: self.target_swap_id,
            reason: self.reason.clone(),
            succeeded: outcome.is_ok(),
            detail: outcome.as_ref().err().map(|e| e.to_string()),
            ip_address: self.meta.ip_address.clone(),
            user_agent: self.meta.user_agent.clone(),
        }
    }
}

/// Appends the audit entry for `outcome`. A failed audit write is logged and
/// never changes the outcome reported to the caller.
pub async fn record<S, T>(audits: &S, attempt: &Attempt, outcome: &Result<T, AppError>)
where
    S: AuditStore + ?Sized,
{
    let entry = attempt.entry(outcome);
    match audits.append_audit(entry).await {
        Ok(saved) => tracing::info!(
            "Audit {:?} by admin {} (succeeded: {})",
            saved.action,
            saved.admin_id,
            saved.succeeded
        ),
        Err(e) => tracing::error!("Failed to write audit entry: {:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{swap::SwapStatus, user::Role};
    use sqlx::types::Json;

    fn user(id: i64, role: Role, banned: bool) -> User {
        let now = Utc::now();
        User {
            id,
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            password_hash: String::new(),
            location: None,
            profile_photo: None,
            skills_offered: Json(vec![]),
            skills_wanted: Json(vec![]),
            availability: Json(vec![]),
            is_public: true,
            is_banned: banned,
            role,
            average_rating: 0.0,
            rating_count: 0,
            last_active: now,
            created_at: now,
        }
    }

    fn attempt() -> Attempt {
        Attempt {
            action: AuditAction::Ban,
            admin_id: 1,
            target_user_id: Some(2),
            target_swap_id: None,
            reason: Some("spam".to_string()),
            meta: ClientMeta {
                ip_address: Some("10.0.0.1".to_string()),
                user_agent: Some("curl/8".to_string()),
            },
        }
    }

    #[test]
    fn toggle_flips_and_is_reversible() {
        let bob = user(2, Role::User, false);
        let change = plan_ban(Some(&bob), BanMode::Toggle).unwrap();
        assert!(change.is_banned);
        assert!(!change.expected);
        assert_eq!(change.action, AuditAction::Ban);

        let banned = user(2, Role::User, true);
        let change = plan_ban(Some(&banned), BanMode::Toggle).unwrap();
        assert!(!change.is_banned);
        assert_eq!(change.action, AuditAction::Unban);
    }

    #[test]
    fn unban_always_clears() {
        for banned in [true, false] {
            let change = plan_ban(Some(&user(2, Role::User, banned)), BanMode::Unban).unwrap();
            assert!(!change.is_banned);
        }
    }

    #[test]
    fn admins_cannot_be_banned_or_deleted() {
        let admin = user(1, Role::Admin, false);
        assert!(matches!(
            plan_ban(Some(&admin), BanMode::Toggle),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(plan_delete(Some(&admin)), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn missing_targets_are_not_found() {
        assert!(matches!(plan_ban(None, BanMode::Toggle), Err(AppError::NotFound(_))));
        assert!(matches!(plan_delete(None), Err(AppError::NotFound(_))));
        let admin = Caller { id: 1, role: Role::Admin };
        assert!(matches!(
            plan_force_reject(None, admin, Utc::now()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn force_reject_only_from_pending() {
        let now = Utc::now();
        let mut swap = SwapRequest {
            id: 5,
            from_id: 2,
            to_id: 3,
            offered_skill: "Guitar".to_string(),
            requested_skill: "Spanish".to_string(),
            message: String::new(),
            status: SwapStatus::Completed,
            feedback_given: false,
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        let admin = Caller { id: 1, role: Role::Admin };
        assert!(matches!(
            plan_force_reject(Some(&swap), admin, now),
            Err(AppError::InvalidState(_))
        ));

        swap.status = SwapStatus::Pending;
        let change = plan_force_reject(Some(&swap), admin, now).unwrap();
        assert_eq!(change.next, SwapStatus::Rejected);
    }

    #[test]
    fn audit_entry_records_outcome_and_client() {
        let ok: Result<(), AppError> = Ok(());
        let entry = attempt().entry(&ok);
        assert!(entry.succeeded);
        assert_eq!(entry.detail, None);
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));

        let failed: Result<(), AppError> = Err(AppError::BadRequest("Cannot ban admin users".to_string()));
        let entry = attempt().entry(&failed);
        assert!(!entry.succeeded);
        assert_eq!(entry.detail.as_deref(), Some("Cannot ban admin users"));
        assert_eq!(entry.reason.as_deref(), Some("spam"));
    }
}
