// src/store/mod.rs

//! Persistence seams. Handlers only see these traits; `postgres` and `memory`
//! provide the implementations.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::AppError,
    models::{
        PageWindow,
        audit::{AuditEntry, NewAuditEntry},
        feedback::{Feedback, RatingSummary},
        swap::{NewSwap, SwapFilter, SwapRequest},
        user::{NewUser, ProfileUpdate, SkillCount, User, UserFilter, UserSummary},
    },
    services::{moderation::BanChange, swap_lifecycle::StatusChange},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Most common skills on each side of the marketplace.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopularSkills {
    pub offered: Vec<SkillCount>,
    pub wanted: Vec<SkillCount>,
}

/// Dashboard counters for admins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_users: i64,
    pub new_users_this_week: i64,
    pub banned_users: i64,
    pub total_swaps: i64,
    pub pending_swaps: i64,
    pub active_swaps: i64,
    pub completed_swaps: i64,
    pub completed_swaps_this_week: i64,
    /// Mean of `average_rating` over users that have at least one rating.
    pub average_rating: f64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn update_profile(&self, id: i64, update: ProfileUpdate)
    -> Result<Option<User>, AppError>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), AppError>;

    async fn touch_last_active(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Writes `change.is_banned` only while the flag still equals
    /// `change.expected`. Never changes an admin account. `None` when the user
    /// is absent, is an admin, or the flag moved underneath.
    async fn set_banned(&self, change: &BanChange) -> Result<Option<User>, AppError>;

    /// Deletes a non-admin user together with every swap request it is a party
    /// to and the feedback it received. Returns false when nothing was deleted.
    async fn delete_user(&self, id: i64) -> Result<bool, AppError>;

    /// Public, non-banned users matching `filter`, plus the total match count.
    async fn explore_users(
        &self,
        filter: &UserFilter,
        window: PageWindow,
    ) -> Result<(Vec<User>, i64), AppError>;

    /// Every account, newest first.
    async fn list_users(&self) -> Result<Vec<User>, AppError>;

    async fn popular_skills(&self, limit: i64) -> Result<PopularSkills, AppError>;

    async fn user_summaries(&self, ids: &[i64]) -> Result<Vec<UserSummary>, AppError>;

    /// Feedback received by `target_id`, newest first.
    async fn list_feedback(&self, target_id: i64) -> Result<Vec<Feedback>, AppError>;

    /// Upserts `entry` (one per rater) and recomputes the target's rating in the
    /// same atomic step. `None` when the target does not exist.
    async fn add_feedback(
        &self,
        target_id: i64,
        entry: Feedback,
    ) -> Result<Option<RatingSummary>, AppError>;
}

#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Fails with `Conflict` when a pending request already exists for the
    /// same (from, to) pair.
    async fn create_swap(&self, new_swap: NewSwap) -> Result<SwapRequest, AppError>;

    async fn find_swap(&self, id: i64) -> Result<Option<SwapRequest>, AppError>;

    /// Compare-and-set on status. `None` when the stored status no longer
    /// equals `change.expected` (or the record is gone).
    async fn apply_status_change(
        &self,
        change: &StatusChange,
    ) -> Result<Option<SwapRequest>, AppError>;

    /// Sets `feedback_given` while the request is accepted or completed.
    async fn mark_feedback_given(&self, id: i64) -> Result<Option<SwapRequest>, AppError>;

    /// Requests involving `user_id`, newest first, plus the total match count.
    async fn list_swaps_for(
        &self,
        user_id: i64,
        filter: SwapFilter,
        window: PageWindow,
    ) -> Result<(Vec<SwapRequest>, i64), AppError>;

    /// Every request, newest first.
    async fn list_all_swaps(&self) -> Result<Vec<SwapRequest>, AppError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, AppError>;

    /// Newest first.
    async fn list_audit(
        &self,
        target_user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AppError>;
}

/// Everything the HTTP layer needs from persistence.
#[async_trait]
pub trait Store: UserStore + SwapStore + AuditStore {
    /// Counters for the admin dashboard; "this week" means since `since`.
    async fn stats(&self, since: DateTime<Utc>) -> Result<PlatformStats, AppError>;
}
