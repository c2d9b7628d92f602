// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        PageWindow,
        audit::{AuditEntry, NewAuditEntry},
        feedback::{Feedback, RatingSummary},
        swap::{NewSwap, SwapDirection, SwapFilter, SwapRequest},
        user::{NewUser, ProfileUpdate, SkillCount, User, UserFilter, UserSummary},
    },
    services::{moderation::BanChange, rating, swap_lifecycle::StatusChange},
    store::{AuditStore, PlatformStats, PopularSkills, Store, SwapStore, UserStore},
};

const USER_COLUMNS: &str = "id, name, email, password_hash, location, profile_photo, \
    skills_offered, skills_wanted, availability, is_public, is_banned, role, \
    average_rating, rating_count, last_active, created_at";

const SWAP_COLUMNS: &str = "id, from_id, to_id, offered_skill, requested_skill, message, \
    status, feedback_given, completed_at, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, action, admin_id, target_user_id, target_swap_id, reason, \
    succeeded, detail, ip_address, user_agent, created_at";

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `%text%` with LIKE wildcards escaped.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_explore_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    builder.push(" WHERE is_public AND NOT is_banned");

    if let Some(id) = filter.exclude_user {
        builder.push(" AND id <> ").push_bind(id);
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        builder
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR location ILIKE ")
            .push_bind(pattern.clone())
            .push(
                " OR EXISTS (SELECT 1 FROM jsonb_array_elements_text(skills_offered || skills_wanted) \
                 AS s(skill) WHERE s.skill ILIKE ",
            )
            .push_bind(pattern)
            .push("))");
    }

    if let Some(skill) = filter.skill.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM jsonb_array_elements_text(skills_offered || skills_wanted) \
                 AS s(skill) WHERE s.skill ILIKE ",
            )
            .push_bind(like_pattern(skill))
            .push(")");
    }

    if let Some(location) = filter.location.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(" AND location ILIKE ")
            .push_bind(like_pattern(location));
    }
}

fn push_swap_filter(builder: &mut QueryBuilder<'_, Postgres>, user_id: i64, filter: SwapFilter) {
    match filter.direction {
        SwapDirection::Sent => {
            builder.push(" WHERE from_id = ").push_bind(user_id);
        }
        SwapDirection::Received => {
            builder.push(" WHERE to_id = ").push_bind(user_id);
        }
        SwapDirection::All => {
            builder
                .push(" WHERE (from_id = ")
                .push_bind(user_id)
                .push(" OR to_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users
            (name, email, password_hash, location, skills_offered, skills_wanted, availability, is_public, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.location)
            .bind(Json(&new_user.skills_offered))
            .bind(Json(&new_user.skills_wanted))
            .bind(Json(&new_user.availability))
            .bind(new_user.is_public)
            .bind(new_user.role)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("User already exists with this email".to_string())
                } else {
                    tracing::error!("Failed to create user: {:?}", e);
                    AppError::from(e)
                }
            })
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: i64,
        update: ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                location = COALESCE($3, location),
                profile_photo = COALESCE($4, profile_photo),
                skills_offered = COALESCE($5, skills_offered),
                skills_wanted = COALESCE($6, skills_wanted),
                availability = COALESCE($7, availability),
                is_public = COALESCE($8, is_public),
                last_active = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.location)
            .bind(update.profile_photo)
            .bind(update.skills_offered.map(Json))
            .bind(update.skills_wanted.map(Json))
            .bind(update.availability.map(Json))
            .bind(update.is_public)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_last_active(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_active = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_banned(&self, change: &BanChange) -> Result<Option<User>, AppError> {
        let sql = format!(
            r#"
            UPDATE users SET is_banned = $2
            WHERE id = $1 AND is_banned = $3 AND role <> 'admin'
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(change.user_id)
            .bind(change.is_banned)
            .bind(change.expected)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let swaps = sqlx::query("DELETE FROM swap_requests WHERE from_id = $1 OR to_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Received feedback goes with the row through ON DELETE CASCADE.
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1 AND role <> 'admin'")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        tracing::info!(
            "Deleted user {} and {} swap requests",
            id,
            swaps.rows_affected()
        );
        Ok(true)
    }

    async fn explore_users(
        &self,
        filter: &UserFilter,
        window: PageWindow,
    ) -> Result<(Vec<User>, i64), AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_explore_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut page_query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users", USER_COLUMNS));
        push_explore_filter(&mut page_query, filter);
        page_query
            .push(" ORDER BY average_rating DESC, last_active DESC, id DESC LIMIT ")
            .push_bind(window.limit)
            .push(" OFFSET ")
            .push_bind(window.offset);

        let users: Vec<User> = page_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn popular_skills(&self, limit: i64) -> Result<PopularSkills, AppError> {
        let mut popular = PopularSkills::default();

        for (column, out) in [
            ("skills_offered", &mut popular.offered),
            ("skills_wanted", &mut popular.wanted),
        ] {
            let sql = format!(
                r#"
                SELECT s.skill AS skill, COUNT(*) AS count
                FROM users, jsonb_array_elements_text(users.{}) AS s(skill)
                WHERE users.is_public AND NOT users.is_banned
                GROUP BY s.skill
                ORDER BY count DESC, s.skill ASC
                LIMIT $1
                "#,
                column
            );
            *out = sqlx::query_as::<_, SkillCount>(&sql)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        }

        Ok(popular)
    }

    async fn user_summaries(&self, ids: &[i64]) -> Result<Vec<UserSummary>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let summaries = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, profile_photo FROM users WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    async fn list_feedback(&self, target_id: i64) -> Result<Vec<Feedback>, AppError> {
        let feedbacks = sqlx::query_as::<_, Feedback>(
            r#"
            SELECT rater_id, rating, message, created_at
            FROM feedbacks
            WHERE target_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(feedbacks)
    }

    async fn add_feedback(
        &self,
        target_id: i64,
        entry: Feedback,
    ) -> Result<Option<RatingSummary>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent ratings of the same user.
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO feedbacks (target_id, rater_id, rating, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (target_id, rater_id)
            DO UPDATE SET rating = EXCLUDED.rating,
                          message = EXCLUDED.message,
                          created_at = EXCLUDED.created_at
            "#,
        )
        .bind(target_id)
        .bind(entry.rater_id)
        .bind(entry.rating)
        .bind(&entry.message)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        let feedbacks = sqlx::query_as::<_, Feedback>(
            "SELECT rater_id, rating, message, created_at FROM feedbacks WHERE target_id = $1",
        )
        .bind(target_id)
        .fetch_all(&mut *tx)
        .await?;

        let summary = rating::summarize(&feedbacks);

        sqlx::query("UPDATE users SET average_rating = $2, rating_count = $3 WHERE id = $1")
            .bind(target_id)
            .bind(summary.average_rating)
            .bind(summary.rating_count)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(summary))
    }
}

#[async_trait]
impl SwapStore for PgStore {
    async fn create_swap(&self, new_swap: NewSwap) -> Result<SwapRequest, AppError> {
        let sql = format!(
            r#"
            INSERT INTO swap_requests (from_id, to_id, offered_skill, requested_skill, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            SWAP_COLUMNS
        );

        sqlx::query_as::<_, SwapRequest>(&sql)
            .bind(new_swap.from_id)
            .bind(new_swap.to_id)
            .bind(&new_swap.offered_skill)
            .bind(&new_swap.requested_skill)
            .bind(&new_swap.message)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let foreign_key = e
                    .as_database_error()
                    .map(|db| db.is_foreign_key_violation())
                    .unwrap_or(false);
                if is_unique_violation(&e) {
                    AppError::Conflict(
                        "A pending swap request to this user already exists".to_string(),
                    )
                } else if foreign_key {
                    AppError::NotFound("Target user not found".to_string())
                } else {
                    tracing::error!("Failed to create swap request: {:?}", e);
                    AppError::from(e)
                }
            })
    }

    async fn find_swap(&self, id: i64) -> Result<Option<SwapRequest>, AppError> {
        let sql = format!("SELECT {} FROM swap_requests WHERE id = $1", SWAP_COLUMNS);
        let swap = sqlx::query_as::<_, SwapRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(swap)
    }

    async fn apply_status_change(
        &self,
        change: &StatusChange,
    ) -> Result<Option<SwapRequest>, AppError> {
        let sql = format!(
            r#"
            UPDATE swap_requests
            SET status = $2,
                completed_at = COALESCE($3, completed_at),
                updated_at = NOW()
            WHERE id = $1 AND status = $4
            RETURNING {}
            "#,
            SWAP_COLUMNS
        );

        let swap = sqlx::query_as::<_, SwapRequest>(&sql)
            .bind(change.swap_id)
            .bind(change.next)
            .bind(change.completed_at)
            .bind(change.expected)
            .fetch_optional(&self.pool)
            .await?;
        Ok(swap)
    }

    async fn mark_feedback_given(&self, id: i64) -> Result<Option<SwapRequest>, AppError> {
        let sql = format!(
            r#"
            UPDATE swap_requests
            SET feedback_given = TRUE, updated_at = NOW()
            WHERE id = $1 AND status IN ('accepted', 'completed')
            RETURNING {}
            "#,
            SWAP_COLUMNS
        );
        let swap = sqlx::query_as::<_, SwapRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(swap)
    }

    async fn list_swaps_for(
        &self,
        user_id: i64,
        filter: SwapFilter,
        window: PageWindow,
    ) -> Result<(Vec<SwapRequest>, i64), AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM swap_requests");
        push_swap_filter(&mut count_query, user_id, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut page_query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM swap_requests", SWAP_COLUMNS));
        push_swap_filter(&mut page_query, user_id, filter);
        page_query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(window.limit)
            .push(" OFFSET ")
            .push_bind(window.offset);

        let swaps: Vec<SwapRequest> = page_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok((swaps, total))
    }

    async fn list_all_swaps(&self) -> Result<Vec<SwapRequest>, AppError> {
        let sql = format!(
            "SELECT {} FROM swap_requests ORDER BY created_at DESC, id DESC",
            SWAP_COLUMNS
        );
        let swaps = sqlx::query_as::<_, SwapRequest>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(swaps)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, AppError> {
        let sql = format!(
            r#"
            INSERT INTO audit_logs
            (action, admin_id, target_user_id, target_swap_id, reason, succeeded, detail, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            AUDIT_COLUMNS
        );

        let saved = sqlx::query_as::<_, AuditEntry>(&sql)
            .bind(entry.action)
            .bind(entry.admin_id)
            .bind(entry.target_user_id)
            .bind(entry.target_swap_id)
            .bind(entry.reason)
            .bind(entry.succeeded)
            .bind(entry.detail)
            .bind(entry.ip_address)
            .bind(entry.user_agent)
            .fetch_one(&self.pool)
            .await?;
        Ok(saved)
    }

    async fn list_audit(
        &self,
        target_user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM audit_logs
            WHERE ($1::BIGINT IS NULL OR target_user_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
            AUDIT_COLUMNS
        );

        let entries = sqlx::query_as::<_, AuditEntry>(&sql)
            .bind(target_user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn stats(&self, since: DateTime<Utc>) -> Result<PlatformStats, AppError> {
        let (total_users, new_users_this_week, banned_users, average_rating) =
            sqlx::query_as::<_, (i64, i64, i64, f64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE created_at >= $1),
                    COUNT(*) FILTER (WHERE is_banned),
                    COALESCE(AVG(average_rating) FILTER (WHERE rating_count > 0), 0)::DOUBLE PRECISION
                FROM users
                "#,
            )
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        let (total_swaps, pending_swaps, active_swaps, completed_swaps, completed_swaps_this_week) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'pending'),
                    COUNT(*) FILTER (WHERE status = 'accepted'),
                    COUNT(*) FILTER (WHERE status = 'completed'),
                    COUNT(*) FILTER (WHERE status = 'completed' AND completed_at >= $1)
                FROM swap_requests
                "#,
            )
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(PlatformStats {
            total_users,
            new_users_this_week,
            banned_users,
            total_swaps,
            pending_swaps,
            active_swaps,
            completed_swaps,
            completed_swaps_this_week,
            average_rating: (average_rating * 10.0).round() / 10.0,
        })
    }
}
