// src/handlers/users.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        PageInfo, PageWindow,
        audit::{AuditAction, ClientMeta},
        feedback::FeedbackRequest,
        user::{ExploreParams, PopularSkillsParams, PublicProfile, User, UserFilter},
    },
    services::{
        moderation::{self, Attempt, plan_delete},
        rating::plan_feedback,
    },
    store::{Store, UserStore},
    utils::{
        extract::{QueryParams, ValidatedJson},
        guard::{AuthUser, MaybeUser, require_owner_or_admin},
    },
};

const DEFAULT_POPULAR_LIMIT: i64 = 10;
const MAX_POPULAR_LIMIT: i64 = 50;

/// Browses public, non-banned profiles, best rated first.
/// A signed-in caller never sees their own profile in the results.
pub async fn explore(
    State(store): State<Arc<dyn Store>>,
    MaybeUser(caller): MaybeUser,
    QueryParams(params): QueryParams<ExploreParams>,
) -> Result<impl IntoResponse, AppError> {
    let window = PageWindow::new(params.page, params.limit);
    let filter = UserFilter {
        search: params.search,
        skill: params.skill,
        location: params.location,
        exclude_user: caller.map(|user| user.id),
    };

    let (users, total) = store.explore_users(&filter, window).await?;
    let users: Vec<PublicProfile> = users.into_iter().map(PublicProfile::from).collect();

    Ok(Json(json!({
        "users": users,
        "pagination": PageInfo::new(window, total),
    })))
}

pub async fn popular_skills(
    State(store): State<Arc<dyn Store>>,
    QueryParams(params): QueryParams<PopularSkillsParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_POPULAR_LIMIT)
        .clamp(1, MAX_POPULAR_LIMIT);
    Ok(Json(store.popular_skills(limit).await?))
}

fn can_view(caller: Option<&User>, profile: &User) -> bool {
    if profile.is_public && !profile.is_banned {
        return true;
    }
    caller.is_some_and(|c| c.id == profile.id || c.is_admin())
}

/// Public profile with received feedback. Private and banned profiles are
/// visible only to their owner and to admins.
pub async fn get_user(
    State(store): State<Arc<dyn Store>>,
    MaybeUser(caller): MaybeUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !can_view(caller.as_ref(), &user) {
        return Err(AppError::Forbidden("This profile is private".to_string()));
    }

    let feedbacks = store.list_feedback(user.id).await?;
    let mut profile = PublicProfile::from(user);
    profile.feedbacks = Some(feedbacks);

    Ok(Json(profile))
}

/// Rates another user. A second rating from the same caller replaces the first.
#[tracing::instrument(skip(store, user, payload), fields(rater_id = user.id))]
pub async fn add_feedback(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<FeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = plan_feedback(user.id, id, &payload, Utc::now())?;

    let summary = store
        .add_feedback(id, entry)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(
        "User {} rated; average now {} over {}",
        id,
        summary.average_rating,
        summary.rating_count
    );
    Ok(Json(summary))
}

/// Deletes an account with all swap requests it takes part in.
/// Allowed to the owner and to admins; admin accounts cannot be deleted.
pub async fn delete_user(
    State(store): State<Arc<dyn Store>>,
    AuthUser(caller): AuthUser,
    meta: ClientMeta,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_owner_or_admin(&caller, id)?;

    let outcome = delete_account(store.as_ref(), id).await;

    if caller.is_admin() && caller.id != id {
        let attempt = Attempt {
            action: AuditAction::UserDeletion,
            admin_id: caller.id,
            target_user_id: Some(id),
            target_swap_id: None,
            reason: None,
            meta,
        };
        moderation::record(store.as_ref(), &attempt, &outcome).await;
    }

    outcome?;
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

pub(crate) async fn delete_account(store: &dyn Store, id: i64) -> Result<(), AppError> {
    let target = store.find_user(id).await?;
    let id = plan_delete(target.as_ref())?;

    if !store.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    tracing::info!("User {} deleted", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;
    use sqlx::types::Json as Jsonb;

    fn user(id: i64, role: Role, public: bool) -> User {
        let now = Utc::now();
        User {
            id,
            name: "Erin".to_string(),
            email: "erin@example.com".to_string(),
            password_hash: String::new(),
            location: None,
            profile_photo: None,
            skills_offered: Jsonb(vec![]),
            skills_wanted: Jsonb(vec![]),
            availability: Jsonb(vec![]),
            is_public: public,
            is_banned: false,
            role,
            average_rating: 0.0,
            rating_count: 0,
            last_active: now,
            created_at: now,
        }
    }

    #[test]
    fn private_profiles_need_owner_or_admin() {
        let private = user(1, Role::User, false);
        assert!(!can_view(None, &private));
        assert!(!can_view(Some(&user(2, Role::User, true)), &private));
        assert!(can_view(Some(&user(1, Role::User, false)), &private));
        assert!(can_view(Some(&user(3, Role::Admin, true)), &private));
        assert!(can_view(None, &user(4, Role::User, true)));
    }
}
