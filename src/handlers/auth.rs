// src/handlers/auth.rs

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use crate::{
    config::Config,
    error::AppError,
    models::user::{
        ChangePasswordRequest, LoginRequest, NewUser, ProfileUpdate, RegisterRequest, Role,
        UpdateProfileRequest, dedup_availability, normalize_email, normalize_skills,
    },
    store::{Store, UserStore},
    utils::{
        extract::ValidatedJson,
        guard::AuthUser,
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with a token and the user object (excluding password).
#[tracing::instrument(skip(store, config, payload))]
pub async fn register(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password_hash = hash_password(&payload.password)?;

    let user = store
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email: normalize_email(&payload.email),
            password_hash,
            location: payload
                .location
                .map(|location| location.trim().to_string())
                .filter(|location| !location.is_empty()),
            skills_offered: normalize_skills(payload.skills_offered),
            skills_wanted: normalize_skills(payload.skills_wanted),
            availability: dedup_availability(payload.availability),
            is_public: payload.is_public.unwrap_or(true),
            role: Role::User,
        })
        .await?;

    let token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;
    tracing::info!("User {} registered", user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "user": user,
        })),
    ))
}

/// Authenticates a user and returns a JWT token.
///
/// Unknown email and wrong password are indistinguishable to the caller.
/// Banned accounts are refused with 403.
#[tracing::instrument(skip(store, config, payload))]
pub async fn login(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = || AppError::AuthError("Invalid credentials".to_string());

    let mut user = store
        .find_user_by_email(&normalize_email(&payload.email))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(invalid());
    }

    if user.is_banned {
        tracing::warn!("Banned user {} attempted to log in", user.id);
        return Err(AppError::Forbidden("Account has been banned".to_string()));
    }

    let now = Utc::now();
    store.touch_last_active(user.id, now).await?;
    user.last_active = now;

    let token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "user": user,
    })))
}

/// Returns the caller's own full profile.
pub async fn me(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(json!({ "user": user }))
}

pub async fn update_profile(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    ValidatedJson(payload): ValidatedJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let update = ProfileUpdate::from(payload);
    if update.is_empty() {
        return Ok(Json(json!({ "user": user })));
    }

    let updated = store
        .update_profile(user.id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({ "user": updated })))
}

pub async fn change_password(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    ValidatedJson(payload): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(AppError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.new_password)?;
    store.update_password(user.id, &password_hash).await?;
    tracing::info!("User {} changed password", user.id);

    Ok(Json(json!({ "message": "Password updated successfully" })))
}
