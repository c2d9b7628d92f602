// src/utils/guard.rs

//! Authorization gate.
//!
//! Identity is resolved by extractors (`AuthUser`, `AdminUser`, `MaybeUser`);
//! per-resource rules are plain predicates the handlers call once the record
//! is loaded.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use crate::{
    error::AppError,
    models::{audit::ClientMeta, swap::SwapRequest, user::User},
    state::AppState,
    store::UserStore,
    utils::jwt::{bearer_token, verify_jwt},
};

/// Authenticated, non-banned caller. Rejects with 401 or 403.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

/// Caller if a valid token for a non-banned user was sent, anonymous otherwise.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<User, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| AppError::AuthError("No token provided".to_string()))?;

    let claims = verify_jwt(token, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;

    if user.is_banned {
        tracing::warn!("Rejected request from banned user {}", user.id);
        return Err(AppError::Forbidden("Account has been banned".to_string()));
    }

    Ok(user)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state).await.map(AuthUser)
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = authenticate(&parts.headers, state).await?;
        require_admin(&user)?;
        Ok(AdminUser(user))
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(authenticate(&parts.headers, state).await.ok()))
    }
}

pub fn require_admin(user: &User) -> Result<(), AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(())
}

pub fn require_owner_or_admin(user: &User, owner_id: i64) -> Result<(), AppError> {
    if user.id != owner_id && !user.is_admin() {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    Ok(())
}

/// Sender, recipient or admin.
pub fn require_party_or_admin(user: &User, swap: &SwapRequest) -> Result<(), AppError> {
    if !swap.involves(user.id) && !user.is_admin() {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_str(&parts.headers, "x-forwarded-for")
            .and_then(|list| list.split(',').next())
            .map(|ip| ip.trim().to_string());

        let ip_address = forwarded
            .or_else(|| header_str(&parts.headers, "x-real-ip").map(str::to_string))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        let user_agent = header_str(&parts.headers, header::USER_AGENT.as_str()).map(str::to_string);

        Ok(ClientMeta {
            ip_address,
            user_agent,
        })
    }
}
