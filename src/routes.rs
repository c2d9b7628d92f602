// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, health, swaps, users},
    state::AppState,
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Assembles the main application router.
///
/// * Nests the sub-routers under `/api` (auth, users, swaps, admin, health).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store + config).
///
/// Authentication is done per handler by the `AuthUser`, `AdminUser` and
/// `MaybeUser` extractors.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/profile", put(auth::update_profile))
        .route("/password", put(auth::change_password));

    let user_routes = Router::new()
        .route("/", get(users::explore))
        .route("/skills/popular", get(users::popular_skills))
        .route("/{id}", get(users::get_user).delete(users::delete_user))
        .route("/{id}/feedback", post(users::add_feedback));

    let swap_routes = Router::new()
        .route("/", get(swaps::list_swaps).post(swaps::create_swap))
        .route("/{id}", get(swaps::get_swap).delete(swaps::cancel_swap))
        .route("/{id}/accept", put(swaps::accept_swap))
        .route("/{id}/reject", put(swaps::reject_swap))
        .route("/{id}/cancel", put(swaps::cancel_swap))
        .route("/{id}/complete", put(swaps::complete_swap))
        .route("/{id}/feedback-given", put(swaps::mark_feedback_given));

    let admin_routes = Router::new()
        .route("/stats", get(admin::stats))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/ban", put(admin::toggle_ban))
        .route("/users/{id}/unban", put(admin::unban_user))
        .route("/swaps", get(admin::list_swaps))
        .route("/swaps/{id}/reject", put(admin::force_reject_swap))
        .route("/logs", get(admin::audit_logs));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/swaps", swap_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (outermost first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
