// src/handlers/swaps.rs

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        PageInfo, PageWindow,
        swap::{CreateSwapRequest, SwapFilter, SwapListParams, SwapRequest, SwapView},
    },
    services::swap_lifecycle::{
        Caller, SwapAction, available_actions, plan_create, plan_feedback_given, plan_transition,
    },
    store::{Store, SwapStore, UserStore},
    utils::{
        extract::{QueryParams, ValidatedJson},
        guard::{AuthUser, require_party_or_admin},
    },
};

/// Attaches `{id, name, profilePhoto}` of both parties to each request.
pub async fn swap_views(
    store: &dyn Store,
    swaps: Vec<SwapRequest>,
) -> Result<Vec<SwapView>, AppError> {
    let mut ids: Vec<i64> = swaps.iter().flat_map(|s| [s.from_id, s.to_id]).collect();
    ids.sort_unstable();
    ids.dedup();

    let parties: HashMap<_, _> = store
        .user_summaries(&ids)
        .await?
        .into_iter()
        .map(|summary| (summary.id, summary))
        .collect();

    Ok(swaps
        .into_iter()
        .map(|swap| SwapView::new(swap, &parties))
        .collect())
}

async fn swap_view(store: &dyn Store, swap: SwapRequest) -> Result<SwapView, AppError> {
    swap_views(store, vec![swap])
        .await?
        .pop()
        .ok_or_else(|| AppError::InternalServerError("swap view lost".to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapDetail {
    #[serde(flatten)]
    swap: SwapView,
    available_actions: Vec<SwapAction>,
}

async fn load_swap(store: &dyn Store, id: i64) -> Result<SwapRequest, AppError> {
    store
        .find_swap(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Swap request not found".to_string()))
}

/// Loads the request, plans `action` for the caller and applies it as a
/// conditional update.
async fn transition(
    store: &dyn Store,
    caller: Caller,
    id: i64,
    action: SwapAction,
) -> Result<SwapView, AppError> {
    let swap = load_swap(store, id).await?;
    let change = plan_transition(&swap, action, caller, Utc::now())?;

    let updated = store
        .apply_status_change(&change)
        .await?
        .ok_or_else(|| change.stale())?;

    tracing::info!(
        "Swap {} moved {} -> {} by user {}",
        updated.id,
        change.expected,
        change.next,
        caller.id
    );
    swap_view(store, updated).await
}

/// Sends a swap request. The target must exist, be public and not banned,
/// and no other request from the caller to the target may be pending.
#[tracing::instrument(skip(store, user, payload), fields(user_id = user.id))]
pub async fn create_swap(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateSwapRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = if payload.to_user_id == user.id {
        None
    } else {
        store.find_user(payload.to_user_id).await?
    };

    let new_swap = plan_create(&user, target.as_ref(), &payload)?;
    let swap = store.create_swap(new_swap).await?;
    tracing::info!("Swap {} created: {} -> {}", swap.id, swap.from_id, swap.to_id);

    let view = swap_view(store.as_ref(), swap).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Lists the caller's requests. `type` picks sent, received or all.
pub async fn list_swaps(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    QueryParams(params): QueryParams<SwapListParams>,
) -> Result<impl IntoResponse, AppError> {
    let window = PageWindow::new(params.page, params.limit);
    let filter = SwapFilter {
        direction: params.r#type,
        status: params.status,
    };

    let (swaps, total) = store.list_swaps_for(user.id, filter, window).await?;
    let swaps = swap_views(store.as_ref(), swaps).await?;

    Ok(Json(json!({
        "swaps": swaps,
        "pagination": PageInfo::new(window, total),
    })))
}

/// One request with the actions the caller may take on it next.
pub async fn get_swap(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let swap = load_swap(store.as_ref(), id).await?;
    require_party_or_admin(&user, &swap)?;

    let available_actions = available_actions(&swap, Caller::from(&user));
    let swap = swap_view(store.as_ref(), swap).await?;
    Ok(Json(SwapDetail {
        swap,
        available_actions,
    }))
}

pub async fn accept_swap(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = transition(store.as_ref(), Caller::from(&user), id, SwapAction::Accept).await?;
    Ok(Json(view))
}

pub async fn reject_swap(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = transition(store.as_ref(), Caller::from(&user), id, SwapAction::Reject).await?;
    Ok(Json(view))
}

/// Cancels a pending request. Served on both `PUT /{id}/cancel` and `DELETE /{id}`;
/// the record is kept with status `cancelled`.
pub async fn cancel_swap(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = transition(store.as_ref(), Caller::from(&user), id, SwapAction::Cancel).await?;
    Ok(Json(view))
}

pub async fn complete_swap(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = transition(store.as_ref(), Caller::from(&user), id, SwapAction::Complete).await?;
    Ok(Json(view))
}

/// Records that feedback was exchanged. Repeating the call changes nothing.
pub async fn mark_feedback_given(
    State(store): State<Arc<dyn Store>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let swap = load_swap(store.as_ref(), id).await?;

    let swap = if plan_feedback_given(&swap, Caller::from(&user))? {
        store.mark_feedback_given(id).await?.ok_or_else(|| {
            AppError::InvalidState("Swap must be accepted or completed to mark feedback".to_string())
        })?
    } else {
        swap
    };

    Ok(Json(swap_view(store.as_ref(), swap).await?))
}
