// src/models/swap.rs

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::user::UserSummary;

/// Lifecycle status of a swap request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "swap_status", rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

impl SwapStatus {
    pub const ALL: [SwapStatus; 5] = [
        SwapStatus::Pending,
        SwapStatus::Accepted,
        SwapStatus::Rejected,
        SwapStatus::Cancelled,
        SwapStatus::Completed,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwapStatus::Rejected | SwapStatus::Cancelled | SwapStatus::Completed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Accepted => "accepted",
            SwapStatus::Rejected => "rejected",
            SwapStatus::Cancelled => "cancelled",
            SwapStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the 'swap_requests' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub id: i64,
    /// Sender.
    pub from_id: i64,
    /// Recipient.
    pub to_id: i64,
    pub offered_skill: String,
    pub requested_skill: String,
    pub message: String,
    pub status: SwapStatus,
    pub feedback_given: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapRequest {
    pub fn involves(&self, user_id: i64) -> bool {
        self.from_id == user_id || self.to_id == user_id
    }
}

/// Insert command produced by the lifecycle planner.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSwap {
    pub from_id: i64,
    pub to_id: i64,
    pub offered_skill: String,
    pub requested_skill: String,
    pub message: String,
}

/// A swap party on the wire: expanded when the user record is known, bare id otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PartyRef {
    Expanded(UserSummary),
    Id(i64),
}

/// Wire shape of a swap request with both parties attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapView {
    pub id: i64,
    pub from: PartyRef,
    pub to: PartyRef,
    pub offered_skill: String,
    pub requested_skill: String,
    pub message: String,
    pub status: SwapStatus,
    pub feedback_given: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapView {
    pub fn new(swap: SwapRequest, parties: &HashMap<i64, UserSummary>) -> Self {
        let party = |id: i64| {
            parties
                .get(&id)
                .cloned()
                .map(PartyRef::Expanded)
                .unwrap_or(PartyRef::Id(id))
        };
        Self {
            id: swap.id,
            from: party(swap.from_id),
            to: party(swap.to_id),
            offered_skill: swap.offered_skill,
            requested_skill: swap.requested_skill,
            message: swap.message,
            status: swap.status,
            feedback_given: swap.feedback_given,
            completed_at: swap.completed_at,
            created_at: swap.created_at,
            updated_at: swap.updated_at,
        }
    }
}

/// Which side of the caller's swaps to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapDirection {
    Sent,
    Received,
    #[default]
    All,
}

/// Storage-level swap listing filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapFilter {
    pub direction: SwapDirection,
    pub status: Option<SwapStatus>,
}

/// DTO for submitting a swap request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwapRequest {
    pub to_user_id: i64,

    #[validate(length(
        min = 1,
        max = 50,
        message = "Offered skill must be between 1 and 50 characters"
    ))]
    pub offered_skill: String,

    #[serde(alias = "wantedSkill")]
    #[validate(length(
        min = 1,
        max = 50,
        message = "Requested skill must be between 1 and 50 characters"
    ))]
    pub requested_skill: String,

    #[validate(length(max = 500, message = "Message cannot exceed 500 characters"))]
    pub message: Option<String>,
}

/// Query parameters for listing the caller's swaps.
#[derive(Debug, Deserialize)]
pub struct SwapListParams {
    #[serde(default)]
    pub r#type: SwapDirection,
    pub status: Option<SwapStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Optional body carried by moderation endpoints.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ModerationReason {
    #[validate(length(max = 1000, message = "Reason cannot exceed 1000 characters"))]
    pub reason: Option<String>,
}
