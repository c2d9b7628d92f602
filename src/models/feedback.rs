use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// One rating left by `rater_id` on another user. At most one per rater per target.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub rater_id: i64,
    pub rating: i32,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Derived reputation of a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub rating_count: i32,
}

impl RatingSummary {
    pub const EMPTY: RatingSummary = RatingSummary {
        average_rating: 0.0,
        rating_count: 0,
    };
}

/// DTO for rating another user.
#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(max = 500, message = "Message cannot exceed 500 characters"))]
    pub message: Option<String>,
}
