//! Feedback aggregation.
//!
//! A user keeps at most one feedback per rater; a newer rating from the same
//! rater replaces the older one. The average is recomputed from the full set
//! and rounded to one decimal, so it does not depend on insertion order.

use chrono::{DateTime, Utc};

use crate::{
    config::MAX_MESSAGE_LENGTH,
    error::AppError,
    models::feedback::{Feedback, FeedbackRequest, RatingSummary},
    utils::html::clean_message,
};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// Builds the feedback record `rater_id` leaves on `target_id`.
pub fn plan_feedback(
    rater_id: i64,
    target_id: i64,
    req: &FeedbackRequest,
    now: DateTime<Utc>,
) -> Result<Feedback, AppError> {
    if rater_id == target_id {
        return Err(AppError::BadRequest(
            "Cannot leave feedback for yourself".to_string(),
        ));
    }

    if !(MIN_RATING..=MAX_RATING).contains(&req.rating) {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".to_string(),
        ));
    }

    let message = req
        .message
        .as_deref()
        .map(|m| clean_message(m, MAX_MESSAGE_LENGTH))
        .transpose()?
        .filter(|m| !m.is_empty());

    Ok(Feedback {
        rater_id,
        rating: req.rating,
        message,
        created_at: now,
    })
}

/// Replaces any earlier entry from the same rater, then appends `entry`.
pub fn merge_feedback(existing: &mut Vec<Feedback>, entry: Feedback) {
    existing.retain(|f| f.rater_id != entry.rater_id);
    existing.push(entry);
}

/// Average rating rounded half-up to one decimal, plus the count.
pub fn summarize(feedbacks: &[Feedback]) -> RatingSummary {
    if feedbacks.is_empty() {
        return RatingSummary::EMPTY;
    }

    let count = feedbacks.len() as i64;
    let sum: i64 = feedbacks.iter().map(|f| i64::from(f.rating)).sum();
    // Tenths, rounded half-up, in integer arithmetic.
    let tenths = (sum * 20 + count) / (2 * count);

    RatingSummary {
        average_rating: tenths as f64 / 10.0,
        rating_count: count as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fb(rater_id: i64, rating: i32) -> Feedback {
        Feedback {
            rater_id,
            rating,
            message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_set_has_zero_average() {
        assert_eq!(summarize(&[]), RatingSummary::EMPTY);
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        let summary = summarize(&[fb(1, 5), fb(2, 4), fb(3, 4)]);
        assert_eq!(summary.average_rating, 4.3);
        assert_eq!(summary.rating_count, 3);

        // 4.5 exactly stays 4.5; 4.25 rounds up to 4.3.
        assert_eq!(summarize(&[fb(1, 5), fb(2, 4)]).average_rating, 4.5);
        assert_eq!(
            summarize(&[fb(1, 5), fb(2, 4), fb(3, 4), fb(4, 4)]).average_rating,
            4.3
        );
    }

    #[test]
    fn average_is_order_independent() {
        let a = summarize(&[fb(1, 1), fb(2, 2), fb(3, 5)]);
        let b = summarize(&[fb(3, 5), fb(1, 1), fb(2, 2)]);
        assert_eq!(a, b);
        assert_eq!(a.average_rating, 2.7);
    }

    #[test]
    fn same_rater_replaces_previous_entry() {
        let mut list = vec![fb(1, 2), fb(2, 5)];
        merge_feedback(&mut list, fb(1, 4));

        assert_eq!(list.len(), 2);
        let summary = summarize(&list);
        assert_eq!(summary.rating_count, 2);
        assert_eq!(summary.average_rating, 4.5);
    }

    #[test]
    fn plan_rejects_self_feedback() {
        let req = FeedbackRequest {
            rating: 5,
            message: None,
        };
        let err = plan_feedback(1, 1, &req, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn plan_rejects_out_of_range_rating() {
        for rating in [0, 6, -1] {
            let req = FeedbackRequest {
                rating,
                message: None,
            };
            assert!(plan_feedback(1, 2, &req, Utc::now()).is_err());
        }
    }

    #[test]
    fn plan_drops_blank_message() {
        let req = FeedbackRequest {
            rating: 3,
            message: Some("   ".to_string()),
        };
        let entry = plan_feedback(1, 2, &req, Utc::now()).unwrap();
        assert_eq!(entry.message, None);
        assert_eq!(entry.rater_id, 1);
    }

    #[test]
    fn plan_rejects_message_that_grows_past_limit() {
        let req = FeedbackRequest {
            rating: 4,
            message: Some("<".repeat(500)),
        };
        assert!(matches!(
            plan_feedback(1, 2, &req, Utc::now()),
            Err(AppError::BadRequest(_))
        ));
    }
}
