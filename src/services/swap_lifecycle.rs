//! Swap request lifecycle.
//!
//! ```text
//! pending ──accept──▶ accepted ──complete──▶ completed
//!    │
//!    ├──reject / force-reject──▶ rejected
//!    └──cancel──▶ cancelled
//! ```
//!
//! Planners take an immutable snapshot of a request plus the caller and return
//! the command the store must apply. Status changes are always conditional on
//! the status the plan was made against, so a concurrent transition makes the
//! store write fail instead of silently overwriting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::MAX_MESSAGE_LENGTH,
    error::AppError,
    models::{
        swap::{CreateSwapRequest, NewSwap, SwapRequest, SwapStatus},
        user::{Role, User},
    },
    utils::html::clean_message,
};

/// Identity the lifecycle rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: i64,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapAction {
    Accept,
    Reject,
    Cancel,
    Complete,
    /// Admin override of `Reject`; ignores party identity.
    ForceReject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permitted {
    Recipient,
    Sender,
    EitherParty,
    Admin,
}

impl Permitted {
    fn allows(self, swap: &SwapRequest, caller: Caller) -> bool {
        match self {
            Permitted::Recipient => caller.id == swap.to_id,
            Permitted::Sender => caller.id == swap.from_id,
            Permitted::EitherParty => swap.involves(caller.id),
            Permitted::Admin => caller.is_admin(),
        }
    }
}

struct Rule {
    action: SwapAction,
    from: SwapStatus,
    to: SwapStatus,
    permitted: Permitted,
    denied: &'static str,
}

static RULES: [Rule; 5] = [
    Rule {
        action: SwapAction::Accept,
        from: SwapStatus::Pending,
        to: SwapStatus::Accepted,
        permitted: Permitted::Recipient,
        denied: "Only the recipient can accept the request",
    },
    Rule {
        action: SwapAction::Reject,
        from: SwapStatus::Pending,
        to: SwapStatus::Rejected,
        permitted: Permitted::Recipient,
        denied: "Only the recipient can reject the request",
    },
    Rule {
        action: SwapAction::Cancel,
        from: SwapStatus::Pending,
        to: SwapStatus::Cancelled,
        permitted: Permitted::Sender,
        denied: "Only the sender can cancel the request",
    },
    Rule {
        action: SwapAction::Complete,
        from: SwapStatus::Accepted,
        to: SwapStatus::Completed,
        permitted: Permitted::EitherParty,
        denied: "Only a party to the swap can complete it",
    },
    Rule {
        action: SwapAction::ForceReject,
        from: SwapStatus::Pending,
        to: SwapStatus::Rejected,
        permitted: Permitted::Admin,
        denied: "Admin access required",
    },
];

fn rule_for(action: SwapAction) -> &'static Rule {
    let index = match action {
        SwapAction::Accept => 0,
        SwapAction::Reject => 1,
        SwapAction::Cancel => 2,
        SwapAction::Complete => 3,
        SwapAction::ForceReject => 4,
    };
    &RULES[index]
}

impl SwapAction {
    /// Status the request must be in for the action to apply.
    pub fn requires(self) -> SwapStatus {
        rule_for(self).from
    }

    /// Status the request moves to.
    pub fn target(self) -> SwapStatus {
        rule_for(self).to
    }
}

/// Conditional status update: applies only while the stored status still equals `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub swap_id: i64,
    pub expected: SwapStatus,
    pub next: SwapStatus,
    /// Set only when entering `completed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// Error reported when the store finds the precondition no longer holds.
    pub fn stale(&self) -> AppError {
        AppError::InvalidState(format!("Request is no longer {}", self.expected))
    }
}

/// Validates `action` against the snapshot and returns the update to persist.
/// Ownership is checked before status so that outsiders learn nothing about the state.
pub fn plan_transition(
    swap: &SwapRequest,
    action: SwapAction,
    caller: Caller,
    now: DateTime<Utc>,
) -> Result<StatusChange, AppError> {
    let rule = rule_for(action);

    if !rule.permitted.allows(swap, caller) {
        return Err(AppError::Forbidden(rule.denied.to_string()));
    }

    if swap.status != rule.from {
        return Err(AppError::InvalidState(format!("Request is not {}", rule.from)));
    }

    Ok(StatusChange {
        swap_id: swap.id,
        expected: rule.from,
        next: rule.to,
        completed_at: (rule.to == SwapStatus::Completed).then_some(now),
    })
}

/// Actions `caller` may currently take on `swap`.
pub fn available_actions(swap: &SwapRequest, caller: Caller) -> Vec<SwapAction> {
    RULES
        .iter()
        .filter(|rule| rule.from == swap.status && rule.permitted.allows(swap, caller))
        .map(|rule| rule.action)
        .collect()
}

/// Validates a new request from `sender` to `target` (`None` when the target id is unknown).
pub fn plan_create(
    sender: &User,
    target: Option<&User>,
    req: &CreateSwapRequest,
) -> Result<NewSwap, AppError> {
    if req.to_user_id == sender.id {
        return Err(AppError::BadRequest(
            "Cannot create swap request with yourself".to_string(),
        ));
    }

    let target = target.ok_or_else(|| AppError::NotFound("Target user not found".to_string()))?;

    if target.is_banned {
        return Err(AppError::BadRequest(
            "Cannot create swap request with banned user".to_string(),
        ));
    }

    if !target.is_public {
        return Err(AppError::BadRequest(
            "Cannot create swap request with a private profile".to_string(),
        ));
    }

    let offered_skill = req.offered_skill.trim();
    let requested_skill = req.requested_skill.trim();
    if offered_skill.is_empty() || requested_skill.is_empty() {
        return Err(AppError::BadRequest(
            "Offered and requested skills are required".to_string(),
        ));
    }

    let message = req
        .message
        .as_deref()
        .map(|m| clean_message(m, MAX_MESSAGE_LENGTH))
        .transpose()?
        .unwrap_or_default();

    Ok(NewSwap {
        from_id: sender.id,
        to_id: target.id,
        offered_skill: offered_skill.to_string(),
        requested_skill: requested_skill.to_string(),
        message,
    })
}

/// Checks a feedback-given mark. Returns `false` when the flag is already set
/// and nothing needs to be written.
pub fn plan_feedback_given(swap: &SwapRequest, caller: Caller) -> Result<bool, AppError> {
    if !swap.involves(caller.id) {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    if !matches!(swap.status, SwapStatus::Accepted | SwapStatus::Completed) {
        return Err(AppError::InvalidState(
            "Swap must be accepted or completed to mark feedback".to_string(),
        ));
    }

    Ok(!swap.feedback_given)
}
