// src/models/user.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use url::Url;
use validator::Validate;

use crate::{config::MAX_SKILL_LENGTH, models::feedback::Feedback};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,})+$").expect("email pattern compiles")
});

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// When a user is generally available for a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Weekdays,
    Weekends,
    Evenings,
    Mornings,
    Flexible,
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,

    pub name: String,

    /// Stored lowercased; unique.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password_hash: String,

    pub location: Option<String>,

    pub profile_photo: Option<String>,

    pub skills_offered: Json<Vec<String>>,

    pub skills_wanted: Json<Vec<String>>,

    pub availability: Json<Vec<Availability>>,

    /// Discoverable in explore and targetable by swap requests.
    pub is_public: bool,

    pub is_banned: bool,

    pub role: Role,

    pub average_rating: f64,

    pub rating_count: i32,

    pub last_active: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            profile_photo: self.profile_photo.clone(),
        }
    }
}

/// Minimal user reference attached to swap requests.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub profile_photo: Option<String>,
}

/// Public view of a profile: no email, role or moderation flags.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub profile_photo: Option<String>,
    pub skills_offered: Vec<String>,
    pub skills_wanted: Vec<String>,
    pub availability: Vec<Availability>,
    pub average_rating: f64,
    pub rating_count: i32,
    pub last_active: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedbacks: Option<Vec<Feedback>>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            location: user.location,
            profile_photo: user.profile_photo,
            skills_offered: user.skills_offered.0,
            skills_wanted: user.skills_wanted.0,
            availability: user.availability.0,
            average_rating: user.average_rating,
            rating_count: user.rating_count,
            last_active: user.last_active,
            feedbacks: None,
        }
    }
}

/// Skill popularity row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SkillCount {
    pub skill: String,
    pub count: i64,
}

/// Insert command for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub location: Option<String>,
    pub skills_offered: Vec<String>,
    pub skills_wanted: Vec<String>,
    pub availability: Vec<Availability>,
    pub is_public: bool,
    pub role: Role,
}

/// Partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub profile_photo: Option<String>,
    pub skills_offered: Option<Vec<String>>,
    pub skills_wanted: Option<Vec<String>>,
    pub availability: Option<Vec<Availability>>,
    pub is_public: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.location.is_none()
            && self.profile_photo.is_none()
            && self.skills_offered.is_none()
            && self.skills_wanted.is_none()
            && self.availability.is_none()
            && self.is_public.is_none()
    }
}

/// Explore filter over public, non-banned users.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Matches name, location and either skill list.
    pub search: Option<String>,
    /// Matches either skill list.
    pub skill: Option<String>,
    pub location: Option<String>,
    /// Hides the caller's own profile.
    pub exclude_user: Option<i64>,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(
        min = 2,
        max = 50,
        message = "Name must be between 2 and 50 characters."
    ))]
    pub name: String,
    #[validate(custom(function = validate_email_format))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password must be between 6 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(max = 100, message = "Location cannot exceed 100 characters."))]
    pub location: Option<String>,
    #[validate(custom(function = validate_skills))]
    #[serde(default)]
    pub skills_offered: Vec<String>,
    #[validate(custom(function = validate_skills))]
    #[serde(default)]
    pub skills_wanted: Vec<String>,
    #[serde(default)]
    pub availability: Vec<Availability>,
    pub is_public: Option<bool>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for updating the caller's own profile.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(
        min = 2,
        max = 50,
        message = "Name must be between 2 and 50 characters."
    ))]
    pub name: Option<String>,
    #[validate(length(max = 100, message = "Location cannot exceed 100 characters."))]
    pub location: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub profile_photo: Option<String>,
    #[validate(custom(function = validate_skills))]
    pub skills_offered: Option<Vec<String>>,
    #[validate(custom(function = validate_skills))]
    pub skills_wanted: Option<Vec<String>>,
    pub availability: Option<Vec<Availability>>,
    pub is_public: Option<bool>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            name: req.name.map(|name| name.trim().to_string()),
            location: req.location.map(|location| location.trim().to_string()),
            profile_photo: req.profile_photo,
            skills_offered: req.skills_offered.map(normalize_skills),
            skills_wanted: req.skills_wanted.map(normalize_skills),
            availability: req.availability.map(dedup_availability),
            is_public: req.is_public,
        }
    }
}

/// DTO for changing the caller's password.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 128))]
    pub current_password: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "New password must be between 6 and 128 characters."
    ))]
    pub new_password: String,
}

/// Query parameters for the explore listing.
#[derive(Debug, Deserialize)]
pub struct ExploreParams {
    pub search: Option<String>,
    pub skill: Option<String>,
    pub location: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PopularSkillsParams {
    pub limit: Option<i64>,
}

/// Trims skill names and drops empty and case-insensitive duplicate entries, keeping order.
pub fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(skills.len());
    let mut out = Vec::with_capacity(skills.len());
    for skill in skills {
        let trimmed = skill.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(trimmed.to_string());
    }
    out
}

pub fn dedup_availability(slots: Vec<Availability>) -> Vec<Availability> {
    let mut out = Vec::with_capacity(slots.len());
    for slot in slots {
        if !out.contains(&slot) {
            out.push(slot);
        }
    }
    out
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email_format(email: &str) -> Result<(), validator::ValidationError> {
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(validator::ValidationError::new("invalid_email")
            .with_message("Please provide a valid email".into()));
    }
    Ok(())
}

fn validate_skills(skills: &[String]) -> Result<(), validator::ValidationError> {
    for skill in skills {
        let len = skill.trim().chars().count() as u64;
        if len == 0 || len > MAX_SKILL_LENGTH {
            return Err(validator::ValidationError::new("invalid_skill")
                .with_message("Skill name must be between 1 and 50 characters".into()));
        }
    }
    Ok(())
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_skills_trims_and_dedups() {
        let skills = vec![
            " Guitar ".to_string(),
            "guitar".to_string(),
            "".to_string(),
            "Spanish".to_string(),
        ];
        assert_eq!(normalize_skills(skills), vec!["Guitar", "Spanish"]);
    }

    #[test]
    fn register_request_rejects_long_skill() {
        let req = RegisterRequest {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "secret123".to_string(),
            location: None,
            skills_offered: vec!["x".repeat(51)],
            skills_wanted: vec![],
            availability: vec![],
            is_public: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn register_request_rejects_bad_email() {
        let req = RegisterRequest {
            name: "Alice".to_string(),
            email: "not-an-email".to_string(),
            password: "secret123".to_string(),
            location: None,
            skills_offered: vec![],
            skills_wanted: vec![],
            availability: vec![],
            is_public: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn availability_uses_capitalized_names() {
        let parsed: Vec<Availability> = serde_json::from_str(r#"["Weekends","Evenings"]"#).unwrap();
        assert_eq!(parsed, vec![Availability::Weekends, Availability::Evenings]);
        assert!(serde_json::from_str::<Vec<Availability>>(r#"["Sometimes"]"#).is_err());
    }
}
