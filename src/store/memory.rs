// src/store/memory.rs

//! In-process store. All writes take the single write lock, so every
//! conditional update is atomic with respect to concurrent requests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    models::{
        PageWindow,
        audit::{AuditEntry, NewAuditEntry},
        feedback::{Feedback, RatingSummary},
        swap::{NewSwap, SwapDirection, SwapFilter, SwapRequest, SwapStatus},
        user::{NewUser, ProfileUpdate, SkillCount, User, UserFilter, UserSummary},
    },
    services::{moderation::BanChange, rating, swap_lifecycle::StatusChange},
    store::{AuditStore, PlatformStats, PopularSkills, Store, SwapStore, UserStore},
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    swaps: BTreeMap<i64, SwapRequest>,
    /// Feedback received, keyed by target user.
    feedbacks: HashMap<i64, Vec<Feedback>>,
    audit: Vec<AuditEntry>,
    next_user_id: i64,
    next_swap_id: i64,
    next_audit_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn any_skill_matches(user: &User, needle_lower: &str) -> bool {
    user.skills_offered
        .iter()
        .chain(user.skills_wanted.iter())
        .any(|skill| contains_ci(skill, needle_lower))
}

fn trimmed_lower(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn matches_explore(user: &User, filter: &UserFilter) -> bool {
    if !user.is_public || user.is_banned || filter.exclude_user == Some(user.id) {
        return false;
    }

    if let Some(search) = trimmed_lower(&filter.search) {
        let hit = contains_ci(&user.name, &search)
            || user
                .location
                .as_deref()
                .is_some_and(|location| contains_ci(location, &search))
            || any_skill_matches(user, &search);
        if !hit {
            return false;
        }
    }

    if let Some(skill) = trimmed_lower(&filter.skill) {
        if !any_skill_matches(user, &skill) {
            return false;
        }
    }

    if let Some(location) = trimmed_lower(&filter.location) {
        let hit = user
            .location
            .as_deref()
            .is_some_and(|l| contains_ci(l, &location));
        if !hit {
            return false;
        }
    }

    true
}

fn matches_swap(swap: &SwapRequest, user_id: i64, filter: SwapFilter) -> bool {
    let side = match filter.direction {
        SwapDirection::Sent => swap.from_id == user_id,
        SwapDirection::Received => swap.to_id == user_id,
        SwapDirection::All => swap.involves(user_id),
    };
    side && filter.status.is_none_or(|status| swap.status == status)
}

fn page<T: Clone>(items: &[T], window: PageWindow) -> Vec<T> {
    items
        .iter()
        .skip(window.offset as usize)
        .take(window.limit as usize)
        .cloned()
        .collect()
}

fn count_skills<'a>(lists: impl Iterator<Item = &'a Vec<String>>, limit: i64) -> Vec<SkillCount> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for list in lists {
        for skill in list {
            *counts.entry(skill.as_str()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<SkillCount> = counts
        .into_iter()
        .map(|(skill, count)| SkillCount {
            skill: skill.to_string(),
            count,
        })
        .collect();
    // BTreeMap already yields names ascending; a stable sort keeps that for ties.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(limit.max(0) as usize);
    ranked
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::Conflict(
                "User already exists with this email".to_string(),
            ));
        }

        let id = Tables::next_id(&mut tables.next_user_id);
        let now = Utc::now();
        let user = User {
            id,
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            location: new_user.location,
            profile_photo: None,
            skills_offered: Json(new_user.skills_offered),
            skills_wanted: Json(new_user.skills_wanted),
            availability: Json(new_user.availability),
            is_public: new_user.is_public,
            is_banned: false,
            role: new_user.role,
            average_rating: 0.0,
            rating_count: 0,
            last_active: now,
            created_at: now,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(
        &self,
        id: i64,
        update: ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(location) = update.location {
            user.location = Some(location);
        }
        if let Some(photo) = update.profile_photo {
            user.profile_photo = Some(photo);
        }
        if let Some(skills) = update.skills_offered {
            user.skills_offered = Json(skills);
        }
        if let Some(skills) = update.skills_wanted {
            user.skills_wanted = Json(skills);
        }
        if let Some(availability) = update.availability {
            user.availability = Json(availability);
        }
        if let Some(is_public) = update.is_public {
            user.is_public = is_public;
        }
        user.last_active = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn touch_last_active(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.last_active = at;
        }
        Ok(())
    }

    async fn set_banned(&self, change: &BanChange) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&change.user_id) {
            Some(user) if !user.is_admin() && user.is_banned == change.expected => {
                user.is_banned = change.is_banned;
                Ok(Some(user.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;

        match tables.users.get(&id) {
            Some(user) if !user.is_admin() => {}
            _ => return Ok(false),
        }

        tables.swaps.retain(|_, swap| !swap.involves(id));
        tables.feedbacks.remove(&id);
        tables.users.remove(&id);
        Ok(true)
    }

    async fn explore_users(
        &self,
        filter: &UserFilter,
        window: PageWindow,
    ) -> Result<(Vec<User>, i64), AppError> {
        let tables = self.tables.read().await;
        let mut matched: Vec<&User> = tables
            .users
            .values()
            .filter(|u| matches_explore(u, filter))
            .collect();

        matched.sort_by(|a, b| {
            b.average_rating
                .total_cmp(&a.average_rating)
                .then(b.last_active.cmp(&a.last_active))
                .then(b.id.cmp(&a.id))
        });

        let total = matched.len() as i64;
        Ok((page(&matched, window).into_iter().cloned().collect(), total))
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read().await;
        // Ids grow with creation time.
        Ok(tables.users.values().rev().cloned().collect())
    }

    async fn popular_skills(&self, limit: i64) -> Result<PopularSkills, AppError> {
        let tables = self.tables.read().await;
        let users = &tables.users;
        let visible = move || users.values().filter(|u| u.is_public && !u.is_banned);

        Ok(PopularSkills {
            offered: count_skills(visible().map(|u| &u.skills_offered.0), limit),
            wanted: count_skills(visible().map(|u| &u.skills_wanted.0), limit),
        })
    }

    async fn user_summaries(&self, ids: &[i64]) -> Result<Vec<UserSummary>, AppError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .map(User::summary)
            .collect())
    }

    async fn list_feedback(&self, target_id: i64) -> Result<Vec<Feedback>, AppError> {
        let tables = self.tables.read().await;
        let mut feedbacks = tables.feedbacks.get(&target_id).cloned().unwrap_or_default();
        // Stored in insertion order; newest last.
        feedbacks.reverse();
        Ok(feedbacks)
    }

    async fn add_feedback(
        &self,
        target_id: i64,
        entry: Feedback,
    ) -> Result<Option<RatingSummary>, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&target_id) {
            return Ok(None);
        }

        let list = tables.feedbacks.entry(target_id).or_default();
        rating::merge_feedback(list, entry);
        let summary = rating::summarize(list);

        if let Some(user) = tables.users.get_mut(&target_id) {
            user.average_rating = summary.average_rating;
            user.rating_count = summary.rating_count;
        }
        Ok(Some(summary))
    }
}

#[async_trait]
impl SwapStore for MemoryStore {
    async fn create_swap(&self, new_swap: NewSwap) -> Result<SwapRequest, AppError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&new_swap.to_id) || !tables.users.contains_key(&new_swap.from_id) {
            return Err(AppError::NotFound("Target user not found".to_string()));
        }

        let duplicate = tables.swaps.values().any(|s| {
            s.status == SwapStatus::Pending
                && s.from_id == new_swap.from_id
                && s.to_id == new_swap.to_id
        });
        if duplicate {
            return Err(AppError::Conflict(
                "A pending swap request to this user already exists".to_string(),
            ));
        }

        let id = Tables::next_id(&mut tables.next_swap_id);
        let now = Utc::now();
        let swap = SwapRequest {
            id,
            from_id: new_swap.from_id,
            to_id: new_swap.to_id,
            offered_skill: new_swap.offered_skill,
            requested_skill: new_swap.requested_skill,
            message: new_swap.message,
            status: SwapStatus::Pending,
            feedback_given: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.swaps.insert(id, swap.clone());
        Ok(swap)
    }

    async fn find_swap(&self, id: i64) -> Result<Option<SwapRequest>, AppError> {
        Ok(self.tables.read().await.swaps.get(&id).cloned())
    }

    async fn apply_status_change(
        &self,
        change: &StatusChange,
    ) -> Result<Option<SwapRequest>, AppError> {
        let mut tables = self.tables.write().await;
        match tables.swaps.get_mut(&change.swap_id) {
            Some(swap) if swap.status == change.expected => {
                swap.status = change.next;
                if change.completed_at.is_some() {
                    swap.completed_at = change.completed_at;
                }
                swap.updated_at = Utc::now();
                Ok(Some(swap.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_feedback_given(&self, id: i64) -> Result<Option<SwapRequest>, AppError> {
        let mut tables = self.tables.write().await;
        match tables.swaps.get_mut(&id) {
            Some(swap) if matches!(swap.status, SwapStatus::Accepted | SwapStatus::Completed) => {
                swap.feedback_given = true;
                swap.updated_at = Utc::now();
                Ok(Some(swap.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_swaps_for(
        &self,
        user_id: i64,
        filter: SwapFilter,
        window: PageWindow,
    ) -> Result<(Vec<SwapRequest>, i64), AppError> {
        let tables = self.tables.read().await;
        let matched: Vec<SwapRequest> = tables
            .swaps
            .values()
            .rev()
            .filter(|s| matches_swap(s, user_id, filter))
            .cloned()
            .collect();
        let total = matched.len() as i64;
        Ok((page(&matched, window), total))
    }

    async fn list_all_swaps(&self) -> Result<Vec<SwapRequest>, AppError> {
        Ok(self.tables.read().await.swaps.values().rev().cloned().collect())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, AppError> {
        let mut tables = self.tables.write().await;
        let id = Tables::next_id(&mut tables.next_audit_id);
        let saved = AuditEntry {
            id,
            action: entry.action,
            admin_id: entry.admin_id,
            target_user_id: entry.target_user_id,
            target_swap_id: entry.target_swap_id,
            reason: entry.reason,
            succeeded: entry.succeeded,
            detail: entry.detail,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: Utc::now(),
        };
        tables.audit.push(saved.clone());
        Ok(saved)
    }

    async fn list_audit(
        &self,
        target_user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .filter(|e| target_user_id.is_none() || e.target_user_id == target_user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn stats(&self, since: DateTime<Utc>) -> Result<PlatformStats, AppError> {
        let tables = self.tables.read().await;

        let rated: Vec<f64> = tables
            .users
            .values()
            .filter(|u| u.rating_count > 0)
            .map(|u| u.average_rating)
            .collect();
        let average_rating = if rated.is_empty() {
            0.0
        } else {
            let mean = rated.iter().sum::<f64>() / rated.len() as f64;
            (mean * 10.0).round() / 10.0
        };

        let count_status =
            |status: SwapStatus| tables.swaps.values().filter(|s| s.status == status).count() as i64;

        Ok(PlatformStats {
            total_users: tables.users.len() as i64,
            new_users_this_week: tables.users.values().filter(|u| u.created_at >= since).count() as i64,
            banned_users: tables.users.values().filter(|u| u.is_banned).count() as i64,
            total_swaps: tables.swaps.len() as i64,
            pending_swaps: count_status(SwapStatus::Pending),
            active_swaps: count_status(SwapStatus::Accepted),
            completed_swaps: count_status(SwapStatus::Completed),
            completed_swaps_this_week: tables
                .swaps
                .values()
                .filter(|s| s.status == SwapStatus::Completed)
                .filter(|s| s.completed_at.is_some_and(|at| at >= since))
                .count() as i64,
            average_rating,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{audit::AuditAction, user::Role};

    fn ban(user_id: i64) -> BanChange {
        BanChange {
            user_id,
            expected: false,
            is_banned: true,
            action: AuditAction::Ban,
        }
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Alice".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            location: Some("Lisbon".to_string()),
            skills_offered: vec!["Guitar".to_string()],
            skills_wanted: vec!["Spanish".to_string()],
            availability: vec![],
            is_public: true,
            role: Role::User,
        }
    }

    fn new_swap(from_id: i64, to_id: i64) -> NewSwap {
        NewSwap {
            from_id,
            to_id,
            offered_skill: "Guitar".to_string(),
            requested_skill: "Spanish".to_string(),
            message: String::new(),
        }
    }

    fn feedback(rater_id: i64, rating: i32) -> Feedback {
        Feedback {
            rater_id,
            rating,
            message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@example.com")).await.unwrap();
        let err = store.create_user(new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn one_pending_request_per_pair() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b@example.com")).await.unwrap();

        let first = store.create_swap(new_swap(a.id, b.id)).await.unwrap();
        let err = store.create_swap(new_swap(a.id, b.id)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Reverse direction is a different pair.
        store.create_swap(new_swap(b.id, a.id)).await.unwrap();

        // Once the first leaves pending, a new one may be sent.
        let change = StatusChange {
            swap_id: first.id,
            expected: SwapStatus::Pending,
            next: SwapStatus::Cancelled,
            completed_at: None,
        };
        store.apply_status_change(&change).await.unwrap().unwrap();
        store.create_swap(new_swap(a.id, b.id)).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_transitions_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let a = store.create_user(new_user("a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b@example.com")).await.unwrap();
        let swap = store.create_swap(new_swap(a.id, b.id)).await.unwrap();

        let accept = StatusChange {
            swap_id: swap.id,
            expected: SwapStatus::Pending,
            next: SwapStatus::Accepted,
            completed_at: None,
        };
        let cancel = StatusChange {
            next: SwapStatus::Cancelled,
            ..accept.clone()
        };

        let (s1, s2) = (store.clone(), store.clone());
        let h1 = tokio::spawn(async move { s1.apply_status_change(&accept).await });
        let h2 = tokio::spawn(async move { s2.apply_status_change(&cancel).await });
        let r1 = h1.await.unwrap().unwrap();
        let r2 = h2.await.unwrap().unwrap();

        assert_eq!(r1.is_some() as u8 + r2.is_some() as u8, 1);
    }

    #[tokio::test]
    async fn rerating_replaces_previous_entry() {
        let store = MemoryStore::new();
        let target = store.create_user(new_user("t@example.com")).await.unwrap();

        store.add_feedback(target.id, feedback(10, 2)).await.unwrap();
        store.add_feedback(target.id, feedback(11, 5)).await.unwrap();
        let summary = store.add_feedback(target.id, feedback(10, 4)).await.unwrap().unwrap();

        assert_eq!(summary.rating_count, 2);
        assert_eq!(summary.average_rating, 4.5);
        assert_eq!(store.list_feedback(target.id).await.unwrap().len(), 2);

        let user = store.find_user(target.id).await.unwrap().unwrap();
        assert_eq!(user.average_rating, 4.5);

        assert!(store.add_feedback(999, feedback(10, 3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_swaps_and_spares_admins() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b@example.com")).await.unwrap();
        let c = store.create_user(new_user("c@example.com")).await.unwrap();
        let mut admin = new_user("admin@example.com");
        admin.role = Role::Admin;
        let admin = store.create_user(admin).await.unwrap();

        store.create_swap(new_swap(a.id, b.id)).await.unwrap();
        store.create_swap(new_swap(c.id, a.id)).await.unwrap();
        let kept = store.create_swap(new_swap(b.id, c.id)).await.unwrap();

        assert!(store.delete_user(a.id).await.unwrap());
        let remaining = store.list_all_swaps().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);

        assert!(!store.delete_user(admin.id).await.unwrap());
        assert!(store.set_banned(&ban(admin.id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn explore_hides_private_banned_and_caller() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b@example.com")).await.unwrap();
        let mut private = new_user("p@example.com");
        private.is_public = false;
        store.create_user(private).await.unwrap();
        let banned = store.create_user(new_user("x@example.com")).await.unwrap();
        store.set_banned(&ban(banned.id)).await.unwrap();

        let filter = UserFilter {
            skill: Some("guit".to_string()),
            exclude_user: Some(a.id),
            ..UserFilter::default()
        };
        let (users, total) = store
            .explore_users(&filter, PageWindow::new(None, None))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].id, b.id);
    }

    #[tokio::test]
    async fn swap_listing_filters_by_direction() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b@example.com")).await.unwrap();
        store.create_swap(new_swap(a.id, b.id)).await.unwrap();
        store.create_swap(new_swap(b.id, a.id)).await.unwrap();

        let window = PageWindow::new(None, None);
        let sent = SwapFilter {
            direction: SwapDirection::Sent,
            status: None,
        };
        let (swaps, total) = store.list_swaps_for(a.id, sent, window).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(swaps[0].from_id, a.id);

        let (_, total) = store
            .list_swaps_for(a.id, SwapFilter::default(), window)
            .await
            .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn skill_ranking_breaks_ties_by_name() {
        let lists = [
            vec!["Spanish".to_string(), "Guitar".to_string()],
            vec!["Guitar".to_string()],
            vec!["Cooking".to_string()],
        ];
        let ranked = count_skills(lists.iter(), 2);
        assert_eq!(ranked[0].skill, "Guitar");
        assert_eq!(ranked[0].count, 2);
        assert_eq!(ranked[1].skill, "Cooking");
    }

    #[tokio::test]
    async fn concurrent_ban_toggles_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let id = store.create_user(new_user("t@example.com")).await.unwrap().id;

        let (s1, s2) = (store.clone(), store.clone());
        let h1 = tokio::spawn(async move { s1.set_banned(&ban(id)).await });
        let h2 = tokio::spawn(async move { s2.set_banned(&ban(id)).await });
        let r1 = h1.await.unwrap().unwrap();
        let r2 = h2.await.unwrap().unwrap();
        assert_eq!(r1.is_some() as u8 + r2.is_some() as u8, 1);

        let unban = BanChange {
            user_id: id,
            expected: true,
            is_banned: false,
            action: AuditAction::Unban,
        };
        let user = store.set_banned(&unban).await.unwrap().unwrap();
        assert!(!user.is_banned);
        // Replaying the same unban finds the flag already moved.
        assert!(store.set_banned(&unban).await.unwrap().is_none());
    }
}
