// src/models/mod.rs

pub mod audit;
pub mod feedback;
pub mod swap;
pub mod user;

use serde::Serialize;

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Highest page number whose row offset still fits in an `i64`.
const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// A resolved page window: 1-based page number, page size and row offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    /// Clamps raw query values into a usable window (page >= 1, 1 <= limit <= 100).
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Self {
            page,
            limit,
            offset: (page - 1) * limit,
        }
    }
}

/// Pagination metadata returned alongside list responses.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
    pub total_items: i64,
}

impl PageInfo {
    pub fn new(window: PageWindow, total_items: i64) -> Self {
        let total_pages = (total_items + window.limit - 1) / window.limit;
        Self {
            current: window.page,
            total_pages,
            has_next: window.page.saturating_mul(window.limit) < total_items,
            has_prev: window.page > 1,
            total_items,
        }
    }
}
