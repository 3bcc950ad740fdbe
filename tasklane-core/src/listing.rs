//! Listing query normalization and cache-key derivation.
//!
//! Raw query parameters arrive as loose strings. [`ListingParams::normalize`]
//! turns them into a [`ListingQuery`] where every field is valid and
//! defaulted, so two requests asking for the same rows always produce the
//! same [`ListingQuery::cache_key`].

use crate::task::TaskStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_PAGE: u32 = 1;

/// Date format accepted for due-date bounds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column a listing may be ordered by. Anything else falls back to `Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Id,
    DueAt,
    CreatedAt,
    UpdatedAt,
}

impl SortColumn {
    pub fn as_column(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::DueAt => "due_at",
            SortColumn::CreatedAt => "created_at",
            SortColumn::UpdatedAt => "updated_at",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "id" => Some(SortColumn::Id),
            "due_at" => Some(SortColumn::DueAt),
            "created_at" => Some(SortColumn::CreatedAt),
            "updated_at" => Some(SortColumn::UpdatedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Only an explicit `asc` sorts ascending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }
}

/// Raw listing parameters as they appear on the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingParams {
    pub limit: Option<String>,
    pub page: Option<String>,
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub due_date_after: Option<String>,
    pub due_date_before: Option<String>,
}

impl ListingParams {
    /// Normalize into a valid query. Invalid values are dropped or defaulted,
    /// never rejected.
    pub fn normalize(&self) -> ListingQuery {
        ListingQuery {
            status: self
                .status
                .as_deref()
                .and_then(|s| TaskStatus::from_db_str(s).ok()),
            due_after: self.due_date_after.as_deref().and_then(parse_date),
            due_before: self.due_date_before.as_deref().and_then(parse_date),
            sort_by: self
                .sort_by
                .as_deref()
                .and_then(SortColumn::parse)
                .unwrap_or_default(),
            direction: self
                .sort_order
                .as_deref()
                .map(SortDirection::parse)
                .unwrap_or_default(),
            page: parse_bounded(self.page.as_deref(), 1, u32::MAX, DEFAULT_PAGE),
            page_size: parse_bounded(self.limit.as_deref(), 1, MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE),
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

fn parse_bounded(raw: Option<&str>, min: u32, max: u32, default: u32) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|v| (min..=max).contains(v))
        .unwrap_or(default)
}

/// A normalized listing query.
///
/// Construct through [`ListingParams::normalize`] or [`ListingQuery::default`]
/// so that `page >= 1` and `1 <= page_size <= MAX_PAGE_SIZE` hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingQuery {
    pub status: Option<TaskStatus>,
    pub due_after: Option<NaiveDate>,
    pub due_before: Option<NaiveDate>,
    pub sort_by: SortColumn,
    pub direction: SortDirection,
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            status: None,
            due_after: None,
            due_before: None,
            sort_by: SortColumn::Id,
            direction: SortDirection::Desc,
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListingQuery {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }

    /// Deterministic key fragment; every field is always present in a fixed order.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ListingQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = |d: Option<NaiveDate>| {
            d.map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| "*".to_string())
        };
        write!(
            f,
            "status={}|after={}|before={}|sort={}:{}|page={}|size={}",
            self.status.map(|s| s.as_db_str()).unwrap_or("*"),
            date(self.due_after),
            date(self.due_before),
            self.sort_by.as_column(),
            self.direction.as_sql().to_lowercase(),
            self.page,
            self.page_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(pairs: &[(&str, &str)]) -> ListingParams {
        let mut p = ListingParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "limit" => p.limit = v,
                "page" => p.page = v,
                "status" => p.status = v,
                "sort_by" => p.sort_by = v,
                "sort_order" => p.sort_order = v,
                "due_date_after" => p.due_date_after = v,
                "due_date_before" => p.due_date_before = v,
                other => panic!("unknown param {other}"),
            }
        }
        p
    }

    #[test]
    fn test_defaults() {
        let q = ListingParams::default().normalize();
        assert_eq!(q, ListingQuery::default());
        assert_eq!(q.offset(), 0);
        assert_eq!(q.limit(), 10);
    }

    #[test]
    fn test_out_of_range_page_size_falls_back() {
        assert_eq!(params(&[("limit", "51")]).normalize().page_size, 10);
        assert_eq!(params(&[("limit", "0")]).normalize().page_size, 10);
        assert_eq!(params(&[("limit", "abc")]).normalize().page_size, 10);
        assert_eq!(params(&[("limit", "50")]).normalize().page_size, 50);
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let q = params(&[
            ("status", "archived"),
            ("sort_by", "title; DROP TABLE tasks"),
            ("due_date_after", "2024-13-45"),
            ("page", "-3"),
        ])
        .normalize();
        assert_eq!(q, ListingQuery::default());
    }

    #[test]
    fn test_both_due_bounds_are_kept() {
        let q = params(&[
            ("due_date_after", "2025-01-01"),
            ("due_date_before", "2025-02-01"),
        ])
        .normalize();
        assert_eq!(q.due_after, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(q.due_before, NaiveDate::from_ymd_opt(2025, 2, 1));
    }

    #[test]
    fn test_offset_uses_page() {
        let q = params(&[("page", "3"), ("limit", "20")]).normalize();
        assert_eq!(q.offset(), 40);
    }

    #[test]
    fn test_equivalent_spellings_share_a_key() {
        let a = params(&[("status", "in progress"), ("sort_order", "ASC")]).normalize();
        let b = params(&[("status", "in_progress"), ("sort_order", "asc")]).normalize();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_key_distinguishes_filters() {
        let pending = ListingQuery::default().with_status(TaskStatus::Pending);
        let done = ListingQuery::default().with_status(TaskStatus::Completed);
        assert_ne!(pending.cache_key(), done.cache_key());
        assert_ne!(pending.cache_key(), ListingQuery::default().cache_key());
    }

    proptest! {
        #[test]
        fn prop_normalized_query_is_in_bounds(
            limit in proptest::option::of(".{0,6}"),
            page in proptest::option::of(".{0,6}"),
        ) {
            let q = ListingParams { limit, page, ..Default::default() }.normalize();
            prop_assert!(q.page >= 1);
            prop_assert!((1..=MAX_PAGE_SIZE).contains(&q.page_size));
            prop_assert!(q.offset() >= 0);
        }

        #[test]
        fn prop_key_is_stable_under_renormalization(limit in 0u32..80, page in 0u32..10) {
            let q = ListingParams {
                limit: Some(limit.to_string()),
                page: Some(page.to_string()),
                ..Default::default()
            }
            .normalize();
            let again = ListingParams {
                limit: Some(q.page_size.to_string()),
                page: Some(q.page.to_string()),
                ..Default::default()
            }
            .normalize();
            prop_assert_eq!(q.cache_key(), again.cache_key());
        }
    }
}
