//! Shared pagination envelope for list endpoints.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PageParams {
    /// 1-indexed page number and effective (capped) limit.
    pub fn resolve(&self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        (page, limit)
    }
}

#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub has_next: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Slices an already-fetched, already-sorted `Vec<T>` into one page.
///
/// The stores return their full result set for a query (bounded upstream by
/// the per-tool circuit breaker), so pagination here is an in-memory slice
/// rather than a second disk query.
pub fn paginate<T: Serialize>(items: Vec<T>, params: &PageParams) -> Paginated<T> {
    let total = items.len();
    let (page, limit) = params.resolve();
    let start = (page - 1) * limit;
    let data: Vec<T> = items.into_iter().skip(start).take(limit).collect();
    let has_next = start + data.len() < total;
    Paginated { data, pagination: PaginationMeta { has_next, total: Some(total) } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_page_one_limit_100() {
        let params = PageParams { page: None, limit: None };
        assert_eq!(params.resolve(), (1, DEFAULT_LIMIT));
    }

    #[test]
    fn limit_is_capped_at_max() {
        let params = PageParams { page: None, limit: Some(10_000) };
        assert_eq!(params.resolve(), (1, MAX_LIMIT));
    }

    #[test]
    fn limit_of_zero_is_clamped_to_one() {
        let params = PageParams { page: Some(1), limit: Some(0) };
        assert_eq!(params.resolve(), (1, 1));
    }

    #[test]
    fn has_next_reflects_remaining_items() {
        let items: Vec<i32> = (0..10).collect();
        let params = PageParams { page: Some(1), limit: Some(4) };
        let page = paginate(items, &params);
        assert_eq!(page.data, vec![0, 1, 2, 3]);
        assert!(page.pagination.has_next);
        assert_eq!(page.pagination.total, Some(10));
    }

    #[test]
    fn last_page_has_no_next() {
        let items: Vec<i32> = (0..10).collect();
        let params = PageParams { page: Some(3), limit: Some(4) };
        let page = paginate(items, &params);
        assert_eq!(page.data, vec![8, 9]);
        assert!(!page.pagination.has_next);
    }
}
