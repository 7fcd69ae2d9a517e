//! Pagination types for list endpoints.

use serde::{Deserialize, Serialize};

/// Hard cap on page size for admin listings.
pub const MAX_PER_PAGE: u32 = 100;

/// Request parameters for paginated queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number (1-indexed).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Number of items per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageRequest {
    /// Zero-indexed page number clamped to at least the first page.
    #[must_use]
    pub fn page_index(&self) -> u64 {
        u64::from(self.page.max(1) - 1)
    }

    /// Page size clamped to `1..=MAX_PER_PAGE`.
    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page.clamp(1, MAX_PER_PAGE))
    }

    /// Calculates the offset for database queries.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.page_index() * self.limit()
    }
}

/// Response wrapper for paginated data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// The items in the current page.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

/// Pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items across all pages.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl<T> PageResponse<T> {
    /// Creates a new paginated response.
    #[must_use]
    pub fn new(data: Vec<T>, request: &PageRequest, total: u64) -> Self {
        let per_page = request.limit();
        let total_pages = if total == 0 {
            1
        } else {
            total.div_ceil(per_page)
        };

        Self {
            data,
            meta: PageMeta {
                page: request.page.max(1),
                #[allow(clippy::cast_possible_truncation)]
                per_page: per_page as u32,
                total,
                total_pages,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let req = PageRequest {
            page: 3,
            per_page: 25,
        };
        assert_eq!(req.offset(), 50);
        assert_eq!(req.limit(), 25);
    }

    #[test]
    fn test_page_zero_treated_as_first() {
        let req = PageRequest {
            page: 0,
            per_page: 10,
        };
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn test_per_page_is_clamped() {
        let req = PageRequest {
            page: 1,
            per_page: 5_000,
        };
        assert_eq!(req.limit(), u64::from(MAX_PER_PAGE));
    }

    #[test]
    fn test_total_pages() {
        let req = PageRequest {
            page: 1,
            per_page: 20,
        };
        assert_eq!(PageResponse::new(vec![1], &req, 41).meta.total_pages, 3);
        assert_eq!(PageResponse::<u8>::new(vec![], &req, 0).meta.total_pages, 1);
    }
}
