use serde::Deserialize;

/// Pagination helper for list queries. Pages are 1-based.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1)) * self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: 100 }
    }
}
