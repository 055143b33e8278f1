use serde::{Deserialize, Serialize};

use crate::config;

/// `?page=&page_size=` query parameters shared by list endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

impl PageQuery {
    /// 1-based page number
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        let api = &config::config().api;
        self.page_size
            .unwrap_or(api.default_page_size)
            .clamp(1, api.max_page_size.max(1))
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }

    pub fn wrap<T>(&self, items: Vec<T>, total: i64) -> Paginated<T> {
        Paginated {
            items,
            page: self.page(),
            page_size: self.page_size(),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page() {
        let query = PageQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.offset(), 0);
        assert_eq!(query.page_size(), config::config().api.default_page_size);
    }

    #[test]
    fn page_zero_is_treated_as_first_page() {
        let query = PageQuery { page: Some(0), page_size: Some(10) };
        assert_eq!(query.page(), 1);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn offset_follows_page_and_size() {
        let query = PageQuery { page: Some(3), page_size: Some(20) };
        assert_eq!(query.limit(), 20);
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn page_size_is_capped() {
        let max = config::config().api.max_page_size;
        let query = PageQuery { page: None, page_size: Some(max + 500) };
        assert_eq!(query.page_size(), max);
    }
}
