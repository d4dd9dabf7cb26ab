use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use super::ApiError;

pub const DEFAULT_PAGE_SIZE: usize = 30;
const MAX_PAGE_SIZE: usize = 1000;

/// Page size used when the request does not ask for one; installed as an extension.
#[derive(Debug, Clone, Copy)]
pub struct PageDefaults(pub usize);

impl Default for PageDefaults {
    fn default() -> Self {
        Self(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<usize>,
    page_size: Option<usize>,
}

/// `{ count, next, previous, results }` list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Requested page of a list endpoint.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    explicit_size: bool,
    path: String,
}

impl Pagination {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            explicit_size: false,
            path: String::new(),
        }
    }

    /// Slices `items`; asking past the last page is a 404.
    pub fn paginate<T>(&self, items: Vec<T>) -> Result<Page<T>, ApiError> {
        let count = items.len();
        let last_page = count.div_ceil(self.page_size).max(1);
        if self.page > last_page {
            return Err(ApiError::NotFound("invalid page".to_string()));
        }

        let start = (self.page - 1) * self.page_size;
        let results: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(self.page_size)
            .collect();

        Ok(Page {
            count,
            next: (self.page < last_page).then(|| self.link(self.page + 1)),
            previous: (self.page > 1).then(|| self.link(self.page - 1)),
            results,
        })
    }

    fn link(&self, page: usize) -> String {
        if self.explicit_size {
            format!("{}?page={page}&page_size={}", self.path, self.page_size)
        } else {
            format!("{}?page={page}", self.path)
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<PageQuery>::from_request_parts(parts, state)
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        let defaults = parts
            .extensions
            .get::<PageDefaults>()
            .copied()
            .unwrap_or_default();

        let mut pagination = Pagination::new(
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(defaults.0),
        );
        pagination.explicit_size = query.page_size.is_some();
        pagination.path = parts.uri.path().to_string();
        Ok(pagination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_and_links_pages() {
        let mut pagination = Pagination::new(2, 2);
        pagination.path = "/api/v1/leases/".to_string();
        let page = pagination.paginate((1..=5).collect()).expect("page exists");

        assert_eq!(page.count, 5);
        assert_eq!(page.results, vec![3, 4]);
        assert_eq!(page.next.as_deref(), Some("/api/v1/leases/?page=3"));
        assert_eq!(page.previous.as_deref(), Some("/api/v1/leases/?page=1"));
    }

    #[test]
    fn empty_lists_still_have_a_first_page() {
        let page = Pagination::new(1, 30)
            .paginate(Vec::<u8>::new())
            .expect("first page always exists");
        assert_eq!(page.count, 0);
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
    }

    #[test]
    fn pages_past_the_end_are_not_found() {
        assert!(matches!(
            Pagination::new(3, 10).paginate(vec![1, 2, 3]),
            Err(ApiError::NotFound(_))
        ));
    }
}
