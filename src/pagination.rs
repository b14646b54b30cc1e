use axum::http::Uri;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::ApiSettings;
use crate::error::ApiError;
use crate::repository::{PageRequest, Paged};

/// Page-number pagination parameters. Kept as a string so that a malformed
/// number reports the same way as a page past the end.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// 1-based page number.
    pub page: Option<String>,
}

/// Case-insensitive substring search.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    pub search: Option<String>,
}

impl PageParams {
    pub fn request(&self, settings: &ApiSettings) -> Result<PageRequest, ApiError> {
        let page = match self.page.as_deref() {
            None => 1,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(invalid_page)?,
        };
        Ok(PageRequest::new(page, settings.page_size))
    }
}

fn invalid_page() -> ApiError {
    ApiError::not_found("Invalid page.")
}

/// Page
///
/// Envelope of every collection response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Page<T> {
    pub count: i64,
    /// Link to the next page (path and query), if any.
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wraps a repository page, converting items and building the neighbour links
    /// from the request URI. The first page always exists, even when empty.
    pub fn build<U>(paged: Paged<U>, request: PageRequest, uri: &Uri) -> Result<Self, ApiError>
    where
        U: Into<T>,
    {
        if request.page > 1 && request.offset() >= paged.total {
            return Err(invalid_page());
        }

        let has_next = request.offset() + (paged.items.len() as i64) < paged.total;
        let next = has_next.then(|| page_link(uri, Some(request.page + 1)));
        let previous = match request.page {
            1 => None,
            // The first page is addressed without a page parameter.
            2 => Some(page_link(uri, None)),
            p => Some(page_link(uri, Some(p - 1))),
        };

        Ok(Self {
            count: paged.total,
            next,
            previous,
            results: paged.items.into_iter().map(Into::into).collect(),
        })
    }
}

/// Rewrites the `page` parameter of `uri`, keeping every other parameter in order.
fn page_link(uri: &Uri, page: Option<u32>) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some("page"))
        .map(str::to_string)
        .collect();
    if let Some(page) = page {
        params.push(format!("page={page}"));
    }

    if params.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), params.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged(n: usize, total: i64) -> Paged<i64> {
        Paged {
            items: (0..n as i64).collect(),
            total,
        }
    }

    #[test]
    fn test_links_keep_filters() {
        let uri: Uri = "/v1/titles/?year=1999&page=2".parse().unwrap();
        let page: Page<i64> = Page::build(paged(10, 35), PageRequest::new(2, 10), &uri).unwrap();
        assert_eq!(page.count, 35);
        assert_eq!(page.next.as_deref(), Some("/v1/titles/?year=1999&page=3"));
        assert_eq!(page.previous.as_deref(), Some("/v1/titles/?year=1999"));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let uri: Uri = "/v1/genres/?page=4".parse().unwrap();
        let page: Page<i64> = Page::build(paged(5, 35), PageRequest::new(4, 10), &uri).unwrap();
        assert!(page.next.is_none());
        assert_eq!(page.previous.as_deref(), Some("/v1/genres/?page=3"));
    }

    #[test]
    fn test_empty_first_page_is_valid() {
        let uri: Uri = "/v1/genres/".parse().unwrap();
        let page: Page<i64> = Page::build(paged(0, 0), PageRequest::new(1, 10), &uri).unwrap();
        assert_eq!(page.count, 0);
        assert!(page.next.is_none() && page.previous.is_none());
    }

    #[test]
    fn test_page_past_end_is_not_found() {
        let uri: Uri = "/v1/genres/?page=9".parse().unwrap();
        let result: Result<Page<i64>, _> = Page::build(paged(0, 12), PageRequest::new(9, 10), &uri);
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_malformed_page_param() {
        let settings = ApiSettings::default();
        for raw in ["0", "abc", "-1"] {
            let params = PageParams {
                page: Some(raw.to_string()),
            };
            assert!(params.request(&settings).is_err(), "{raw} should be rejected");
        }
        assert_eq!(
            PageParams::default().request(&settings).unwrap(),
            PageRequest::new(1, 10)
        );
    }
}
