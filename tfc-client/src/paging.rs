//! List paging.
//!
//! Every list endpoint of the remote service is paged. Callers either walk
//! pages themselves (name resolution stops at the first match) or use
//! [`collect_all`] to drain a collection before diffing it.

use std::future::Future;

use crate::error::{ClientError, Result};

/// Page size requested from the remote service.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Upper bound on pages walked for a single collection.
pub const MAX_PAGES: u32 = 1000;

/// Options for a single list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub page_number: u32,
    pub page_size: u32,
    /// Server-side search filter (usually a name substring).
    pub search: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl ListOptions {
    pub fn with_search(search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            ..Default::default()
        }
    }

    pub fn page(mut self, page_number: u32) -> Self {
        self.page_number = page_number;
        self
    }
}

/// One page of a list response.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    /// A page with no successor.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Drain every page of a collection.
///
/// Fails with [`ClientError::Incomplete`] rather than returning a partial
/// list when [`MAX_PAGES`] is reached with more pages pending.
pub async fn collect_all<T, F, Fut>(search: Option<&str>, fetch: F) -> Result<Vec<T>>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    collect_pages(search, MAX_PAGES, fetch).await
}

async fn collect_pages<T, F, Fut>(search: Option<&str>, limit: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut opts = ListOptions {
        search: search.map(str::to_string),
        ..Default::default()
    };

    for walked in 1.. {
        let page = fetch(opts.clone()).await?;
        items.extend(page.items);
        match page.next_page {
            Some(next) if next > opts.page_number => {
                if walked >= limit {
                    return Err(ClientError::Incomplete { pages: walked });
                }
                opts = opts.page(next);
            }
            _ => break,
        }
    }

    Ok(items)
}
