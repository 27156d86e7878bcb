//! Paginated Fetcher
//!
//! Drains a query page by page. A page shorter than the page size is the
//! end-of-data signal; no separate count query is made. Rows that do not fit
//! the requested row type are skipped one by one.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::poller::QueryPoller;
use crate::query::{QueryClient, QueryError, QueryRef};

/// Default number of rows requested per page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Offset of a 1-based page
pub fn page_offset(page: usize, page_size: usize) -> usize {
    page.saturating_sub(1) * page_size
}

/// Sequential page-by-page reader on top of a `QueryPoller`
pub struct PaginatedFetcher<C> {
    poller: QueryPoller<C>,
    page_size: usize,
}

impl<C: QueryClient> PaginatedFetcher<C> {
    pub fn new(poller: QueryPoller<C>, page_size: usize) -> Self {
        Self { poller, page_size }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn poller(&self) -> &QueryPoller<C> {
        &self.poller
    }

    /// Fetch every row of `query`, in page order
    ///
    /// Paging stops on the raw page length, so skipped rows never end the
    /// scan early.
    pub async fn fetch_all<T: DeserializeOwned>(&self, query: &QueryRef) -> Result<Vec<T>, QueryError> {
        if self.page_size == 0 {
            return Err(QueryError::InvalidPageSize);
        }

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        let mut page = 1;
        loop {
            let offset = page_offset(page, self.page_size);
            let batch = self.poller.fetch_page(query, self.page_size, offset).await?;
            let count = batch.len();
            debug!("{} page {} returned {} rows", query, page, count);

            for (index, raw) in batch.into_iter().enumerate() {
                match serde_json::from_value::<T>(raw) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        skipped += 1;
                        warn!("Skipping row {} of {}: {}", offset + index, query, e);
                    }
                }
            }

            if count < self.page_size {
                break;
            }
            page += 1;
        }

        info!(
            "Fetched {} rows from {} in {} pages ({} skipped)",
            rows.len(),
            query,
            page,
            skipped
        );
        Ok(rows)
    }
}
