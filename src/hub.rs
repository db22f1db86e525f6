//! Row fetching from the Hugging Face datasets-server
//!
//! Structured task splits are read page by page from the public rows API so
//! that only the first `limit` rows of a split are ever transferred.

use crate::download::{DownloadError, Fetch};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Rows API endpoint
pub const ROWS_ENDPOINT: &str = "https://datasets-server.huggingface.co/rows";

/// Largest page the rows API serves
pub const MAX_PAGE_SIZE: usize = 100;

/// Hub errors
#[derive(Error, Debug)]
pub enum HubError {
    /// Transport failure
    #[error("Failed to fetch rows: {0}")]
    Fetch(#[from] DownloadError),

    /// Response body did not match the rows schema
    #[error("Malformed rows response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RowsPage {
    rows: Vec<RowEntry>,
    #[serde(default)]
    num_rows_total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RowEntry {
    row: Value,
}

/// Paginated client over the rows API
#[derive(Debug, Clone)]
pub struct HubClient<F> {
    fetcher: F,
    page_size: usize,
}

impl<F: Fetch> HubClient<F> {
    /// Client against the public endpoint
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// URL of one page
    #[must_use]
    pub fn rows_url(&self, dataset: &str, config: &str, split: &str, offset: usize, length: usize) -> String {
        format!(
            "{ROWS_ENDPOINT}?dataset={}&config={}&split={}&offset={offset}&length={length}",
            urlencoding::encode(dataset),
            urlencoding::encode(config),
            urlencoding::encode(split),
        )
    }

    /// Fetch up to `limit` rows of a split, in order
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be fetched or decoded.
    pub fn fetch_rows(
        &self,
        dataset: &str,
        config: &str,
        split: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, HubError> {
        let mut rows = Vec::new();
        let mut total: Option<usize> = None;

        loop {
            let wanted = match limit {
                Some(limit) if rows.len() >= limit => break,
                Some(limit) => (limit - rows.len()).min(self.page_size),
                None => self.page_size,
            };
            if total.is_some_and(|total| rows.len() >= total) {
                break;
            }

            let url = self.rows_url(dataset, config, split, rows.len(), wanted);
            tracing::debug!(url = %url, "Fetching rows page");
            let body = self.fetcher.fetch(&url)?;
            let page: RowsPage =
                serde_json::from_slice(&body).map_err(|source| HubError::Decode { url, source })?;

            total = page.num_rows_total.or(total);
            let received = page.rows.len();
            rows.extend(page.rows.into_iter().map(|entry| entry.row).take(wanted));

            if received < wanted {
                break;
            }
        }

        tracing::debug!(dataset, config, split, rows = rows.len(), "Rows fetched");
        Ok(rows)
    }
}
