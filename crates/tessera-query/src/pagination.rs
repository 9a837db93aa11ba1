//! Pagination summary.

use serde::Serialize;
use tessera_core::{Error, Result, ValidationErrorKind};

/// Position of one page within a filtered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total_docs: u64,
    pub limit: Option<u64>,
    pub total_pages: u64,
    pub page: u64,
    pub paging_counter: u64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
}

impl PageInfo {
    /// Summary for `total_docs` matches fetched with `limit`/`offset`.
    ///
    /// Without a limit everything is one page. An offset past the end still
    /// reports the page it points at.
    pub fn compute(total_docs: u64, limit: Option<u64>, offset: u64) -> Result<Self> {
        let Some(limit) = limit else {
            return Ok(Self {
                total_docs,
                limit: None,
                total_pages: 1,
                page: 1,
                paging_counter: offset + 1,
                has_prev_page: false,
                has_next_page: false,
                prev_page: None,
                next_page: None,
            });
        };
        validate_limit(Some(limit))?;

        let total_pages = total_docs.div_ceil(limit);
        let page = offset / limit + 1;
        let has_prev_page = page > 1;
        let has_next_page = page < total_pages;
        Ok(Self {
            total_docs,
            limit: Some(limit),
            total_pages,
            page,
            paging_counter: offset + 1,
            has_prev_page,
            has_next_page,
            prev_page: has_prev_page.then(|| page - 1),
            next_page: has_next_page.then(|| page + 1),
        })
    }
}

/// A zero limit is rejected.
pub fn validate_limit(limit: Option<u64>) -> Result<()> {
    if limit == Some(0) {
        return Err(Error::validation(
            "limit",
            ValidationErrorKind::Query,
            "limit must be greater than zero",
        ));
    }
    Ok(())
}

/// One page of documents plus its summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub docs: Vec<T>,
    #[serde(flatten)]
    pub info: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(docs: Vec<T>, info: PageInfo) -> Self {
        Self { docs, info }
    }

    pub fn total_docs(&self) -> u64 {
        self.info.total_docs
    }

    pub fn total_pages(&self) -> u64 {
        self.info.total_pages
    }

    pub fn page(&self) -> u64 {
        self.info.page
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            docs: self.docs.into_iter().map(f).collect(),
            info: self.info,
        }
    }
}
