//! Client-side search over the API's bulk listing endpoint: query parsing,
//! candidate fetching, pagination and autocomplete.
//!
//! The API has no paging of its own, so every page turn is a fresh
//! fetch-and-slice over the full result set.

use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Mutex,
};

use crate::models::{Listing, SearchMode, SearchParams};

pub mod fetcher;
pub mod paginator;
pub mod query;
pub mod suggest;

use fetcher::{fetch_candidates, ListingSource};
use paginator::{paginate, Page};

/// Hands out increasing tickets; only the newest ticket is current.
#[derive(Debug, Default)]
pub struct Sequencer {
    latest: AtomicU64,
}

impl Sequencer {
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub params: SearchParams,
    pub mode: SearchMode,
    #[serde(flatten)]
    pub page: Page<Listing>,
    pub failed: bool,
    // A newer search from the same visitor started before this one finished
    pub superseded: bool,
}

/// Fetch the candidates for `params` and cut out one page.
pub async fn run_search<S>(
    source: &S,
    params: &SearchParams,
    mode: SearchMode,
    page: usize,
    page_size: usize,
) -> SearchOutcome
where
    S: ListingSource + ?Sized,
{
    let fetched = fetch_candidates(source, params, mode).await;
    SearchOutcome {
        params: params.clone(),
        mode,
        page: paginate(fetched.listings, page, page_size),
        failed: fetched.failed,
        superseded: false,
    }
}

/// One visitor's search results. Overlapping searches resolve last-request-wins:
/// a result is only applied if no newer search was issued meanwhile.
#[derive(Default)]
pub struct SearchView {
    sequencer: Sequencer,
    loading: AtomicBool,
    latest: Mutex<Option<SearchOutcome>>,
}

impl SearchView {
    pub async fn run<S>(
        &self,
        source: &S,
        params: &SearchParams,
        mode: SearchMode,
        page: usize,
        page_size: usize,
    ) -> SearchOutcome
    where
        S: ListingSource + ?Sized,
    {
        let ticket = self.sequencer.issue();
        self.loading.store(true, Ordering::SeqCst);

        let mut outcome = run_search(source, params, mode, page, page_size).await;

        if self.sequencer.is_current(ticket) {
            self.loading.store(false, Ordering::SeqCst);
            let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
            *latest = Some(outcome.clone());
        } else {
            tracing::debug!(ticket, "Discarding stale search result");
            outcome.superseded = true;
        }
        outcome
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<SearchOutcome> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
