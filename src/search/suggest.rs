//! Quick-search autocomplete.

use std::{collections::HashSet, time::Duration};
use tokio::sync::watch;

use super::{
    fetcher::{ListingSource, OrderFilter},
    Sequencer,
};
use crate::models::{Listing, SearchParams, Suggestion};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
/// Queries of this many characters or fewer never fetch.
pub const MIN_QUERY_CHARS: usize = 2;
const MAX_MATCHES: usize = 10;
const MAX_SUGGESTIONS: usize = 5;

/// First ten description matches, blanks dropped, deduplicated on the trimmed
/// lowercase text, capped at five.
pub fn build_suggestions(listings: &[Listing], query: &str) -> Vec<Suggestion> {
    let needle = query.to_lowercase();
    let mut seen = HashSet::new();

    listings
        .iter()
        .filter(|listing| listing.description.to_lowercase().contains(&needle))
        .take(MAX_MATCHES)
        .map(|listing| Suggestion {
            id: listing.id,
            kind: listing.kind.clone(),
            original_description: listing.description.clone(),
            description: listing.description.to_lowercase(),
            photo: listing.first_photo().map(str::to_string),
        })
        .filter(|suggestion| {
            let key = suggestion.description.trim().to_string();
            !key.is_empty() && seen.insert(key)
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Per-visitor debounced suggestion state.
///
/// Each keystroke takes a ticket; only the holder of the latest ticket may
/// fetch after the debounce window, and only its result is published.
pub struct SuggestionEngine {
    debounce: Duration,
    sequencer: Sequencer,
    current: watch::Sender<Vec<Suggestion>>,
}

impl SuggestionEngine {
    pub fn new(debounce: Duration) -> Self {
        let (current, _) = watch::channel(Vec::new());
        Self {
            debounce,
            sequencer: Sequencer::default(),
            current,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Suggestion>> {
        self.current.subscribe()
    }

    pub fn current(&self) -> Vec<Suggestion> {
        self.current.borrow().clone()
    }

    /// Handles one keystroke. Returns `None` when a newer keystroke superseded
    /// this one, otherwise the suggestions now on display.
    pub async fn input<S>(&self, source: &S, query: &str) -> Option<Vec<Suggestion>>
    where
        S: ListingSource + ?Sized,
    {
        let ticket = self.sequencer.issue();

        if query.chars().count() <= MIN_QUERY_CHARS {
            self.current.send_replace(Vec::new());
            return Some(Vec::new());
        }

        tokio::time::sleep(self.debounce).await;
        if !self.sequencer.is_current(ticket) {
            tracing::trace!(ticket, "Suggestion keystroke superseded before fetch");
            return None;
        }

        let suggestions = match source.search_orders(&OrderFilter::default()).await {
            Ok(listings) => build_suggestions(&listings, query),
            Err(e) => {
                tracing::warn!("Failed to load suggestions: {e}");
                Vec::new()
            }
        };

        // A slower fetch must not overwrite a newer keystroke's result
        if !self.sequencer.is_current(ticket) {
            tracing::trace!(ticket, "Suggestion result superseded after fetch");
            return None;
        }
        self.current.send_replace(suggestions.clone());
        Some(suggestions)
    }

    /// Picking a suggestion searches its original-case description at once.
    pub fn select(&self, suggestion: &Suggestion) -> SearchParams {
        self.cancel();
        SearchParams::quick(suggestion.original_description.clone())
    }

    /// Drops pending keystrokes and clears the list.
    pub fn cancel(&self) {
        self.sequencer.issue();
        self.current.send_replace(Vec::new());
    }
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
