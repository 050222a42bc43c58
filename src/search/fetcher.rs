use axum::async_trait;

use crate::{
    models::{Listing, SearchMode, SearchParams},
    pet_api::ApiError,
};

/// API-side filter for `GET /search/order`; empty fields are not sent.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    pub district: String,
    pub kind: String,
}

impl OrderFilter {
    pub fn is_empty(&self) -> bool {
        self.district.is_empty() && self.kind.is_empty()
    }
}

/// Anything that can answer the bulk/filtered listing query.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn search_orders(&self, filter: &OrderFilter) -> Result<Vec<Listing>, ApiError>;
}

#[derive(Debug, Default, Clone)]
pub struct FetchOutcome {
    pub listings: Vec<Listing>,
    // The request failed; listings is empty and the page shows "no results"
    pub failed: bool,
}

/// Retrieves the candidate listings for a search.
///
/// With no parameters the unfiltered bulk set is returned. Quick search pulls
/// the bulk set and filters descriptions locally; advanced search lets the API
/// filter by district and kind. Failures are logged and yield an empty outcome.
pub async fn fetch_candidates<S>(source: &S, params: &SearchParams, mode: SearchMode) -> FetchOutcome
where
    S: ListingSource + ?Sized,
{
    let (filter, local_query) = if params.is_empty() {
        (OrderFilter::default(), None)
    } else if mode == SearchMode::Quick && !params.description.is_empty() {
        (OrderFilter::default(), Some(params.description.as_str()))
    } else {
        (
            OrderFilter {
                district: params.district.clone(),
                kind: params.animal_type.clone(),
            },
            None,
        )
    };

    match source.search_orders(&filter).await {
        Ok(listings) => {
            let listings = match local_query {
                Some(query) => filter_by_description(listings, query),
                None => listings,
            };
            tracing::debug!(count = listings.len(), ?mode, "Fetched search candidates");
            FetchOutcome {
                listings,
                failed: false,
            }
        }
        Err(e) => {
            tracing::warn!(?params, ?mode, "Search request failed: {e}");
            FetchOutcome {
                listings: Vec::new(),
                failed: true,
            }
        }
    }
}

/// Case-insensitive substring match on the description.
pub fn filter_by_description(listings: Vec<Listing>, query: &str) -> Vec<Listing> {
    let needle = query.to_lowercase();
    listings
        .into_iter()
        .filter(|listing| listing.description.to_lowercase().contains(&needle))
        .collect()
}
