// JSON endpoints used by the page scripts

use axum::{
    extract::{Query, RawQuery, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};

use super::CurrentVisitor;
use crate::{
    models::UserProfile,
    search::{
        paginator::PageNav,
        query::{parse_page, parse_query},
        SearchOutcome,
    },
    session::{AuthEvent, AuthSession, AuthState, RegistrationStatus},
    AppState,
};

#[derive(Deserialize)]
pub struct SuggestionsQuery {
    #[serde(default)]
    q: String,
}

/// One keystroke. 204 when a newer keystroke from the same visitor superseded it.
pub async fn suggestions(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Query(query): Query<SuggestionsQuery>,
) -> Response {
    let api = visitor.api(&app_state);
    match visitor.suggestions.input(&api, &query.q).await {
        Some(suggestions) => Json(suggestions).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(flatten)]
    outcome: SearchOutcome,
    nav: PageNav,
    // A newer search from this visitor is still running
    loading: bool,
}

impl SearchResponse {
    fn new(outcome: SearchOutcome, loading: bool) -> Self {
        let nav = PageNav::new(outcome.page.page, outcome.page.total_pages);
        Self {
            outcome,
            nav,
            loading,
        }
    }
}

/// Same search as the `/search` page, as JSON.
pub async fn search(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    RawQuery(query): RawQuery,
) -> Json<SearchResponse> {
    let query = query.unwrap_or_default();
    let params = parse_query(&query);
    let page = parse_page(&query);
    let mode = params.mode();

    let api = visitor.api(&app_state);
    let outcome = visitor
        .search
        .run(&api, &params, mode, page, app_state.settings.page_size)
        .await;
    Json(SearchResponse::new(outcome, visitor.search.is_loading()))
}

/// The visitor's most recently applied search, for a page that reloads mid-flight.
/// 204 before the first search.
pub async fn latest_search(visitor: CurrentVisitor) -> Response {
    match visitor.search.latest() {
        Some(outcome) => {
            Json(SearchResponse::new(outcome, visitor.search.is_loading())).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    state: AuthState,
    user_name: String,
    user_id: Option<i64>,
    user: Option<UserProfile>,
    registration: RegistrationStatus,
}

impl SessionView {
    fn of(session: &AuthSession) -> Self {
        Self {
            state: session.state(),
            user_name: session.user_name(),
            user_id: session.user_id(),
            user: session.user_data(),
            registration: session.registration_status(),
        }
    }
}

pub async fn session(visitor: CurrentVisitor) -> Json<SessionView> {
    Json(SessionView::of(&visitor.auth))
}

fn event_for(change: AuthEvent, session: &AuthSession) -> Event {
    let name = match change {
        AuthEvent::AuthChange(_) => "authChange",
        AuthEvent::UserDataUpdate => "userDataUpdate",
    };
    // Listeners get the re-derived session, not just the event
    Event::default()
        .event(name)
        .json_data(SessionView::of(session))
        .unwrap_or_else(|e| {
            tracing::error!("Failed to encode session event: {e}");
            Event::default().event(name)
        })
}

/// Server-sent stream of the visitor's auth changes, so open tabs re-render
/// their header without polling.
pub async fn session_events(
    visitor: CurrentVisitor,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = visitor.auth.clone();
    let receiver = session.subscribe();

    let events = stream::unfold(
        (receiver, session),
        |(mut receiver, session): (broadcast::Receiver<AuthEvent>, AuthSession)| async move {
            loop {
                match receiver.recv().await {
                    Ok(change) => {
                        let event = event_for(change, &session);
                        return Some((Ok(event), (receiver, session)));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Session event listener lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    );

    Sse::new(events).keep_alive(KeepAlive::default())
}
