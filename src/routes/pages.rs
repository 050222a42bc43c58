// Public pages: main, search results, pet details, newsletter

use askama::Template;
use axum::{
    extract::{Form, Path, RawQuery, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use super::{render, CurrentVisitor, HeaderView};
use crate::{
    error::{AppError, AppResult},
    models::{Listing, SearchMode, SearchParams, SliderPet, DISTRICTS},
    pet_api::GENERIC_FAILURE,
    search::{
        paginator::PageNav,
        query::{parse_page, parse_query},
        SearchOutcome,
    },
    validation::{validate_field, Field},
    AppState,
};

const RECENT_COUNT: usize = 6;

/// Success or failure banner under a form.
#[derive(Debug, Clone)]
pub struct Notice {
    pub success: bool,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

#[derive(Template)]
#[template(path = "main.html")]
struct MainTemplate {
    header: HeaderView,
    slider: Vec<SliderPet>,
    recent: Vec<Listing>,
    // Newsletter result
    notice: Option<Notice>,
    subscribe_email: String,
}

#[derive(Template)]
#[template(path = "search.html")]
struct SearchTemplate {
    header: HeaderView,
    params: SearchParams,
    mode: SearchMode,
    districts: &'static [&'static str],
    outcome: SearchOutcome,
    nav: NavView,
}

#[derive(Template)]
#[template(path = "pet.html")]
struct PetTemplate {
    header: HeaderView,
    pet: Listing,
}

pub struct NavLinkView {
    pub number: usize,
    pub href: String,
    pub active: bool,
    pub gap: bool,
}

/// Pagination controls with the hrefs already built from the search params.
pub struct NavView {
    pub visible: bool,
    pub links: Vec<NavLinkView>,
    pub prev_href: Option<String>,
    pub next_href: Option<String>,
}

impl NavView {
    pub fn new(params: &SearchParams, nav: &PageNav) -> Self {
        Self {
            visible: nav.is_visible(),
            links: nav
                .links
                .iter()
                .map(|link| NavLinkView {
                    number: link.number,
                    href: if link.gap {
                        String::new()
                    } else {
                        params.page_href(link.number)
                    },
                    active: link.active,
                    gap: link.gap,
                })
                .collect(),
            prev_href: nav.prev.map(|p| params.page_href(p)),
            next_href: nav.next.map(|p| params.page_href(p)),
        }
    }
}

/// Newest first by parsed date; undated listings go last.
fn most_recent(mut listings: Vec<Listing>, count: usize) -> Vec<Listing> {
    listings.sort_by(|a, b| b.parsed_date().cmp(&a.parsed_date()));
    listings.truncate(count);
    listings
}

async fn render_main(
    app_state: &AppState,
    visitor: &CurrentVisitor,
    subscription: Option<Notice>,
    subscribe_email: String,
) -> AppResult<Response> {
    let api = visitor.api(app_state);
    let (slider, recent) = futures::join!(api.slider(), api.recent_pets());

    let slider = slider.unwrap_or_else(|e| {
        tracing::warn!("Failed to load slider: {e}");
        Vec::new()
    });
    let recent = recent.map(|l| most_recent(l, RECENT_COUNT)).unwrap_or_else(|e| {
        tracing::warn!("Failed to load recent pets: {e}");
        Vec::new()
    });

    Ok(render(MainTemplate {
        header: HeaderView::from_session(&visitor.auth),
        slider,
        recent,
        notice: subscription,
        subscribe_email,
    })?
    .into_response())
}

pub async fn main_page(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
) -> AppResult<Response> {
    render_main(&app_state, &visitor, None, String::new()).await
}

/// `GET /search`: everything on the page is derived from the query string.
pub async fn search_page(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    RawQuery(query): RawQuery,
) -> AppResult<impl IntoResponse> {
    let query = query.unwrap_or_default();
    let params = parse_query(&query);
    let page = parse_page(&query);
    let mode = params.mode();
    tracing::info!(?params, page, ?mode, "Search page");

    // The visitor left the quick-search box; drop any pending suggestions
    visitor.suggestions.cancel();

    let api = visitor.api(&app_state);
    let outcome = visitor
        .search
        .run(&api, &params, mode, page, app_state.settings.page_size)
        .await;
    let nav = NavView::new(&params, &PageNav::new(outcome.page.page, outcome.page.total_pages));

    render(SearchTemplate {
        header: HeaderView::from_session(&visitor.auth),
        params,
        mode,
        districts: DISTRICTS,
        outcome,
        nav,
    })
}

/// Picking a suggestion runs a quick search on its original-case description.
pub async fn select_suggestion(visitor: CurrentVisitor, Path(id): Path<i64>) -> Redirect {
    let current = visitor.suggestions.current();
    match current.iter().find(|s| s.id == id) {
        Some(suggestion) => {
            let params = visitor.suggestions.select(suggestion);
            Redirect::to(&params.search_href(SearchMode::Quick))
        }
        None => {
            tracing::debug!(id, "Selected suggestion is no longer listed");
            Redirect::to("/search")
        }
    }
}

pub async fn pet_page(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let api = visitor.api(&app_state);
    let pet = api
        .pet_details(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("pet {id}")))?;

    render(PetTemplate {
        header: HeaderView::from_session(&visitor.auth),
        pet,
    })
}

#[derive(Deserialize)]
pub struct SubscribeForm {
    #[serde(default)]
    email: String,
}

pub async fn subscribe(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Form(form): Form<SubscribeForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_string();

    let notice = if let Err(message) = validate_field(Field::Email, &email) {
        Notice::error(message)
    } else {
        match visitor.api(&app_state).subscribe(&email).await {
            Ok(()) => {
                tracing::info!("Newsletter subscription accepted");
                Notice::success("Вы успешно подписались на рассылку!")
            }
            Err(e) if e.is_validation() => Notice::error(
                e.field_errors()
                    .remove("email")
                    .unwrap_or_else(|| "Ошибка валидации".to_string()),
            ),
            Err(e) => {
                tracing::warn!("Subscription failed: {e}");
                Notice::error(e.server_message().unwrap_or(GENERIC_FAILURE))
            }
        }
    };

    let keep = if notice.success { String::new() } else { email };
    render_main(&app_state, &visitor, Some(notice), keep).await
}
