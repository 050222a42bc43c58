// Route definitions

use askama::Template;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{error::AppResult, session::AuthSession, AppState};

mod api;
mod auth;
mod listing;
mod pages;
mod profile;
mod visitor;

#[cfg(test)]
mod tests;

pub use visitor::{CurrentVisitor, SESSION_COOKIE};

pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/suggestions", get(api::suggestions))
        .route("/search", get(api::search))
        .route("/search/latest", get(api::latest_search))
        .route("/session", get(api::session))
        .route("/session/events", get(api::session_events));

    Router::new()
        .route("/", get(pages::main_page))
        .route("/search", get(pages::search_page))
        .route("/suggestions/:id", get(pages::select_suggestion))
        .route("/pet/:id", get(pages::pet_page))
        .route("/subscribe", post(pages::subscribe))
        .route("/login", get(auth::login_page).post(auth::handle_login))
        .route("/register", get(auth::register_page).post(auth::handle_register))
        .route("/logout", post(auth::handle_logout))
        .route(
            "/add",
            get(listing::add_page)
                .post(listing::handle_add)
                .layer(DefaultBodyLimit::max(listing::UPLOAD_BODY_LIMIT)),
        )
        .route("/profile", get(profile::profile_page))
        .route("/profile/contacts", post(profile::update_contacts))
        .route("/profile/ads/:id/delete", post(profile::delete_ad))
        .route(
            "/profile/ads/:id/edit",
            post(profile::edit_ad).layer(DefaultBodyLimit::max(listing::UPLOAD_BODY_LIMIT)),
        )
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            visitor::attach_visitor,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// What the page header needs to know about the visitor.
#[derive(Debug, Clone, Default)]
pub struct HeaderView {
    pub authenticated: bool,
    pub user_name: String,
}

impl HeaderView {
    pub fn from_session(session: &AuthSession) -> Self {
        Self {
            authenticated: session.is_authenticated(),
            user_name: session.user_name(),
        }
    }
}

fn render<T: Template>(template: T) -> AppResult<Html<String>> {
    Ok(Html(template.render()?))
}
