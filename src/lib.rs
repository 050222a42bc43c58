use anyhow::{Context, Result};
use axum::{extract::FromRef, Router};
use reqwest::Client;
use std::sync::Arc;
use tower_http::services::ServeDir;

pub mod config;
pub mod error;
pub mod models;
pub mod pet_api;
pub mod routes;
pub mod search;
pub mod session;
pub mod telemetry;
pub mod validation;

#[cfg(test)]
mod test_support;

use config::Settings;
use pet_api::PetApi;
use session::VisitorRegistry;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Arc<Settings>,
    // Anonymous client; handlers bind it to the visitor's session
    pub api: PetApi,
    pub visitors: Arc<VisitorRegistry>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        let http_client = Arc::new(
            Client::builder()
                .user_agent(concat!("pet_board/", env!("CARGO_PKG_VERSION")))
                .timeout(settings.request_timeout())
                .build()
                .context("Failed to build shared reqwest client")?,
        );

        if let Some(dir) = &settings.session_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create session dir {}", dir.display()))?;
        }

        let api = PetApi::new(http_client, &settings);
        let visitors = Arc::new(VisitorRegistry::new(
            settings.session_dir.clone(),
            settings.suggestion_debounce(),
            settings.visitor_idle(),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            api,
            visitors,
        })
    }
}

/// Full application: pages, JSON endpoints and static assets.
pub fn app(state: AppState) -> Router {
    let static_dir = state.settings.static_dir.clone();
    routes::create_router(state).nest_service("/static", ServeDir::new(static_dir))
}
