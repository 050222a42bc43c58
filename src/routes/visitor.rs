use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::{ops::Deref, sync::Arc};

use crate::{error::AppError, pet_api::PetApi, session::Visitor, AppState};

pub const SESSION_COOKIE: &str = "pet_board_sid";

/// Resolves the visitor for every request and issues the cookie for new ones.
pub async fn attach_visitor(
    State(app_state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let (visitor, created) = app_state.visitors.get_or_create(cookie_id.as_deref()).await;
    let id = visitor.id.clone();
    request.extensions_mut().insert(visitor);

    let response = next.run(request).await;
    if !created {
        return response;
    }

    let cookie = Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), response).into_response()
}

/// The visitor behind the current request.
#[derive(Clone)]
pub struct CurrentVisitor(pub Arc<Visitor>);

impl CurrentVisitor {
    /// API client signed in as this visitor.
    pub fn api(&self, app_state: &AppState) -> PetApi {
        app_state.api.with_session(&self.0.auth)
    }
}

impl Deref for CurrentVisitor {
    type Target = Visitor;

    fn deref(&self) -> &Visitor {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentVisitor
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(visitor) = parts.extensions.get::<Arc<Visitor>>() {
            return Ok(CurrentVisitor(visitor.clone()));
        }

        // Route mounted without the middleware; fall back to the cookie alone
        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
        let (visitor, _) = app_state.visitors.get_or_create(cookie_id.as_deref()).await;
        Ok(CurrentVisitor(visitor))
    }
}
