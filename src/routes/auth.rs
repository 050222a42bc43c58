use askama::Template;
use axum::{
    extract::{Form, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use super::{pages::Notice, render, CurrentVisitor, HeaderView};
use crate::{
    error::AppResult,
    pet_api::{ApiError, RegisterRequest, GENERIC_FAILURE},
    validation::{validate_login, validate_registration, FieldErrors},
    AppState,
};

const BAD_CREDENTIALS: &str = "Неверный email или пароль";

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    header: HeaderView,
    email: String,
    errors: FieldErrors,
    notice: Option<Notice>,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    header: HeaderView,
    form: RegisterForm,
    errors: FieldErrors,
    notice: Option<Notice>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize, Default, Clone)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
    // Checkbox; present only when ticked
    pub confirm: Option<String>,
}

impl RegisterForm {
    fn to_request(&self) -> RegisterRequest {
        RegisterRequest {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            password_confirmation: self.password_confirmation.clone(),
            confirm: self.confirm.is_some(),
        }
    }
}

/// Logs the visitor in and stores the token and profile in its session.
pub(super) async fn sign_in(
    app_state: &AppState,
    visitor: &CurrentVisitor,
    email: &str,
    password: &str,
) -> Result<(), ApiError> {
    // Anonymous client: a rejected password must not touch the current session
    let login = app_state.api.login(email, password).await?;
    visitor.auth.login(&login.token, login.user.clone());
    visitor.auth.save_email(email);

    if login.user.is_none() {
        match visitor.api(app_state).current_user().await {
            Ok(user) => visitor.auth.save_user_data(&user),
            Err(e) => tracing::warn!("Logged in but failed to load the profile: {e}"),
        }
    }
    tracing::info!(user_id = ?visitor.auth.user_id(), "Visitor signed in");
    Ok(())
}

fn login_error(e: &ApiError) -> Notice {
    if e.is_unauthorized() || e.is_validation() {
        Notice::error(BAD_CREDENTIALS)
    } else {
        tracing::error!("Login request failed: {e}");
        Notice::error(GENERIC_FAILURE)
    }
}

pub async fn login_page(visitor: CurrentVisitor) -> AppResult<Response> {
    if visitor.auth.is_authenticated() {
        return Ok(Redirect::to("/profile").into_response());
    }
    Ok(render(LoginTemplate {
        header: HeaderView::from_session(&visitor.auth),
        email: visitor.auth.stored_email().unwrap_or_default(),
        errors: FieldErrors::new(),
        notice: None,
    })?
    .into_response())
}

pub async fn handle_login(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_string();
    let errors = validate_login(&email, &form.password);

    let notice = if errors.is_empty() {
        match sign_in(&app_state, &visitor, &email, &form.password).await {
            Ok(()) => return Ok(Redirect::to("/profile").into_response()),
            Err(e) => Some(login_error(&e)),
        }
    } else {
        None
    };

    Ok(render(LoginTemplate {
        header: HeaderView::from_session(&visitor.auth),
        email,
        errors,
        notice,
    })?
    .into_response())
}

pub async fn register_page(visitor: CurrentVisitor) -> AppResult<Response> {
    if visitor.auth.is_authenticated() {
        return Ok(Redirect::to("/profile").into_response());
    }
    Ok(render(RegisterTemplate {
        header: HeaderView::from_session(&visitor.auth),
        form: RegisterForm::default(),
        errors: FieldErrors::new(),
        notice: None,
    })?
    .into_response())
}

/// Registers, then signs the new account in.
pub async fn handle_register(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let request = form.to_request();
    let mut errors = validate_registration(&request);
    let mut notice = None;

    if errors.is_empty() {
        match app_state.api.register(&request).await {
            Ok(_) => {
                tracing::info!("Registration accepted");
                visitor.auth.save_email(&request.email);
                return match sign_in(&app_state, &visitor, &request.email, &request.password).await
                {
                    Ok(()) => Ok(Redirect::to("/profile").into_response()),
                    Err(e) => {
                        tracing::warn!("Registered but automatic login failed: {e}");
                        Ok(render(LoginTemplate {
                            header: HeaderView::from_session(&visitor.auth),
                            email: request.email,
                            errors: FieldErrors::new(),
                            notice: Some(Notice::error(
                                "Регистрация прошла, но вход не удался. Войдите вручную.",
                            )),
                        })?
                        .into_response())
                    }
                };
            }
            Err(e) if e.is_validation() => {
                errors = e.field_errors();
                if errors.is_empty() {
                    notice = Some(Notice::error(
                        e.server_message().unwrap_or("Ошибка валидации").to_string(),
                    ));
                }
            }
            Err(e) => {
                tracing::error!("Registration failed: {e}");
                notice = Some(Notice::error(GENERIC_FAILURE));
            }
        }
    }

    // Never echo passwords back into the page
    let form = RegisterForm {
        password: String::new(),
        password_confirmation: String::new(),
        ..form
    };
    Ok(render(RegisterTemplate {
        header: HeaderView::from_session(&visitor.auth),
        form,
        errors,
        notice,
    })?
    .into_response())
}

pub async fn handle_logout(visitor: CurrentVisitor) -> Redirect {
    visitor.auth.logout();
    Redirect::to("/")
}
