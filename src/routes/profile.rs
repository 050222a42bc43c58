// Personal account: profile, contact edits and the visitor's own ads

use askama::Template;
use axum::{
    extract::{Form, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{listing::read_multipart, pages::Notice, render, CurrentVisitor, HeaderView};
use crate::{
    error::AppResult,
    models::{format_date, Listing, ListingStatus, UserProfile},
    pet_api::{ListingUpdate, GENERIC_FAILURE},
    validation::{validate_field, validate_listing_update, validate_profile_phone, Field, FieldErrors},
    AppState,
};

const EDIT_PHOTO_FIELDS: [&str; 3] = ["photo1", "photo2", "photo3"];

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    header: HeaderView,
    user: UserProfile,
    registered_on: String,
    days_registered: i64,
    days_word: &'static str,
    ads: Vec<Listing>,
    found_count: usize,
    errors: FieldErrors,
    notice: Option<Notice>,
}

#[derive(Deserialize)]
pub struct ProfileQuery {
    done: Option<String>,
}

#[derive(Deserialize)]
pub struct ContactsForm {
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
}

/// Russian plural of "day" for `n`.
fn days_word(n: i64) -> &'static str {
    let n = n.abs();
    match (n % 10, n % 100) {
        (1, rem) if rem != 11 => "день",
        (2..=4, rem) if !(12..=14).contains(&rem) => "дня",
        _ => "дней",
    }
}

fn done_notice(code: &str) -> Option<Notice> {
    let text = match code {
        "contacts" => "Контактные данные успешно обновлены",
        "deleted" => "Объявление удалено",
        "edited" => "Объявление обновлено",
        _ => return None,
    };
    Some(Notice::success(text))
}

async fn render_profile(
    app_state: &AppState,
    visitor: &CurrentVisitor,
    errors: FieldErrors,
    notice: Option<Notice>,
) -> AppResult<Response> {
    let api = visitor.api(app_state);
    let (user, ads) = futures::join!(api.current_user(), api.current_user_orders());

    let user = match user {
        Ok(user) => {
            visitor.auth.save_user_data(&user);
            user
        }
        // The client has already signed the visitor out
        Err(e) if e.is_unauthorized() => return Ok(Redirect::to("/login").into_response()),
        Err(e) => {
            tracing::warn!("Failed to load profile, using the stored copy: {e}");
            visitor.auth.user_data().unwrap_or_default()
        }
    };
    let ads = match ads {
        Ok(ads) => ads,
        Err(e) if e.is_unauthorized() => return Ok(Redirect::to("/login").into_response()),
        Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Vec::new(),
        Err(e) => {
            tracing::warn!("Failed to load the visitor's ads: {e}");
            Vec::new()
        }
    };

    let days_registered = user
        .days_since_registration(chrono::Local::now().date_naive())
        .unwrap_or(0);
    let registered_on = match user.registration_date.as_deref() {
        Some(raw) => format_date(raw),
        None => "Не указана".to_string(),
    };
    let found_count = ads
        .iter()
        .filter(|ad| ad.status == ListingStatus::WasFound)
        .count();

    Ok(render(ProfileTemplate {
        header: HeaderView::from_session(&visitor.auth),
        registered_on,
        days_registered,
        days_word: days_word(days_registered),
        found_count,
        user,
        ads,
        errors,
        notice,
    })?
    .into_response())
}

pub async fn profile_page(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Query(query): Query<ProfileQuery>,
) -> AppResult<Response> {
    if !visitor.auth.is_authenticated() {
        return Ok(Redirect::to("/login").into_response());
    }
    let notice = query.done.as_deref().and_then(done_notice);
    render_profile(&app_state, &visitor, FieldErrors::new(), notice).await
}

pub async fn update_contacts(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Form(form): Form<ContactsForm>,
) -> AppResult<Response> {
    if !visitor.auth.is_authenticated() {
        return Ok(Redirect::to("/login").into_response());
    }
    let phone = form.phone.trim().to_string();
    let email = form.email.trim().to_string();

    let mut errors = FieldErrors::new();
    if !email.is_empty() && validate_field(Field::Email, &email).is_err() {
        errors.insert(
            "email".into(),
            "Введите корректный адрес электронной почты".into(),
        );
    }
    if !phone.is_empty() {
        if let Err(message) = validate_profile_phone(&phone) {
            errors.insert("phone".into(), message.into());
        }
    }
    if !errors.is_empty() {
        return render_profile(&app_state, &visitor, errors, None).await;
    }

    let stored = visitor.auth.user_data().unwrap_or_default();
    let api = visitor.api(&app_state);
    let mut patch = Map::new();

    if phone != stored.phone {
        if let Err(e) = api.update_phone(&phone).await {
            return contacts_failed(&app_state, &visitor, "phone", e).await;
        }
        patch.insert("phone".into(), Value::String(phone));
    }
    if email != stored.email {
        if let Err(e) = api.update_email(&email).await {
            return contacts_failed(&app_state, &visitor, "email", e).await;
        }
        visitor.auth.save_email(&email);
        patch.insert("email".into(), json!(email));
    }

    if patch.is_empty() {
        return Ok(Redirect::to("/profile").into_response());
    }
    visitor.auth.update_user_data(patch);
    tracing::info!("Contact details updated");
    Ok(Redirect::to("/profile?done=contacts").into_response())
}

async fn contacts_failed(
    app_state: &AppState,
    visitor: &CurrentVisitor,
    field: &str,
    e: crate::pet_api::ApiError,
) -> AppResult<Response> {
    if e.is_unauthorized() {
        return Ok(Redirect::to("/login").into_response());
    }
    tracing::warn!(field, "Contact update rejected: {e}");
    let mut errors = FieldErrors::new();
    let mut notice = None;
    match e.status() {
        Some(StatusCode::UNPROCESSABLE_ENTITY) | Some(StatusCode::BAD_REQUEST) => {
            errors = e.field_errors();
            if errors.is_empty() {
                errors.insert(field.to_string(), "Некорректное значение".into());
            }
        }
        Some(StatusCode::CONFLICT) => {
            errors.insert(
                "email".into(),
                "Этот email уже используется другим пользователем".into(),
            );
        }
        _ => notice = Some(Notice::error(GENERIC_FAILURE)),
    }
    render_profile(app_state, visitor, errors, notice).await
}

pub async fn delete_ad(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if !visitor.auth.is_authenticated() {
        return Ok(Redirect::to("/login").into_response());
    }
    match visitor.api(&app_state).delete_order(id).await {
        Ok(()) => {
            tracing::info!(id, "Listing deleted");
            Ok(Redirect::to("/profile?done=deleted").into_response())
        }
        Err(e) if e.is_unauthorized() => Ok(Redirect::to("/login").into_response()),
        Err(e) => {
            tracing::warn!(id, "Failed to delete listing: {e}");
            let notice = Notice::error(e.delete_message());
            render_profile(&app_state, &visitor, FieldErrors::new(), Some(notice)).await
        }
    }
}

pub async fn edit_ad(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    if !visitor.auth.is_authenticated() {
        return Ok(Redirect::to("/login").into_response());
    }
    let upload = read_multipart(multipart, &EDIT_PHOTO_FIELDS).await?;
    if !upload.errors.is_empty() {
        let text = upload.errors.into_values().collect::<Vec<_>>().join(". ");
        return render_profile(&app_state, &visitor, FieldErrors::new(), Some(Notice::error(text)))
            .await;
    }
    let (mut fields, photos) = (upload.fields, upload.photos);
    let update = ListingUpdate {
        mark: fields.remove("mark").unwrap_or_default().trim().to_string(),
        description: fields
            .remove("description")
            .unwrap_or_default()
            .trim()
            .to_string(),
        photos,
    };

    let errors = validate_listing_update(&update);
    if !errors.is_empty() {
        let text = errors.values().cloned().collect::<Vec<_>>().join(". ");
        return render_profile(&app_state, &visitor, FieldErrors::new(), Some(Notice::error(text)))
            .await;
    }

    match visitor.api(&app_state).update_order(id, update).await {
        Ok(()) => {
            tracing::info!(id, "Listing updated");
            Ok(Redirect::to("/profile?done=edited").into_response())
        }
        Err(e) if e.is_unauthorized() => Ok(Redirect::to("/login").into_response()),
        Err(e) => {
            tracing::warn!(id, "Failed to update listing: {e}");
            let text = e
                .field_errors()
                .into_values()
                .next()
                .unwrap_or_else(|| "Ошибка при сохранении объявления".to_string());
            render_profile(&app_state, &visitor, FieldErrors::new(), Some(Notice::error(text)))
                .await
        }
    }
}
