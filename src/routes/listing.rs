// "Add listing" form, optionally registering its author on the way

use askama::Template;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use std::collections::HashMap;

use super::{pages::Notice, render, CurrentVisitor, HeaderView};
use crate::{
    error::{AppError, AppResult},
    pet_api::{NewListing, PhotoUpload, RegisterRequest},
    validation::{validate_new_listing, FieldErrors, MAX_PHOTO_BYTES, PHOTO_SIZE_MESSAGE},
    AppState,
};

const PHOTO_FIELDS: [&str; 3] = ["photo1", "photo2", "photo3"];

/// Request body cap for the photo forms: three full-size photos plus the text fields.
pub const UPLOAD_BODY_LIMIT: usize = PHOTO_FIELDS.len() * MAX_PHOTO_BYTES + 1024 * 1024;

#[derive(Template)]
#[template(path = "add.html")]
struct AddTemplate {
    header: HeaderView,
    form: AddForm,
    errors: FieldErrors,
    notice: Option<Notice>,
    districts: &'static [&'static str],
}

/// Values echoed back into the form after a failed submit.
#[derive(Debug, Default, Clone)]
pub struct AddForm {
    pub kind: String,
    pub description: String,
    pub district: String,
    pub mark: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub register: bool,
    pub confirm: bool,
}

impl AddForm {
    pub fn district_is(&self, district: &str) -> bool {
        self.district == district
    }

    fn from_listing(listing: &NewListing) -> Self {
        Self {
            kind: listing.kind.clone(),
            description: listing.description.clone(),
            district: listing.district.clone(),
            mark: listing.mark.clone(),
            name: listing.name.clone(),
            phone: listing.phone.clone(),
            email: listing.email.clone(),
            register: listing.register,
            confirm: listing.confirm,
        }
    }
}

/// A parsed multipart form. `errors` holds parts that could not be read,
/// keyed by their field name.
#[derive(Debug, Default)]
pub(super) struct UploadForm {
    pub fields: HashMap<String, String>,
    pub photos: Vec<PhotoUpload>,
    pub errors: FieldErrors,
}

fn read_failed(e: MultipartError) -> AppError {
    AppError::InternalServerError(anyhow::Error::new(e))
}

/// Text fields by name plus the non-empty file parts named in `photo_fields`.
///
/// Hitting the body limit stops the read and reports the part being read as
/// too large; the rest of the stream is unreadable after that.
pub(super) async fn read_multipart(
    mut multipart: Multipart,
    photo_fields: &[&str],
) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                tracing::warn!("Upload exceeded the body limit between parts: {e}");
                form.errors
                    .insert(photo_fields[0].to_string(), PHOTO_SIZE_MESSAGE.to_string());
                break;
            }
            Err(e) => return Err(read_failed(e)),
        };
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if photo_fields.contains(&name.as_str()) {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = match field.bytes().await {
                Ok(bytes) => bytes,
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                    tracing::warn!(field = %name, "Photo exceeded the body limit: {e}");
                    form.errors.insert(name, PHOTO_SIZE_MESSAGE.to_string());
                    break;
                }
                Err(e) => return Err(read_failed(e)),
            };
            // Untouched file inputs arrive as empty parts
            if !bytes.is_empty() {
                form.photos.push(PhotoUpload {
                    field: name,
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
        } else {
            match field.text().await {
                Ok(value) => {
                    form.fields.insert(name, value);
                }
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                    tracing::warn!(field = %name, "Form field exceeded the body limit: {e}");
                    form.errors
                        .insert(photo_fields[0].to_string(), PHOTO_SIZE_MESSAGE.to_string());
                    break;
                }
                Err(e) => return Err(read_failed(e)),
            }
        }
    }
    Ok(form)
}

fn checkbox(fields: &HashMap<String, String>, name: &str) -> bool {
    fields
        .get(name)
        .is_some_and(|v| matches!(v.as_str(), "on" | "1" | "true"))
}

fn new_listing(mut fields: HashMap<String, String>, photos: Vec<PhotoUpload>) -> NewListing {
    let mut take = |name: &str| fields.remove(name).unwrap_or_default();
    let listing = NewListing {
        kind: take("kind").trim().to_string(),
        description: take("description").trim().to_string(),
        district: take("district"),
        mark: take("mark").trim().to_string(),
        name: take("name").trim().to_string(),
        phone: take("phone").trim().to_string(),
        email: take("email").trim().to_string(),
        password: take("password"),
        password_confirmation: take("password_confirmation"),
        confirm: false,
        register: false,
        photos,
    };
    NewListing {
        confirm: checkbox(&fields, "confirm"),
        register: checkbox(&fields, "register"),
        ..listing
    }
}

pub async fn add_page(visitor: CurrentVisitor) -> AppResult<impl IntoResponse> {
    // Signed-in authors get their contacts pre-filled
    let form = match visitor.auth.user_data() {
        Some(user) => AddForm {
            name: user.name,
            phone: user.phone,
            email: user.email,
            ..AddForm::default()
        },
        None => AddForm::default(),
    };
    render(AddTemplate {
        header: HeaderView::from_session(&visitor.auth),
        form,
        errors: FieldErrors::new(),
        notice: None,
        districts: crate::models::DISTRICTS,
    })
}

struct Rejected {
    errors: FieldErrors,
    notice: Option<Notice>,
}

impl Rejected {
    fn field(name: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), message.to_string());
        Self {
            errors,
            notice: None,
        }
    }

    fn notice(message: impl Into<String>) -> Self {
        Self {
            errors: FieldErrors::new(),
            notice: Some(Notice::error(message)),
        }
    }
}

/// Registers or signs in the author when asked to, then creates the ad.
async fn submit(
    app_state: &AppState,
    visitor: &CurrentVisitor,
    listing: NewListing,
) -> Result<i64, Rejected> {
    let authenticated = visitor.auth.is_authenticated();
    let errors = validate_new_listing(&listing, authenticated);
    if !errors.is_empty() {
        return Err(Rejected {
            errors,
            notice: None,
        });
    }

    if listing.register {
        if !authenticated {
            let request = RegisterRequest {
                name: listing.name.clone(),
                phone: listing.phone.clone(),
                email: listing.email.clone(),
                password: listing.password.clone(),
                password_confirmation: listing.password_confirmation.clone(),
                confirm: listing.confirm,
            };
            match app_state.api.register(&request).await {
                Ok(_) => tracing::info!("Registered the ad's author"),
                // Existing account: the password below decides
                Err(e) if e.field_errors().contains_key("email") => {
                    tracing::info!("Author already registered, signing in instead");
                }
                Err(e) => {
                    let detail = e.server_message().unwrap_or("ошибка сервера").to_string();
                    return Err(Rejected::notice(format!("Ошибка регистрации: {detail}")));
                }
            }
        }

        if let Err(e) = super::auth::sign_in(app_state, visitor, &listing.email, &listing.password).await
        {
            tracing::warn!("Author sign-in failed: {e}");
            let message = if authenticated {
                "Неверный пароль"
            } else {
                "Введите правильный пароль для этого аккаунта"
            };
            return Err(Rejected::field("password", message));
        }
    }

    match visitor.api(app_state).create_order(listing).await {
        Ok(id) => Ok(id),
        Err(e) if e.is_validation() => {
            let errors = e.field_errors();
            if errors.is_empty() {
                Err(Rejected::notice("Ошибка при создании объявления"))
            } else {
                Err(Rejected {
                    errors,
                    notice: None,
                })
            }
        }
        Err(e) => {
            tracing::error!("Failed to create listing: {e}");
            Err(Rejected::notice("Ошибка при создании объявления"))
        }
    }
}

pub async fn handle_add(
    State(app_state): State<AppState>,
    visitor: CurrentVisitor,
    multipart: Multipart,
) -> AppResult<Response> {
    let upload = read_multipart(multipart, &PHOTO_FIELDS).await?;
    let listing = new_listing(upload.fields, upload.photos);
    let form = AddForm::from_listing(&listing);
    let register = listing.register;

    let outcome = if upload.errors.is_empty() {
        submit(&app_state, &visitor, listing).await
    } else {
        // A truncated upload is never submitted; show what is wrong with the rest too
        let mut errors = validate_new_listing(&listing, visitor.auth.is_authenticated());
        errors.extend(upload.errors);
        Err(Rejected {
            errors,
            notice: None,
        })
    };

    match outcome {
        Ok(id) => {
            tracing::info!(id, "Listing created");
            let target = if register {
                "/profile".to_string()
            } else {
                format!("/pet/{id}")
            };
            Ok(Redirect::to(&target).into_response())
        }
        Err(rejected) => Ok(render(AddTemplate {
            header: HeaderView::from_session(&visitor.auth),
            form,
            errors: rejected.errors,
            notice: rejected.notice,
            districts: crate::models::DISTRICTS,
        })?
        .into_response()),
    }
}
