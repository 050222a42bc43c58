// Form checks run before anything is sent to the API.
// Messages are shown inline next to the offending field.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::pet_api::{ListingUpdate, NewListing, PhotoUpload, RegisterRequest};

/// Field name -> message. Local checks and server-side 422s fill the same map.
pub type FieldErrors = BTreeMap<String, String>;

pub const NAME_MESSAGE: &str = "Имя должно содержать только кириллицу, пробелы и дефисы";
pub const PHONE_MESSAGE: &str = "Некорректный номер телефона";
pub const EMAIL_MESSAGE: &str = "Некорректный email";
pub const PASSWORD_MESSAGE: &str =
    "Пароль должен содержать минимум 7 символов, 1 цифру, 1 строчную и 1 заглавную букву";
pub const PASSWORD_MISMATCH: &str = "Пароли не совпадают";
pub const TERMS_REQUIRED: &str = "Необходимо согласие на обработку персональных данных";

const MIN_PASSWORD_CHARS: usize = 7;
const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
pub const PHOTO_SIZE_MESSAGE: &str = "Размер файла не должен превышать 5MB";

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[а-яА-ЯёЁ\s-]+$").expect("valid name pattern"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9\s\-()]+$").expect("valid phone pattern"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));
static MARK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid mark pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Phone,
    Email,
    Password,
}

impl Field {
    pub fn key(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Phone => "phone",
            Field::Email => "email",
            Field::Password => "password",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Field::Name => NAME_MESSAGE,
            Field::Phone => PHONE_MESSAGE,
            Field::Email => EMAIL_MESSAGE,
            Field::Password => PASSWORD_MESSAGE,
        }
    }
}

pub fn validate_field(field: Field, value: &str) -> Result<(), &'static str> {
    let valid = match field {
        Field::Name => NAME_RE.is_match(value),
        Field::Phone => PHONE_RE.is_match(value),
        Field::Email => EMAIL_RE.is_match(value),
        Field::Password => is_strong_password(value),
    };
    if valid { Ok(()) } else { Err(field.message()) }
}

/// At least seven characters with an ASCII digit, lowercase and uppercase letter.
fn is_strong_password(value: &str) -> bool {
    value.chars().count() >= MIN_PASSWORD_CHARS
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().any(|c| c.is_ascii_lowercase())
        && value.chars().any(|c| c.is_ascii_uppercase())
}

/// Runs every rule and collects the failures.
pub fn validate_form(fields: &[(Field, &str)]) -> FieldErrors {
    fields
        .iter()
        .filter_map(|(field, value)| {
            validate_field(*field, value)
                .err()
                .map(|message| (field.key().to_string(), message.to_string()))
        })
        .collect()
}

/// Digits only.
pub fn format_phone_number(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

pub fn validate_registration(request: &RegisterRequest) -> FieldErrors {
    let mut errors = validate_form(&[
        (Field::Name, request.name.as_str()),
        (Field::Phone, request.phone.as_str()),
        (Field::Email, request.email.as_str()),
        (Field::Password, request.password.as_str()),
    ]);
    if request.password != request.password_confirmation {
        errors.insert("password_confirmation".into(), PASSWORD_MISMATCH.into());
    }
    if !request.confirm {
        errors.insert("confirm".into(), TERMS_REQUIRED.into());
    }
    errors
}

pub fn validate_login(email: &str, password: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if email.trim().is_empty() {
        errors.insert("email".into(), "Введите email".into());
    } else if let Err(message) = validate_field(Field::Email, email) {
        errors.insert("email".into(), message.into());
    }
    if password.is_empty() {
        errors.insert("password".into(), "Введите пароль".into());
    }
    errors
}

/// New-ad checks. Signed-in authors are not held to the Cyrillic name rule
/// and only need a password when they also ask to register.
pub fn validate_new_listing(listing: &NewListing, authenticated: bool) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let mut fail = |key: &str, message: &str| {
        errors.entry(key.to_string()).or_insert_with(|| message.to_string());
    };

    if listing.kind.trim().is_empty() {
        fail("kind", "Укажите вид животного");
    }
    let description_chars = listing.description.trim().chars().count();
    if description_chars == 0 {
        fail("description", "Введите описание");
    } else if !(10..=500).contains(&description_chars) {
        fail("description", "Описание должно содержать от 10 до 500 символов");
    }
    if listing.district.is_empty() {
        fail("district", "Выберите район");
    }
    if listing.photos.is_empty() {
        fail("photo1", "Добавьте хотя бы одну фотографию");
    }
    for photo in &listing.photos {
        if let Err(message) = validate_photo(photo) {
            fail(&photo.field, message);
        }
    }

    if listing.name.trim().is_empty() {
        fail("name", "Введите ваше имя");
    } else if !authenticated && validate_field(Field::Name, &listing.name).is_err() {
        fail("name", NAME_MESSAGE);
    }
    if listing.phone.trim().is_empty() {
        fail("phone", "Введите телефон");
    } else if validate_field(Field::Phone, &listing.phone).is_err() {
        fail("phone", PHONE_MESSAGE);
    }
    if listing.email.trim().is_empty() {
        fail("email", "Введите email");
    } else if validate_field(Field::Email, &listing.email).is_err() {
        fail("email", EMAIL_MESSAGE);
    }
    if let Err(message) = validate_mark(&listing.mark) {
        fail("mark", message);
    }

    if listing.register {
        if listing.password.trim().is_empty() {
            fail("password", "Введите пароль");
        } else if !authenticated && !is_strong_password(&listing.password) {
            fail("password", PASSWORD_MESSAGE);
        }
        if !authenticated && listing.password != listing.password_confirmation {
            fail("password_confirmation", PASSWORD_MISMATCH);
        }
    }

    if !listing.confirm {
        fail("confirm", TERMS_REQUIRED);
    }
    errors
}

pub fn validate_listing_update(update: &ListingUpdate) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if update.description.trim().is_empty() {
        errors.insert("description".into(), "Введите описание".into());
    }
    if let Err(message) = validate_mark(&update.mark) {
        errors.insert("mark".into(), message.into());
    }
    for photo in &update.photos {
        if let Err(message) = validate_photo(photo) {
            errors.insert(photo.field.clone(), message.into());
        }
    }
    errors
}

/// Optional chip/brand number: latin letters, digits and hyphens.
pub fn validate_mark(mark: &str) -> Result<(), &'static str> {
    let mark = mark.trim();
    if mark.is_empty() || MARK_RE.is_match(mark) {
        Ok(())
    } else {
        Err("Номер клейма/чипа может содержать только латинские буквы, цифры и дефисы")
    }
}

pub fn validate_photo(photo: &PhotoUpload) -> Result<(), &'static str> {
    let is_png = match photo.content_type.as_deref() {
        Some(content_type) => content_type == "image/png",
        None => photo.file_name.to_lowercase().ends_with(".png"),
    };
    if !is_png {
        return Err("Формат файла должен быть PNG");
    }
    if photo.bytes.len() > MAX_PHOTO_BYTES {
        return Err(PHOTO_SIZE_MESSAGE);
    }
    Ok(())
}

/// Profile contact edit: the phone must carry at least ten digits.
pub fn validate_profile_phone(phone: &str) -> Result<String, &'static str> {
    let digits = format_phone_number(phone);
    if digits.len() < MIN_PHONE_DIGITS {
        return Err("Номер телефона должен содержать не менее 10 цифр");
    }
    Ok(phone.trim().to_string())
}
