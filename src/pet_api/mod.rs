// Client for the remote pet classifieds REST API.
// Every listing that comes back has its image paths resolved to absolute URLs.

use axum::async_trait;
use reqwest::{
    header::ACCEPT,
    multipart::{Form, Part},
    Client, Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::Arc;
use url::form_urlencoded;

use crate::{
    config::Settings,
    models::{
        CreatedData, DataEnvelope, Listing, LoginData, OrdersData, PetData, SliderData, SliderPet,
        UserProfile,
    },
    search::fetcher::{ListingSource, OrderFilter},
    session::AuthSession,
};

mod error;

pub use error::{ApiError, DELETE_FORBIDDEN, GENERIC_FAILURE};


// Uploaded image forwarded as one multipart part (photo1..photo3)
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub confirm: bool,
}

// New ad submitted through the "add listing" form, optionally registering its author
#[derive(Debug, Clone, Default)]
pub struct NewListing {
    pub kind: String,
    pub description: String,
    pub district: String,
    pub mark: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub confirm: bool,
    pub register: bool,
    pub password: String,
    pub password_confirmation: String,
    pub photos: Vec<PhotoUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingUpdate {
    pub mark: String,
    pub description: String,
    pub photos: Vec<PhotoUpload>,
}

enum Payload {
    Empty,
    Json(Value),
    Multipart(Form),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrdersResponse {
    Envelope(DataEnvelope<OrdersData>),
    Bare(Vec<Listing>),
}

#[derive(Clone)]
pub struct PetApi {
    http_client: Arc<Client>,
    api_host: Arc<str>,
    image_base_url: Arc<str>,
    // Token source for requests, and the session to sign out on a 401
    session: Option<AuthSession>,
}

impl PetApi {
    pub fn new(http_client: Arc<Client>, settings: &Settings) -> Self {
        Self {
            http_client,
            api_host: settings.api_host.trim_end_matches('/').into(),
            image_base_url: settings.image_base_url.trim_end_matches('/').into(),
            session: None,
        }
    }

    /// Same client, authenticated as (and reporting 401s to) the given session.
    pub fn with_session(&self, session: &AuthSession) -> Self {
        Self {
            session: Some(session.clone()),
            ..self.clone()
        }
    }

    /// Absolute URLs pass through; `/relative` paths get the image base; anything else is dropped.
    pub fn resolve_image_url(&self, path: &str) -> Option<String> {
        if path.starts_with("http") {
            return Some(path.to_string());
        }
        let clean = path.trim();
        if !clean.starts_with('/') {
            tracing::warn!(path = clean, "Image path does not start with '/'");
            return None;
        }
        Some(format!("{}{}", self.image_base_url, clean))
    }

    fn resolve_listing(&self, mut listing: Listing) -> Listing {
        listing.photo = self.resolve_all(&listing.photo);
        listing.photos = self.resolve_all(&listing.photos);
        listing
    }

    fn resolve_all(&self, paths: &[String]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|p| self.resolve_image_url(p))
            .collect()
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        payload: Payload,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.api_host, endpoint);
        tracing::debug!(%method, %url, "API request");

        let mut builder = self
            .http_client
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");
        if let Some(token) = self.session.as_ref().and_then(AuthSession::token) {
            builder = builder.bearer_auth(token);
        }
        builder = match payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Multipart(form) => builder.multipart(form),
        };

        let network = |source| ApiError::Network {
            endpoint: endpoint.to_string(),
            source,
        };
        let response = builder.send().await.map_err(network)?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let bytes = response.bytes().await.map_err(network)?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => value,
                Err(source) if status.is_success() => {
                    return Err(ApiError::Malformed {
                        endpoint: endpoint.to_string(),
                        source,
                    });
                }
                // Error pages are often HTML; keep the text for the log
                Err(_) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            }
        };

        if !status.is_success() {
            tracing::warn!(%method, %url, %status, "API error response");
            tracing::debug!(%url, body = %body, "API error body");
            if status == StatusCode::UNAUTHORIZED {
                if let Some(session) = self.session.as_ref().filter(|s| s.is_authenticated()) {
                    tracing::warn!("API rejected the session token, signing the visitor out");
                    session.invalidate();
                }
            }
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }

        Ok(body)
    }

    fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value).map_err(|source| ApiError::Malformed {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    fn decode_orders(&self, endpoint: &str, value: Value) -> Result<Vec<Listing>, ApiError> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        let orders = match Self::decode::<OrdersResponse>(endpoint, value)? {
            OrdersResponse::Envelope(envelope) => envelope.data.orders,
            OrdersResponse::Bare(orders) => orders,
        };
        Ok(orders
            .into_iter()
            .map(|listing| self.resolve_listing(listing))
            .collect())
    }

    // --- Listings ---

    /// `GET /search/order`; empty filter values are left out of the query.
    pub async fn search_orders(&self, filter: &OrderFilter) -> Result<Vec<Listing>, ApiError> {
        // The serializer is not Send; finish it before the request is awaited
        let query = {
            let mut query = form_urlencoded::Serializer::new(String::new());
            if !filter.district.is_empty() {
                query.append_pair("district", &filter.district);
            }
            if !filter.kind.is_empty() {
                query.append_pair("kind", &filter.kind);
            }
            query.finish()
        };
        let endpoint = if query.is_empty() {
            "/search/order".to_string()
        } else {
            format!("/search/order?{query}")
        };

        let value = self.request(Method::GET, &endpoint, Payload::Empty).await?;
        self.decode_orders(&endpoint, value)
    }

    pub async fn recent_pets(&self) -> Result<Vec<Listing>, ApiError> {
        let value = self.request(Method::GET, "/pets", Payload::Empty).await?;
        self.decode_orders("/pets", value)
    }

    /// Carousel pets; falls back to the placeholder set when there are none.
    pub async fn slider(&self) -> Result<Vec<SliderPet>, ApiError> {
        let mut pets = self.slider_from("/pets/slider").await?;
        if pets.is_empty() {
            pets = self.slider_from("/pets/slider/empty").await?;
        }
        Ok(pets)
    }

    async fn slider_from(&self, endpoint: &str) -> Result<Vec<SliderPet>, ApiError> {
        let value = self.request(Method::GET, endpoint, Payload::Empty).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let envelope: DataEnvelope<SliderData> = Self::decode(endpoint, value)?;
        Ok(envelope
            .data
            .pets
            .into_iter()
            .map(|mut pet| {
                pet.image = pet.image.and_then(|p| self.resolve_image_url(&p));
                pet
            })
            .collect())
    }

    /// `None` when the API reports the pet missing (404) or sends no content.
    pub async fn pet_details(&self, id: i64) -> Result<Option<Listing>, ApiError> {
        let endpoint = format!("/pets/{id}");
        let value = match self.request(Method::GET, &endpoint, Payload::Empty).await {
            Ok(Value::Null) => return Ok(None),
            Ok(value) => value,
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => return Ok(None),
            Err(e) => return Err(e),
        };
        let envelope: DataEnvelope<PetData> = Self::decode(&endpoint, value)?;
        Ok(envelope
            .data
            .pet
            .into_iter()
            .next()
            .map(|pet| self.resolve_listing(pet)))
    }

    /// `POST /pets` (multipart). Returns the new listing id.
    pub async fn create_order(&self, listing: NewListing) -> Result<i64, ApiError> {
        let mut form = Form::new()
            .text("kind", listing.kind)
            .text("description", listing.description)
            .text("district", listing.district)
            .text("name", listing.name)
            .text("phone", listing.phone)
            .text("email", listing.email)
            .text("confirm", flag(listing.confirm))
            .text("register", flag(listing.register));
        if !listing.mark.trim().is_empty() {
            form = form.text("mark", listing.mark);
        }
        if listing.register {
            let confirmation = if listing.password_confirmation.is_empty() {
                listing.password.clone()
            } else {
                listing.password_confirmation
            };
            form = form
                .text("password", listing.password)
                .text("password_confirmation", confirmation);
        }
        form = attach_photos(form, listing.photos)?;

        let value = self
            .request(Method::POST, "/pets", Payload::Multipart(form))
            .await?;
        let created: DataEnvelope<CreatedData> = Self::decode("/pets", value)?;
        Ok(created.data.id)
    }

    /// `POST /pets/:id` (multipart): mark, description and replacement photos.
    pub async fn update_order(&self, id: i64, update: ListingUpdate) -> Result<(), ApiError> {
        let form = Form::new()
            .text("mark", update.mark)
            .text("description", update.description);
        let form = attach_photos(form, update.photos)?;
        self.request(Method::POST, &format!("/pets/{id}"), Payload::Multipart(form))
            .await?;
        Ok(())
    }

    // --- Accounts ---

    pub async fn register(&self, request: &RegisterRequest) -> Result<Value, ApiError> {
        let body = json!({
            "name": request.name,
            "phone": request.phone,
            "email": request.email,
            "password": request.password,
            "password_confirmation": request.password_confirmation,
            "confirm": if request.confirm { 1 } else { 0 },
        });
        self.request(Method::POST, "/register", Payload::Json(body))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginData, ApiError> {
        let body = json!({ "email": email, "password": password });
        let value = self
            .request(Method::POST, "/login", Payload::Json(body))
            .await?;
        let envelope: DataEnvelope<LoginData> = Self::decode("/login", value)?;
        Ok(envelope.data)
    }

    /// `GET /users`; the profile comes either bare or wrapped in `data`.
    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        let value = self.request(Method::GET, "/users", Payload::Empty).await?;
        let profile = if value.get("id").is_some() {
            value
        } else {
            match value.get("data") {
                Some(data) if data.get("id").is_some() => data.clone(),
                _ => return Err(ApiError::UnexpectedShape("/users".into())),
            }
        };
        Self::decode("/users", profile)
    }

    pub async fn current_user_orders(&self) -> Result<Vec<Listing>, ApiError> {
        let value = self
            .request(Method::GET, "/users/orders", Payload::Empty)
            .await?;
        self.decode_orders("/users/orders", value)
    }

    pub async fn update_phone(&self, phone: &str) -> Result<(), ApiError> {
        self.request(
            Method::PATCH,
            "/users/phone",
            Payload::Json(json!({ "phone": phone })),
        )
        .await?;
        Ok(())
    }

    pub async fn update_email(&self, email: &str) -> Result<(), ApiError> {
        self.request(
            Method::PATCH,
            "/users/email",
            Payload::Json(json!({ "email": email })),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_order(&self, id: i64) -> Result<(), ApiError> {
        self.request(
            Method::DELETE,
            &format!("/users/orders/{id}"),
            Payload::Empty,
        )
        .await?;
        Ok(())
    }

    // --- Newsletter ---

    pub async fn subscribe(&self, email: &str) -> Result<(), ApiError> {
        self.request(
            Method::POST,
            "/subscription",
            Payload::Json(json!({ "email": email })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ListingSource for PetApi {
    async fn search_orders(&self, filter: &OrderFilter) -> Result<Vec<Listing>, ApiError> {
        PetApi::search_orders(self, filter).await
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn attach_photos(mut form: Form, photos: Vec<PhotoUpload>) -> Result<Form, ApiError> {
    for photo in photos {
        let mut part = Part::bytes(photo.bytes).file_name(photo.file_name);
        if let Some(content_type) = photo.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        form = form.part(photo.field, part);
    }
    Ok(form)
}
