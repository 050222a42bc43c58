//! Shared fixtures: listing builder, in-memory listing source and a mock of the
//! remote pet API served by axum on an ephemeral port.

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::{
    config::Settings,
    models::{Listing, ListingStatus},
    pet_api::ApiError,
    search::fetcher::{ListingSource, OrderFilter},
};

pub const MOCK_TOKEN: &str = "tok-1";
pub const MOCK_PASSWORD: &str = "Secret123";

pub fn listing(id: i64, kind: &str, description: &str, district: &str) -> Listing {
    Listing {
        id,
        kind: kind.to_string(),
        description: description.to_string(),
        district: district.to_string(),
        date: "2024-05-01".to_string(),
        mark: None,
        name: None,
        phone: None,
        email: None,
        photo: Vec::new(),
        photos: Vec::new(),
        status: ListingStatus::Active,
    }
}

/// Answers from a fixed list, filtering like the API does, and records every call.
pub struct StaticSource {
    listings: Option<Vec<Listing>>,
    delay: Option<Duration>,
    filters: Mutex<Vec<OrderFilter>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self {
            listings: Some(listings),
            delay: None,
            filters: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            listings: None,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn filters(&self) -> Vec<OrderFilter> {
        self.filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for StaticSource {
    async fn search_orders(&self, filter: &OrderFilter) -> Result<Vec<Listing>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().unwrap().push(filter.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let Some(listings) = &self.listings else {
            return Err(ApiError::UnexpectedShape("/search/order".into()));
        };
        Ok(listings
            .iter()
            .filter(|l| filter.district.is_empty() || l.district == filter.district)
            .filter(|l| filter.kind.is_empty() || l.kind == filter.kind)
            .cloned()
            .collect())
    }
}

// --- Mock remote API ---

#[derive(Default)]
pub struct MockApi {
    pub orders: Vec<Value>,
    pub requests: Mutex<Vec<String>>,
    // Every bearer token is rejected from now on
    revoked: AtomicBool,
}

impl MockApi {
    pub fn with_orders(orders: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            orders,
            ..Self::default()
        })
    }

    /// Expires the issued token, as the server does when a session ends.
    pub fn revoke_tokens(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        !self.revoked.load(Ordering::SeqCst)
            && headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == format!("Bearer {MOCK_TOKEN}"))
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.requests.lock().unwrap().push(entry);
    }
}

pub fn sample_orders() -> Vec<Value> {
    vec![
        json!({"id": 1, "kind": "кошка", "description": "Серая кошка, нашлась у метро",
               "district": "Невский район", "date": "2024-05-01",
               "photos": "/storage/cat.png", "status": "active"}),
        json!({"id": 2, "kind": "собака", "description": "Рыжий пёс в ошейнике",
               "district": "Центральный район", "date": "2024-05-02",
               "photo": "https://cdn.example.com/dog.png", "status": "wasFound"}),
        json!({"id": 3, "kind": "кошка", "description": "Black cat near the park",
               "district": "Невский район", "date": "2024-05-03", "status": "onModeration"}),
    ]
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"code": 401, "message": "Unauthorized"}})),
    )
        .into_response()
}

async fn search_order(
    State(api): State<Arc<MockApi>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let district = query.get("district").cloned().unwrap_or_default();
    let kind = query.get("kind").cloned().unwrap_or_default();
    api.record(format!("GET /search/order district={district} kind={kind}"));
    let orders: Vec<Value> = api
        .orders
        .iter()
        .filter(|o| district.is_empty() || o["district"] == district.as_str())
        .filter(|o| kind.is_empty() || o["kind"] == kind.as_str())
        .cloned()
        .collect();
    Json(json!({"data": {"orders": orders}}))
}

async fn recent(State(api): State<Arc<MockApi>>) -> Json<Value> {
    api.record("GET /pets".into());
    Json(json!({"data": {"orders": api.orders}}))
}

async fn slider(State(api): State<Arc<MockApi>>) -> Json<Value> {
    api.record("GET /pets/slider".into());
    Json(json!({"data": {"pets": []}}))
}

async fn slider_empty(State(api): State<Arc<MockApi>>) -> Json<Value> {
    api.record("GET /pets/slider/empty".into());
    Json(json!({"data": {"pets": [
        {"id": 0, "kind": "кот", "description": "Здесь могут быть ваши питомцы", "image": "/img/empty.png"}
    ]}}))
}

async fn pet(State(api): State<Arc<MockApi>>, Path(id): Path<i64>) -> Response {
    api.record(format!("GET /pets/{id}"));
    match api.orders.iter().find(|o| o["id"] == id) {
        Some(order) => Json(json!({"data": {"pet": [order]}})).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn login(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    api.record("POST /login".into());
    if body["password"] == MOCK_PASSWORD {
        Json(json!({"data": {"token": MOCK_TOKEN,
            "user": {"id": 1, "name": "Анна", "email": body["email"], "phone": "+79990001122"}}}))
        .into_response()
    } else {
        unauthorized()
    }
}

async fn register(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    api.record(format!("POST /register confirm={}", body["confirm"]));
    if body["email"] == "taken@example.com" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": {"code": 422, "message": "Validation error",
                "errors": {"email": ["Такой email уже зарегистрирован"]}}})),
        )
            .into_response();
    }
    (StatusCode::NO_CONTENT).into_response()
}

async fn users(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    api.record("GET /users".into());
    if !api.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": {"id": 1, "name": "Анна", "email": "anna@example.com",
        "phone": "+79990001122", "registrationDate": "2024-01-01"}}))
    .into_response()
}

async fn user_orders(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    api.record("GET /users/orders".into());
    if !api.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": {"orders": api.orders}})).into_response()
}

async fn update_phone(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.record(format!("PATCH /users/phone {}", body["phone"]));
    if !api.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": {"status": "ok"}})).into_response()
}

async fn delete_order(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    api.record(format!("DELETE /users/orders/{id}"));
    if !api.authorized(&headers) {
        return unauthorized();
    }
    if id == 2 {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "Forbidden"}})),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Part names in order, with the byte size of file parts: `kind,photo1(3145728)`.
async fn part_summary(mut multipart: Multipart) -> String {
    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let is_file = field.file_name().is_some();
        let bytes = field.bytes().await.unwrap_or_default();
        parts.push(if is_file {
            format!("{name}({})", bytes.len())
        } else {
            name
        });
    }
    parts.join(",")
}

async fn create_pet(State(api): State<Arc<MockApi>>, multipart: Multipart) -> Json<Value> {
    let parts = part_summary(multipart).await;
    api.record(format!("POST /pets {parts}"));
    Json(json!({"data": {"id": 42}}))
}

async fn update_pet(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Response {
    let parts = part_summary(multipart).await;
    api.record(format!("POST /pets/{id} {parts}"));
    if !api.authorized(&headers) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn update_email(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.record(format!("PATCH /users/email {}", body["email"]));
    if !api.authorized(&headers) {
        return unauthorized();
    }
    if body["email"] == "taken@example.com" {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": {"code": 409, "message": "Email already taken"}})),
        )
            .into_response();
    }
    Json(json!({"data": {"status": "ok"}})).into_response()
}

async fn subscription(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    api.record(format!("POST /subscription {}", body["email"]));
    StatusCode::NO_CONTENT.into_response()
}

pub fn mock_router(api: Arc<MockApi>) -> Router {
    Router::new()
        .route("/search/order", get(search_order))
        .route("/pets", get(recent).post(create_pet))
        .route("/pets/slider", get(slider))
        .route("/pets/slider/empty", get(slider_empty))
        .route("/pets/:id", get(pet).post(update_pet))
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/users", get(users))
        .route("/users/orders", get(user_orders))
        .route("/users/phone", patch(update_phone))
        .route("/users/email", patch(update_email))
        .route("/users/orders/:id", delete(delete_order))
        .route("/subscription", post(subscription))
        .layer(DefaultBodyLimit::disable())
        .with_state(api)
}

/// Serves `router` on 127.0.0.1 and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn spawn_mock_api(api: Arc<MockApi>) -> String {
    serve(mock_router(api)).await
}

pub fn settings_for(api_host: &str) -> Settings {
    let mut settings = Settings::defaults().unwrap();
    settings.api_host = api_host.to_string();
    settings.image_base_url = "http://images.test".to_string();
    settings
}
