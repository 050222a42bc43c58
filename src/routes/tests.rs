use reqwest::{
    header::LOCATION,
    multipart::{Form, Part},
    redirect::Policy,
    Client, Response, StatusCode,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};

use super::SESSION_COOKIE;
use crate::{
    app,
    pet_api::DELETE_FORBIDDEN,
    test_support::{sample_orders, serve, settings_for, spawn_mock_api, MockApi, MOCK_PASSWORD},
    validation::EMAIL_MESSAGE,
    AppState,
};

const PNG_HEADER: [u8; 4] = [137, 80, 78, 71];

fn png(field: &str, size: usize) -> Part {
    let mut bytes = PNG_HEADER.to_vec();
    bytes.resize(size.max(PNG_HEADER.len()), 0);
    Part::bytes(bytes)
        .file_name(format!("{field}.png"))
        .mime_str("image/png")
        .unwrap()
}

fn listing_form(email: &str) -> Form {
    Form::new()
        .text("kind", "кошка")
        .text("description", "Серая кошка у метро, очень ласковая")
        .text("district", "Невский район")
        .text("name", "Анна")
        .text("phone", "+79990001122")
        .text("email", email.to_string())
        .text("confirm", "on")
}

fn location(response: &Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

/// Reads an event stream until `needle` shows up in it.
async fn read_until(events: &mut Response, needle: &str) -> String {
    let mut seen = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !seen.contains(needle) {
            let chunk = events.chunk().await.unwrap().expect("stream ended early");
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {needle:?} in {seen:?}"));
    seen
}

struct Harness {
    base: String,
    mock: Arc<MockApi>,
    // Keeps cookies like a browser would
    browser: Client,
}

impl Harness {
    async fn start() -> Self {
        let mock = MockApi::with_orders(sample_orders());
        let api_base = spawn_mock_api(mock.clone()).await;
        let mut settings = settings_for(&api_base);
        settings.suggestion_debounce_ms = 10;
        let base = serve(app(AppState::new(settings).unwrap())).await;
        let browser = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .unwrap();
        Self {
            base,
            mock,
            browser,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> Response {
        self.browser.get(self.url(path)).send().await.unwrap()
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Response {
        self.browser.post(self.url(path)).form(form).send().await.unwrap()
    }

    async fn post_multipart(&self, path: &str, form: Form) -> Response {
        self.browser
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn session(&self) -> Value {
        self.get("/api/session").await.json().await.unwrap()
    }

    async fn login(&self) {
        let response = self
            .browser
            .post(self.url("/login"))
            .form(&[("email", "anna@example.com"), ("password", MOCK_PASSWORD)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/profile");
    }
}

#[tokio::test]
async fn first_visit_sets_the_visitor_cookie() {
    let harness = Harness::start().await;
    let response = harness.get("/api/session").await;
    let cookie = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(SESSION_COOKIE));
    assert!(cookie.is_some());

    let session: Value = response.json().await.unwrap();
    assert_eq!(session["state"], "anonymous");

    // Second request reuses the cookie
    let response = harness.get("/api/session").await;
    assert!(response.headers().get(reqwest::header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn quick_search_prefills_the_field_and_fetches_everything() {
    let harness = Harness::start().await;
    let response = harness.get("/search?description=%D0%BA%D0%BE%D1%88%D0%BA%D0%B0").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();

    assert!(body.contains(r#"name="description" value="кошка""#));
    assert!(body.contains("Серая кошка, нашлась у метро"));
    assert!(!body.contains("Рыжий пёс"));
    assert_eq!(
        harness.mock.requests(),
        vec!["GET /search/order district= kind=".to_string()]
    );
}

#[tokio::test]
async fn advanced_search_lets_the_api_filter() {
    let harness = Harness::start().await;
    let response = harness
        .get("/api/search?kind=%D1%81%D0%BE%D0%B1%D0%B0%D0%BA%D0%B0")
        .await;
    let outcome: Value = response.json().await.unwrap();

    assert_eq!(outcome["mode"], "advanced");
    assert_eq!(outcome["totalCount"], 1);
    assert_eq!(outcome["items"][0]["id"], 2);
    assert_eq!(outcome["nav"]["total_pages"], 1);
    assert_eq!(outcome["loading"], false);
    assert_eq!(
        harness.mock.requests(),
        vec!["GET /search/order district= kind=собака".to_string()]
    );
}

#[tokio::test]
async fn suggestions_need_three_characters() {
    let harness = Harness::start().await;

    let short: Value = harness
        .get("/api/suggestions?q=%D0%BA%D0%BE")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(short, Value::Array(Vec::new()));
    assert!(harness.mock.requests().is_empty());

    let response = harness
        .get("/api/suggestions?q=%D0%BA%D0%BE%D1%88%D0%BA%D0%B0")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let found: Value = response.json().await.unwrap();
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["originalDescription"], "Серая кошка, нашлась у метро");

    // Picking it runs a quick search on the original text
    let response = harness.get("/suggestions/1").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("/search?description="));
}

#[tokio::test]
async fn profile_requires_login() {
    let harness = Harness::start().await;
    let response = harness.get("/profile").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/login");
}

#[tokio::test]
async fn login_then_profile_then_logout() {
    let harness = Harness::start().await;
    harness.login().await;

    let session: Value = harness.get("/api/session").await.json().await.unwrap();
    assert_eq!(session["state"], "authenticated");
    assert_eq!(session["userName"], "Анна");

    let response = harness.get("/profile").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Анна"));
    assert!(body.contains("Рыжий пёс в ошейнике"));

    let response = harness
        .browser
        .post(harness.url("/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let session: Value = harness.get("/api/session").await.json().await.unwrap();
    assert_eq!(session["state"], "anonymous");
}

#[tokio::test]
async fn wrong_password_stays_on_the_login_page() {
    let harness = Harness::start().await;
    let response = harness
        .browser
        .post(harness.url("/login"))
        .form(&[("email", "anna@example.com"), ("password", "nope")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("Неверный email или пароль"));
}

#[tokio::test]
async fn deleting_a_found_pet_is_refused() {
    let harness = Harness::start().await;
    harness.login().await;

    let response = harness
        .browser
        .post(harness.url("/profile/ads/2/delete"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains(DELETE_FORBIDDEN));

    let response = harness
        .browser
        .post(harness.url("/profile/ads/1/delete"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn unknown_pet_is_404() {
    let harness = Harness::start().await;
    assert_eq!(harness.get("/pet/99").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(harness.get("/pet/1").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn latest_search_is_kept_per_visitor() {
    let harness = Harness::start().await;
    let response = harness.get("/api/search/latest").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    harness
        .get("/api/search?kind=%D1%81%D0%BE%D0%B1%D0%B0%D0%BA%D0%B0")
        .await;
    let latest: Value = harness.get("/api/search/latest").await.json().await.unwrap();
    assert_eq!(latest["totalCount"], 1);
    assert_eq!(latest["params"]["animalType"], "собака");
    assert_eq!(latest["loading"], false);
}

#[tokio::test]
async fn add_listing_accepts_a_three_megabyte_photo() {
    let harness = Harness::start().await;
    harness.login().await;

    let size = 3 * 1024 * 1024;
    let form = listing_form("anna@example.com").part("photo1", png("photo1", size));
    let response = harness.post_multipart("/add", form).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/pet/42");
    let created = harness
        .mock
        .requests()
        .into_iter()
        .find(|r| r.starts_with("POST /pets "))
        .expect("listing was sent to the API");
    assert!(created.contains(&format!("photo1({size})")));
}

#[tokio::test]
async fn add_listing_registers_and_signs_in_a_new_author() {
    let harness = Harness::start().await;

    let form = listing_form("new@example.com")
        .text("register", "on")
        .text("password", MOCK_PASSWORD)
        .text("password_confirmation", MOCK_PASSWORD)
        .part("photo1", png("photo1", 64));
    let response = harness.post_multipart("/add", form).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile");
    let requests = harness.mock.requests();
    assert!(requests.contains(&"POST /register confirm=1".to_string()));
    assert!(requests.contains(&"POST /login".to_string()));
    assert!(requests.iter().any(|r| r.starts_with("POST /pets ")));
    assert_eq!(harness.session().await["state"], "authenticated");
}

#[tokio::test]
async fn add_listing_without_a_photo_is_rejected_inline() {
    let harness = Harness::start().await;
    harness.login().await;

    let response = harness.post_multipart("/add", listing_form("anna@example.com")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Добавьте хотя бы одну фотографию"));
    assert!(body.contains(r#"<option value="Невский район" selected>"#));
    assert!(!harness.mock.requests().iter().any(|r| r.starts_with("POST /pets")));
}

#[tokio::test]
async fn contact_update_patches_the_phone_and_merges_user_data() {
    let harness = Harness::start().await;
    harness.login().await;

    let response = harness
        .post_form(
            "/profile/contacts",
            &[("phone", "+7 999 111 22 33"), ("email", "anna@example.com")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile?done=contacts");

    // Unchanged email is not sent
    let requests = harness.mock.requests();
    assert!(requests.contains(&r#"PATCH /users/phone "+7 999 111 22 33""#.to_string()));
    assert!(!requests.iter().any(|r| r.starts_with("PATCH /users/email")));

    let session = harness.session().await;
    assert_eq!(session["user"]["phone"], "+7 999 111 22 33");
    assert_eq!(session["user"]["name"], "Анна");

    let body = harness.get("/profile?done=contacts").await.text().await.unwrap();
    assert!(body.contains("Контактные данные успешно обновлены"));
}

#[tokio::test]
async fn taken_email_is_shown_next_to_the_field() {
    let harness = Harness::start().await;
    harness.login().await;

    let response = harness
        .post_form(
            "/profile/contacts",
            &[("phone", "+79990001122"), ("email", "taken@example.com")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Этот email уже используется другим пользователем"));
    assert_eq!(harness.session().await["user"]["email"], "anna@example.com");
}

#[tokio::test]
async fn editing_an_ad_sends_the_multipart_update() {
    let harness = Harness::start().await;
    harness.login().await;

    let form = Form::new()
        .text("mark", "AB-12")
        .text("description", "Серая кошка, теперь с ошейником")
        .part("photo1", png("photo1", 4))
        .part("photo2", Part::bytes(Vec::new()).file_name(""));
    let response = harness.post_multipart("/profile/ads/1/edit", form).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile?done=edited");
    assert!(
        harness
            .mock
            .requests()
            .contains(&"POST /pets/1 mark,description,photo1(4)".to_string())
    );
}

#[tokio::test]
async fn newsletter_keeps_a_rejected_email_in_the_field() {
    let harness = Harness::start().await;

    let response = harness.post_form("/subscribe", &[("email", "not-an-email")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains(r#"value="not-an-email""#));
    assert!(body.contains(EMAIL_MESSAGE));
    assert!(!harness.mock.requests().iter().any(|r| r.starts_with("POST /subscription")));

    let body = harness
        .post_form("/subscribe", &[("email", "news@example.com")])
        .await
        .text()
        .await
        .unwrap();
    assert!(body.contains("Вы успешно подписались на рассылку!"));
    assert!(!body.contains(r#"value="news@example.com""#));
    assert!(
        harness
            .mock
            .requests()
            .contains(&r#"POST /subscription "news@example.com""#.to_string())
    );
}

#[tokio::test]
async fn session_events_follow_login_and_logout() {
    let harness = Harness::start().await;
    // Get the visitor cookie first so the stream and the login share a session
    harness.session().await;

    let mut events = harness.get("/api/session/events").await;
    assert_eq!(events.status(), StatusCode::OK);

    harness.login().await;
    let seen = read_until(&mut events, r#""state":"authenticated""#).await;
    assert!(seen.contains("event: authChange"));

    harness.post_form("/logout", &[]).await;
    let seen = read_until(&mut events, r#""state":"anonymous""#).await;
    assert!(seen.contains("event: authChange"));
}

#[tokio::test]
async fn expired_token_sends_the_visitor_to_login() {
    let harness = Harness::start().await;
    harness.login().await;
    harness.mock.revoke_tokens();

    let response = harness.get("/profile").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert_eq!(harness.session().await["state"], "anonymous");
}
