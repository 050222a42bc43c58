use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::storage::{
    SessionStorage, AUTH_TOKEN_KEY, USER_DATA_KEY, USER_EMAIL_KEY, USER_ID_KEY,
};
use crate::models::UserProfile;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

/// Change notifications. Listeners re-read the session when they get one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    AuthChange(AuthState),
    UserDataUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    pub is_authenticated: bool,
    pub user_data: Option<UserProfile>,
    pub has_email: bool,
}

/// A visitor's token and profile snapshot, kept in its [`SessionStorage`].
///
/// The session is Anonymous until a token is stored and Authenticated while one
/// is present. Every transition publishes [`AuthEvent::AuthChange`]; profile edits
/// publish [`AuthEvent::UserDataUpdate`] without touching the state.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthSession {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner { storage, events }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    fn storage(&self) -> &dyn SessionStorage {
        self.inner.storage.as_ref()
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    pub fn state(&self) -> AuthState {
        if self.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.storage().get(AUTH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn user_data(&self) -> Option<UserProfile> {
        let raw = self.storage().get(USER_DATA_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::error!("Stored user data is not valid JSON: {e}");
                None
            }
        }
    }

    /// Name, else email, else empty.
    pub fn user_name(&self) -> String {
        match self.user_data() {
            Some(user) if !user.name.is_empty() => user.name,
            Some(user) => user.email,
            None => String::new(),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_data()
            .and_then(|user| user.id)
            .or_else(|| self.storage().get(USER_ID_KEY)?.parse().ok())
    }

    /// Anonymous -> Authenticated after a successful login or registration.
    pub fn login(&self, token: &str, user: Option<UserProfile>) {
        tracing::info!("Storing session token and user data");
        self.storage().set(AUTH_TOKEN_KEY, token);
        if let Some(user) = user {
            self.write_user(&user);
        }
        self.emit(AuthEvent::AuthChange(AuthState::Authenticated));
    }

    /// Authenticated -> Anonymous on explicit logout.
    pub fn logout(&self) {
        tracing::info!("Clearing session");
        self.clear_keys();
        self.emit(AuthEvent::AuthChange(AuthState::Anonymous));
    }

    /// Authenticated -> Anonymous because the API rejected the token (401).
    pub fn invalidate(&self) {
        tracing::warn!("Session invalidated by the API");
        self.clear_keys();
        self.emit(AuthEvent::AuthChange(AuthState::Anonymous));
    }

    fn clear_keys(&self) {
        let storage = self.storage();
        storage.remove(AUTH_TOKEN_KEY);
        storage.remove(USER_DATA_KEY);
        storage.remove(USER_ID_KEY);
        storage.remove(USER_EMAIL_KEY);
    }

    fn write_user(&self, user: &UserProfile) {
        match serde_json::to_string(user) {
            Ok(json) => self.storage().set(USER_DATA_KEY, &json),
            Err(e) => tracing::error!("Failed to serialize user data: {e}"),
        }
        if let Some(id) = user.id {
            self.storage().set(USER_ID_KEY, &id.to_string());
        }
    }

    /// Replaces the stored profile.
    pub fn save_user_data(&self, user: &UserProfile) {
        self.write_user(user);
        self.emit(AuthEvent::UserDataUpdate);
    }

    /// Shallow-merges `patch` into the stored profile and returns the result.
    pub fn update_user_data(&self, patch: Map<String, Value>) -> Option<UserProfile> {
        let mut merged = self
            .user_data()
            .and_then(|user| serde_json::to_value(user).ok())
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();
        merged.extend(patch);

        let updated: UserProfile = match serde_json::from_value(Value::Object(merged)) {
            Ok(user) => user,
            Err(e) => {
                tracing::error!("Failed to update user data: {e}");
                return None;
            }
        };
        self.write_user(&updated);
        self.emit(AuthEvent::UserDataUpdate);
        Some(updated)
    }

    /// Drops the profile but keeps the token.
    pub fn clear_user_data(&self) {
        let storage = self.storage();
        storage.remove(USER_DATA_KEY);
        storage.remove(USER_ID_KEY);
        storage.remove(USER_EMAIL_KEY);
        self.emit(AuthEvent::UserDataUpdate);
    }

    pub fn stored_email(&self) -> Option<String> {
        self.storage().get(USER_EMAIL_KEY)
    }

    pub fn save_email(&self, email: &str) {
        if !email.is_empty() {
            self.storage().set(USER_EMAIL_KEY, email);
        }
    }

    pub fn registration_status(&self) -> RegistrationStatus {
        RegistrationStatus {
            is_authenticated: self.is_authenticated(),
            user_data: self.user_data(),
            has_email: self.stored_email().is_some(),
        }
    }
}
