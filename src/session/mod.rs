//! Per-visitor state: auth session over key/value storage, plus the registry
//! that maps the visitor cookie to it.

pub mod auth;
pub mod registry;
pub mod storage;

pub use auth::{AuthEvent, AuthSession, AuthState, RegistrationStatus};
pub use registry::{Visitor, VisitorRegistry};
