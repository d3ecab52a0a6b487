//! Quillgate: identity federation for the Quill documentation platform.
//!
//! SAML 2.0 SP authentication, opaque application sessions with hash-only
//! storage, Just-In-Time account provisioning, and per-team identity
//! provider configuration.

pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
mod state;

pub use routes::router;
pub use state::AppState;
