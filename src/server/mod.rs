//! HTTP surface of grapi
//!
//! [`Api`] registers the generated routes of each model, one pipeline per
//! (model, verb), plus the optional login endpoint, and builds the axum
//! [`Router`](axum::Router) serving them.

pub mod api;
mod login;

pub use api::Api;
