//! # grapi
//!
//! Auto-generated CRUD REST endpoints for serde models, each request running
//! through a short-circuiting pipeline of stages.
//!
//! ## Features
//!
//! - **Five routes per model**: GET item, GET index, POST, PATCH, DELETE
//! - **Pluggable stages**: Authenticate, Authorize, QueryScope, CheckUpload and
//!   EditResult callbacks per route group
//! - **Least privilege**: each stage sees a capability view exposing only what
//!   it may touch
//! - **Token authentication**: built-in HS256 authenticator and login endpoint
//! - **Eager configuration errors**: contradictory setups fail at registration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grapi::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Widget {
//!     #[serde(default)]
//!     id: u64,
//!     name: String,
//! }
//!
//! impl Model for Widget {
//!     fn model_name() -> &'static str {
//!         "Widget"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = Options::builder().store(MemoryStore::new()).build()?;
//!
//!     Api::new(options)
//!         .add_default_routes::<Widget>(vec![])?
//!         .serve("127.0.0.1:3000")
//!         .await
//! }
//! ```

pub mod config;
pub mod core;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{LoginModel, Principal},
        error::{AuthError, ConfigError, StoreError},
        model::{FieldErrors, Model, Owned, Validatable, field_errors},
        store::{DataStore, Filter, FilterOp, StoreHandle, Table},
    };

    // === Pipeline ===
    pub use crate::pipeline::{
        AuthenticateView, AuthorizeView, PrincipalRead, QueryScopeView, RequestInfo,
        RequestInfoExt, Resource, ResponseWrite, ResultEditView, UploadCheckView, UploadRead,
        Verb,
        scoping::{is_owned_by, scope_by_param},
    };

    // === Config ===
    pub use crate::config::{ApiConfig, LogLevel, Options, RouteConfig};

    // === Server ===
    pub use crate::server::Api;

    // === Storage ===
    pub use crate::storage::MemoryStore;

    // === External dependencies ===
    pub use axum::http::StatusCode;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
}
