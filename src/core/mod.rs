//! Core building blocks: models, naming, the data store collaborator,
//! authentication and errors

pub mod auth;
pub mod error;
pub mod model;
pub mod naming;
pub mod store;

pub use auth::{LoginModel, Principal};
pub use error::{AuthError, ConfigError, StoreError};
pub use model::{FieldErrors, Model, Owned, Validatable};
pub use store::{DataStore, Filter, FilterOp, Scope, StoreHandle, Table};
