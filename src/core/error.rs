//! Typed errors for grapi
//!
//! Three families of failure exist and they never mix:
//!
//! - [`ConfigError`]: contradictory or missing configuration. Always detected
//!   eagerly, when [`Options`](crate::config::Options) are built or a route
//!   is registered, and returned to the caller instead of aborting the process.
//! - [`StoreError`]: failures reported by a [`DataStore`](crate::core::store::DataStore)
//!   backend. The pipeline turns them into HTTP responses.
//! - [`AuthError`]: token and login failures. Never leaked to clients beyond a
//!   bare 401/403.

use axum::http::StatusCode;
use thiserror::Error;

/// Configuration errors raised while constructing the API or registering routes
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `Options` were built without a data store
    #[error("a data store must be provided in the options")]
    MissingStore,

    /// Token signing was requested but no secret was configured
    #[error("a token signing secret is required to use the built-in authentication")]
    MissingSecret,

    /// Built-in authentication was requested but no login model was configured
    #[error("a login model is required to use the built-in authentication")]
    MissingLoginModel,

    /// A route config set both `use_default_auth` and a custom authenticate stage
    #[error(
        "route config for '{path}' sets both a custom authenticate stage and use_default_auth"
    )]
    ConflictingAuthenticate { path: String },

    /// More than read/write/delete configs were given to `add_default_routes`
    #[error("add_default_routes accepts at most 3 route configs, got {count}")]
    TooManyRouteConfigs { count: usize },

    /// The same method and path were registered twice
    #[error("route {method} {path} is already registered")]
    DuplicateRoute { method: String, path: String },

    /// A route path the router cannot hold
    #[error("invalid route path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A configuration file could not be read or parsed
    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Errors returned by data store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this identity exists in the table
    #[error("no record '{id}' in '{table}'")]
    NotFound { table: String, id: String },

    /// A record with this identity already exists
    #[error("record '{id}' already exists in '{table}'")]
    Conflict { table: String, id: String },

    /// The record is not a JSON object or lacks a usable identity
    #[error("invalid record for '{table}': {message}")]
    InvalidRecord { table: String, message: String },

    /// Any other backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was found on the request
    #[error("missing bearer token")]
    MissingToken,

    /// The token failed signature, algorithm or expiry checks
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// The token could not be produced
    #[error("failed to sign token: {0}")]
    Signing(String),

    /// The token subject does not resolve to a principal
    #[error("unknown subject {0}")]
    UnknownSubject(u64),

    /// Login credentials were rejected
    #[error("login rejected: {0}")]
    LoginRejected(String),
}

impl AuthError {
    /// HTTP status used when this error terminates a request
    ///
    /// Rejected logins are forbidden; every other failure is unauthorized.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::LoginRejected(_) => StatusCode::FORBIDDEN,
            AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages_name_the_problem() {
        let err = ConfigError::TooManyRouteConfigs { count: 4 };
        assert_eq!(
            err.to_string(),
            "add_default_routes accepts at most 3 route configs, got 4"
        );

        let err = ConfigError::ConflictingAuthenticate {
            path: "/api/widgets".to_string(),
        };
        assert!(err.to_string().contains("/api/widgets"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Conflict {
            table: "widgets".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(err.to_string(), "record '1' already exists in 'widgets'");
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(
            AuthError::MissingToken.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::UnknownSubject(7).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::LoginRejected("bad password".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
