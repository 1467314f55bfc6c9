//! Token authentication for grapi
//!
//! Provides:
//! - [`Principal`]: the opaque authenticated caller bound into a request
//! - [`LoginModel`]: the collaborator that checks credentials and resolves
//!   token subjects back to principals
//! - HS256 tokens carrying `{id, exp}` with a fixed one hour lifetime
//! - [`default_authenticator`]: the built-in Authenticate stage

use crate::core::error::AuthError;
use crate::core::store::StoreHandle;
use crate::pipeline::views::{AuthenticateFn, AuthenticateView, RequestInfo};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifetime of an issued token
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Query parameter accepted when no `Authorization` header is present
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// The authenticated caller of a request
///
/// Opaque to the pipeline: stages that know the concrete type recover it with
/// [`Principal::downcast_ref`].
#[derive(Clone)]
pub struct Principal(Arc<dyn Any + Send + Sync>);

impl Principal {
    pub fn new<P: Any + Send + Sync>(principal: P) -> Self {
        Self(Arc::new(principal))
    }

    /// The principal as `P`, if that is its concrete type
    pub fn downcast_ref<P: Any>(&self) -> Option<&P> {
        self.0.downcast_ref::<P>()
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Principal").finish_non_exhaustive()
    }
}

/// Credentials check and principal lookup used by the built-in authentication
///
/// Both calls receive the unscoped store handle from the API options.
pub trait LoginModel: Send + Sync {
    /// Check the deserialized body of a login request, returning the subject id
    fn check_login_details(
        &self,
        credentials: &Map<String, Value>,
        store: &StoreHandle,
    ) -> Result<u64, AuthError>;

    /// Resolve a token subject to the principal bound into the request
    fn get_by_id(&self, id: u64, store: &StoreHandle) -> Result<Principal, AuthError>;
}

/// Claims embedded in every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier
    pub id: u64,
    /// Expiry, unix seconds
    pub exp: i64,
}

/// Sign a token for `subject` expiring [`TOKEN_TTL`] from now
pub fn issue_token(subject: u64, secret: &str) -> Result<String, AuthError> {
    issue_token_at(subject, secret, Utc::now())
}

/// Sign a token for `subject` as if issued at `issued_at`
pub fn issue_token_at(
    subject: u64,
    secret: &str,
    issued_at: DateTime<Utc>,
) -> Result<String, AuthError> {
    let claims = Claims {
        id: subject,
        exp: issued_at.timestamp() + TOKEN_TTL.as_secs() as i64,
    };
    tracing::debug!(id = subject, expiry = claims.exp, "Signing token");

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Verify signature, algorithm and expiry of a token
///
/// Only HS256 is accepted and there is no leeway: a token is valid up to and
/// including its `exp` second.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Bearer token of a request
///
/// Read from `Authorization: Bearer <token>`, falling back to the
/// `access_token` query parameter.
pub fn bearer_token<R: RequestInfo + ?Sized>(request: &R) -> Option<&str> {
    if let Some((scheme, token)) = request
        .header("authorization")
        .and_then(|header| header.split_once(' '))
    {
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            return Some(token.trim());
        }
    }

    request.query()?.split('&').find_map(|pair| {
        pair.strip_prefix(ACCESS_TOKEN_PARAM)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|token| !token.is_empty())
    })
}

/// The built-in Authenticate stage
///
/// Verifies the bearer token with `secret`, resolves its subject through
/// `login_model` and binds the principal. Any failure answers 401 with no
/// detail and halts the pipeline.
pub fn default_authenticator(
    secret: String,
    login_model: Arc<dyn LoginModel>,
    store: StoreHandle,
) -> AuthenticateFn {
    Arc::new(move |request: &mut dyn AuthenticateView| {
        let outcome = bearer_token(&*request)
            .ok_or(AuthError::MissingToken)
            .and_then(|token| verify_token(token, &secret))
            .and_then(|claims| login_model.get_by_id(claims.id, &store));

        match outcome {
            Ok(principal) => {
                request.set_principal(principal);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Token authentication failed");
                request.respond_text(StatusCode::UNAUTHORIZED, "Unauthorized");
                false
            }
        }
    })
}
