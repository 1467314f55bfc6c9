//! The login endpoint of the built-in authentication

use crate::core::auth::{LoginModel, issue_token};
use crate::core::store::StoreHandle;
use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Exchanges login credentials for a token
///
/// Expects a JSON object, passed untouched to
/// [`LoginModel::check_login_details`]. Answers:
///
/// - 422 `{"error":"Malformed JSON"}` if the body is not a JSON object
/// - 403 `{"error":"Login failed"}` if the login model rejects it
/// - 200 `{"token":"..."}` otherwise
pub(crate) struct LoginHandler {
    secret: String,
    login_model: Arc<dyn LoginModel>,
    store: StoreHandle,
}

impl LoginHandler {
    pub(crate) fn new(secret: String, login_model: Arc<dyn LoginModel>, store: StoreHandle) -> Self {
        Self {
            secret,
            login_model,
            store,
        }
    }

    pub(crate) async fn handle(self: Arc<Self>, body: Bytes) -> Response {
        let handler = self.clone();
        match tokio::task::spawn_blocking(move || handler.login(&body)).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "Login task failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    fn login(&self, body: &[u8]) -> Response {
        let credentials: Map<String, Value> = match serde_json::from_slice(body) {
            Ok(credentials) => credentials,
            Err(err) => {
                tracing::error!(error = %err, "Received malformed JSON body");
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "Malformed JSON" })),
                )
                    .into_response();
            }
        };

        let id = match self
            .login_model
            .check_login_details(&credentials, &self.store)
        {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, "Login failed");
                return (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "error": "Login failed" })),
                )
                    .into_response();
            }
        };

        match issue_token(id, &self.secret) {
            Ok(token) => {
                tracing::info!(id, "Logged in user");
                Json(json!({ "token": token })).into_response()
            }
            Err(err) => {
                tracing::error!(id, error = %err, "Token signing failed");
                err.status_code().into_response()
            }
        }
    }
}
