//! Per-request state threaded through the stages

use crate::core::auth::Principal;
use crate::core::model::Model;
use crate::core::store::{StoreHandle, Table};
use crate::pipeline::Verb;
use crate::pipeline::views::UserData;
use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// The value serialized as the response of a successful request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Resource<T> {
    /// A single model instance (item routes, POST, PATCH, DELETE)
    One(T),
    /// A list of instances (index routes)
    Many(Vec<T>),
    /// Anything else an EditResult stage chose to return
    Json(Value),
}

impl<T> Resource<T> {
    pub fn as_one(&self) -> Option<&T> {
        match self {
            Resource::One(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_one_mut(&mut self) -> Option<&mut T> {
        match self {
            Resource::One(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&[T]> {
        match self {
            Resource::Many(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_many_mut(&mut self) -> Option<&mut Vec<T>> {
        match self {
            Resource::Many(items) => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum ResponseBody {
    Json(Value),
    Text(String),
}

/// Holds the one response a request may produce
#[derive(Debug, Default)]
pub(crate) struct ResponseSlot {
    written: Option<(StatusCode, ResponseBody)>,
}

impl ResponseSlot {
    pub(crate) fn write_json(&mut self, status: StatusCode, body: Value) {
        self.write(status, ResponseBody::Json(body));
    }

    pub(crate) fn write_text(&mut self, status: StatusCode, body: &str) {
        self.write(status, ResponseBody::Text(body.to_string()));
    }

    pub(crate) fn is_written(&self) -> bool {
        self.written.is_some()
    }

    pub(crate) fn status(&self) -> Option<StatusCode> {
        self.written.as_ref().map(|(status, _)| *status)
    }

    fn write(&mut self, status: StatusCode, body: ResponseBody) {
        if let Some((first, _)) = &self.written {
            tracing::warn!(
                status = %status,
                first = %first,
                "Response already written, ignoring second write"
            );
            return;
        }
        self.written = Some((status, body));
    }

    fn into_response(self) -> Response {
        match self.written {
            Some((status, ResponseBody::Json(body))) => (status, Json(body)).into_response(),
            Some((status, ResponseBody::Text(body))) => (status, body).into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Mutable state of one request
///
/// Created by the pipeline for each incoming request and dropped once the
/// response has been produced. Stages only see it through the views in
/// [`views`](crate::pipeline::views).
pub struct RequestContext<T: Model> {
    pub(crate) verb: Verb,
    pub(crate) table: Table,
    pub(crate) parts: Parts,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) store: StoreHandle,
    /// Raw record loaded by fetch-by-id, including fields the model skips
    pub(crate) stored: Option<Value>,
    pub(crate) principal: Option<Principal>,
    pub(crate) upload: Option<T>,
    pub(crate) result: Option<Resource<T>>,
    pub(crate) data: Option<Box<UserData>>,
    pub(crate) response: ResponseSlot,
}

impl<T: Model> RequestContext<T> {
    /// Fresh context for a request
    ///
    /// `store` is the handle read lookups start from; QueryScope may replace it.
    pub fn new(
        verb: Verb,
        table: Table,
        store: StoreHandle,
        parts: Parts,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            verb,
            table,
            parts,
            body,
            params,
            store,
            stored: None,
            principal: None,
            upload: None,
            result: None,
            data: None,
            response: ResponseSlot::default(),
        }
    }

    /// Status of the response written so far
    pub fn response_status(&self) -> Option<StatusCode> {
        self.response.status()
    }

    /// The written response, or an empty 500 if no stage wrote one
    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}
