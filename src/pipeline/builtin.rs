//! Built-in stages
//!
//! These always run; they are not configurable. Reads go through the request's
//! store handle, which QueryScope may have narrowed. Writes take the unscoped
//! handle from the options as an argument, since filters added for lookups do
//! not describe the record being written.

use crate::core::error::StoreError;
use crate::core::model::{FieldErrors, Model, identity_key, identity_of};
use crate::core::store::{StoreHandle, Table};
use crate::pipeline::context::{RequestContext, Resource};
use crate::pipeline::views::ResponseWrite;
use axum::http::StatusCode;
use serde_json::{Value, json};

const NOT_FOUND: &str = "Not Found";

impl<T: Model> RequestContext<T> {
    /// Load the record named by the `id` path parameter into the result
    pub(crate) fn fetch_by_id(&mut self) -> bool {
        let Some(id) = self.params.get("id").cloned() else {
            self.respond_text(StatusCode::NOT_FOUND, NOT_FOUND);
            return false;
        };

        let record = match self.store.find(&self.table, &id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(table = %self.table, id = %id, "Record not found");
                self.respond_text(StatusCode::NOT_FOUND, NOT_FOUND);
                return false;
            }
            Err(err) => return self.store_failure(err),
        };

        match serde_json::from_value::<T>(record.clone()) {
            Ok(item) => {
                self.stored = Some(record);
                self.result = Some(Resource::One(item));
                true
            }
            Err(err) => self.decode_failure(err),
        }
    }

    /// Load every record visible through the store handle into the result
    pub(crate) fn fetch_all(&mut self) -> bool {
        let records = match self.store.find_all(&self.table) {
            Ok(records) => records,
            Err(err) => return self.store_failure(err),
        };

        let items: Result<Vec<T>, _> = records.into_iter().map(serde_json::from_value).collect();
        match items {
            Ok(items) => {
                self.result = Some(Resource::Many(items));
                true
            }
            Err(err) => self.decode_failure(err),
        }
    }

    /// Parse the body into a new instance and validate it
    pub(crate) fn parse_upload(&mut self) -> bool {
        let item = match serde_json::from_slice::<T>(&self.body) {
            Ok(item) => item,
            Err(err) => return self.malformed_body(err.to_string()),
        };

        if !self.accept_valid(&item) {
            return false;
        }
        self.upload = Some(item);
        true
    }

    /// Overlay the body onto the fetched instance
    ///
    /// The identity field may not change. Nested objects are merged key by
    /// key; any other value replaces what was there.
    pub(crate) fn merge_upload(&mut self) -> bool {
        let Some(current) = self.result.as_ref().and_then(Resource::as_one) else {
            self.respond_text(StatusCode::NOT_FOUND, NOT_FOUND);
            return false;
        };
        let mut merged = match serde_json::to_value(current) {
            Ok(value) => value,
            Err(err) => return self.decode_failure(err),
        };

        let patch = match serde_json::from_slice::<Value>(&self.body) {
            Ok(patch @ Value::Object(_)) => patch,
            Ok(_) => return self.malformed_body("expected a JSON object".to_string()),
            Err(err) => return self.malformed_body(err.to_string()),
        };

        let key = self.table.key;
        let before = merged.get(key).cloned();
        overlay(&mut merged, patch);
        let after = merged.get(key).cloned();

        if before != after {
            tracing::warn!(
                table = %self.table,
                before = ?before,
                after = ?after,
                "Patch trying to change identity"
            );
            let mut errors = FieldErrors::new();
            errors.insert(key.to_string(), "cannot be changed".to_string());
            self.respond(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "errors": errors }),
            );
            return false;
        }

        let item = match serde_json::from_value::<T>(merged) {
            Ok(item) => item,
            Err(err) => return self.malformed_body(err.to_string()),
        };
        if !self.accept_valid(&item) {
            return false;
        }

        self.result = Some(Resource::One(item.clone()));
        self.upload = Some(item);
        true
    }

    /// Insert the upload and keep the stored record as the result
    pub(crate) fn create(&mut self, store: &StoreHandle) -> bool {
        self.write_upload(store, None, StoreHandle::create)
    }

    /// Save the merged upload over the existing record
    ///
    /// The upload is overlaid onto the raw stored record, so fields the model
    /// reads but never serializes survive.
    pub(crate) fn update(&mut self, store: &StoreHandle) -> bool {
        let base = self.stored.clone();
        self.write_upload(store, base, StoreHandle::save)
    }

    /// Remove the fetched record; the result keeps its prior value
    pub(crate) fn delete(&mut self, store: &StoreHandle) -> bool {
        let Some(id) = self
            .result
            .as_ref()
            .and_then(Resource::as_one)
            .and_then(identity_of)
        else {
            self.respond_text(StatusCode::NOT_FOUND, NOT_FOUND);
            return false;
        };

        let id = identity_key(&id);
        tracing::info!(table = %self.table, id = %id, "Deleting");
        match store.delete(&self.table, &id) {
            Ok(()) => true,
            Err(err) => self.store_failure(err),
        }
    }

    /// Write the result as the 200 response
    pub(crate) fn serialize(&mut self) -> bool {
        let Some(result) = &self.result else {
            tracing::error!(table = %self.table, "Serialise empty result");
            self.respond_text(StatusCode::NOT_FOUND, NOT_FOUND);
            return false;
        };

        match serde_json::to_value(result) {
            Ok(body) => {
                self.respond(StatusCode::OK, body);
                true
            }
            Err(err) => {
                tracing::error!(table = %self.table, error = %err, "JSON encode failed");
                self.respond(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "msg": "Failed to encode JSON" }),
                );
                false
            }
        }
    }

    fn write_upload(
        &mut self,
        store: &StoreHandle,
        base: Option<Value>,
        write: fn(&StoreHandle, &Table, Value) -> Result<Value, StoreError>,
    ) -> bool {
        let Some(item) = &self.upload else {
            return self.malformed_body("missing upload".to_string());
        };
        let upload = match serde_json::to_value(item) {
            Ok(upload) => upload,
            Err(err) => return self.decode_failure(err),
        };
        let record = match base {
            Some(mut record) => {
                overlay(&mut record, upload);
                record
            }
            None => upload,
        };

        let stored = match write(store, &self.table, record) {
            Ok(stored) => stored,
            Err(err) => return self.store_failure(err),
        };
        match serde_json::from_value::<T>(stored) {
            Ok(item) => {
                self.result = Some(Resource::One(item));
                true
            }
            Err(err) => self.decode_failure(err),
        }
    }

    /// Respond 422 with the validation errors of `item`, if any
    fn accept_valid(&mut self, item: &T) -> bool {
        let errors = item
            .as_validatable()
            .map(|v| v.validate_upload())
            .unwrap_or_default();
        if errors.is_empty() {
            return true;
        }

        tracing::warn!(table = %self.table, errors = ?errors, "Validation error");
        self.respond(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "errors": errors }),
        );
        false
    }

    fn malformed_body(&mut self, message: String) -> bool {
        tracing::warn!(table = %self.table, error = %message, "Can't parse incoming json");
        self.respond(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "errors": { "json": message } }),
        );
        false
    }

    fn decode_failure(&mut self, err: serde_json::Error) -> bool {
        tracing::error!(table = %self.table, error = %err, "Record does not match the model");
        self.respond(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "Record does not match the model" }),
        );
        false
    }

    fn store_failure(&mut self, err: StoreError) -> bool {
        tracing::warn!(table = %self.table, error = %err, "Store operation failed");
        self.respond(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": err.to_string() }),
        );
        false
    }
}

fn overlay(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        *target = patch;
        return;
    };
    let Some(fields) = target.as_object_mut() else {
        *target = Value::Object(patch);
        return;
    };

    for (key, value) in patch {
        match fields.get_mut(&key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                overlay(existing, value)
            }
            _ => {
                fields.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{DataStore, Scope};
    use crate::pipeline::Verb;
    use crate::storage::MemoryStore;
    use axum::body::{Body, Bytes};
    use axum::http::Request;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Account {
        id: u64,
        name: String,
        #[serde(default, skip_serializing)]
        secret: String,
    }

    impl Model for Account {
        fn model_name() -> &'static str {
            "Account"
        }
    }

    fn patch_context(store: &MemoryStore, body: &str) -> RequestContext<Account> {
        let (parts, _) = Request::builder()
            .method("PATCH")
            .uri("/api/accounts/1")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        RequestContext::new(
            Verb::Patch,
            Table::new("accounts", "id"),
            StoreHandle::new(Arc::new(store.clone())),
            parts,
            Bytes::from(body.to_string()),
            HashMap::from([("id".to_string(), "1".to_string())]),
        )
    }

    #[test]
    fn test_update_keeps_unserialized_stored_fields() {
        let store = MemoryStore::new();
        store
            .seed(
                "accounts",
                vec![json!({"id": 1, "name": "old", "secret": "s3cret", "extra": {"a": 1}})],
            )
            .unwrap();
        let handle = StoreHandle::new(Arc::new(store.clone()));

        let mut ctx = patch_context(&store, r#"{"name": "new"}"#);
        assert!(ctx.fetch_by_id());
        assert!(ctx.merge_upload());
        assert!(ctx.update(&handle));

        let saved = store
            .find(&Table::new("accounts", "id"), "1", &Scope::all())
            .unwrap()
            .unwrap();
        assert_eq!(
            saved,
            json!({"id": 1, "name": "new", "secret": "s3cret", "extra": {"a": 1}})
        );
    }

    #[test]
    fn test_overlay_replaces_scalars_and_keeps_missing_keys() {
        let mut target = json!({"id": 1, "name": "old", "tags": ["a"]});
        overlay(&mut target, json!({"name": "new", "tags": []}));
        assert_eq!(target, json!({"id": 1, "name": "new", "tags": []}));
    }

    #[test]
    fn test_overlay_merges_nested_objects() {
        let mut target = json!({"address": {"city": "Paris", "zip": "75001"}});
        overlay(&mut target, json!({"address": {"zip": "75002"}}));
        assert_eq!(target, json!({"address": {"city": "Paris", "zip": "75002"}}));
    }

    #[test]
    fn test_overlay_null_replaces() {
        let mut target = json!({"note": {"text": "x"}});
        overlay(&mut target, json!({"note": null}));
        assert_eq!(target, json!({"note": null}));
    }
}
