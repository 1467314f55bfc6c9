//! The request pipeline
//!
//! Each route runs a fixed, ordered list of stages for its verb:
//!
//! | Verb | Stages |
//! |---|---|
//! | GET item | Authenticate, Authorize, QueryScope, fetch-by-id, EditResult, serialize |
//! | GET index | Authenticate, Authorize, QueryScope, fetch-all, EditResult, serialize |
//! | POST | Authenticate, Authorize, parse-upload, CheckUpload, create, EditResult, serialize |
//! | PATCH | Authenticate, Authorize, QueryScope, fetch-by-id, merge-upload, CheckUpload, update, EditResult, serialize |
//! | DELETE | Authenticate, Authorize, QueryScope, fetch-by-id, delete, EditResult, serialize |
//!
//! The first stage returning `false` halts the request. It is expected to
//! have written the response; if it did not, the client gets an empty 500.

mod builtin;
pub mod context;
pub mod scoping;
pub mod views;

pub use context::{RequestContext, Resource};
pub use views::{
    AuthenticateFn, AuthenticateView, AuthorizeFn, AuthorizeView, CheckUploadFn, EditResultFn,
    PrincipalRead, QueryScopeFn, QueryScopeView, RequestInfo, RequestInfoExt, ResponseWrite,
    ResultEditView, UploadCheckView, UploadRead,
};

use crate::config::{Options, RouteConfig};
use crate::core::model::Model;
use crate::core::naming::table_name;
use crate::core::store::Table;
use axum::body::{Bytes, to_bytes};
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Largest request body read into a request context
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// The five operations generated for each model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    GetItem,
    GetIndex,
    Post,
    Patch,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 5] = [
        Verb::GetItem,
        Verb::GetIndex,
        Verb::Post,
        Verb::Patch,
        Verb::Delete,
    ];

    pub fn method(self) -> Method {
        match self {
            Verb::GetItem | Verb::GetIndex => Method::GET,
            Verb::Post => Method::POST,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }

    /// Whether the route addresses a single record by `{id}`
    pub fn is_item(self) -> bool {
        matches!(self, Verb::GetItem | Verb::Patch | Verb::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::GetItem => "GET",
            Verb::GetIndex => "index GET",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// Ordered stages run for this verb
    pub fn stages(self) -> &'static [Stage] {
        use Stage::*;

        match self {
            Verb::GetItem => &[
                Authenticate,
                Authorize,
                QueryScope,
                FetchById,
                EditResult,
                Serialize,
            ],
            Verb::GetIndex => &[
                Authenticate,
                Authorize,
                QueryScope,
                FetchAll,
                EditResult,
                Serialize,
            ],
            Verb::Post => &[
                Authenticate,
                Authorize,
                ParseUpload,
                CheckUpload,
                Create,
                EditResult,
                Serialize,
            ],
            Verb::Patch => &[
                Authenticate,
                Authorize,
                QueryScope,
                FetchById,
                MergeUpload,
                CheckUpload,
                Update,
                EditResult,
                Serialize,
            ],
            Verb::Delete => &[
                Authenticate,
                Authorize,
                QueryScope,
                FetchById,
                Delete,
                EditResult,
                Serialize,
            ],
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Authenticate,
    Authorize,
    QueryScope,
    FetchById,
    FetchAll,
    ParseUpload,
    MergeUpload,
    CheckUpload,
    Create,
    Update,
    Delete,
    EditResult,
    Serialize,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Authenticate => "authenticate",
            Stage::Authorize => "authorize",
            Stage::QueryScope => "query-scope",
            Stage::FetchById => "fetch-by-id",
            Stage::FetchAll => "fetch-all",
            Stage::ParseUpload => "parse-upload",
            Stage::MergeUpload => "merge-upload",
            Stage::CheckUpload => "check-upload",
            Stage::Create => "create",
            Stage::Update => "update",
            Stage::Delete => "delete",
            Stage::EditResult => "edit-result",
            Stage::Serialize => "serialize",
        }
    }

    /// Whether the stage comes from the route config rather than the pipeline
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            Stage::Authenticate
                | Stage::Authorize
                | Stage::QueryScope
                | Stage::CheckUpload
                | Stage::EditResult
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every stage succeeded and the result was serialized
    Completed,
    /// This stage returned `false`
    Halted(Stage),
}

/// The pipeline of one (model, verb) route
pub struct Pipeline<T: Model> {
    verb: Verb,
    table: Table,
    config: Arc<RouteConfig<T>>,
    options: Arc<Options>,
}

impl<T: Model> Pipeline<T> {
    pub fn new(verb: Verb, config: Arc<RouteConfig<T>>, options: Arc<Options>) -> Self {
        Self {
            verb,
            table: Table::new(table_name::<T>(), T::identity_field()),
            config,
            options,
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// A fresh context for one request, reading through the unscoped store
    pub fn context(
        &self,
        parts: Parts,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> RequestContext<T> {
        RequestContext::new(
            self.verb,
            self.table.clone(),
            self.options.store.clone(),
            parts,
            body,
            params,
        )
    }

    /// Run the stages of this verb in order, stopping at the first failure
    pub fn run(&self, ctx: &mut RequestContext<T>) -> Outcome {
        for &stage in self.verb.stages() {
            if !self.execute(stage, ctx) {
                return Outcome::Halted(stage);
            }
        }
        Outcome::Completed
    }

    fn execute(&self, stage: Stage, ctx: &mut RequestContext<T>) -> bool {
        let config = &self.config;
        let store = &self.options.store;

        match stage {
            Stage::Authenticate => match &config.authenticate {
                Some(authenticate) => authenticate(ctx),
                None => true,
            },
            Stage::Authorize => match &config.authorize {
                Some(authorize) => authorize(ctx),
                None => true,
            },
            Stage::QueryScope => match &config.query_scope {
                Some(query_scope) => query_scope(ctx),
                None => true,
            },
            Stage::CheckUpload => match &config.check_upload {
                Some(check_upload) => check_upload(ctx),
                None => true,
            },
            Stage::EditResult => match &config.edit_result {
                Some(edit_result) => edit_result(ctx),
                None => true,
            },
            Stage::FetchById => ctx.fetch_by_id(),
            Stage::FetchAll => ctx.fetch_all(),
            Stage::ParseUpload => ctx.parse_upload(),
            Stage::MergeUpload => ctx.merge_upload(),
            Stage::Create => ctx.create(store),
            Stage::Update => ctx.update(store),
            Stage::Delete => ctx.delete(store),
            Stage::Serialize => ctx.serialize(),
        }
    }

    /// Serve one HTTP request
    ///
    /// The body is read up front; the stages then run on the blocking pool
    /// since they, and the store calls they make, are synchronous.
    pub async fn handle(self: Arc<Self>, params: HashMap<String, String>, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let body = match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read request body");
                Bytes::new()
            }
        };

        let pipeline = self.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut ctx = pipeline.context(parts, body, params);
            let outcome = pipeline.run(&mut ctx);
            pipeline.report(outcome, &ctx);
            ctx.into_response()
        })
        .await;

        match joined {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(
                    model = T::model_name(),
                    verb = %self.verb,
                    error = %err,
                    "Pipeline task failed"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    fn report(&self, outcome: Outcome, ctx: &RequestContext<T>) {
        match outcome {
            Outcome::Completed => {
                tracing::info!(model = T::model_name(), verb = %self.verb, "Successful {}", self.verb);
            }
            Outcome::Halted(stage) if !ctx.has_responded() => {
                tracing::error!(
                    model = T::model_name(),
                    verb = %self.verb,
                    stage = %stage,
                    "Stage halted the request without writing a response"
                );
            }
            Outcome::Halted(stage) => {
                tracing::debug!(
                    model = T::model_name(),
                    verb = %self.verb,
                    stage = %stage,
                    status = ?ctx.response_status(),
                    "Request halted"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{DataStore, Scope};
    use crate::storage::MemoryStore;
    use axum::body::Body;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Gizmo {
        #[serde(default)]
        id: u64,
        name: String,
    }

    impl Model for Gizmo {
        fn model_name() -> &'static str {
            "Gizmo"
        }
    }

    fn options(store: MemoryStore) -> Arc<Options> {
        Arc::new(Options::builder().store(store).build().unwrap())
    }

    fn context(
        pipeline: &Pipeline<Gizmo>,
        method: Method,
        id: Option<&str>,
        body: &str,
    ) -> RequestContext<Gizmo> {
        let (parts, _) = Request::builder()
            .method(method)
            .uri("/api/gizmos")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let params = id
            .map(|id| HashMap::from([("id".to_string(), id.to_string())]))
            .unwrap_or_default();
        pipeline.context(parts, Bytes::from(body.to_string()), params)
    }

    #[test]
    fn test_verb_stage_orders() {
        assert_eq!(
            Verb::Post.stages(),
            &[
                Stage::Authenticate,
                Stage::Authorize,
                Stage::ParseUpload,
                Stage::CheckUpload,
                Stage::Create,
                Stage::EditResult,
                Stage::Serialize,
            ]
        );
        assert!(!Verb::Post.stages().contains(&Stage::QueryScope));
        assert_eq!(Verb::Patch.stages().len(), 9);
        for verb in Verb::ALL {
            assert_eq!(verb.stages().first(), Some(&Stage::Authenticate));
            assert_eq!(verb.stages().last(), Some(&Stage::Serialize));
        }
    }

    #[test]
    fn test_failing_stage_halts_the_run() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let later = calls.clone();

        let config = RouteConfig::<Gizmo>::new()
            .authorize(move |request| {
                seen.lock().unwrap().push("authorize");
                request.respond_text(StatusCode::FORBIDDEN, "Forbidden");
                false
            })
            .edit_result(move |_| {
                later.lock().unwrap().push("edit");
                true
            });
        let pipeline = Pipeline::new(Verb::GetIndex, Arc::new(config), options(MemoryStore::new()));

        let mut ctx = context(&pipeline, Method::GET, None, "");
        assert_eq!(pipeline.run(&mut ctx), Outcome::Halted(Stage::Authorize));
        assert_eq!(*calls.lock().unwrap(), vec!["authorize"]);
        assert_eq!(ctx.response_status(), Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_halt_without_response_is_internal_error() {
        let config = RouteConfig::<Gizmo>::new().query_scope(|_| false);
        let pipeline = Pipeline::new(Verb::GetIndex, Arc::new(config), options(MemoryStore::new()));

        let mut ctx = context(&pipeline, Method::GET, None, "");
        assert_eq!(pipeline.run(&mut ctx), Outcome::Halted(Stage::QueryScope));
        assert_eq!(
            ctx.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_post_then_patch_through_run() {
        let store = MemoryStore::new();
        let options = options(store.clone());
        let config = Arc::new(RouteConfig::<Gizmo>::new());

        let post = Pipeline::new(Verb::Post, config.clone(), options.clone());
        let mut ctx = context(&post, Method::POST, None, r#"{"name":"first"}"#);
        assert_eq!(post.run(&mut ctx), Outcome::Completed);
        assert_eq!(ctx.response_status(), Some(StatusCode::OK));
        assert_eq!(store.len("gizmos"), 1);

        let patch = Pipeline::new(Verb::Patch, config, options);
        let mut ctx = context(&patch, Method::PATCH, Some("1"), r#"{"name":"second"}"#);
        assert_eq!(patch.run(&mut ctx), Outcome::Completed);

        let mut ctx = context(&patch, Method::PATCH, Some("1"), r#"{"id":2}"#);
        assert_eq!(patch.run(&mut ctx), Outcome::Halted(Stage::MergeUpload));
        assert_eq!(ctx.response_status(), Some(StatusCode::UNPROCESSABLE_ENTITY));

        let records = store
            .find_all(&Table::new("gizmos", "id"), &Scope::all())
            .unwrap();
        assert_eq!(records, vec![json!({"id": 1, "name": "second"})]);
    }

    #[test]
    fn test_unknown_id_never_reaches_edit_result() {
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        let config = RouteConfig::<Gizmo>::new().edit_result(move |_| {
            *flag.lock().unwrap() = true;
            true
        });
        let pipeline = Pipeline::new(Verb::GetItem, Arc::new(config), options(MemoryStore::new()));

        let mut ctx = context(&pipeline, Method::GET, Some("7"), "");
        assert_eq!(pipeline.run(&mut ctx), Outcome::Halted(Stage::FetchById));
        assert_eq!(ctx.response_status(), Some(StatusCode::NOT_FOUND));
        assert!(!*reached.lock().unwrap());
    }
}
