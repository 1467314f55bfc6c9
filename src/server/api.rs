//! The route registrar

use super::login::LoginHandler;
use crate::config::{LogLevel, Options, RouteConfig};
use crate::core::error::ConfigError;
use crate::core::model::Model;
use crate::core::naming::{params_clash, route_template, table_name};
use crate::core::store::StoreHandle;
use crate::pipeline::{Pipeline, Verb};
use anyhow::Result;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Request};
use axum::http::{Method, StatusCode, header};
use axum::routing::{MethodRouter, delete, get, options, patch, post};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Generates and serves the CRUD routes of registered models
///
/// # Example
///
/// ```rust
/// use grapi::prelude::*;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Widget {
///     #[serde(default)]
///     id: u64,
///     name: String,
/// }
///
/// impl Model for Widget {
///     fn model_name() -> &'static str {
///         "Widget"
///     }
/// }
///
/// # fn main() -> Result<(), ConfigError> {
/// let options = Options::builder().store(MemoryStore::new()).build()?;
///
/// // GET, POST /api/widgets and GET, PATCH, DELETE /api/widgets/{id}
/// let app = Api::new(options)
///     .add_default_routes::<Widget>(vec![])?
///     .router();
/// # Ok(())
/// # }
/// ```
pub struct Api {
    options: Arc<Options>,
    router: Router,
    routes: BTreeSet<(String, String)>,
}

impl Api {
    pub fn new(options: Options) -> Self {
        Self {
            options: Arc::new(options),
            router: Router::new(),
            routes: BTreeSet::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The unscoped store handle
    pub fn store(&self) -> &StoreHandle {
        &self.options.store
    }

    /// Registered `(method, path)` pairs, sorted by path
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|(path, method)| (method.clone(), path.clone()))
            .collect();
        routes.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        routes
    }

    /// Register the five routes of `T`
    ///
    /// `configs` holds up to three configs: read (GET item and index), write
    /// (POST and PATCH) and delete. A missing slot reuses the previous one;
    /// with none, every route runs without optional stages. Each config is
    /// finalized once, even when it serves several slots.
    pub fn add_default_routes<T: Model>(
        mut self,
        configs: Vec<RouteConfig<T>>,
    ) -> Result<Self, ConfigError> {
        if configs.len() > 3 {
            return Err(ConfigError::TooManyRouteConfigs {
                count: configs.len(),
            });
        }

        let mut configs = configs.into_iter();
        let read = self.finalized(configs.next().unwrap_or_default())?;
        let write = match configs.next() {
            Some(config) => self.finalized(config)?,
            None => read.clone(),
        };
        let remove = match configs.next() {
            Some(config) => self.finalized(config)?,
            None => write.clone(),
        };

        let slots = [
            (Verb::GetItem, read.clone()),
            (Verb::GetIndex, read),
            (Verb::Post, write.clone()),
            (Verb::Patch, write),
            (Verb::Delete, remove),
        ];

        // Nothing is registered unless every route is free
        for (verb, config) in &slots {
            let path = self.route_path(*verb, config)?;
            self.ensure_free(&verb.method(), &path)?;
        }
        for (verb, config) in slots {
            self = self.register(verb, config)?;
        }
        Ok(self)
    }

    /// `GET {prefix}/{models}/{id}`
    pub fn add_get_route<T: Model>(self, config: RouteConfig<T>) -> Result<Self, ConfigError> {
        self.add_route(Verb::GetItem, config)
    }

    /// `GET {prefix}/{models}`
    pub fn add_index_route<T: Model>(self, config: RouteConfig<T>) -> Result<Self, ConfigError> {
        self.add_route(Verb::GetIndex, config)
    }

    /// `POST {prefix}/{models}`
    pub fn add_post_route<T: Model>(self, config: RouteConfig<T>) -> Result<Self, ConfigError> {
        self.add_route(Verb::Post, config)
    }

    /// `PATCH {prefix}/{models}/{id}`
    pub fn add_patch_route<T: Model>(self, config: RouteConfig<T>) -> Result<Self, ConfigError> {
        self.add_route(Verb::Patch, config)
    }

    /// `DELETE {prefix}/{models}/{id}`
    pub fn add_delete_route<T: Model>(self, config: RouteConfig<T>) -> Result<Self, ConfigError> {
        self.add_route(Verb::Delete, config)
    }

    /// Register the route of one verb
    pub fn add_route<T: Model>(
        self,
        verb: Verb,
        config: RouteConfig<T>,
    ) -> Result<Self, ConfigError> {
        let config = self.finalized(config)?;
        self.ensure_free(&verb.method(), &self.route_path(verb, &config)?)?;
        self.register(verb, config)
    }

    /// Add the login endpoint at `POST {prefix}/{path}`
    ///
    /// Requires a token secret and a login model in the options.
    pub fn set_auth(mut self, path: &str) -> Result<Self, ConfigError> {
        let secret = self
            .options
            .jwt_secret
            .clone()
            .ok_or(ConfigError::MissingSecret)?;
        let login_model = self
            .options
            .login_model
            .clone()
            .ok_or(ConfigError::MissingLoginModel)?;

        let login_path = format!("{}/{}", self.options.uri_prefix, path.trim_matches('/'));
        let login_path = route_template(&login_path).map_err(|reason| ConfigError::InvalidPath {
            path: login_path.clone(),
            reason,
        })?;
        self.claim(&Method::POST, &login_path)?;
        tracing::info!(path = %login_path, "Setting login path");

        let handler = Arc::new(LoginHandler::new(
            secret,
            login_model,
            self.options.store.clone(),
        ));
        self.router = self.router.route(
            &login_path,
            post(move |body: Bytes| {
                let handler = handler.clone();
                async move { handler.handle(body).await }
            }),
        );
        Ok(self)
    }

    /// The finished router, with request ids, panic recovery and, when
    /// verbose, HTTP tracing
    ///
    /// Every registered path also answers `OPTIONS` with 200 and an `Allow`
    /// header listing its methods.
    pub fn router(self) -> Router {
        let mut allowed: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (path, method) in &self.routes {
            allowed.entry(path).or_default().push(method);
        }
        let preflight: Vec<(String, String)> = allowed
            .into_iter()
            .map(|(path, mut methods)| {
                methods.push("OPTIONS");
                methods.sort_unstable();
                (path.to_string(), methods.join(", "))
            })
            .collect();

        let mut router = self.router;
        for (path, methods) in preflight {
            router = router.route(
                &path,
                options(move || async move { (StatusCode::OK, [(header::ALLOW, methods)]) }),
            );
        }

        let mut router = router
            .layer(CatchPanicLayer::new())
            .layer(PropagateRequestIdLayer::x_request_id());

        if self.options.log_level == LogLevel::Verbose {
            router = router.layer(TraceLayer::new_for_http());
        }

        router.layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve the API with graceful shutdown
    ///
    /// Binds `addr`, then serves until SIGTERM or Ctrl+C.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    fn finalized<T: Model>(
        &self,
        mut config: RouteConfig<T>,
    ) -> Result<Arc<RouteConfig<T>>, ConfigError> {
        let path = self.base_path(&config);
        config.finalize(&self.options, &path)?;
        Ok(Arc::new(config))
    }

    fn base_path<T: Model>(&self, config: &RouteConfig<T>) -> String {
        let name = config
            .model_name
            .clone()
            .unwrap_or_else(table_name::<T>);
        match config.prefix.trim_matches('/') {
            "" => format!("{}/{}", self.options.uri_prefix, name),
            prefix => format!("{}/{}/{}", self.options.uri_prefix, prefix, name),
        }
    }

    /// Route template of `verb`, with `:name` parameters translated
    fn route_path<T: Model>(
        &self,
        verb: Verb,
        config: &RouteConfig<T>,
    ) -> Result<String, ConfigError> {
        let mut path = self.base_path(config);
        if verb.is_item() {
            path.push_str("/{id}");
        }
        route_template(&path).map_err(|reason| ConfigError::InvalidPath { path, reason })
    }

    fn ensure_free(&self, method: &Method, path: &str) -> Result<(), ConfigError> {
        if self
            .routes
            .contains(&(path.to_string(), method.to_string()))
        {
            return Err(ConfigError::DuplicateRoute {
                method: method.to_string(),
                path: path.to_string(),
            });
        }
        if let Some((existing, _)) = self
            .routes
            .iter()
            .find(|(existing, _)| params_clash(existing, path))
        {
            return Err(ConfigError::InvalidPath {
                path: path.to_string(),
                reason: format!("parameter names differ from {}", existing),
            });
        }
        Ok(())
    }

    fn claim(&mut self, method: &Method, path: &str) -> Result<(), ConfigError> {
        self.ensure_free(method, path)?;
        self.routes.insert((path.to_string(), method.to_string()));
        Ok(())
    }

    fn register<T: Model>(
        mut self,
        verb: Verb,
        config: Arc<RouteConfig<T>>,
    ) -> Result<Self, ConfigError> {
        let path = self.route_path(verb, &config)?;
        self.claim(&verb.method(), &path)?;
        tracing::info!(model = T::model_name(), path = %path, "Adding {} route", verb);

        let pipeline = Arc::new(Pipeline::new(verb, config, self.options.clone()));
        self.router = self.router.route(&path, pipeline_route(verb, pipeline));
        Ok(self)
    }
}

fn pipeline_route<T: Model>(verb: Verb, pipeline: Arc<Pipeline<T>>) -> MethodRouter {
    let handler = move |params: Option<Path<HashMap<String, String>>>, request: Request| {
        let pipeline = pipeline.clone();
        async move {
            let params = params.map(|Path(params)| params).unwrap_or_default();
            pipeline.handle(params, request).await
        }
    };

    match verb {
        Verb::GetItem | Verb::GetIndex => get(handler),
        Verb::Post => post(handler),
        Verb::Patch => patch(handler),
        Verb::Delete => delete(handler),
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
