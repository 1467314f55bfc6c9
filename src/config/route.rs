//! Per route group configuration

use crate::config::Options;
use crate::core::auth::default_authenticator;
use crate::core::error::ConfigError;
use crate::core::model::Model;
use crate::pipeline::views::{
    AuthenticateFn, AuthenticateView, AuthorizeFn, AuthorizeView, CheckUploadFn, EditResultFn,
    QueryScopeFn, QueryScopeView, ResultEditView, UploadCheckView,
};
use std::fmt;
use std::sync::Arc;

/// Stage callbacks and naming overrides for a group of routes
///
/// Built with chained setters, then handed to the [`Api`](crate::server::Api)
/// which finalizes it when the routes are registered. A finalized config is
/// never modified again.
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
///     user_id: u64,
/// }
///
/// impl Model for Widget {
///     fn model_name() -> &'static str {
///         "Widget"
///     }
/// }
///
/// // GET /api/user/{user_id}/widgets lists the widgets of one user
/// let by_user = RouteConfig::<Widget>::new()
///     .prefix("/user/{user_id}")
///     .query_scope(|request| {
///         let Some(user_id) = request.param("user_id").map(str::to_string) else {
///             return false;
///         };
///         let scoped = request.store().filter(Filter::eq("user_id", user_id));
///         request.set_store(scoped);
///         true
///     });
/// ```
pub struct RouteConfig<T: Model> {
    pub(crate) prefix: String,
    pub(crate) model_name: Option<String>,
    pub(crate) use_default_auth: bool,
    pub(crate) authenticate: Option<AuthenticateFn>,
    pub(crate) authorize: Option<AuthorizeFn>,
    pub(crate) query_scope: Option<QueryScopeFn>,
    pub(crate) check_upload: Option<CheckUploadFn<T>>,
    pub(crate) edit_result: Option<EditResultFn<T>>,
    finalized: bool,
}

impl<T: Model> RouteConfig<T> {
    /// A config with no stages and no overrides
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            model_name: None,
            use_default_auth: false,
            authenticate: None,
            authorize: None,
            query_scope: None,
            check_upload: None,
            edit_result: None,
            finalized: false,
        }
    }

    /// Path segment inserted between the API prefix and the model name
    ///
    /// May declare path parameters, e.g. `/department/{dept_id}`; stages read
    /// them with [`RequestInfo::param`](crate::pipeline::views::RequestInfo::param).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Use this name in the path instead of the pluralized table name
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Install the built-in token authenticator at registration
    pub fn use_default_auth(mut self) -> Self {
        self.use_default_auth = true;
        self
    }

    pub fn authenticate(
        mut self,
        stage: impl Fn(&mut dyn AuthenticateView) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.authenticate = Some(Arc::new(stage));
        self
    }

    pub fn authorize(
        mut self,
        stage: impl Fn(&mut dyn AuthorizeView) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.authorize = Some(Arc::new(stage));
        self
    }

    /// Narrow the store handle used by fetch-by-id and fetch-all
    pub fn query_scope(
        mut self,
        stage: impl Fn(&mut dyn QueryScopeView) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.query_scope = Some(Arc::new(stage));
        self
    }

    /// Inspect the parsed upload of POST and PATCH requests
    pub fn check_upload(
        mut self,
        stage: impl Fn(&mut dyn UploadCheckView<T>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.check_upload = Some(Arc::new(stage));
        self
    }

    /// Edit or replace the result just before it is serialized
    pub fn edit_result(
        mut self,
        stage: impl Fn(&mut dyn ResultEditView<T>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.edit_result = Some(Arc::new(stage));
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Resolve the built-in authenticator, once
    ///
    /// Later calls are no-ops. `path` only names the routes in the error.
    pub fn finalize(&mut self, options: &Options, path: &str) -> Result<(), ConfigError> {
        if self.finalized {
            return Ok(());
        }

        if self.use_default_auth {
            if self.authenticate.is_some() {
                return Err(ConfigError::ConflictingAuthenticate {
                    path: path.to_string(),
                });
            }
            let secret = options.jwt_secret.clone().ok_or(ConfigError::MissingSecret)?;
            let login_model = options
                .login_model
                .clone()
                .ok_or(ConfigError::MissingLoginModel)?;

            tracing::debug!(path = %path, "Installing default authenticator");
            self.authenticate = Some(default_authenticator(
                secret,
                login_model,
                options.store.clone(),
            ));
        }

        self.finalized = true;
        Ok(())
    }
}

impl<T: Model> Default for RouteConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Model> Clone for RouteConfig<T> {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            model_name: self.model_name.clone(),
            use_default_auth: self.use_default_auth,
            authenticate: self.authenticate.clone(),
            authorize: self.authorize.clone(),
            query_scope: self.query_scope.clone(),
            check_upload: self.check_upload.clone(),
            edit_result: self.edit_result.clone(),
            finalized: self.finalized,
        }
    }
}

impl<T: Model> fmt::Debug for RouteConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfig")
            .field("prefix", &self.prefix)
            .field("model_name", &self.model_name)
            .field("use_default_auth", &self.use_default_auth)
            .field("authenticate", &self.authenticate.is_some())
            .field("authorize", &self.authorize.is_some())
            .field("query_scope", &self.query_scope.is_some())
            .field("check_upload", &self.check_upload.is_some())
            .field("edit_result", &self.edit_result.is_some())
            .field("finalized", &self.finalized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::{LoginModel, Principal};
    use crate::core::error::AuthError;
    use crate::core::store::StoreHandle;
    use crate::storage::MemoryStore;
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Thing {
        id: u64,
    }

    impl Model for Thing {
        fn model_name() -> &'static str {
            "Thing"
        }
    }

    struct NoLogin;

    impl LoginModel for NoLogin {
        fn check_login_details(
            &self,
            _credentials: &Map<String, Value>,
            _store: &StoreHandle,
        ) -> Result<u64, AuthError> {
            Err(AuthError::LoginRejected("never".into()))
        }

        fn get_by_id(&self, id: u64, _store: &StoreHandle) -> Result<Principal, AuthError> {
            Err(AuthError::UnknownSubject(id))
        }
    }

    fn auth_options() -> Options {
        Options::builder()
            .store(MemoryStore::new())
            .jwt_secret("secret")
            .login_model(NoLogin)
            .build()
            .unwrap()
    }

    #[test]
    fn test_finalize_installs_default_authenticator() {
        let mut config = RouteConfig::<Thing>::new().use_default_auth();
        config.finalize(&auth_options(), "/api/things").unwrap();

        assert!(config.is_finalized());
        assert!(config.authenticate.is_some());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let options = auth_options();
        let mut config = RouteConfig::<Thing>::new().use_default_auth();
        config.finalize(&options, "/api/things").unwrap();
        let installed = config.authenticate.clone().unwrap();

        config.finalize(&options, "/api/things").unwrap();
        assert!(Arc::ptr_eq(&installed, config.authenticate.as_ref().unwrap()));
    }

    #[test]
    fn test_finalize_rejects_conflicting_authenticate() {
        let mut config = RouteConfig::<Thing>::new()
            .use_default_auth()
            .authenticate(|_| true);

        let err = config.finalize(&auth_options(), "/api/things").unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingAuthenticate { path } if path == "/api/things"));
        assert!(!config.is_finalized());
    }

    #[test]
    fn test_finalize_requires_secret_and_login_model() {
        let no_secret = Options::builder()
            .store(MemoryStore::new())
            .login_model(NoLogin)
            .build()
            .unwrap();
        let err = RouteConfig::<Thing>::new()
            .use_default_auth()
            .finalize(&no_secret, "/api/things")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));

        let no_model = Options::builder()
            .store(MemoryStore::new())
            .jwt_secret("secret")
            .build()
            .unwrap();
        let err = RouteConfig::<Thing>::new()
            .use_default_auth()
            .finalize(&no_model, "/api/things")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingLoginModel));
    }

    #[test]
    fn test_finalize_without_default_auth_keeps_stages() {
        let mut config = RouteConfig::<Thing>::new().authorize(|_| true);
        config.finalize(&auth_options(), "/api/things").unwrap();

        assert!(config.authenticate.is_none());
        assert!(config.authorize.is_some());
    }
}
