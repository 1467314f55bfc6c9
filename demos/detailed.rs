//! Authenticated API with per-user scoping
//!
//! This example demonstrates:
//! - Token login at `POST /api/login`
//! - Users readable by anyone logged in, writable by admins only
//! - Widgets owned by users: non-admins only see and upload their own
//! - A nested index, `GET /api/user/{user_id}/private_widgets`
//!
//! ```bash
//! cargo run --example detailed
//! TOKEN=$(curl -s -X POST localhost:3000/api/login \
//!     -d '{"name":"user1","password":"user1"}' | jq -r .token)
//! curl -H "Authorization: Bearer $TOKEN" localhost:3000/api/private_widgets
//! ```

use anyhow::Result;
use grapi::prelude::*;
use serde_json::Map;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: u64,
    name: String,
    #[serde(default, skip_serializing)]
    password: String,
    #[serde(default)]
    admin: bool,
}

impl Model for User {
    fn model_name() -> &'static str {
        "User"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PrivateWidget {
    #[serde(default)]
    id: u64,
    user_id: u64,
    name: String,
}

impl Model for PrivateWidget {
    fn model_name() -> &'static str {
        "PrivateWidget"
    }

    fn as_owned(&self) -> Option<&dyn Owned> {
        Some(self)
    }
}

impl Owned for PrivateWidget {
    fn owner_id(&self) -> Option<u64> {
        Some(self.user_id)
    }
}

/// Checks name and password against the `users` table
struct UserLogin;

impl LoginModel for UserLogin {
    fn check_login_details(
        &self,
        credentials: &Map<String, Value>,
        store: &StoreHandle,
    ) -> Result<u64, AuthError> {
        let (Some(name), Some(password)) = (credentials.get("name"), credentials.get("password"))
        else {
            return Err(AuthError::LoginRejected("missing credentials".into()));
        };

        store
            .filter(Filter::eq("name", name.clone()))
            .filter(Filter::eq("password", password.clone()))
            .find_all(&Table::new("users", "id"))
            .map_err(|e| AuthError::LoginRejected(e.to_string()))?
            .first()
            .and_then(|user| user["id"].as_u64())
            .ok_or_else(|| AuthError::LoginRejected("not authenticated".into()))
    }

    fn get_by_id(&self, id: u64, store: &StoreHandle) -> Result<Principal, AuthError> {
        let record = store
            .find(&Table::new("users", "id"), &id.to_string())
            .ok()
            .flatten()
            .ok_or(AuthError::UnknownSubject(id))?;
        let user: User =
            serde_json::from_value(record).map_err(|_| AuthError::UnknownSubject(id))?;
        Ok(Principal::new(user))
    }
}

fn current_user<V: PrincipalRead + ?Sized>(request: &V) -> Option<&User> {
    request.principal().and_then(|p| p.downcast_ref::<User>())
}

fn only_authenticated<T: Model>() -> RouteConfig<T> {
    RouteConfig::new().use_default_auth()
}

fn only_admin<T: Model>() -> RouteConfig<T> {
    RouteConfig::new().use_default_auth().authorize(|request| {
        if current_user(&*request).is_some_and(|user| user.admin) {
            return true;
        }
        request.respond(StatusCode::FORBIDDEN, json!({"error": "Admins only"}));
        false
    })
}

fn own_unless_admin() -> RouteConfig<PrivateWidget> {
    RouteConfig::new()
        .use_default_auth()
        .query_scope(|request| {
            let Some(user) = current_user(&*request) else {
                return false;
            };
            if !user.admin {
                let scoped = request.store().filter(Filter::eq("user_id", user.id));
                request.set_store(scoped);
            }
            true
        })
        .check_upload(|request| {
            let allowed = match (current_user(&*request), request.upload()) {
                (Some(user), Some(widget)) => user.admin || is_owned_by(widget, user.id),
                _ => false,
            };
            if !allowed {
                request.respond(StatusCode::FORBIDDEN, json!({"error": "Not your widget"}));
            }
            allowed
        })
}

fn seed(store: &MemoryStore) -> Result<()> {
    store.seed(
        "users",
        vec![
            json!({"id": 1, "name": "user1", "password": "user1", "admin": false}),
            json!({"id": 2, "name": "user2", "password": "user2", "admin": false}),
            json!({"id": 3, "name": "admin", "password": "admin", "admin": true}),
        ],
    )?;
    store.seed(
        "private_widgets",
        vec![
            json!({"id": 1, "user_id": 1, "name": "User 1's Widget"}),
            json!({"id": 2, "user_id": 2, "name": "User 2's Widget"}),
        ],
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ApiConfig {
        jwt_secret: Some("SomethingLongAndDifficultToGuess".to_string()),
        log_level: LogLevel::Verbose,
        ..ApiConfig::default()
    }
    .with_env_overrides()?;
    grapi::logging::init(config.log_level);

    let store = MemoryStore::new();
    seed(&store)?;

    let options = Options::builder()
        .store(store)
        .login_model(UserLogin)
        .config(config)
        .build()?;

    let api = Api::new(options)
        .set_auth("login")?
        .add_default_routes(vec![only_authenticated::<User>(), only_admin::<User>()])?
        .add_default_routes(vec![own_unless_admin()])?
        .add_index_route(
            only_admin::<PrivateWidget>()
                .prefix("/user/{user_id}")
                .query_scope(scope_by_param("user_id", "user_id")),
        )?;

    println!("🚀 grapi detailed example");
    println!("   Users: user1/user1, user2/user2, admin/admin\n");
    for (method, path) in api.routes() {
        println!("   {:<6} {}", method, path);
    }
    println!();

    api.serve("127.0.0.1:3000").await
}
