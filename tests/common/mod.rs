//! Models and fixtures shared by the integration tests

#![allow(dead_code)]

use axum_test::TestServer;
use grapi::core::auth::issue_token;
use grapi::prelude::*;
use serde::Serializer;
use serde_json::Map;
use validator::Validate;

pub const SECRET: &str = "SomethingLongAndDifficultToGuess";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    #[serde(default)]
    pub id: u64,
    pub name: String,
}

impl Model for Widget {
    fn model_name() -> &'static str {
        "Widget"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifiedWidget {
    #[serde(default)]
    pub id: u64,
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub name: String,
}

impl Model for VerifiedWidget {
    fn model_name() -> &'static str {
        "VerifiedWidget"
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}

impl Validatable for VerifiedWidget {
    fn validate_upload(&self) -> FieldErrors {
        field_errors(self.validate())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateWidget {
    #[serde(default)]
    pub id: u64,
    pub user_id: u64,
    pub name: String,
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

/// A model whose name cannot always be encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragile {
    pub id: u64,
    #[serde(serialize_with = "refuse_poison")]
    pub name: String,
}

impl Model for Fragile {
    fn model_name() -> &'static str {
        "Fragile"
    }
}

fn refuse_poison<S: Serializer>(name: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if name == "poison" {
        return Err(serde::ser::Error::custom("poisoned name"));
    }
    serializer.serialize_str(name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub admin: bool,
}

impl Model for User {
    fn model_name() -> &'static str {
        "User"
    }
}

/// Logs users in by name and password, looking them up in the `users` table
pub struct UserLogin;

impl UserLogin {
    fn table() -> Table {
        Table::new("users", "id")
    }
}

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
            .find_all(&Self::table())
            .map_err(|e| AuthError::LoginRejected(e.to_string()))?
            .first()
            .and_then(|user| user["id"].as_u64())
            .ok_or_else(|| AuthError::LoginRejected("not authenticated".into()))
    }

    fn get_by_id(&self, id: u64, store: &StoreHandle) -> Result<Principal, AuthError> {
        let record = store
            .find(&Self::table(), &id.to_string())
            .ok()
            .flatten()
            .ok_or(AuthError::UnknownSubject(id))?;
        let user: User =
            serde_json::from_value(record).map_err(|_| AuthError::UnknownSubject(id))?;
        Ok(Principal::new(user))
    }
}

/// Store with three users (the third is admin) and one private widget each
/// for the first two
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed(
            "users",
            vec![
                json!({"id": 1, "name": "user1", "password": "user1", "admin": false}),
                json!({"id": 2, "name": "user2", "password": "user2", "admin": false}),
                json!({"id": 3, "name": "admin", "password": "admin", "admin": true}),
            ],
        )
        .unwrap();
    store
        .seed(
            "private_widgets",
            vec![
                json!({"id": 1, "user_id": 1, "name": "User 1's Widget"}),
                json!({"id": 2, "user_id": 2, "name": "User 2's Widget"}),
            ],
        )
        .unwrap();
    store
}

pub fn plain_options(store: &MemoryStore) -> Options {
    Options::builder().store(store.clone()).build().unwrap()
}

pub fn auth_options(store: &MemoryStore) -> Options {
    Options::builder()
        .store(store.clone())
        .jwt_secret(SECRET)
        .login_model(UserLogin)
        .build()
        .unwrap()
}

pub fn token_for(id: u64) -> String {
    issue_token(id, SECRET).unwrap()
}

pub fn server(api: Api) -> TestServer {
    TestServer::new(api.router())
}

/// Append `stage` to the trace kept in the request data slot
pub fn trace<V: RequestInfo + ?Sized>(request: &mut V, stage: &'static str) {
    match request.data_as_mut::<Vec<&'static str>>() {
        Some(trace) => trace.push(stage),
        None => request.put_data(vec![stage]),
    }
}

/// The principal of a request as a [`User`]
pub fn current_user<V: PrincipalRead + ?Sized>(request: &V) -> Option<&User> {
    request.principal().and_then(|p| p.downcast_ref::<User>())
}
