//! Capability views handed to user stages
//!
//! Every optional stage receives a trait object exposing only what that stage
//! kind may touch. The views are built from a few small capability traits:
//!
//! | View | Request info | Set principal | Read principal | Respond | Store | Upload | Result |
//! |---|---|---|---|---|---|---|---|
//! | [`AuthenticateView`] | yes | yes | | yes | | | |
//! | [`AuthorizeView`] | yes | | yes | yes | | | |
//! | [`QueryScopeView`] | yes | | yes | | yes | | |
//! | [`UploadCheckView`] | yes | | yes | yes | | yes | |
//! | [`ResultEditView`] | yes | | yes | | | yes | yes |
//!
//! A stage cannot reach past its view:
//!
//! ```rust,compile_fail
//! use grapi::prelude::*;
//!
//! fn widen(request: &mut dyn AuthorizeView) {
//!     // AuthorizeView has no store access
//!     let store = request.store().clone();
//! }
//! ```

use crate::core::auth::Principal;
use crate::core::model::Model;
use crate::core::store::{StoreHandle, Table};
use crate::pipeline::Verb;
use crate::pipeline::context::{RequestContext, Resource};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Free-form per-request data owned by the user stages
pub type UserData = dyn Any + Send + Sync;

/// Authenticate stage callback
pub type AuthenticateFn = Arc<dyn Fn(&mut dyn AuthenticateView) -> bool + Send + Sync>;

/// Authorize stage callback
pub type AuthorizeFn = Arc<dyn Fn(&mut dyn AuthorizeView) -> bool + Send + Sync>;

/// QueryScope stage callback
pub type QueryScopeFn = Arc<dyn Fn(&mut dyn QueryScopeView) -> bool + Send + Sync>;

/// CheckUpload stage callback
pub type CheckUploadFn<T> = Arc<dyn Fn(&mut dyn UploadCheckView<T>) -> bool + Send + Sync>;

/// EditResult stage callback
pub type EditResultFn<T> = Arc<dyn Fn(&mut dyn ResultEditView<T>) -> bool + Send + Sync>;

/// Request information available to every stage
pub trait RequestInfo {
    fn verb(&self) -> Verb;

    /// HTTP method of the request
    fn method(&self) -> &Method;

    /// Path parameter, e.g. `id` or a parameter declared in a route prefix
    fn param(&self, name: &str) -> Option<&str>;

    /// Header value, if present and valid UTF-8
    fn header(&self, name: &str) -> Option<&str>;

    /// Raw query string
    fn query(&self) -> Option<&str>;

    /// Head of the raw request
    fn request(&self) -> &Parts;

    /// Raw request body
    fn body(&self) -> &[u8];

    /// Table the route serves
    fn table(&self) -> &Table;

    fn data(&self) -> Option<&UserData>;
    fn data_mut(&mut self) -> Option<&mut UserData>;
    fn set_data(&mut self, data: Box<UserData>);
}

/// Typed access to the user data slot
pub trait RequestInfoExt: RequestInfo {
    /// The data slot as `D`, if that is what it holds
    fn data_as<D: Any>(&self) -> Option<&D> {
        self.data().and_then(|data| data.downcast_ref::<D>())
    }

    fn data_as_mut<D: Any>(&mut self) -> Option<&mut D> {
        self.data_mut().and_then(|data| data.downcast_mut::<D>())
    }

    /// Replace the data slot
    fn put_data<D: Any + Send + Sync>(&mut self, data: D) {
        self.set_data(Box::new(data));
    }
}

impl<V: RequestInfo + ?Sized> RequestInfoExt for V {}

/// Write access to the single response of a request
///
/// Only the first write is kept.
pub trait ResponseWrite {
    /// Respond with a JSON body
    fn respond(&mut self, status: StatusCode, body: Value);

    /// Respond with a plain text body
    fn respond_text(&mut self, status: StatusCode, body: &str);

    fn has_responded(&self) -> bool;
}

/// Read access to the authenticated caller
pub trait PrincipalRead {
    fn principal(&self) -> Option<&Principal>;
}

/// Read access to the parsed upload of a POST or PATCH
pub trait UploadRead<T> {
    fn upload(&self) -> Option<&T>;
}

pub trait AuthenticateView: RequestInfo + ResponseWrite {
    /// Bind the authenticated caller for the remaining stages
    fn set_principal(&mut self, principal: Principal);
}

pub trait AuthorizeView: RequestInfo + PrincipalRead + ResponseWrite {}

/// View of the QueryScope stage
///
/// The store handle replaced here is only used by read lookups.
pub trait QueryScopeView: RequestInfo + PrincipalRead {
    fn store(&self) -> &StoreHandle;
    fn set_store(&mut self, store: StoreHandle);
}

pub trait UploadCheckView<T>: RequestInfo + PrincipalRead + ResponseWrite + UploadRead<T> {}

/// View of the EditResult stage
///
/// The result may be edited in place or replaced by any serializable value.
pub trait ResultEditView<T>: RequestInfo + PrincipalRead + UploadRead<T> {
    fn result(&self) -> Option<&Resource<T>>;
    fn result_mut(&mut self) -> Option<&mut Resource<T>>;
    fn set_result(&mut self, result: Resource<T>);
    fn take_result(&mut self) -> Option<Resource<T>>;
}

impl<T: Model> RequestInfo for RequestContext<T> {
    fn verb(&self) -> Verb {
        self.verb
    }

    fn method(&self) -> &Method {
        &self.parts.method
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    fn request(&self) -> &Parts {
        &self.parts
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn table(&self) -> &Table {
        &self.table
    }

    fn data(&self) -> Option<&UserData> {
        self.data.as_deref()
    }

    fn data_mut(&mut self) -> Option<&mut UserData> {
        self.data.as_deref_mut()
    }

    fn set_data(&mut self, data: Box<UserData>) {
        self.data = Some(data);
    }
}

impl<T: Model> ResponseWrite for RequestContext<T> {
    fn respond(&mut self, status: StatusCode, body: Value) {
        self.response.write_json(status, body);
    }

    fn respond_text(&mut self, status: StatusCode, body: &str) {
        self.response.write_text(status, body);
    }

    fn has_responded(&self) -> bool {
        self.response.is_written()
    }
}

impl<T: Model> PrincipalRead for RequestContext<T> {
    fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

impl<T: Model> UploadRead<T> for RequestContext<T> {
    fn upload(&self) -> Option<&T> {
        self.upload.as_ref()
    }
}

impl<T: Model> AuthenticateView for RequestContext<T> {
    fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }
}

impl<T: Model> AuthorizeView for RequestContext<T> {}

impl<T: Model> QueryScopeView for RequestContext<T> {
    fn store(&self) -> &StoreHandle {
        &self.store
    }

    fn set_store(&mut self, store: StoreHandle) {
        self.store = store;
    }
}

impl<T: Model> UploadCheckView<T> for RequestContext<T> {}

impl<T: Model> ResultEditView<T> for RequestContext<T> {
    fn result(&self) -> Option<&Resource<T>> {
        self.result.as_ref()
    }

    fn result_mut(&mut self) -> Option<&mut Resource<T>> {
        self.result.as_mut()
    }

    fn set_result(&mut self, result: Resource<T>) {
        self.result = Some(result);
    }

    fn take_result(&mut self) -> Option<Resource<T>> {
        self.result.take()
    }
}
