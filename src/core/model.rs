//! The model abstraction served by the generated routes
//!
//! A model is any serde type with an identity field. Optional behaviour is
//! discovered through capability queries: a model that can validate uploads
//! returns itself from [`Model::as_validatable`], one that belongs to a user
//! returns itself from [`Model::as_owned`]. Models that offer neither keep the
//! default `None` and the corresponding checks are skipped.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Validation errors keyed by field name
///
/// An empty map means the upload is valid. Serialized as the `errors` object
/// of a 422 response.
pub type FieldErrors = BTreeMap<String, String>;

/// A type that can be exposed through the CRUD pipeline
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
/// ```
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// CamelCase type name, used to derive the table and route path
    fn model_name() -> &'static str;

    /// JSON key of the identity field
    fn identity_field() -> &'static str {
        "id"
    }

    /// Capability query for upload validation
    fn as_validatable(&self) -> Option<&dyn Validatable> {
        None
    }

    /// Capability query for ownership
    fn as_owned(&self) -> Option<&dyn Owned> {
        None
    }
}

/// Models that validate themselves after being parsed from a request body
pub trait Validatable {
    /// Return every field error; an empty map accepts the upload
    fn validate_upload(&self) -> FieldErrors;
}

/// Models that belong to a principal, identified by a numeric owner id
pub trait Owned {
    fn owner_id(&self) -> Option<u64>;
}

/// Flatten a `validator` result into [`FieldErrors`]
///
/// Lets a model derive `validator::Validate` and forward to it from
/// [`Validatable::validate_upload`]. Only the first message of each field is
/// kept; errors without a message fall back to their code.
pub fn field_errors(result: Result<(), validator::ValidationErrors>) -> FieldErrors {
    let Err(errors) = result else {
        return FieldErrors::new();
    };

    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            errs.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                (field.to_string(), message)
            })
        })
        .collect()
}

/// Identity of a model instance, read from its serialized form
///
/// Returns `None` when the instance does not serialize to an object or the
/// identity field is absent.
pub fn identity_of<T: Model>(item: &T) -> Option<Value> {
    match serde_json::to_value(item) {
        Ok(Value::Object(mut map)) => map.remove(T::identity_field()),
        _ => None,
    }
}

/// Render an identity value the way it appears in a URL path
pub fn identity_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use validator::Validate;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Gadget {
        id: u64,
        name: String,
    }

    impl Model for Gadget {
        fn model_name() -> &'static str {
            "Gadget"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    struct Signup {
        #[serde(rename = "key")]
        key: String,
        #[validate(length(min = 3, message = "too short"))]
        name: String,
        #[validate(email)]
        email: String,
    }

    impl Model for Signup {
        fn model_name() -> &'static str {
            "Signup"
        }

        fn identity_field() -> &'static str {
            "key"
        }

        fn as_validatable(&self) -> Option<&dyn Validatable> {
            Some(self)
        }
    }

    impl Validatable for Signup {
        fn validate_upload(&self) -> FieldErrors {
            field_errors(self.validate())
        }
    }

    #[test]
    fn test_identity_of_uses_identity_field() {
        let gadget = Gadget {
            id: 42,
            name: "g".into(),
        };
        assert_eq!(identity_of(&gadget), Some(json!(42)));

        let signup = Signup {
            key: "abc".into(),
            name: "bob".into(),
            email: "bob@example.com".into(),
        };
        assert_eq!(identity_of(&signup), Some(json!("abc")));
    }

    #[test]
    fn test_identity_key_renders_like_a_path_segment() {
        assert_eq!(identity_key(&json!(7)), "7");
        assert_eq!(identity_key(&json!("abc")), "abc");
    }

    #[test]
    fn test_capabilities_default_to_none() {
        let gadget = Gadget {
            id: 1,
            name: "g".into(),
        };
        assert!(gadget.as_validatable().is_none());
        assert!(gadget.as_owned().is_none());
    }

    #[test]
    fn test_field_errors_from_validator() {
        let valid = Signup {
            key: "k".into(),
            name: "alice".into(),
            email: "alice@example.com".into(),
        };
        assert!(valid.as_validatable().unwrap().validate_upload().is_empty());

        let invalid = Signup {
            key: "k".into(),
            name: "al".into(),
            email: "not-an-email".into(),
        };
        let errors = invalid.validate_upload();
        assert_eq!(errors.get("name").map(String::as_str), Some("too short"));
        assert_eq!(errors.get("email").map(String::as_str), Some("email"));
    }
}
