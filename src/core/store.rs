//! Data store collaborator and scoped handles
//!
//! The pipeline never talks to a database directly. It goes through a
//! [`DataStore`], always via a [`StoreHandle`]: the store plus a [`Scope`] of
//! filters that read lookups must honour.
//!
//! A QueryScope stage narrows the handle of its own request with
//! [`StoreHandle::filter`], which returns a new value; the handle held by
//! [`Options`](crate::config::Options) is never mutated. Write operations take
//! no scope at all, so a narrowed handle cannot leak its predicates into
//! create, update or delete.

use crate::core::error::StoreError;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A named collection and the JSON key of its identity field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub key: &'static str,
}

impl Table {
    pub fn new(name: impl Into<String>, key: &'static str) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Storage backend used by the built-in stages
///
/// Records are JSON objects. Calls are synchronous: the pipeline runs on a
/// blocking thread and expects the store to block until the operation is done.
pub trait DataStore: Send + Sync {
    /// Find the record whose identity renders as `id` and that matches `scope`
    fn find(&self, table: &Table, id: &str, scope: &Scope) -> Result<Option<Value>, StoreError>;

    /// All records matching `scope`, in storage order
    fn find_all(&self, table: &Table, scope: &Scope) -> Result<Vec<Value>, StoreError>;

    /// Insert a record, assigning an identity if it has none; returns the stored record
    fn create(&self, table: &Table, record: Value) -> Result<Value, StoreError>;

    /// Replace an existing record with the same identity; returns the stored record
    fn save(&self, table: &Table, record: Value) -> Result<Value, StoreError>;

    /// Remove the record whose identity renders as `id`
    fn delete(&self, table: &Table, id: &str) -> Result<(), StoreError>;
}

/// Comparison operator of a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
        }
    }
}

/// A single predicate on a top-level record field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Build a filter from a key with an operator suffix
    ///
    /// `"amount>="` compares with `>=`, a bare `"status"` compares for
    /// equality. Supported suffixes: `!=`, `>=`, `<=`, `>`, `<`.
    pub fn parse_key(key: &str, value: impl Into<Value>) -> Self {
        const SUFFIXES: [(&str, FilterOp); 5] = [
            ("!=", FilterOp::Ne),
            (">=", FilterOp::Gte),
            ("<=", FilterOp::Lte),
            (">", FilterOp::Gt),
            ("<", FilterOp::Lt),
        ];

        for (suffix, op) in SUFFIXES {
            if let Some(field) = key.strip_suffix(suffix) {
                return Self::new(field.trim(), op, value);
            }
        }
        Self::eq(key.trim(), value)
    }

    /// Whether `record` satisfies this predicate
    ///
    /// A missing field never matches. Values of different JSON types are
    /// compared by their string rendering, so `"1"` equals `1`.
    pub fn matches(&self, record: &Value) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        compare(actual, &self.value).is_some_and(|ordering| self.op.accepts(ordering))
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (x, y) => {
            let render = |v: &Value| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(render(x).cmp(&render(y)))
        }
    }
}

/// Conjunction of filters applied to read lookups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    filters: Vec<Filter>,
}

impl Scope {
    /// The empty scope, matching every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether `record` satisfies every filter
    pub fn matches(&self, record: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    fn with(&self, filter: Filter) -> Self {
        let mut filters = self.filters.clone();
        filters.push(filter);
        Self { filters }
    }
}

/// A data store together with the scope of the current request
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn DataStore>,
    scope: Scope,
}

impl StoreHandle {
    /// Unscoped handle over `store`
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            scope: Scope::all(),
        }
    }

    /// A new handle with `filter` added to the scope
    ///
    /// `self` is left untouched, so narrowing one request never affects
    /// another.
    pub fn filter(&self, filter: Filter) -> Self {
        Self {
            store: self.store.clone(),
            scope: self.scope.with(filter),
        }
    }

    /// The same store with an empty scope
    pub fn unscoped(&self) -> Self {
        Self::new(self.store.clone())
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Scoped lookup by identity
    pub fn find(&self, table: &Table, id: &str) -> Result<Option<Value>, StoreError> {
        self.store.find(table, id, &self.scope)
    }

    /// Scoped listing
    pub fn find_all(&self, table: &Table) -> Result<Vec<Value>, StoreError> {
        self.store.find_all(table, &self.scope)
    }

    pub fn create(&self, table: &Table, record: Value) -> Result<Value, StoreError> {
        self.store.create(table, record)
    }

    pub fn save(&self, table: &Table, record: Value) -> Result<Value, StoreError> {
        self.store.save(table, record)
    }

    pub fn delete(&self, table: &Table, id: &str) -> Result<(), StoreError> {
        self.store.delete(table, id)
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
