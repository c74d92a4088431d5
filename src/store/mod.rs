//! Store boundary - identifier-keyed JSON documents and ordered view queries.
//!
//! The [`DocumentStore`] trait is what this crate consumes from a document
//! database: get/put/delete by identifier with revision-checked conditional
//! writes, a database existence check, and queries against named views
//! returning key-ordered [`Row`]s. [`InMemoryStore`] is a fully functional
//! implementation for tests and development.

mod collate;
mod in_memory;

pub use collate::collate;
pub use in_memory::{InMemoryStore, MapFn, ReduceFn};

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// A raw JSON document as exchanged with the store.
///
/// `content` holds the document body without the `_id`/`_rev` bookkeeping
/// keys; those travel in the dedicated fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: Option<String>,
    pub rev: Option<String>,
    pub content: Map<String, Value>,
}

impl RawDocument {
    pub fn new(content: Map<String, Value>) -> RawDocument {
        RawDocument {
            id: None,
            rev: None,
            content,
        }
    }

    /// Split a stored JSON object into identifier, revision, and body.
    pub fn from_json(raw: Value) -> Result<RawDocument, StoreError> {
        let mut content = match raw {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Serde(format!(
                    "document is not a JSON object: {}",
                    other
                )))
            }
        };
        let id = content
            .remove("_id")
            .and_then(|v| v.as_str().map(str::to_string));
        let rev = content
            .remove("_rev")
            .and_then(|v| v.as_str().map(str::to_string));
        Ok(RawDocument { id, rev, content })
    }

    /// The stored JSON form: body plus `_id`/`_rev` when present.
    pub fn to_json(&self) -> Value {
        let mut map = self.content.clone();
        if let Some(id) = &self.id {
            map.insert("_id".to_string(), Value::String(id.clone()));
        }
        if let Some(rev) = &self.rev {
            map.insert("_rev".to_string(), Value::String(rev.clone()));
        }
        Value::Object(map)
    }
}

/// One emitted view result: a read-only (key, value, source document) triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub key: Value,
    pub value: Value,
    /// Identifier of the document that emitted this row. Absent for reduced
    /// rows, which have no single source document.
    pub id: Option<String>,
    /// The source document body, populated under `include_docs`.
    pub doc: Option<Value>,
}

/// Options for a view query.
///
/// The boolean options are tri-state so that a view definition's defaults and
/// per-call overrides can be layered: `None` means "not specified here" and
/// defers to the next layer, the store treating a fully-unspecified option as
/// false.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewOptions {
    pub start_key: Option<Value>,
    /// Disambiguates the starting row among ties on `start_key`.
    pub start_doc_id: Option<String>,
    pub end_key: Option<Value>,
    pub limit: Option<usize>,
    pub skip: usize,
    pub group: Option<bool>,
    pub descending: Option<bool>,
    pub include_docs: Option<bool>,
}

impl ViewOptions {
    pub fn new() -> ViewOptions {
        ViewOptions::default()
    }

    pub fn start_key(mut self, key: Value) -> Self {
        self.start_key = Some(key);
        self
    }

    pub fn start_doc_id(mut self, id: impl Into<String>) -> Self {
        self.start_doc_id = Some(id.into());
        self
    }

    pub fn end_key(mut self, key: Value) -> Self {
        self.end_key = Some(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn group(mut self, group: bool) -> Self {
        self.group = Some(group);
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = Some(descending);
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = Some(include_docs);
        self
    }

    /// Layer these options over a base: anything specified here wins,
    /// anything left unspecified falls through to the base.
    pub fn layered(self, base: &ViewOptions) -> ViewOptions {
        ViewOptions {
            start_key: self.start_key.or_else(|| base.start_key.clone()),
            start_doc_id: self.start_doc_id.or_else(|| base.start_doc_id.clone()),
            end_key: self.end_key.or_else(|| base.end_key.clone()),
            limit: self.limit.or(base.limit),
            skip: if self.skip != 0 { self.skip } else { base.skip },
            group: self.group.or(base.group),
            descending: self.descending.or(base.descending),
            include_docs: self.include_docs.or(base.include_docs),
        }
    }
}

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Revision mismatch on a conditional write. `expected` is the revision
    /// the caller held, `actual` the store's current one.
    Conflict {
        id: String,
        expected: Option<String>,
        actual: Option<String>,
    },
    /// Operation against a database that has not been created.
    DatabaseMissing(String),
    /// Lookup of an identifier an operation requires to exist.
    NotFound { id: String },
    /// Query of a view the store does not know.
    MissingView { design: String, name: String },
    /// Storage-level error.
    Storage(String),
    /// Serialization/deserialization error.
    Serde(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict {
                id,
                expected,
                actual,
            } => write!(
                f,
                "document update conflict on {} (held revision {:?}, current {:?})",
                id, expected, actual
            ),
            StoreError::DatabaseMissing(name) => write!(f, "database does not exist: {}", name),
            StoreError::NotFound { id } => write!(f, "document not found: {}", id),
            StoreError::MissingView { design, name } => {
                write!(f, "view not found: _design/{}/_view/{}", design, name)
            }
            StoreError::Storage(msg) => write!(f, "storage error: {}", msg),
            StoreError::Serde(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Identifier-keyed JSON document storage with named-view queries.
///
/// Implementations are blocking; no timeout or retry policy is defined at
/// this level, and failures propagate synchronously to the caller.
pub trait DocumentStore: Send + Sync {
    /// The database name this handle is bound to.
    fn database(&self) -> &str;

    /// Fetch a document by identifier. `Ok(None)` if it does not exist.
    fn get(&self, id: &str) -> Result<Option<RawDocument>, StoreError>;

    /// Conditional write. The document's revision must match the store's
    /// current revision for its identifier (absent for a new document), or
    /// the write fails with [`StoreError::Conflict`] and the stored copy is
    /// left unmodified. Assigns an identifier when the document has none.
    /// Returns the post-write `(identifier, revision)`.
    fn put(&self, doc: &RawDocument) -> Result<(String, String), StoreError>;

    /// Remove a document, revision-checked like [`put`](DocumentStore::put).
    fn delete(&self, id: &str, rev: &str) -> Result<(), StoreError>;

    /// Create the database if it does not exist. Returns whether it was
    /// created by this call.
    fn ensure_database(&self) -> Result<bool, StoreError>;

    /// Query a named view, returning rows ordered by key (then source
    /// document identifier), reversed under `descending`.
    fn query_view(
        &self,
        design: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<Vec<Row>, StoreError>;
}
