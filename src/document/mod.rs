//! Document types and instances with load/store semantics.
//!
//! A [`DocumentType`] is a constant descriptor declared once at startup: an
//! optional `doc_type` discriminator, a [`Schema`], and the views attached to
//! the type. A [`Document`] is one instance: a mapping body plus the
//! identifier and revision token the store assigns.
//!
//! ## Example
//!
//! ```ignore
//! use mapped_rust::{DocumentType, Field, Schema, ViewDefinition};
//!
//! let signature = DocumentType::builder(
//!     Schema::builder()
//!         .field("message", Field::text())
//!         .field("author", Field::text())
//!         .build(),
//! )
//! .doc_type("signature")
//! .view(ViewDefinition::new("guestbook", "all", ALL_MAP))
//! .build();
//!
//! let mut doc = signature.new_document()?;
//! doc.set("message", "Hello")?;
//! doc.store(&db)?;
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::field::{CodecError, FieldValue};
use crate::schema::{Mapping, Schema};
use crate::store::{DocumentStore, RawDocument, StoreError};
use crate::view::{DocumentView, ViewDefinition};

#[derive(Debug)]
struct TypeInner {
    doc_type: Option<String>,
    schema: Schema,
    views: Vec<ViewDefinition>,
}

/// Descriptor for one "type" of document. Cloning shares the descriptor.
#[derive(Debug, Clone)]
pub struct DocumentType {
    inner: Arc<TypeInner>,
}

impl DocumentType {
    pub fn builder(schema: Schema) -> DocumentTypeBuilder {
        DocumentTypeBuilder {
            doc_type: None,
            schema,
            views: Vec::new(),
        }
    }

    /// The fixed discriminator written into every stored instance, if one is
    /// declared.
    pub fn doc_type(&self) -> Option<&str> {
        self.inner.doc_type.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Views attached to this type, in declaration order.
    pub fn views(&self) -> &[ViewDefinition] {
        &self.inner.views
    }

    /// Look up an attached view by name, bound to this type so results wrap
    /// into [`Document`]s.
    pub fn view(&self, name: &str) -> Option<DocumentView> {
        self.inner
            .views
            .iter()
            .find(|definition| definition.name() == name)
            .map(|definition| DocumentView::new(definition.clone(), self.clone()))
    }

    /// Construct a fresh in-memory instance, materializing schema defaults.
    /// No identifier is required until store time.
    pub fn new_document(&self) -> Result<Document, CodecError> {
        Ok(Document {
            ty: self.clone(),
            id: None,
            rev: None,
            body: Mapping::new(self.schema())?,
        })
    }

    /// Rehydrate an instance from a stored JSON object.
    pub fn wrap(&self, raw: Value) -> Result<Document, Error> {
        self.from_raw(RawDocument::from_json(raw)?)
    }

    /// Rehydrate an instance from a raw store document, enforcing the
    /// discriminator when this type declares one.
    pub fn from_raw(&self, raw: RawDocument) -> Result<Document, Error> {
        if let Some(expected) = self.doc_type() {
            match raw.content.get("doc_type").and_then(Value::as_str) {
                Some(found) if found == expected => {}
                other => {
                    return Err(Error::TypeMismatch {
                        expected: expected.to_string(),
                        found: other.map(str::to_string),
                    })
                }
            }
        }
        let body = Mapping::wrap(self.schema(), Value::Object(raw.content))?;
        Ok(Document {
            ty: self.clone(),
            id: raw.id,
            rev: raw.rev,
            body,
        })
    }

    /// Fetch an instance by identifier. `Ok(None)` when no document with
    /// that identifier exists; absence is not an error.
    pub fn load(&self, db: &dyn DocumentStore, id: &str) -> Result<Option<Document>, Error> {
        match db.get(id)? {
            Some(raw) => self.from_raw(raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Accumulates declarations for a [`DocumentType`].
pub struct DocumentTypeBuilder {
    doc_type: Option<String>,
    schema: Schema,
    views: Vec<ViewDefinition>,
}

impl DocumentTypeBuilder {
    /// Declare the fixed `doc_type` discriminator value.
    pub fn doc_type(mut self, value: impl Into<String>) -> Self {
        self.doc_type = Some(value.into());
        self
    }

    /// Attach a view. The view keeps the explicit name it was defined with.
    pub fn view(mut self, definition: ViewDefinition) -> Self {
        self.views.push(definition);
        self
    }

    pub fn build(self) -> DocumentType {
        DocumentType {
            inner: Arc::new(TypeInner {
                doc_type: self.doc_type,
                schema: self.schema,
                views: self.views,
            }),
        }
    }
}

/// One document instance: a mapping body plus store bookkeeping.
#[derive(Debug, Clone)]
pub struct Document {
    ty: DocumentType,
    id: Option<String>,
    rev: Option<String>,
    body: Mapping,
}

impl Document {
    pub fn document_type(&self) -> &DocumentType {
        &self.ty
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assign the identifier ahead of the first store. Identifiers for
    /// documents stored without one are assigned by the store.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// The opaque revision token from the last successful write, used by the
    /// store for conflict detection.
    pub fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    pub fn body(&self) -> &Mapping {
        &self.body
    }

    pub fn get(&self, name: &str) -> Result<Option<FieldValue>, Error> {
        self.body.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), Error> {
        self.body.set(name, value)
    }

    /// The raw store form: body, discriminator, identifier, and revision.
    pub fn to_raw(&self) -> RawDocument {
        let mut content = self.body.data().clone();
        if let Some(doc_type) = self.ty.doc_type() {
            content.insert("doc_type".to_string(), Value::String(doc_type.to_string()));
        }
        RawDocument {
            id: self.id.clone(),
            rev: self.rev.clone(),
            content,
        }
    }

    /// Persist this instance, returning the post-write `(identifier, revision)`.
    ///
    /// The store assigns an identifier when the instance has none; the
    /// declared `doc_type` is written before the first save and preserved
    /// thereafter. On success the instance's identifier and revision reflect
    /// the post-write state. A concurrent modification surfaces as
    /// [`StoreError::Conflict`], never retried here.
    pub fn store(&mut self, db: &dyn DocumentStore) -> Result<(String, String), Error> {
        if let Some(doc_type) = self.ty.doc_type() {
            self.body
                .insert_raw("doc_type", Value::String(doc_type.to_string()));
        }
        let raw = RawDocument {
            id: self.id.clone(),
            rev: self.rev.clone(),
            content: self.body.data().clone(),
        };
        let (id, rev) = db.put(&raw)?;
        self.id = Some(id.clone());
        self.rev = Some(rev.clone());
        Ok((id, rev))
    }

    /// Remove this instance from the store, revision-checked.
    pub fn delete(&mut self, db: &dyn DocumentStore) -> Result<(), Error> {
        let (id, rev) = match (self.id.clone(), self.rev.clone()) {
            (Some(id), Some(rev)) => (id, rev),
            _ => {
                return Err(Error::Store(StoreError::NotFound {
                    id: self.id.clone().unwrap_or_default(),
                }))
            }
        };
        db.delete(&id, &rev)?;
        self.rev = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn signature_type() -> DocumentType {
        DocumentType::builder(
            Schema::builder()
                .field("message", Field::text())
                .field("author", Field::text())
                .build(),
        )
        .doc_type("signature")
        .build()
    }

    fn test_store() -> InMemoryStore {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();
        store
    }

    #[test]
    fn store_assigns_identifier_and_revision() {
        let store = test_store();
        let ty = signature_type();

        let mut doc = ty.new_document().unwrap();
        doc.set("message", "Hello").unwrap();
        assert!(doc.id().is_none());

        doc.store(&store).unwrap();
        assert!(doc.id().is_some());
        assert!(doc.rev().unwrap().starts_with("1-"));
    }

    #[test]
    fn doc_type_is_written_on_first_store() {
        let store = test_store();
        let ty = signature_type();

        let mut doc = ty.new_document().unwrap();
        doc.set_id("hello");
        doc.store(&store).unwrap();

        let stored = store.get("hello").unwrap().unwrap();
        assert_eq!(stored.content.get("doc_type"), Some(&json!("signature")));
    }

    #[test]
    fn load_roundtrips_through_the_codec() {
        let store = test_store();
        let ty = signature_type();

        let mut doc = ty.new_document().unwrap();
        doc.set_id("hello");
        doc.set("message", "Hello, world!").unwrap();
        doc.set("author", "Steve Person").unwrap();
        doc.store(&store).unwrap();

        let loaded = ty.load(&store, "hello").unwrap().unwrap();
        assert_eq!(loaded.id(), Some("hello"));
        assert_eq!(
            loaded.get("message").unwrap().unwrap().as_text(),
            Some("Hello, world!")
        );
        assert_eq!(loaded.rev(), doc.rev());
    }

    #[test]
    fn loading_nonexistent_returns_none() {
        let store = test_store();
        let loaded = signature_type().load(&store, "goodbye").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_enforces_the_discriminator() {
        let store = test_store();
        let ty = signature_type();

        let raw = RawDocument::from_json(json!({
            "_id": "other",
            "doc_type": "comment",
            "message": "hi",
        }))
        .unwrap();
        store.put(&raw).unwrap();

        let err = ty.load(&store, "other").unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                expected: "signature".to_string(),
                found: Some("comment".to_string()),
            }
        );
    }

    #[test]
    fn stale_revision_store_conflicts() {
        let store = test_store();
        let ty = signature_type();

        let mut doc = ty.new_document().unwrap();
        doc.set_id("contested");
        doc.store(&store).unwrap();

        let mut first = ty.load(&store, "contested").unwrap().unwrap();
        let mut second = ty.load(&store, "contested").unwrap().unwrap();

        first.set("message", "first wins").unwrap();
        first.store(&store).unwrap();

        second.set("message", "second loses").unwrap();
        let err = second.store(&store).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Conflict { .. })));

        // the stored copy still holds the first writer's content
        let current = ty.load(&store, "contested").unwrap().unwrap();
        assert_eq!(
            current.get("message").unwrap().unwrap().as_text(),
            Some("first wins")
        );
    }

    #[test]
    fn delete_removes_the_document() {
        let store = test_store();
        let ty = signature_type();

        let mut doc = ty.new_document().unwrap();
        doc.set_id("gone");
        doc.store(&store).unwrap();
        doc.delete(&store).unwrap();

        assert!(ty.load(&store, "gone").unwrap().is_none());
    }

    #[test]
    fn delete_before_store_is_an_error() {
        let store = test_store();
        let mut doc = signature_type().new_document().unwrap();
        assert!(doc.delete(&store).is_err());
    }

    #[test]
    fn unknown_keys_survive_a_load_store_cycle() {
        let store = test_store();
        let ty = signature_type();

        let raw = RawDocument::from_json(json!({
            "_id": "annotated",
            "doc_type": "signature",
            "message": "hi",
            "added_by_migration": {"v": 2},
        }))
        .unwrap();
        store.put(&raw).unwrap();

        let mut loaded = ty.load(&store, "annotated").unwrap().unwrap();
        loaded.set("author", "Someone").unwrap();
        loaded.store(&store).unwrap();

        let stored = store.get("annotated").unwrap().unwrap();
        assert_eq!(
            stored.content.get("added_by_migration"),
            Some(&json!({"v": 2}))
        );
    }
}
