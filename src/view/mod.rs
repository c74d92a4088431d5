//! View definitions and typed document views.
//!
//! A [`ViewDefinition`] names a view, `(design document, view name)`, and
//! carries its map source, optional reduce source, and default query options.
//! Definitions are registered with a [`Manager`](crate::Manager) for sync and
//! queried against an explicit store handle. A [`DocumentView`] is a
//! definition bound to its owning [`DocumentType`](crate::DocumentType),
//! wrapping each result row into that type.

use crate::document::{Document, DocumentType};
use crate::error::Error;
use crate::store::{DocumentStore, Row, ViewOptions};

/// A named view definition: map source, optional reduce source, and the
/// options every query of this view starts from.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    design: String,
    name: String,
    map: String,
    reduce: Option<String>,
    defaults: ViewOptions,
}

impl ViewDefinition {
    /// Define a view under a design document, with an explicit name.
    pub fn new(
        design: impl Into<String>,
        name: impl Into<String>,
        map: impl Into<String>,
    ) -> ViewDefinition {
        ViewDefinition {
            design: design.into(),
            name: name.into(),
            map: map.into(),
            reduce: None,
            defaults: ViewOptions::default(),
        }
    }

    /// Attach a reduce source.
    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }

    /// Set the default query options (e.g. implicit grouping or descending
    /// order). Per-call options layer over these.
    pub fn with_defaults(mut self, defaults: ViewOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn design(&self) -> &str {
        &self.design
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map_source(&self) -> &str {
        &self.map
    }

    pub fn reduce_source(&self) -> Option<&str> {
        self.reduce.as_deref()
    }

    pub fn defaults(&self) -> &ViewOptions {
        &self.defaults
    }

    /// Query this view, layering the given options over the defaults.
    pub fn query(
        &self,
        db: &dyn DocumentStore,
        options: ViewOptions,
    ) -> Result<Vec<Row>, Error> {
        let merged = options.layered(&self.defaults);
        db.query_view(&self.design, &self.name, &merged)
            .map_err(Error::from)
    }
}

/// A view bound to the document type that owns it. Each result row's emitted
/// value is coerced into that type.
#[derive(Debug, Clone)]
pub struct DocumentView {
    definition: ViewDefinition,
    ty: DocumentType,
}

impl DocumentView {
    pub(crate) fn new(definition: ViewDefinition, ty: DocumentType) -> DocumentView {
        DocumentView { definition, ty }
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    pub fn document_type(&self) -> &DocumentType {
        &self.ty
    }

    /// Query, returning raw rows.
    pub fn rows(&self, db: &dyn DocumentStore, options: ViewOptions) -> Result<Vec<Row>, Error> {
        self.definition.query(db, options)
    }

    /// Query, wrapping each row's value into the owning document type.
    pub fn query(
        &self,
        db: &dyn DocumentStore,
        options: ViewOptions,
    ) -> Result<Vec<Document>, Error> {
        let rows = self.definition.query(db, options)?;
        rows.iter().map(|row| self.wrap_row(row)).collect()
    }

    /// Coerce one row into the owning document type.
    pub fn wrap_row(&self, row: &Row) -> Result<Document, Error> {
        self.ty.wrap(row.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_layer_under_call_options() {
        let view = ViewDefinition::new("guestbook", "all", "function (doc) {}")
            .with_defaults(ViewOptions::new().descending(true));

        let merged = ViewOptions::new().layered(view.defaults());
        assert_eq!(merged.descending, Some(true));

        let merged = ViewOptions::new()
            .descending(false)
            .start_key(json!("k"))
            .layered(view.defaults());
        assert_eq!(merged.descending, Some(false));
    }

    #[test]
    fn reduce_source_is_optional() {
        let plain = ViewDefinition::new("d", "v", "map src");
        assert!(plain.reduce_source().is_none());

        let reduced = ViewDefinition::new("d", "v", "map src").with_reduce("_count");
        assert_eq!(reduced.reduce_source(), Some("_count"));
    }
}
