mod document;
mod error;
mod field;
mod lifecycle;
mod manager;
mod page;
mod schema;
mod store;
mod view;

pub use document::{Document, DocumentType, DocumentTypeBuilder};
pub use error::Error;
pub use field::{CodecError, Field, FieldDefault, FieldKind, FieldValue};
pub use lifecycle::{Config, Connector, Extension, RequestContext};
pub use manager::{Manager, SyncReport};
pub use page::{paginate, paginate_rows, Page};
pub use schema::{Mapping, Schema, SchemaBuilder};
pub use store::{
    collate, DocumentStore, InMemoryStore, MapFn, RawDocument, ReduceFn, Row, StoreError,
    ViewOptions,
};
pub use view::{DocumentView, ViewDefinition};

// Re-export the decimal type fields are declared with
pub use rust_decimal::Decimal;
