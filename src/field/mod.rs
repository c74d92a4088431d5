//! Field declarations and the typed value codec.
//!
//! A [`Field`] names a semantic kind (text, integer, decimal, datetime, ...)
//! and optionally a default. Fields are declared once, collected into a
//! [`Schema`](crate::Schema), and translate between typed [`FieldValue`]s and
//! the raw JSON primitives a document store holds.
//!
//! ## Example
//!
//! ```ignore
//! use mapped_rust::{Field, FieldValue};
//!
//! let field = Field::decimal();
//! let raw = field.encode(&FieldValue::Decimal("12.3400".parse()?))?;
//! assert_eq!(raw, serde_json::json!("12.3400"));
//! ```

mod codec;
mod value;

pub(crate) use codec::json_shape;
pub use value::FieldValue;

use std::fmt;
use std::sync::Arc;

use crate::schema::Schema;

/// The semantic kind of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Text,
    Integer,
    /// Distinct semantic tag from [`FieldKind::Integer`]; shares the `i64`
    /// carrier since JSON numbers do not exceed it. Values that need more
    /// precision belong in a decimal field.
    Long,
    Float,
    /// Arbitrary-precision decimal, encoded as text so precision survives
    /// storage.
    Decimal,
    Boolean,
    DateTime,
    Date,
    Time,
    /// Homogeneous list of an element field.
    List(Box<Field>),
    /// Nested object: schemaless passthrough (`None`) or a nested schema.
    Dict(Option<Schema>),
}

/// A declared default for an unset field.
#[derive(Clone)]
pub enum FieldDefault {
    Value(FieldValue),
    /// Invoked fresh per instantiation; results are never shared.
    Producer(Arc<dyn Fn() -> FieldValue + Send + Sync>),
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldDefault::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// A named, typed accessor declaration.
///
/// Constructed through the kind-specific constructors and attached to a
/// schema under a name by [`SchemaBuilder::field`](crate::SchemaBuilder::field).
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    default: Option<FieldDefault>,
}

impl Field {
    fn of(kind: FieldKind) -> Self {
        Field {
            kind,
            default: None,
        }
    }

    pub fn text() -> Self {
        Field::of(FieldKind::Text)
    }

    pub fn integer() -> Self {
        Field::of(FieldKind::Integer)
    }

    pub fn long() -> Self {
        Field::of(FieldKind::Long)
    }

    pub fn float() -> Self {
        Field::of(FieldKind::Float)
    }

    pub fn decimal() -> Self {
        Field::of(FieldKind::Decimal)
    }

    pub fn boolean() -> Self {
        Field::of(FieldKind::Boolean)
    }

    pub fn datetime() -> Self {
        Field::of(FieldKind::DateTime)
    }

    pub fn date() -> Self {
        Field::of(FieldKind::Date)
    }

    pub fn time() -> Self {
        Field::of(FieldKind::Time)
    }

    /// A list whose members all use the given element field.
    pub fn list(element: Field) -> Self {
        Field::of(FieldKind::List(Box::new(element)))
    }

    /// An untyped nested object, carried through storage unchanged.
    pub fn dict() -> Self {
        Field::of(FieldKind::Dict(None))
    }

    /// A nested object with its own schema, encoded and decoded recursively.
    pub fn dict_of(schema: Schema) -> Self {
        Field::of(FieldKind::Dict(Some(schema)))
    }

    /// Attach a static default value.
    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Attach a default producer, invoked fresh each time the default is
    /// materialized.
    pub fn default_with(
        mut self,
        producer: impl Fn() -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(FieldDefault::Producer(Arc::new(producer)));
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Materialize this field's default, evaluating a producer if one is
    /// declared. `None` when the field has no default.
    pub fn default_value(&self) -> Option<FieldValue> {
        match &self.default {
            Some(FieldDefault::Value(value)) => Some(value.clone()),
            Some(FieldDefault::Producer(producer)) => Some(producer()),
            None => None,
        }
    }
}

/// Decode-time failure: the stored primitive's shape does not match the
/// declared semantic kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    SchemaMismatch {
        expected: &'static str,
        found: String,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::SchemaMismatch { expected, found } => {
                write!(f, "schema mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for CodecError {}
