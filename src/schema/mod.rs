//! Schema declarations and Mapping instances.
//!
//! A [`Schema`] is a constant descriptor: an ordered set of uniquely-named
//! [`Field`]s, declared once at startup through [`Schema::builder`] and shared
//! cheaply (`Arc` inside). A [`Mapping`] is an instance of a schema over a raw
//! JSON backing store; field access translates through the field codec.
//!
//! ## Example
//!
//! ```ignore
//! use mapped_rust::{Field, Mapping, Schema};
//!
//! let schema = Schema::builder()
//!     .field("title", Field::text())
//!     .field("tags", Field::list(Field::text()))
//!     .build();
//!
//! let mut post = Mapping::new(&schema)?;
//! post.set("title", "Hello")?;
//! assert_eq!(post.get("title")?.unwrap().as_text(), Some("Hello"));
//! ```

mod mapping;

pub use mapping::Mapping;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::field::Field;

#[derive(Debug)]
struct SchemaInner {
    fields: Vec<(String, Field)>,
    index: HashMap<String, usize>,
}

/// An immutable, ordered set of uniquely-named fields.
///
/// Field names are unique and their order is declaration order, stable for
/// the life of the schema. Cloning shares the descriptor.
#[derive(Debug, Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.inner
            .index
            .get(name)
            .map(|&i| &self.inner.fields[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.index.contains_key(name)
    }

    /// Declared fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.inner
            .fields
            .iter()
            .map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.inner.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.is_empty()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Accumulates `(name, Field)` declarations for a [`Schema`].
pub struct SchemaBuilder {
    fields: Vec<(String, Field)>,
    index: HashMap<String, usize>,
}

impl SchemaBuilder {
    /// Declare a field. Declaring the same name again replaces the earlier
    /// declaration in place, keeping its position.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        match self.index.get(&name).copied() {
            Some(i) => self.fields[i].1 = field,
            None => {
                self.index.insert(name.clone(), self.fields.len());
                self.fields.push((name, field));
            }
        }
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            inner: Arc::new(SchemaInner {
                fields: self.fields,
                index: self.index,
            }),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema(")?;
        for (i, (name, _)) in self.inner.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", name)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;

    #[test]
    fn declaration_order_is_stable() {
        let schema = Schema::builder()
            .field("b", Field::text())
            .field("a", Field::integer())
            .field("c", Field::boolean())
            .build();

        let names: Vec<&str> = schema.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn later_declaration_replaces_earlier() {
        let schema = Schema::builder()
            .field("value", Field::text())
            .field("other", Field::boolean())
            .field("value", Field::integer())
            .build();

        assert_eq!(schema.len(), 2);
        assert!(matches!(
            schema.field("value").unwrap().kind(),
            FieldKind::Integer
        ));
        // replacement keeps the original position
        let names: Vec<&str> = schema.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["value", "other"]);
    }

    #[test]
    fn lookup_missing_field() {
        let schema = Schema::builder().field("a", Field::text()).build();
        assert!(schema.field("b").is_none());
        assert!(!schema.contains("b"));
    }

    #[test]
    fn clones_share_the_descriptor() {
        let schema = Schema::builder().field("a", Field::text()).build();
        let clone = schema.clone();
        assert_eq!(schema, clone);
    }
}
