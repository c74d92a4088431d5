//! Mapping instances: a schema over a raw JSON backing store.

use serde_json::{Map, Value};

use crate::error::Error;
use crate::field::{CodecError, FieldValue};

use super::Schema;

/// An instance of a [`Schema`].
///
/// The backing store is the untyped JSON object as persisted; declared field
/// access goes through the field codec, and keys the schema does not declare
/// are carried through wrap/unwrap verbatim so round-tripping never drops
/// unknown data.
#[derive(Debug, Clone)]
pub struct Mapping {
    schema: Schema,
    data: Map<String, Value>,
}

impl Mapping {
    /// Create an empty instance, materializing declared defaults.
    ///
    /// Default producers are evaluated here, fresh for this instance.
    pub fn new(schema: &Schema) -> Result<Mapping, CodecError> {
        let mut data = Map::new();
        for (name, field) in schema.iter() {
            if let Some(default) = field.default_value() {
                data.insert(name.to_string(), field.encode(&default)?);
            }
        }
        Ok(Mapping {
            schema: schema.clone(),
            data,
        })
    }

    /// Construct an instance from persisted JSON.
    ///
    /// Every declared field present in the JSON is decoded (so shape
    /// violations surface here); undeclared keys are retained verbatim.
    pub fn wrap(schema: &Schema, raw: Value) -> Result<Mapping, CodecError> {
        let data = match raw {
            Value::Object(map) => map,
            other => {
                return Err(CodecError::SchemaMismatch {
                    expected: "object",
                    found: crate::field::json_shape(&other),
                })
            }
        };
        for (name, field) in schema.iter() {
            match data.get(name) {
                None | Some(Value::Null) => {}
                Some(raw) => {
                    field.decode(raw)?;
                }
            }
        }
        Ok(Mapping {
            schema: schema.clone(),
            data,
        })
    }

    /// The raw JSON this instance wraps: every declared field in its encoded
    /// form, plus every retained undeclared key. Exact inverse of [`wrap`].
    ///
    /// [`wrap`]: Mapping::wrap
    pub fn unwrap(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Read a declared field.
    ///
    /// Unset (or null) fields resolve to the declared default, evaluating a
    /// producer fresh; `Ok(None)` when the field is unset and has no default.
    pub fn get(&self, name: &str) -> Result<Option<FieldValue>, Error> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        match self.data.get(name) {
            None | Some(Value::Null) => Ok(field.default_value()),
            Some(raw) => field.decode(raw).map(Some).map_err(Error::Codec),
        }
    }

    /// Write a declared field, encoding the value into the backing store.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), Error> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        let encoded = field.encode(&value.into()).map_err(Error::Codec)?;
        self.data.insert(name.to_string(), encoded);
        Ok(())
    }

    /// Raw access to a backing-store key, declared or not.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Keys present in the backing store that the schema does not declare.
    pub fn extra_keys(&self) -> impl Iterator<Item = &str> {
        self.data
            .keys()
            .map(String::as_str)
            .filter(|key| !self.schema.contains(key))
    }

    pub(crate) fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub(crate) fn insert_raw(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.data == other.data
    }
}
