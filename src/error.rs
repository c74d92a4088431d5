use std::fmt;

use crate::field::CodecError;
use crate::store::StoreError;

/// Crate-level error type.
///
/// Absence is never an error: lookups of missing documents return `Ok(None)`.
/// Everything here surfaces synchronously to the immediate caller; nothing is
/// swallowed, logged-and-continued, or retried by this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Decode-time shape violation from the field codec.
    Codec(CodecError),
    /// Error surfaced by the store boundary (conflicts included).
    Store(StoreError),
    /// A stored document's `doc_type` discriminator does not match the
    /// requesting document type.
    TypeMismatch {
        expected: String,
        found: Option<String>,
    },
    /// Access to a field the schema does not declare.
    UnknownField(String),
    /// A design-document write was rejected by the store during sync.
    SyncWrite { design: String, source: StoreError },
    /// A pagination cursor token that does not decode.
    InvalidCursor(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Codec(err) => write!(f, "{}", err),
            Error::Store(err) => write!(f, "{}", err),
            Error::TypeMismatch { expected, found } => match found {
                Some(found) => write!(
                    f,
                    "document type mismatch: expected {:?}, found {:?}",
                    expected, found
                ),
                None => write!(
                    f,
                    "document type mismatch: expected {:?}, found no discriminator",
                    expected
                ),
            },
            Error::UnknownField(name) => write!(f, "unknown field: {}", name),
            Error::SyncWrite { design, source } => write!(
                f,
                "design document write rejected for _design/{}: {}",
                design, source
            ),
            Error::InvalidCursor(token) => write!(f, "invalid pagination cursor: {}", token),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Codec(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::SyncWrite { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::Codec(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}
