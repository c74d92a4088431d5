//! Linked-list pagination over ordered view results.
//!
//! Cursors are opaque tokens naming a row by identity (its key plus its
//! source document identifier to disambiguate ties), never a positional
//! offset, so rows inserted or deleted elsewhere in the result set do not
//! shift a page already being viewed.
//!
//! ## Example
//!
//! ```ignore
//! use mapped_rust::paginate;
//!
//! let page = paginate(&db, &signature.view("all").unwrap(), 5, None)?;
//! let second = paginate(&db, &signature.view("all").unwrap(), 5, page.next.as_deref())?;
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;

use crate::document::Document;
use crate::error::Error;
use crate::store::{DocumentStore, Row, ViewOptions};
use crate::view::{DocumentView, ViewDefinition};

/// One page of an ordered result sequence.
///
/// `prev` and `next` are opaque start tokens for the neighboring pages, each
/// present only when more data exists in that direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub prev: Option<String>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    fn empty() -> Page<T> {
        Page {
            items: Vec::new(),
            prev: None,
            next: None,
        }
    }
}

fn encode_bookmark(key: &Value, id: Option<&str>) -> String {
    let bookmark = Value::Array(vec![
        key.clone(),
        id.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null),
    ]);
    URL_SAFE_NO_PAD.encode(bookmark.to_string())
}

fn decode_bookmark(token: &str) -> Result<(Value, Option<String>), Error> {
    let invalid = || Error::InvalidCursor(token.to_string());
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
    let parts = match value {
        Value::Array(parts) if parts.len() == 2 => parts,
        _ => return Err(invalid()),
    };
    let [key, id]: [Value; 2] = parts.try_into().map_err(|_| invalid())?;
    let id = match id {
        Value::Null => None,
        Value::String(s) => Some(s),
        _ => return Err(invalid()),
    };
    Ok((key, id))
}

/// Paginate a view in its natural key order, returning raw rows.
///
/// Fetches `page_size + 1` rows from the start token (or the beginning when
/// absent); a `page_size + 1`-th row means a next page exists and its
/// identity becomes [`Page::next`]. When a start token is given, one bounded
/// reverse-order query resolves whether a previous page exists and where it
/// starts. The view itself is never mutated.
pub fn paginate_rows(
    db: &dyn DocumentStore,
    view: &ViewDefinition,
    page_size: usize,
    start: Option<&str>,
) -> Result<Page<Row>, Error> {
    if page_size == 0 {
        return Ok(Page::empty());
    }
    let bookmark = start.map(decode_bookmark).transpose()?;

    let mut options = ViewOptions::new().limit(page_size + 1);
    if let Some((key, id)) = &bookmark {
        options.start_key = Some(key.clone());
        options.start_doc_id = id.clone();
    }
    let mut rows = view.query(db, options)?;

    let next = if rows.len() > page_size {
        rows.pop()
            .map(|extra| encode_bookmark(&extra.key, extra.id.as_deref()))
    } else {
        None
    };
    rows.truncate(page_size);

    let prev = match &bookmark {
        None => None,
        Some((key, id)) => {
            // walk backwards from the current start: the window holds the
            // current row plus up to page_size preceding rows, and its last
            // row is where the preceding page starts
            let natural_descending = view.defaults().descending.unwrap_or(false);
            let mut back = ViewOptions::new()
                .limit(page_size + 1)
                .descending(!natural_descending);
            back.start_key = Some(key.clone());
            back.start_doc_id = id.clone();
            let window = view.query(db, back)?;
            if window.len() <= 1 {
                None
            } else {
                window
                    .last()
                    .map(|row| encode_bookmark(&row.key, row.id.as_deref()))
            }
        }
    };

    Ok(Page {
        items: rows,
        prev,
        next,
    })
}

/// Paginate a typed document view, wrapping each row into the owning
/// document type.
pub fn paginate(
    db: &dyn DocumentStore,
    view: &DocumentView,
    page_size: usize,
    start: Option<&str>,
) -> Result<Page<Document>, Error> {
    let page = paginate_rows(db, view.definition(), page_size, start)?;
    let items = page
        .items
        .iter()
        .map(|row| view.wrap_row(row))
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(Page {
        items,
        prev: page.prev,
        next: page.next,
    })
}
