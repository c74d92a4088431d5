//! InMemoryStore - HashMap-backed document store for testing and development.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::lifecycle::{Config, Connector};

use super::{collate, DocumentStore, RawDocument, Row, StoreError, ViewOptions};

/// Native map function: document JSON in, emitted `(key, value)` pairs out.
///
/// The map *source* published into a design document is opaque text, exactly
/// as a real server treats it; the in-memory store executes views through
/// native functions registered per (design document, view name).
pub type MapFn = Arc<dyn Fn(&Value) -> Vec<(Value, Value)> + Send + Sync>;

/// Native reduce function over emitted values. The second argument selects
/// rereduce mode: combining already-reduced intermediate values rather than
/// raw mapped values.
pub type ReduceFn = Arc<dyn Fn(&[Value], bool) -> Value + Send + Sync>;

const REDUCE_CHUNK: usize = 100;

struct StoredDoc {
    generation: u64,
    rev: String,
    content: Map<String, Value>,
}

struct State {
    exists: bool,
    docs: HashMap<String, StoredDoc>,
    put_count: u64,
}

#[derive(Default)]
struct ViewFns {
    map: Option<MapFn>,
    reduce: Option<ReduceFn>,
}

/// In-memory document store backed by a HashMap.
///
/// Clone-friendly via `Arc`: clones share storage, so a clone can serve as a
/// per-request handle. The database starts out not-yet-created; `sync` (or an
/// explicit [`ensure_database`](DocumentStore::ensure_database)) creates it.
#[derive(Clone)]
pub struct InMemoryStore {
    name: String,
    state: Arc<RwLock<State>>,
    views: Arc<RwLock<HashMap<(String, String), ViewFns>>>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> InMemoryStore {
        InMemoryStore {
            name: name.into(),
            state: Arc::new(RwLock::new(State {
                exists: false,
                docs: HashMap::new(),
                put_count: 0,
            })),
            views: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register the native map function executing a view locally.
    pub fn register_map(
        &self,
        design: impl Into<String>,
        view: impl Into<String>,
        map: impl Fn(&Value) -> Vec<(Value, Value)> + Send + Sync + 'static,
    ) {
        if let Ok(mut views) = self.views.write() {
            views
                .entry((design.into(), view.into()))
                .or_default()
                .map = Some(Arc::new(map));
        }
    }

    /// Register the native reduce function for a view.
    pub fn register_reduce(
        &self,
        design: impl Into<String>,
        view: impl Into<String>,
        reduce: impl Fn(&[Value], bool) -> Value + Send + Sync + 'static,
    ) {
        if let Ok(mut views) = self.views.write() {
            views
                .entry((design.into(), view.into()))
                .or_default()
                .reduce = Some(Arc::new(reduce));
        }
    }

    /// Total number of successful writes, design documents included. Lets
    /// tests observe that an idempotent re-sync issued no writes.
    pub fn put_count(&self) -> Result<u64, StoreError> {
        Ok(self.read_state()?.put_count)
    }

    pub fn database_exists(&self) -> Result<bool, StoreError> {
        Ok(self.read_state()?.exists)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

fn stored_json(id: &str, stored: &StoredDoc) -> Value {
    RawDocument {
        id: Some(id.to_string()),
        rev: Some(stored.rev.clone()),
        content: stored.content.clone(),
    }
    .to_json()
}

fn run_reduce(reduce: &ReduceFn, values: &[Value]) -> Value {
    if values.len() <= REDUCE_CHUNK {
        return reduce(values, false);
    }
    let partials: Vec<Value> = values
        .chunks(REDUCE_CHUNK)
        .map(|chunk| reduce(chunk, false))
        .collect();
    reduce(&partials, true)
}

impl DocumentStore for InMemoryStore {
    fn database(&self) -> &str {
        &self.name
    }

    fn get(&self, id: &str) -> Result<Option<RawDocument>, StoreError> {
        let state = self.read_state()?;
        if !state.exists {
            return Err(StoreError::DatabaseMissing(self.name.clone()));
        }
        Ok(state.docs.get(id).map(|stored| RawDocument {
            id: Some(id.to_string()),
            rev: Some(stored.rev.clone()),
            content: stored.content.clone(),
        }))
    }

    fn put(&self, doc: &RawDocument) -> Result<(String, String), StoreError> {
        let mut state = self.write_state()?;
        if !state.exists {
            return Err(StoreError::DatabaseMissing(self.name.clone()));
        }
        let id = doc
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let (generation, current) = match state.docs.get(&id) {
            Some(stored) => (stored.generation, Some(stored.rev.clone())),
            None => (0, None),
        };
        if doc.rev != current {
            return Err(StoreError::Conflict {
                id,
                expected: doc.rev.clone(),
                actual: current,
            });
        }
        let generation = generation + 1;
        let rev = format!("{}-{}", generation, Uuid::new_v4().simple());
        state.docs.insert(
            id.clone(),
            StoredDoc {
                generation,
                rev: rev.clone(),
                content: doc.content.clone(),
            },
        );
        state.put_count += 1;
        Ok((id, rev))
    }

    fn delete(&self, id: &str, rev: &str) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        if !state.exists {
            return Err(StoreError::DatabaseMissing(self.name.clone()));
        }
        match state.docs.get(id) {
            None => Err(StoreError::NotFound { id: id.to_string() }),
            Some(stored) if stored.rev != rev => Err(StoreError::Conflict {
                id: id.to_string(),
                expected: Some(rev.to_string()),
                actual: Some(stored.rev.clone()),
            }),
            Some(_) => {
                state.docs.remove(id);
                Ok(())
            }
        }
    }

    fn ensure_database(&self) -> Result<bool, StoreError> {
        let mut state = self.write_state()?;
        let created = !state.exists;
        state.exists = true;
        Ok(created)
    }

    fn query_view(
        &self,
        design: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<Vec<Row>, StoreError> {
        let state = self.read_state()?;
        if !state.exists {
            return Err(StoreError::DatabaseMissing(self.name.clone()));
        }

        // the view must have been published into its design document
        let design_id = format!("_design/{}", design);
        let published = state
            .docs
            .get(&design_id)
            .and_then(|stored| stored.content.get("views"))
            .and_then(|views| views.get(view))
            .is_some();
        if !published {
            return Err(StoreError::MissingView {
                design: design.to_string(),
                name: view.to_string(),
            });
        }

        let (map_fn, reduce_fn) = {
            let views = self
                .views
                .read()
                .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
            let fns = views.get(&(design.to_string(), view.to_string()));
            let map_fn = fns.and_then(|f| f.map.clone()).ok_or_else(|| {
                StoreError::Storage(format!(
                    "no native map function registered for {}/{}",
                    design, view
                ))
            })?;
            (map_fn, fns.and_then(|f| f.reduce.clone()))
        };

        let mut rows: Vec<Row> = Vec::new();
        for (id, stored) in &state.docs {
            if id.starts_with("_design/") {
                continue;
            }
            let doc_json = stored_json(id, stored);
            for (key, value) in map_fn(&doc_json) {
                rows.push(Row {
                    key,
                    value,
                    id: Some(id.clone()),
                    doc: None,
                });
            }
        }
        rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));

        let descending = options.descending.unwrap_or(false);
        if descending {
            rows.reverse();
        }

        if let Some(start) = &options.start_key {
            let start_id = options.start_doc_id.as_deref();
            rows.retain(|row| {
                let key_order = collate(&row.key, start);
                let tie = || match (start_id, row.id.as_deref()) {
                    (Some(sid), Some(rid)) => {
                        if descending {
                            rid <= sid
                        } else {
                            rid >= sid
                        }
                    }
                    _ => true,
                };
                match key_order {
                    Ordering::Equal => tie(),
                    Ordering::Less => descending,
                    Ordering::Greater => !descending,
                }
            });
        }

        if let Some(end) = &options.end_key {
            rows.retain(|row| {
                let key_order = collate(&row.key, end);
                if descending {
                    key_order != Ordering::Less
                } else {
                    key_order != Ordering::Greater
                }
            });
        }

        if options.group.unwrap_or(false) {
            let reduce = reduce_fn.ok_or_else(|| {
                StoreError::Storage(format!("view {}/{} has no reduce function", design, view))
            })?;
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            for row in rows {
                let start_new = match groups.last() {
                    Some((key, _)) => collate(key, &row.key) != Ordering::Equal,
                    None => true,
                };
                if start_new {
                    groups.push((row.key, vec![row.value]));
                } else if let Some((_, values)) = groups.last_mut() {
                    values.push(row.value);
                }
            }
            rows = groups
                .into_iter()
                .map(|(key, values)| Row {
                    value: run_reduce(&reduce, &values),
                    key,
                    id: None,
                    doc: None,
                })
                .collect();
        }

        let mut rows: Vec<Row> = rows
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        if options.include_docs.unwrap_or(false) {
            for row in &mut rows {
                if let Some(id) = &row.id {
                    if let Some(stored) = state.docs.get(id) {
                        row.doc = Some(stored_json(id, stored));
                    }
                }
            }
        }

        Ok(rows)
    }
}

/// The in-memory store is its own connector: each "connection" is a clone
/// sharing the same storage, mirroring a per-request handle.
impl Connector for InMemoryStore {
    fn connect(&self, _config: &Config) -> Result<Box<dyn DocumentStore>, Error> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn store_with_view() -> InMemoryStore {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();
        // publish the design document, then register the native executor
        let design = RawDocument {
            id: Some("_design/posts".to_string()),
            rev: None,
            content: content(json!({
                "language": "javascript",
                "views": {"by_author": {"map": "function (doc) { emit(doc.author, doc); }"}},
            })),
        };
        store.put(&design).unwrap();
        store.register_map("posts", "by_author", |doc| {
            match doc.get("author") {
                Some(author) => vec![(author.clone(), doc.clone())],
                None => vec![],
            }
        });
        store
    }

    fn add_post(store: &InMemoryStore, id: &str, author: &str) {
        let doc = RawDocument {
            id: Some(id.to_string()),
            rev: None,
            content: content(json!({"author": author})),
        };
        store.put(&doc).unwrap();
    }

    #[test]
    fn operations_require_the_database() {
        let store = InMemoryStore::new("missing");
        let err = store.get("a").unwrap_err();
        assert_eq!(err, StoreError::DatabaseMissing("missing".to_string()));

        assert!(store.ensure_database().unwrap());
        assert!(!store.ensure_database().unwrap());
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn put_assigns_identifier_and_revision() {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();

        let doc = RawDocument::new(content(json!({"x": 1})));
        let (id, rev) = store.put(&doc).unwrap();
        assert!(!id.is_empty());
        assert!(rev.starts_with("1-"));

        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.rev.as_deref(), Some(rev.as_str()));
        assert_eq!(loaded.content, content(json!({"x": 1})));
    }

    #[test]
    fn stale_revision_conflicts_and_leaves_copy_unmodified() {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();

        let mut doc = RawDocument::new(content(json!({"x": 1})));
        doc.id = Some("d".to_string());
        let (_, rev1) = store.put(&doc).unwrap();

        doc.rev = Some(rev1.clone());
        doc.content = content(json!({"x": 2}));
        store.put(&doc).unwrap();

        // a writer still holding rev1 must conflict
        doc.rev = Some(rev1);
        doc.content = content(json!({"x": 3}));
        let err = store.put(&doc).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.get("d").unwrap().unwrap();
        assert_eq!(stored.content, content(json!({"x": 2})));
    }

    #[test]
    fn creating_over_existing_conflicts() {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();

        let mut doc = RawDocument::new(content(json!({})));
        doc.id = Some("d".to_string());
        store.put(&doc).unwrap();
        let err = store.put(&doc).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn delete_is_revision_checked() {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();

        let mut doc = RawDocument::new(content(json!({})));
        doc.id = Some("d".to_string());
        let (_, rev) = store.put(&doc).unwrap();

        assert!(matches!(
            store.delete("d", "1-bogus").unwrap_err(),
            StoreError::Conflict { .. }
        ));
        store.delete("d", &rev).unwrap();
        assert!(store.get("d").unwrap().is_none());
        assert!(matches!(
            store.delete("d", &rev).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn view_rows_sort_by_key_then_id() {
        let store = store_with_view();
        add_post(&store, "b", "steve");
        add_post(&store, "a", "steve");
        add_post(&store, "c", "fred");

        let rows = store
            .query_view("posts", "by_author", &ViewOptions::new())
            .unwrap();
        let keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.key.as_str().unwrap(), r.id.as_deref().unwrap()))
            .collect();
        assert_eq!(keys, vec![("fred", "c"), ("steve", "a"), ("steve", "b")]);
    }

    #[test]
    fn view_range_and_paging_options() {
        let store = store_with_view();
        for (id, author) in [("1", "a"), ("2", "b"), ("3", "c"), ("4", "d")] {
            add_post(&store, id, author);
        }

        let rows = store
            .query_view(
                "posts",
                "by_author",
                &ViewOptions::new().start_key(json!("b")).end_key(json!("c")),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, json!("b"));
        assert_eq!(rows[1].key, json!("c"));

        let rows = store
            .query_view("posts", "by_author", &ViewOptions::new().skip(1).limit(2))
            .unwrap();
        assert_eq!(rows[0].key, json!("b"));
        assert_eq!(rows[1].key, json!("c"));
    }

    #[test]
    fn descending_reverses_key_and_tie_order() {
        let store = store_with_view();
        add_post(&store, "a", "steve");
        add_post(&store, "b", "steve");
        add_post(&store, "c", "fred");

        let rows = store
            .query_view(
                "posts",
                "by_author",
                &ViewOptions::new().descending(true),
            )
            .unwrap();
        let keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.key.as_str().unwrap(), r.id.as_deref().unwrap()))
            .collect();
        assert_eq!(keys, vec![("steve", "b"), ("steve", "a"), ("fred", "c")]);
    }

    #[test]
    fn start_doc_id_disambiguates_ties() {
        let store = store_with_view();
        add_post(&store, "a", "steve");
        add_post(&store, "b", "steve");
        add_post(&store, "c", "steve");

        let rows = store
            .query_view(
                "posts",
                "by_author",
                &ViewOptions::new().start_key(json!("steve")).start_doc_id("b"),
            )
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn include_docs_attaches_source_documents() {
        let store = store_with_view();
        add_post(&store, "a", "steve");

        let rows = store
            .query_view(
                "posts",
                "by_author",
                &ViewOptions::new().include_docs(true),
            )
            .unwrap();
        let doc = rows[0].doc.as_ref().unwrap();
        assert_eq!(doc.get("_id"), Some(&json!("a")));
        assert_eq!(doc.get("author"), Some(&json!("steve")));
    }

    #[test]
    fn grouped_queries_reduce_per_key() {
        let store = store_with_view();
        let design = RawDocument {
            id: Some("_design/stats".to_string()),
            rev: None,
            content: content(json!({
                "views": {"count_by_author": {
                    "map": "function (doc) { emit(doc.author, 1); }",
                    "reduce": "_count",
                }},
            })),
        };
        store.put(&design).unwrap();
        store.register_map("stats", "count_by_author", |doc| match doc.get("author") {
            Some(author) => vec![(author.clone(), json!(1))],
            None => vec![],
        });
        store.register_reduce("stats", "count_by_author", |values, rereduce| {
            if rereduce {
                json!(values.iter().filter_map(Value::as_i64).sum::<i64>())
            } else {
                json!(values.len())
            }
        });

        add_post(&store, "a", "steve");
        add_post(&store, "b", "steve");
        add_post(&store, "c", "fred");

        let rows = store
            .query_view(
                "stats",
                "count_by_author",
                &ViewOptions::new().group(true),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, json!("fred"));
        assert_eq!(rows[0].value, json!(1));
        assert!(rows[0].id.is_none());
        assert_eq!(rows[1].key, json!("steve"));
        assert_eq!(rows[1].value, json!(2));
    }

    #[test]
    fn unpublished_view_is_missing() {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();
        store.register_map("posts", "by_author", |_| vec![]);

        let err = store
            .query_view("posts", "by_author", &ViewOptions::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingView { .. }));
    }

    #[test]
    fn clones_share_storage() {
        let store = InMemoryStore::new("test");
        store.ensure_database().unwrap();
        let clone = store.clone();

        let mut doc = RawDocument::new(content(json!({"x": 1})));
        doc.id = Some("d".to_string());
        store.put(&doc).unwrap();
        assert!(clone.get("d").unwrap().is_some());
    }
}
