//! View registry and sync engine.
//!
//! A [`Manager`] accumulates view definitions at application-setup time
//! (standalone ones through [`add_viewdef`](Manager::add_viewdef), or every
//! view attached to a document type through [`add_document`](Manager::add_document))
//! and reconciles them against the store with [`sync`](Manager::sync).
//! Registration happens once at startup; the registry is immutable afterwards
//! (`sync` only takes `&self`).
//!
//! ## Example
//!
//! ```ignore
//! use mapped_rust::{InMemoryStore, Manager};
//!
//! let mut manager = Manager::new();
//! manager.add_document(&signature);
//! manager.on_sync(|db| {
//!     // seed default data against the live store handle
//!     Ok(())
//! });
//!
//! let db = InMemoryStore::new("guestbook");
//! let report = manager.sync(&db)?;
//! assert!(report.created_database);
//! ```

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::document::DocumentType;
use crate::error::Error;
use crate::store::{DocumentStore, RawDocument};
use crate::view::ViewDefinition;

type SyncCallback = Box<dyn Fn(&dyn DocumentStore) -> Result<(), Error> + Send + Sync>;

/// What one sync pass did: whether it created the database, and which design
/// documents it wrote. A re-sync with an unchanged registry writes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub created_database: bool,
    pub written: Vec<String>,
}

/// Collects view definitions and synchronizes them into design documents.
pub struct Manager {
    viewdefs: Vec<ViewDefinition>,
    callbacks: Vec<SyncCallback>,
    auto_sync: bool,
}

impl Default for Manager {
    fn default() -> Self {
        Manager::new()
    }
}

impl Manager {
    pub fn new() -> Manager {
        Manager::with_auto_sync(true)
    }

    /// `auto_sync` controls whether the lifecycle hooks sync on every
    /// request; manual [`sync`](Manager::sync) is always available.
    pub fn with_auto_sync(auto_sync: bool) -> Manager {
        Manager {
            viewdefs: Vec::new(),
            callbacks: Vec::new(),
            auto_sync,
        }
    }

    pub fn auto_sync(&self) -> bool {
        self.auto_sync
    }

    /// Register every view attached to a document type.
    pub fn add_document(&mut self, ty: &DocumentType) {
        for definition in ty.views() {
            self.viewdefs.push(definition.clone());
        }
    }

    /// Register a standalone view definition.
    pub fn add_viewdef(&mut self, definition: ViewDefinition) {
        self.viewdefs.push(definition);
    }

    /// Every registered view definition, in registration order.
    pub fn all_viewdefs(&self) -> impl Iterator<Item = &ViewDefinition> {
        self.viewdefs.iter()
    }

    /// Register a callback to run after every sync, in registration order,
    /// with the live store handle. Runs after all design documents are
    /// written; a callback error aborts the remaining chain.
    pub fn on_sync(
        &mut self,
        callback: impl Fn(&dyn DocumentStore) -> Result<(), Error> + Send + Sync + 'static,
    ) {
        self.callbacks.push(Box::new(callback));
    }

    /// Reconcile the registry against the store.
    ///
    /// Creates the database if absent, then per design document: fetch the
    /// stored definition, compare the computed `views` object against it, and
    /// write back only when they differ. Re-running with an unchanged
    /// registry issues no writes. Two registrations of the same
    /// (design document, view name) keep the later one.
    pub fn sync(&self, db: &dyn DocumentStore) -> Result<SyncReport, Error> {
        let created = db.ensure_database()?;
        if created {
            info!(database = db.database(), "created database");
        }

        // group by design document, first-appearance order; later duplicate
        // registrations overwrite earlier ones
        let mut order: Vec<&str> = Vec::new();
        let mut designs: HashMap<&str, HashMap<&str, &ViewDefinition>> = HashMap::new();
        for definition in &self.viewdefs {
            if !designs.contains_key(definition.design()) {
                order.push(definition.design());
            }
            designs
                .entry(definition.design())
                .or_default()
                .insert(definition.name(), definition);
        }

        let mut written = Vec::new();
        for design in order {
            let mut names: Vec<&str> = designs[design].keys().copied().collect();
            names.sort_unstable();

            let mut desired = Map::new();
            for name in names {
                let definition = designs[design][name];
                let mut body = Map::new();
                body.insert(
                    "map".to_string(),
                    Value::String(definition.map_source().to_string()),
                );
                if let Some(reduce) = definition.reduce_source() {
                    body.insert("reduce".to_string(), Value::String(reduce.to_string()));
                }
                desired.insert(name.to_string(), Value::Object(body));
            }

            let id = format!("_design/{}", design);
            let existing = db.get(&id)?;
            let (mut content, rev) = match existing {
                Some(raw) => (raw.content, raw.rev),
                None => (Map::new(), None),
            };

            if content.get("views") == Some(&Value::Object(desired.clone())) {
                debug!(design = %id, "design document unchanged");
                continue;
            }

            // unrelated properties of an existing design document survive
            content.insert("views".to_string(), Value::Object(desired));
            if !content.contains_key("language") {
                content.insert(
                    "language".to_string(),
                    Value::String("javascript".to_string()),
                );
            }

            let doc = RawDocument {
                id: Some(id.clone()),
                rev,
                content,
            };
            db.put(&doc).map_err(|source| Error::SyncWrite {
                design: design.to_string(),
                source,
            })?;
            debug!(design = %id, "published design document");
            written.push(id);
        }

        for callback in &self.callbacks {
            callback(db)?;
        }

        Ok(SyncReport {
            created_database: created,
            written,
        })
    }
}
