//! Application lifecycle boundary.
//!
//! Hooks for a host framework adapter to wire: [`Extension::setup`] once at
//! application initialization, and [`Extension::before_request`] before each
//! handler. The per-request ordering contract is fixed: the store handle is
//! acquired first, auto-sync (when active) runs against that handle, and the
//! handle is released when the returned [`RequestContext`] drops at request
//! end. Every operation takes its store handle explicitly; there is no
//! ambient global.
//!
//! ## Example
//!
//! ```ignore
//! use mapped_rust::{Config, Extension, InMemoryStore, Manager};
//!
//! let extension = Extension::new(
//!     manager,
//!     InMemoryStore::new("guestbook"),
//!     Config::new("http://localhost:5984/", "guestbook"),
//! );
//! extension.setup()?;
//!
//! // per request, from the framework adapter:
//! let ctx = extension.before_request()?;
//! let doc = signature.load(ctx.db(), "some-id")?;
//! drop(ctx); // request end
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::manager::{Manager, SyncReport};
use crate::store::DocumentStore;

/// Connection settings consumed from the host application's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: String,
    pub database: String,
    /// Suppresses per-request auto-sync without touching the manager's own
    /// auto-sync flag.
    #[serde(default)]
    pub disable_auto_sync: bool,
}

impl Config {
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Config {
        Config {
            server: server.into(),
            database: database.into(),
            disable_auto_sync: false,
        }
    }

    pub fn disable_auto_sync(mut self) -> Self {
        self.disable_auto_sync = true;
        self
    }
}

/// Acquires a store handle for one request scope.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &Config) -> Result<Box<dyn DocumentStore>, Error>;
}

/// Wires a [`Manager`], a [`Connector`], and a [`Config`] into the two hooks
/// a host framework adapter installs.
pub struct Extension {
    manager: Manager,
    connector: Box<dyn Connector>,
    config: Config,
}

impl Extension {
    pub fn new(manager: Manager, connector: impl Connector + 'static, config: Config) -> Extension {
        Extension {
            manager,
            connector: Box::new(connector),
            config,
        }
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn auto_sync_active(&self) -> bool {
        self.manager.auto_sync() && !self.config.disable_auto_sync
    }

    /// One-time application-initialization hook: runs the initial sync when
    /// auto-sync is active.
    pub fn setup(&self) -> Result<(), Error> {
        if self.auto_sync_active() {
            let db = self.connector.connect(&self.config)?;
            self.manager.sync(db.as_ref())?;
        }
        Ok(())
    }

    /// Per-request hook: acquires the store handle, then auto-syncs against
    /// it unless suppressed. The handle lives in the returned context until
    /// request end.
    pub fn before_request(&self) -> Result<RequestContext, Error> {
        let db = self.connector.connect(&self.config)?;
        debug!(database = db.database(), "store handle attached");
        if self.auto_sync_active() {
            self.manager.sync(db.as_ref())?;
        }
        Ok(RequestContext { db })
    }

    /// Manual sync, for applications that disable the automatic one.
    pub fn sync(&self) -> Result<SyncReport, Error> {
        let db = self.connector.connect(&self.config)?;
        self.manager.sync(db.as_ref())
    }
}

/// The request-scoped store handle. Dropping it at request end releases the
/// connection.
pub struct RequestContext {
    db: Box<dyn DocumentStore>,
}

impl RequestContext {
    pub fn db(&self) -> &dyn DocumentStore {
        self.db.as_ref()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        debug!(database = self.db.database(), "store handle released");
    }
}
