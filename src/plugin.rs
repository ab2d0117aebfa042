//! Plugin capability contract
//!
//! A plugin is a factory: `init` receives the node and returns a live
//! instance. Instances may opt into `open`/`close` sequencing and error
//! forwarding; the defaults are no-ops, so a plugin only implements the
//! capabilities it has.

use crate::error::Result;
use crate::events::EventEmitter;
use crate::node::Node;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type InitFn = Box<dyn Fn(&Node) -> Result<Arc<dyn PluginInstance>> + Send + Sync>;

/// Loader resolving a plugin name from the `plugins` config entry into a
/// plugin object. Supplied by the embedder via the `loader` option.
pub type PluginLoader = Arc<dyn Fn(&str) -> Result<Plugin> + Send + Sync>;

/// Subsystem ids owned by core infrastructure. Never available to custom
/// plugins; resolved from dedicated node fields, not the registry index.
pub const RESERVED: &[&str] = &[
    "chain", "fees", "mempool", "miner", "pool", "rpc", "http", "wallet", "stratum",
];

pub fn is_reserved(id: &str) -> bool {
    RESERVED.contains(&id)
}

/// A registerable plugin.
pub struct Plugin {
    /// Optional registry id. Colliding with a reserved subsystem id or a
    /// previously registered custom id is fatal.
    pub id: Option<String>,
    pub init: InitFn,
}

impl Plugin {
    pub fn new<F>(id: Option<&str>, init: F) -> Self
    where
        F: Fn(&Node) -> Result<Arc<dyn PluginInstance>> + Send + Sync + 'static,
    {
        Plugin {
            id: id.map(str::to_string),
            init: Box::new(init),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("id", &self.id).finish()
    }
}

/// A live plugin instance.
///
/// `open` and `close` are awaited sequentially in registration order; the
/// defaults make both capabilities optional. An instance exposing an
/// emitter has its `error` events forwarded into the node's error handler.
pub trait PluginInstance: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn events(&self) -> Option<Arc<EventEmitter>> {
        None
    }
}

impl fmt::Debug for dyn PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance").finish_non_exhaustive()
    }
}
