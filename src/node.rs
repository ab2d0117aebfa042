//! Node lifecycle controller and plugin registry
//!
//! Drives the idle -> preopen -> open -> preclose -> close sequence over
//! an ordered plugin stack. Phases are strictly sequential: subsystems
//! and plugins open one at a time, and close in the same order they
//! opened (registration order is authoritative for both directions).
//!
//! The controller is configured entirely through [`Config`]'s typed
//! accessors; it performs no networking or persistence of its own.

use crate::config::{Config, ConfigInput, Value};
use crate::error::{NodeError, Result};
use crate::events::EventEmitter;
use crate::logging::Logger;
use crate::plugin::{is_reserved, BoxFuture, Plugin, PluginInstance};
use crate::time::NetworkTime;
use crate::workers::WorkerPool;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Module string: config-file name, env prefix and prefix directory all
/// derive from it.
pub const MODULE: &str = "lumen";

/// Default config-file name under the prefix directory.
pub const CONFIG_FILE: &str = "lumen.conf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Preopen,
    Open,
    Preclose,
    Close,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Preopen => "preopen",
            LifecycleState::Open => "open",
            LifecycleState::Preclose => "preclose",
            LifecycleState::Close => "close",
        };
        write!(f, "{}", name)
    }
}

/// The four named hook points accepting asynchronous callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    Preopen,
    Open,
    Preclose,
    Close,
}

type HookFn = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Optional accelerated backends. The assembler flips these on when the
/// corresponding native implementations are linked in; the node only
/// warns when they are missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub native_hashing: bool,
    pub native_signing: bool,
}

/// Serializable snapshot of the running node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub module: String,
    pub version: String,
    pub network: String,
    pub state: String,
    pub uptime: i64,
    pub plugins: Vec<String>,
}

pub struct Node {
    pub config: Config,
    pub network: String,
    pub time: Arc<NetworkTime>,
    pub events: Arc<EventEmitter>,
    pub workers: Arc<WorkerPool>,
    pub capabilities: Capabilities,

    logger: Logger,
    state: LifecycleState,
    loaded: bool,
    start_time: i64,
    bound: Vec<(Arc<EventEmitter>, String, crate::events::ListenerId)>,
    hooks: HashMap<HookPoint, Vec<HookFn>>,

    stack: Vec<Arc<dyn PluginInstance>>,
    plugins: HashMap<String, Arc<dyn PluginInstance>>,

    // Reserved subsystems, populated by the external assembler. Never
    // resolved through the custom-plugin index.
    pub chain: Option<Arc<dyn PluginInstance>>,
    pub fees: Option<Arc<dyn PluginInstance>>,
    pub mempool: Option<Arc<dyn PluginInstance>>,
    pub miner: Option<Arc<dyn PluginInstance>>,
    pub pool: Option<Arc<dyn PluginInstance>>,
    pub rpc: Option<Arc<dyn PluginInstance>>,
    pub http: Option<Arc<dyn PluginInstance>>,
    pub wallet: Option<Arc<dyn PluginInstance>>,
    pub stratum: Option<Arc<dyn PluginInstance>>,
}

impl Node {
    /// Build a node from raw input snapshots, resolving configuration in
    /// tier order and optionally reading the config file.
    pub fn new(input: ConfigInput) -> Result<Self> {
        Self::with_config(Config::new(MODULE), input)
    }

    /// Same as [`Node::new`] with an explicit store, for embedders and
    /// tests that control the directory snapshots.
    pub fn with_config(mut config: Config, input: ConfigInput) -> Result<Self> {
        config.inject(&input.options);
        config.load(&input)?;

        if input.config {
            config.open(CONFIG_FILE)?;
        }

        let logger = Logger::from_config(&config)?;
        let workers = Arc::new(WorkerPool::from_config(&config)?);
        let network = config.network.clone();

        let node = Node {
            config,
            network,
            time: Arc::new(NetworkTime::new()),
            events: Arc::new(EventEmitter::new()),
            workers,
            capabilities: Capabilities::default(),
            logger,
            state: LifecycleState::Idle,
            loaded: false,
            start_time: -1,
            bound: Vec::new(),
            hooks: HashMap::new(),
            stack: Vec::new(),
            plugins: HashMap::new(),
            chain: None,
            fees: None,
            mempool: None,
            miner: None,
            pool: None,
            rpc: None,
            http: None,
            wallet: None,
            stratum: None,
        };

        node.init();
        Ok(node)
    }

    /// Wire collaborator event channels into the logger and the node's
    /// single error handler.
    fn init(&self) {
        let worker_events = &self.workers.events;

        worker_events.on("spawn", |payload| {
            info!(worker = %payload["id"], "spawning worker process");
        });

        worker_events.on("exit", |payload| {
            warn!(worker = %payload["id"], code = %payload["code"], "worker exited");
        });

        worker_events.on("log", |payload| {
            debug!(worker = %payload["id"], "worker says: {}", payload["text"]);
        });

        let events = self.events.clone();
        worker_events.on("error", move |payload| {
            error!("worker error: {}", payload);
            events.emit("error", payload);
        });
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Create the prefix directory if absent.
    pub fn ensure(&self) -> Result<()> {
        self.config.ensure()
    }

    pub fn location(&self, name: &str) -> std::path::PathBuf {
        self.config.location(name)
    }

    /// Register an asynchronous callback on one of the four hook points.
    /// Hooks run after the built-in phase handler, in registration order.
    pub fn hook<F>(&mut self, point: HookPoint, callback: F)
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.hooks.entry(point).or_default().push(Box::new(callback));
    }

    async fn run_hooks(&self, point: HookPoint) -> Result<()> {
        if let Some(hooks) = self.hooks.get(&point) {
            for hook in hooks {
                hook().await?;
            }
        }
        Ok(())
    }

    /// Subscribe `listener` on `source` and record the triple so close can
    /// guarantee removal. Subscription lifetime is one open/close cycle.
    pub fn bind<F>(&mut self, source: &Arc<EventEmitter>, event: &str, listener: F)
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let id = source.on(event, listener);
        self.bound.push((source.clone(), event.to_string(), id));
    }

    /// The controller's single error handler: log, then forward to the
    /// process-wide error signal.
    pub fn error(&self, err: &NodeError) {
        error!("{}", err);
        self.events
            .emit("error", &serde_json::json!(err.to_string()));
    }

    /// Seconds since the node finished opening; 0 when not running.
    pub fn uptime(&self) -> i64 {
        if self.start_time == -1 {
            return 0;
        }

        self.time.now() - self.start_time
    }

    pub fn info(&self) -> NodeInfo {
        let mut plugins: Vec<String> = self.plugins.keys().cloned().collect();
        plugins.sort();

        NodeInfo {
            module: MODULE.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            network: self.network.clone(),
            state: self.state.to_string(),
            uptime: self.uptime(),
            plugins,
        }
    }

    /// Open the node: preopen handler and hooks, then every plugin in
    /// stack order, then the open handler and hooks.
    pub async fn open(&mut self) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(NodeError::Lifecycle(format!(
                "cannot open from state {}",
                self.state
            )));
        }

        self.state = LifecycleState::Preopen;
        self.handle_preopen().await?;
        self.run_hooks(HookPoint::Preopen).await?;

        self.open_plugins().await?;

        self.state = LifecycleState::Open;
        self.handle_open();
        self.run_hooks(HookPoint::Open).await?;

        self.loaded = true;
        Ok(())
    }

    /// Close the node: preclose hooks, then every plugin in the same
    /// order they opened, then the close handler and hooks.
    pub async fn close(&mut self) -> Result<()> {
        if self.state != LifecycleState::Open {
            return Err(NodeError::Lifecycle(format!(
                "cannot close from state {}",
                self.state
            )));
        }

        self.state = LifecycleState::Preclose;
        self.run_hooks(HookPoint::Preclose).await?;

        self.close_plugins().await?;

        self.state = LifecycleState::Close;
        self.handle_close().await?;
        self.run_hooks(HookPoint::Close).await?;

        self.loaded = false;
        self.state = LifecycleState::Idle;
        Ok(())
    }

    async fn handle_preopen(&mut self) -> Result<()> {
        self.logger.open().await?;
        self.workers.open().await?;

        let time_events = self.time.events.clone();

        self.bind(&time_events, "offset", |payload| {
            let offset = payload.as_i64().unwrap_or(0);
            info!(offset, minutes = offset / 60, "time offset");
        });

        self.bind(&time_events, "sample", |payload| {
            debug!(
                samples = %payload["total"],
                offset = %payload["sample"],
                "added time data"
            );
        });

        self.bind(&time_events, "mismatch", |_| {
            warn!("adjusted time mismatch");
            warn!("please make sure your system clock is correct");
        });

        Ok(())
    }

    fn handle_open(&mut self) {
        self.start_time = self.time.now();

        if !self.capabilities.native_signing {
            warn!("signature acceleration unavailable; verification will be slow");
        }

        if !self.capabilities.native_hashing {
            warn!("hash acceleration unavailable; hashing will be slow");
        }

        if !self.workers.enabled {
            warn!("worker pool is disabled; verification will be slow");
        }
    }

    async fn handle_close(&mut self) -> Result<()> {
        for (source, event, id) in self.bound.drain(..) {
            source.remove_listener(&event, id);
        }

        self.start_time = -1;

        self.workers.close().await?;
        self.logger.close().await?;
        Ok(())
    }

    /// Register a plugin: run its factory, guard its id against the
    /// reserved set and duplicates, append the instance to the stack, and
    /// forward its `error` events.
    pub fn use_plugin(&mut self, plugin: &Plugin) -> Result<Arc<dyn PluginInstance>> {
        if self.loaded {
            return Err(NodeError::Validation(
                "cannot add plugin after node is loaded".to_string(),
            ));
        }

        let instance = (plugin.init)(self)?;

        if let Some(id) = &plugin.id {
            if is_reserved(id) || self.plugins.contains_key(id) {
                return Err(NodeError::Validation(format!("{} is already added", id)));
            }

            self.plugins.insert(id.clone(), instance.clone());
        }

        self.stack.push(instance.clone());

        if let Some(emitter) = instance.events() {
            let events = self.events.clone();
            emitter.on("error", move |payload| {
                error!("plugin error: {}", payload);
                events.emit("error", payload);
            });
        }

        Ok(instance)
    }

    /// Whether a custom plugin is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Resolve a subsystem or plugin. Reserved names resolve dedicated
    /// fields and are fatal when unpopulated; custom names may be absent.
    pub fn get(&self, name: &str) -> Result<Option<Arc<dyn PluginInstance>>> {
        if is_reserved(name) {
            let slot = match name {
                "chain" => &self.chain,
                "fees" => &self.fees,
                "mempool" => &self.mempool,
                "miner" => &self.miner,
                "pool" => &self.pool,
                "rpc" => &self.rpc,
                "http" => &self.http,
                "wallet" => &self.wallet,
                "stratum" => &self.stratum,
                _ => unreachable!(),
            };

            return match slot {
                Some(instance) => Ok(Some(instance.clone())),
                None => Err(NodeError::Validation(format!("{} is not loaded", name))),
            };
        }

        Ok(self.plugins.get(name).cloned())
    }

    pub fn require(&self, name: &str) -> Result<Arc<dyn PluginInstance>> {
        self.get(name)?
            .ok_or_else(|| NodeError::Validation(format!("{} is not loaded", name)))
    }

    /// Register every plugin named by the `plugins` config entry. String
    /// entries are resolved through the injected `loader` function.
    pub fn load_plugins(&mut self) -> Result<()> {
        let entries = self.config.array("plugins")?.unwrap_or_default();
        let loader = self.config.func("loader")?;

        for entry in entries {
            match entry {
                Value::Str(name) => {
                    let loader = loader.as_ref().ok_or_else(|| {
                        NodeError::Validation(
                            "a loader function is required for string plugin entries".to_string(),
                        )
                    })?;

                    let plugin = loader(&name)?;
                    self.use_plugin(&plugin)?;
                }
                Value::Obj(any) => {
                    let plugin = any.downcast::<Plugin>().map_err(|_| {
                        NodeError::Validation(
                            "plugins entries must be plugin objects or names".to_string(),
                        )
                    })?;

                    self.use_plugin(&plugin)?;
                }
                _ => {
                    return Err(NodeError::Validation(
                        "plugins entries must be plugin objects or names".to_string(),
                    ))
                }
            }
        }

        Ok(())
    }

    /// Open the stack in registration order, awaiting each instance. A
    /// failure leaves earlier plugins open; no rollback is attempted.
    async fn open_plugins(&mut self) -> Result<()> {
        let stack = self.stack.clone();

        for instance in stack {
            if let Err(err) = instance.open().await {
                self.error(&err);
                return Err(err);
            }
        }

        Ok(())
    }

    /// Close the stack in the same order it opened. Registration order is
    /// authoritative for both directions.
    async fn close_plugins(&mut self) -> Result<()> {
        let stack = self.stack.clone();

        for instance in stack {
            if let Err(err) = instance.close().await {
                self.error(&err);
                return Err(err);
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("network", &self.network)
            .field("state", &self.state)
            .field("plugins", &self.stack.len())
            .finish()
    }
}
