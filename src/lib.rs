//! LumenChain node kernel - configuration resolution and lifecycle
//! orchestration
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Configuration
//! - [`config`] - Tiered configuration store, typed accessors and the
//!   four input parsers (config file, CLI, environment, URL forms)
//!
//! ## Lifecycle
//! - [`node`] - Lifecycle controller and plugin registry
//! - [`plugin`] - Plugin capability contract
//!
//! ## Collaborator Boundaries
//! - [`logging`] - Logger subsystem (tracing)
//! - [`workers`] - Worker pool facade
//! - [`time`] - Adjusted network time
//!
//! ## Utilities
//! - [`events`] - Event subscription plumbing
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Configuration
// ============================================================================
pub mod config;

// ============================================================================
// Lifecycle
// ============================================================================
pub mod node;
pub mod plugin;

// ============================================================================
// Collaborator Boundaries
// ============================================================================
pub mod logging;
pub mod time;
pub mod workers;

// ============================================================================
// Utilities
// ============================================================================
pub mod error;
pub mod events;

pub use config::{Config, ConfigInput, Value};
pub use error::{NodeError, Result};
pub use node::{Node, NodeInfo};
pub use plugin::{Plugin, PluginInstance};
