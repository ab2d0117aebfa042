//! Worker-pool collaborator boundary
//!
//! The real pool (verification and hashing offload) lives outside this
//! crate; the node only needs its configuration surface, its open/close
//! sequencing and its event channel. Disabled pools open and close as
//! no-ops.

use crate::config::Config;
use crate::error::Result;
use crate::events::EventEmitter;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub struct WorkerPool {
    pub enabled: bool,
    pub size: u64,
    pub timeout: u64,
    pub file: Option<PathBuf>,
    pub events: Arc<EventEmitter>,
    running: AtomicBool,
}

impl WorkerPool {
    /// Build the pool facade from typed config accessors.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(WorkerPool {
            enabled: config.bool("workers")?.unwrap_or(false),
            size: config.uint("workers-size")?.unwrap_or(4),
            timeout: config.uint("workers-timeout")?.unwrap_or(120_000),
            file: config.path("worker-file")?,
            events: Arc::new(EventEmitter::new()),
            running: AtomicBool::new(false),
        })
    }

    pub async fn open(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        debug!(size = self.size, "worker pool open");

        for id in 0..self.size {
            self.events.emit("spawn", &serde_json::json!({ "id": id }));
        }

        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        for id in 0..self.size {
            self.events
                .emit("exit", &serde_json::json!({ "id": id, "code": 0 }));
        }

        debug!("worker pool closed");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
