//! Adjusted network time
//!
//! Boundary of the time subsystem the node binds diagnostic listeners to.
//! Tracks a peer-derived offset against the local clock and announces
//! `offset`, `sample` and `mismatch` events.

use crate::events::EventEmitter;
use parking_lot::Mutex;
use std::sync::Arc;

/// Offsets beyond this many seconds count as a clock mismatch.
const MAX_OFFSET: i64 = 70 * 60;

pub struct NetworkTime {
    pub events: Arc<EventEmitter>,
    offset: Mutex<i64>,
    samples: Mutex<Vec<i64>>,
}

impl Default for NetworkTime {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkTime {
    pub fn new() -> Self {
        NetworkTime {
            events: Arc::new(EventEmitter::new()),
            offset: Mutex::new(0),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Unix seconds adjusted by the current offset.
    pub fn now(&self) -> i64 {
        chrono::Utc::now().timestamp() + *self.offset.lock()
    }

    pub fn offset(&self) -> i64 {
        *self.offset.lock()
    }

    /// Record a peer time sample and re-derive the offset as the median
    /// of all samples so far.
    pub fn add_sample(&self, sample: i64) {
        let total = {
            let mut samples = self.samples.lock();
            samples.push(sample);
            samples.len()
        };

        self.events
            .emit("sample", &serde_json::json!({ "sample": sample, "total": total }));

        let median = {
            let mut samples = self.samples.lock().clone();
            samples.sort_unstable();
            samples[samples.len() / 2]
        };

        if median.abs() > MAX_OFFSET {
            self.events.emit("mismatch", &serde_json::Value::Null);
            return;
        }

        let changed = {
            let mut offset = self.offset.lock();
            let changed = *offset != median;
            *offset = median;
            changed
        };

        if changed {
            self.events.emit("offset", &serde_json::json!(median));
        }
    }
}
