//! Per-instance bridge state and store management.
//!
//! This module provides:
//! - [`BridgeState`]: the data every host function can reach through the
//!   store: the heap table, the memory epoch, and captured guest logs
//! - [`GuestLog`]: a log line emitted by the guest

use std::time::Instant;

use wasmtime::Store;

use crate::WasmEngine;
use crate::heap::HeapTable;

/// Per-instance state accessible from host functions.
///
/// One `BridgeState` lives inside each [`Store`] for the lifetime of the
/// guest instance. Handle allocation and freeing are strictly sequential:
/// the guest is single-threaded, and the bridge serializes calls into it.
pub struct BridgeState {
    /// The reference-indirection table for guest handles.
    pub heap: HeapTable,

    /// Logs captured from guest code.
    pub logs: Vec<GuestLog>,

    /// Bumped by every operation that can resize guest memory.
    memory_epoch: u64,
}

/// A single log line from guest code.
#[derive(Debug, Clone)]
pub struct GuestLog {
    /// Log message content.
    pub message: String,

    /// When the log was recorded.
    pub timestamp: Instant,
}

impl BridgeState {
    /// Create fresh state with an empty heap (reserved constants only).
    pub fn new() -> Self {
        Self {
            heap: HeapTable::new(),
            logs: Vec::new(),
            memory_epoch: 0,
        }
    }

    /// Record a log line from the guest.
    pub fn log(&mut self, message: String) {
        self.logs.push(GuestLog {
            message,
            timestamp: Instant::now(),
        });
    }

    /// The current memory epoch.
    ///
    /// See [`MemoryViews`](crate::MemoryViews) for how consumers use this to
    /// assert view freshness.
    pub fn memory_epoch(&self) -> u64 {
        self.memory_epoch
    }

    /// Mark every outstanding memory view stale.
    ///
    /// Called after any operation that can resize the guest's linear memory:
    /// allocator calls, and guest entry-point calls.
    pub fn bump_memory_epoch(&mut self) {
        self.memory_epoch += 1;
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a new store holding fresh bridge state.
pub fn create_store(engine: &WasmEngine) -> Store<BridgeState> {
    Store::new(engine.inner(), BridgeState::new())
}
