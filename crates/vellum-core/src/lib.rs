//! Core marshalling machinery for vellum.
//!
//! This crate provides the boundary between a Rust host and a linear-memory
//! guest module:
//! - [`WasmEngine`]: configured Wasmtime engine (synchronous execution)
//! - [`CompiledModule`]: validated, compiled guest binary
//! - [`HeapTable`] + [`HostValue`]: the handle indirection between guest
//!   integers and host values
//! - [`MemoryViews`]: bounds-checked, epoch-stamped access to guest memory
//! - [`codec`]: UTF-8 transport through the guest's exported allocator
//! - [`BridgeState`]: per-instance state host functions operate on
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Shared, thread-safe, compiles the guest once)         │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              Store<BridgeState> + Instance              │
//! │  - HeapTable: handle ↔ host value                       │
//! │  - memory epoch: view invalidation stamp                │
//! │  - guest logs                                           │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              MemoryViews + StringCodec                  │
//! │  (every access re-derived from the live buffer)         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod engine;
pub mod heap;
pub mod memory;
pub mod module;
pub mod state;
pub mod value;

pub use codec::GuestAllocator;
pub use engine::WasmEngine;
pub use heap::{HANDLE_FALSE, HANDLE_NULL, HANDLE_TRUE, HANDLE_UNDEFINED, Handle, HeapTable};
pub use memory::{MemoryStamp, MemoryViews};
pub use module::CompiledModule;
pub use state::{BridgeState, GuestLog, create_store};
pub use value::HostValue;
