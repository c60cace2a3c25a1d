//! Host function catalogue for the vellum guest.
//!
//! The guest module imports a fixed set of host functions, its only window
//! into the host. This crate registers them on a Wasmtime linker:
//!
//! - [`imports`]: the full catalogue, grouped by category
//! - [`marshal`]: helpers for moving strings and bytes across the boundary
//!
//! # Boundary rules
//!
//! 1. Guest-visible arguments are handles and primitives, never host values.
//! 2. Host functions re-resolve memory and allocator exports on every call;
//!    nothing derived from guest memory outlives a call that can resize it.
//! 3. Failures unwind the guest call as traps carrying typed errors; the
//!    entry wrappers classify them into the bridge's error taxonomy.

pub mod imports;
pub mod marshal;

pub use imports::{IMPORT_MODULE, register_all};
