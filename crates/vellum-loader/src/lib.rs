//! Module loading, caching, and the bridge surface for vellum.
//!
//! This crate turns a module source URL into a ready-to-call guest:
//!
//! - [`fetch`]: transport seam + bounded exponential-backoff retry
//! - [`cache`]: content-addressed on-disk cache with silent degradation
//! - [`loader`]: deduplicated, idempotent instantiation
//! - [`guest`]: the instantiated guest and its entry-point wrappers
//! - [`bridge`]: the caller-owned context tying it together
//!
//! # Lifecycle
//!
//! ```text
//! Unloaded ──load()──▶ Loading ──ok──▶ Loaded (permanent singleton)
//!     ▲                   │
//!     └──────── err ──────┘   (every failed load is retryable)
//! ```

pub mod bridge;
pub mod cache;
pub mod fetch;
pub mod guest;
pub mod loader;

pub use bridge::{Bridge, BridgeBuilder};
pub use cache::{AssetCache, CACHE_SUBDIR, DecompressFn, Resolved};
pub use fetch::{Fetch, HttpFetcher, fetch_with_retries};
pub use guest::Guest;
pub use loader::ModuleLoader;
