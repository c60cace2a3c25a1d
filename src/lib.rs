//! vellum: a host/guest marshalling bridge for a WebAssembly
//! text-transform module (Markdown/CommonMark to HTML/plaintext,
//! MJML to HTML).
//!
//! The guest is a compiled linear-memory module with no native object
//! model; this crate is the boundary that lets it exchange rich values with
//! the host: a handle table for host values, a UTF-8 codec over the guest's
//! allocator, epoch-stamped memory views, the host-function import table,
//! and a loader that fetches, caches, and instantiates the binary exactly
//! once.
//!
//! # Quick start
//!
//! ```no_run
//! # async fn demo() -> Result<(), vellum::BridgeError> {
//! use vellum::{Bridge, MarkdownOptions};
//!
//! let bridge = Bridge::builder()
//!     .module_url("https://cdn.example.com/vellum_guest_bg.wasm")
//!     .build()?;
//!
//! let output = bridge
//!     .markdown_to_html("## Hello\n\n* a\n* b\n", &MarkdownOptions::default())
//!     .await?;
//!
//! println!("{}", output.html);
//! for heading in &output.headings {
//!     println!("#{}: {}", heading.id, heading.heading);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Crates
//!
//! - `vellum-common`: errors, configuration, option/output types
//! - `vellum-core`: heap table, memory views, string codec, engine
//! - `vellum-host`: the import table (host functions the guest calls)
//! - `vellum-loader`: fetching, caching, instantiation, and [`Bridge`]

pub use vellum_common::{
    BridgeConfig, BridgeError, ConfigFile, EngineConfig, FetchError, Heading, LoaderConfig,
    MarkdownHtml, MarkdownOptions, PlaintextOptions, RetryConfig, Statistics,
};
pub use vellum_core::{
    BridgeState, CompiledModule, HeapTable, HostValue, MemoryViews, WasmEngine,
};
pub use vellum_host::{IMPORT_MODULE, register_all};
pub use vellum_loader::{
    AssetCache, Bridge, BridgeBuilder, Fetch, Guest, HttpFetcher, ModuleLoader, Resolved,
};
