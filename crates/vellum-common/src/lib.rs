//! Common types, errors, and configuration for vellum.
//!
//! This crate provides shared functionality used across the vellum workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for engine and loader settings
//! - Typed conversion options and outputs

pub mod config;
pub mod config_file;
pub mod error;
pub mod options;

pub use config::{
    BridgeConfig, DEFAULT_MODULE_FILENAME, EngineConfig, LoaderConfig, RetryConfig,
};
pub use config_file::{ConfigFile, ConfigFileError};
pub use error::{BridgeError, FetchError, GuestThrow};
pub use options::{Heading, MarkdownHtml, MarkdownOptions, PlaintextOptions, Statistics};
