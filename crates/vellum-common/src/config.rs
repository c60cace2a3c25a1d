//! Configuration structures for the vellum bridge.
//!
//! This module defines configuration options for the bridge components:
//! - [`BridgeConfig`]: top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings
//! - [`LoaderConfig`]: module source, cache, and retry settings
//! - [`RetryConfig`]: bounded exponential backoff for network fetches

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::BridgeError;

/// File name of the guest module when no override URL is configured.
///
/// The default source is this file next to the current executable, mirroring
/// the convention of shipping the `.wasm` artifact alongside the binary that
/// embeds it.
pub const DEFAULT_MODULE_FILENAME: &str = "vellum_guest_bg.wasm";

/// Top-level bridge configuration.
///
/// Can be loaded from a TOML file (see [`crate::ConfigFile`]) or built in
/// code. Everything has a sensible default; a bridge constructed with
/// `BridgeConfig::default()` loads the guest artifact from next to the
/// current executable and caches network fetches in the platform data
/// directory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Module loading configuration.
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Wasmtime engine configuration.
///
/// The engine is synchronous: the guest executes to completion on every
/// call, and suspension only happens at the loader's I/O boundaries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable Cranelift speed optimizations.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,

    /// Include debug info in compiled code.
    #[serde(default)]
    pub debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize: defaults::optimize(),
            debug_info: false,
        }
    }
}

/// Module loading configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderConfig {
    /// Override URL for the guest binary (`https://`, `http://` or
    /// `file://`). When unset, the loader looks for
    /// [`DEFAULT_MODULE_FILENAME`] next to the current executable.
    #[serde(default)]
    pub module_url: Option<String>,

    /// Enable the content-addressed on-disk cache for network sources.
    ///
    /// The cache degrades silently to network-only operation when the
    /// platform data directory cannot be resolved or written.
    #[serde(default = "defaults::cache_enabled")]
    pub cache_enabled: bool,

    /// Override directory for the on-disk cache.
    ///
    /// When unset, `<platform-data-dir>/vellum/` is used.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Retry policy for network fetches.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            module_url: None,
            cache_enabled: defaults::cache_enabled(),
            cache_dir: None,
            retry: RetryConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Resolve the module source URL.
    ///
    /// Returns the configured override, or a `file://` URL pointing at
    /// [`DEFAULT_MODULE_FILENAME`] next to the current executable.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if the override does not parse
    /// as a URL, or if the executable path cannot be determined.
    pub fn resolved_module_url(&self) -> Result<Url, BridgeError> {
        if let Some(raw) = &self.module_url {
            return Url::parse(raw).map_err(|e| {
                BridgeError::invalid_config(format!("invalid module URL '{raw}': {e}"))
            });
        }

        let exe = std::env::current_exe().map_err(|e| {
            BridgeError::invalid_config(format!("cannot locate current executable: {e}"))
        })?;
        let path = exe.with_file_name(DEFAULT_MODULE_FILENAME);
        Url::from_file_path(&path).map_err(|()| {
            BridgeError::invalid_config(format!(
                "cannot express '{}' as a file URL",
                path.display()
            ))
        })
    }
}

/// Bounded exponential backoff for network fetches.
///
/// An initial attempt plus `max_retries` retries; the wait between attempts
/// starts at `initial_backoff_ms`, doubles each time, and is capped at
/// `max_backoff_ms`. After the ceiling, the last failure is surfaced.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Initial wait between attempts, in milliseconds.
    #[serde(default = "defaults::initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the wait between attempts, in milliseconds.
    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            initial_backoff_ms: defaults::initial_backoff_ms(),
            max_backoff_ms: defaults::max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Get the initial backoff as a `Duration`.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get the backoff cap as a `Duration`.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn optimize() -> bool {
        true
    }

    pub const fn cache_enabled() -> bool {
        true
    }

    pub const fn max_retries() -> u32 {
        5
    }

    pub const fn initial_backoff_ms() -> u64 {
        250
    }

    pub const fn max_backoff_ms() -> u64 {
        10_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();

        assert!(config.engine.optimize);
        assert!(!config.engine.debug_info);
        assert!(config.loader.module_url.is_none());
        assert!(config.loader.cache_enabled);
        assert!(config.loader.cache_dir.is_none());
        assert_eq!(config.loader.retry.max_retries, 5);
        assert_eq!(config.loader.retry.initial_backoff_ms, 250);
        assert_eq!(config.loader.retry.max_backoff_ms, 10_000);
    }

    #[test]
    fn test_config_serialization() {
        let config = BridgeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: BridgeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            config.loader.retry.max_retries,
            deserialized.loader.retry.max_retries
        );
        assert_eq!(config.engine.optimize, deserialized.engine.optimize);
    }

    #[test]
    fn test_resolved_module_url_override() {
        let config = LoaderConfig {
            module_url: Some("https://example.com/guest.wasm".into()),
            ..Default::default()
        };

        let url = config.resolved_module_url().unwrap();
        assert_eq!(url.as_str(), "https://example.com/guest.wasm");
    }

    #[test]
    fn test_resolved_module_url_invalid() {
        let config = LoaderConfig {
            module_url: Some("not a url".into()),
            ..Default::default()
        };

        let result = config.resolved_module_url();
        assert!(matches!(
            result,
            Err(BridgeError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_resolved_module_url_default_is_exe_relative() {
        let config = LoaderConfig::default();
        let url = config.resolved_module_url().unwrap();

        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with(DEFAULT_MODULE_FILENAME));
    }

    #[test]
    fn test_retry_durations() {
        let retry = RetryConfig::default();
        assert_eq!(retry.initial_backoff(), Duration::from_millis(250));
        assert_eq!(retry.max_backoff(), Duration::from_secs(10));
    }
}
