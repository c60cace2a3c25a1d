//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the bridge. It is thread-safe,
//! shared by everything that compiles or instantiates the guest, and
//! deliberately synchronous: the guest executes to completion on every call,
//! so there is no async support, no fuel metering and no epoch interruption
//! to configure.

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine};

use vellum_common::{BridgeError, EngineConfig};

/// Thread-safe WebAssembly engine wrapper.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, BridgeError> {
        let mut wasmtime_config = Config::new();

        let opt_level = if config.optimize {
            wasmtime::OptLevel::Speed
        } else {
            wasmtime::OptLevel::None
        };
        wasmtime_config.cranelift_opt_level(opt_level);
        wasmtime_config.debug_info(config.debug_info);

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            BridgeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(optimize = config.optimize, "Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("optimize", &self.config.optimize)
            .field("debug_info", &self.config.debug_info)
            .finish_non_exhaustive()
    }
}
