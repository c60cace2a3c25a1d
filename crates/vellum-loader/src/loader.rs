//! Deduplicated, idempotent guest instantiation.
//!
//! [`ModuleLoader`] owns the `Unloaded → Loading → {Loaded | Unloaded}`
//! lifecycle. The first `load()` starts instantiation; callers arriving
//! while it is in flight await the *same* attempt and observe the same
//! outcome. Success becomes a permanent singleton for the loader's
//! lifetime; failure clears the in-flight marker so a later call retries
//! from scratch. Every failed load is retryable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{info, instrument};
use wasmtime::Linker;

use vellum_common::{BridgeConfig, BridgeError};
use vellum_core::{CompiledModule, WasmEngine, create_store};
use vellum_host::register_all;

use crate::cache::{AssetCache, DecompressFn, Resolved};
use crate::fetch::{Fetch, HttpFetcher};
use crate::guest::Guest;

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<Guest>, BridgeError>>>;

enum LoadState {
    Unloaded,
    Loading(SharedLoad),
    Loaded(Arc<Guest>),
}

/// Loads and instantiates the guest module exactly once.
///
/// Cloneable; clones share the same state and singleton.
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    engine: WasmEngine,
    config: BridgeConfig,
    cache: AssetCache,
    fetcher: Arc<dyn Fetch>,
    decompress: Option<Arc<DecompressFn>>,
    state: Mutex<LoadState>,
    attempts: AtomicU32,
}

impl ModuleLoader {
    /// Create a loader with the default HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created from the
    /// configuration.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::with_fetcher(config, Arc::new(HttpFetcher::new()), None)
    }

    /// Create a loader with a custom transport and optional decompression
    /// callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created from the
    /// configuration.
    pub fn with_fetcher(
        config: BridgeConfig,
        fetcher: Arc<dyn Fetch>,
        decompress: Option<Arc<DecompressFn>>,
    ) -> Result<Self, BridgeError> {
        let engine = WasmEngine::new(&config.engine)?;
        let cache = AssetCache::new(&config.loader);

        Ok(Self {
            inner: Arc::new(LoaderInner {
                engine,
                config,
                cache,
                fetcher,
                decompress,
                state: Mutex::new(LoadState::Unloaded),
                attempts: AtomicU32::new(0),
            }),
        })
    }

    /// Get the ready-to-call guest, instantiating it on first use.
    ///
    /// Concurrent callers share a single in-flight attempt. Once loaded,
    /// this returns the singleton immediately and synchronously.
    ///
    /// # Errors
    ///
    /// Returns the shared outcome of the attempt this caller observed; the
    /// loader itself returns to `Unloaded` on failure.
    pub async fn load(&self) -> Result<Arc<Guest>, BridgeError> {
        let shared = {
            let mut state = self.inner.state.lock();
            match &*state {
                LoadState::Loaded(guest) => return Ok(Arc::clone(guest)),
                LoadState::Loading(inflight) => inflight.clone(),
                LoadState::Unloaded => {
                    let inflight: SharedLoad =
                        Arc::clone(&self.inner).instantiate().boxed().shared();
                    *state = LoadState::Loading(inflight.clone());
                    inflight
                }
            }
        };

        let result = shared.clone().await;

        let mut state = self.inner.state.lock();
        // Only the attempt we awaited may transition the state; a newer
        // attempt started after a failure is left untouched.
        let owns_transition =
            matches!(&*state, LoadState::Loading(inflight) if inflight.ptr_eq(&shared));
        if owns_transition {
            *state = match &result {
                Ok(guest) => LoadState::Loaded(Arc::clone(guest)),
                Err(_) => LoadState::Unloaded,
            };
        }

        result
    }

    /// Returns `true` if the singleton is currently populated.
    pub fn is_loaded(&self) -> bool {
        matches!(&*self.inner.state.lock(), LoadState::Loaded(_))
    }

    /// How many instantiation attempts have ever started.
    pub fn attempt_count(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("loaded", &self.is_loaded())
            .field("attempts", &self.attempt_count())
            .finish_non_exhaustive()
    }
}

impl LoaderInner {
    #[instrument(skip(self))]
    async fn instantiate(self: Arc<Self>) -> Result<Arc<Guest>, BridgeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let url = self.config.loader.resolved_module_url()?;
        info!(url = %url, "Loading guest module");

        let resolved = self
            .cache
            .resolve(&url, self.fetcher.as_ref(), self.decompress.as_deref())
            .await?;
        let bytes = match resolved {
            Resolved::Bytes(bytes) => bytes,
            Resolved::File(path) => tokio::fs::read(&path).await.map_err(|e| {
                BridgeError::transport(format!("failed to read '{}': {e}", path.display()))
            })?,
        };

        let module = CompiledModule::from_bytes(self.engine.inner(), &bytes)?;

        let mut linker = Linker::new(self.engine.inner());
        register_all(&mut linker)?;

        let mut store = create_store(&self.engine);
        let instance = linker
            .instantiate(&mut store, module.module())
            .map_err(|e| BridgeError::instantiation(e.to_string()))?;

        let guest = Guest::new(store, &instance)?;

        info!(content_hash = module.content_hash(), "Guest module ready");
        Ok(Arc::new(guest))
    }
}
