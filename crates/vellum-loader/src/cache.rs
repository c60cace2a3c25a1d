//! Content-addressed on-disk cache for the guest binary.
//!
//! Network sources are cached under the platform's local data directory,
//! keyed by the hex SHA-256 of the source URL string. The cache is
//! append-only and never invalidated; racing writers produce at most a
//! harmless duplicate write of identical content.
//!
//! Every cache failure (unresolvable data directory, unwritable path)
//! degrades silently to returning the fetched bytes directly. The cache is
//! an optimization, never a correctness dependency.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use vellum_common::{BridgeError, LoaderConfig, RetryConfig};

use crate::fetch::{Fetch, fetch_with_retries};

/// Subdirectory of the platform data directory holding cached modules.
pub const CACHE_SUBDIR: &str = "vellum";

/// Decompression callback applied to raw fetched bytes.
pub type DecompressFn = dyn Fn(Vec<u8>) -> Result<Vec<u8>, BridgeError> + Send + Sync;

/// Outcome of resolving a module source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A local file holding ready-to-instantiate (already decompressed)
    /// bytes.
    File(PathBuf),
    /// In-memory bytes, when no cache file exists or could be written.
    Bytes(Vec<u8>),
}

/// Resolver from module source URL to loadable bytes.
pub struct AssetCache {
    dir: Option<PathBuf>,
    retry: RetryConfig,
}

impl AssetCache {
    /// Build a cache from loader configuration.
    ///
    /// Caching is disabled (network-only) when the configuration disables
    /// it or when no platform data directory can be resolved.
    pub fn new(config: &LoaderConfig) -> Self {
        let dir = if config.cache_enabled {
            config.cache_dir.clone().or_else(default_cache_dir)
        } else {
            None
        };
        if dir.is_none() {
            debug!("Module cache disabled; operating network-only");
        }
        Self {
            dir,
            retry: config.retry.clone(),
        }
    }

    /// The cache directory, if caching is active.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// The stable cache key for a source URL: hex SHA-256 of the URL string.
    pub fn url_hash(url: &Url) -> String {
        let digest = Sha256::digest(url.as_str().as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// The cache file path a source URL maps to, if caching is active.
    ///
    /// The same URL always maps to the same path, across processes and
    /// cache instances.
    pub fn cache_path(&self, url: &Url) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.wasm", Self::url_hash(url))))
    }

    /// Resolve a module source to loadable bytes.
    ///
    /// - `file://` URLs are read directly (decompressed when a callback is
    ///   supplied).
    /// - Network URLs consult the cache first; a hit returns the local file
    ///   (already decompressed when persisted, so the callback is not
    ///   applied again). A miss fetches with retry, decompresses, persists
    ///   best-effort, and returns the file or the bytes.
    ///
    /// # Errors
    ///
    /// Returns a transport error when fetching fails past the retry
    /// ceiling, or when a `file://` source cannot be read. Cache write
    /// failures are not errors.
    pub async fn resolve(
        &self,
        url: &Url,
        fetcher: &dyn Fetch,
        decompress: Option<&DecompressFn>,
    ) -> Result<Resolved, BridgeError> {
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|()| BridgeError::invalid_config(format!("invalid file URL: {url}")))?;
            if let Some(decompress) = decompress {
                let bytes = read_file(&path).await?;
                return Ok(Resolved::Bytes(decompress(bytes)?));
            }
            return Ok(Resolved::File(path));
        }

        let Some(path) = self.cache_path(url) else {
            let bytes = fetch_with_retries(fetcher, url, &self.retry).await?;
            return Ok(Resolved::Bytes(apply_decompress(decompress, bytes)?));
        };

        if tokio::fs::metadata(&path).await.is_ok() {
            debug!(path = %path.display(), "Module cache hit");
            return Ok(Resolved::File(path));
        }

        let bytes = fetch_with_retries(fetcher, url, &self.retry).await?;
        let bytes = apply_decompress(decompress, bytes)?;

        match persist(&path, &bytes).await {
            Ok(()) => {
                info!(path = %path.display(), bytes = bytes.len(), "Module cached");
                Ok(Resolved::File(path))
            }
            Err(err) => {
                debug!(error = %err, "Module cache write failed; returning fetched bytes");
                Ok(Resolved::Bytes(bytes))
            }
        }
    }
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(CACHE_SUBDIR))
}

async fn read_file(path: &Path) -> Result<Vec<u8>, BridgeError> {
    tokio::fs::read(path).await.map_err(|e| {
        BridgeError::transport(format!("failed to read '{}': {e}", path.display()))
    })
}

fn apply_decompress(
    decompress: Option<&DecompressFn>,
    bytes: Vec<u8>,
) -> Result<Vec<u8>, BridgeError> {
    match decompress {
        Some(decompress) => decompress(bytes),
        None => Ok(bytes),
    }
}

async fn persist(path: &Path, bytes: &[u8]) -> Result<(), BridgeError> {
    let parent = path
        .parent()
        .ok_or_else(|| BridgeError::cache("cache path has no parent directory"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| BridgeError::cache(format!("cannot create '{}': {e}", parent.display())))?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| BridgeError::cache(format!("cannot write '{}': {e}", path.display())))
}
