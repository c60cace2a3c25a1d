//! Asset-cache behavior: file URLs, content-addressed hits and misses,
//! decompression placement, and silent degradation.

mod common;

use common::{FakeFetcher, zero_backoff};
use url::Url;

use vellum_common::{BridgeError, LoaderConfig};
use vellum_loader::{AssetCache, Resolved};

fn config_with_dir(dir: &std::path::Path) -> LoaderConfig {
    LoaderConfig {
        cache_dir: Some(dir.to_path_buf()),
        retry: zero_backoff(),
        ..Default::default()
    }
}

fn network_url() -> Url {
    Url::parse("https://example.com/guest.wasm").unwrap()
}

#[tokio::test]
async fn test_file_url_resolves_to_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guest.wasm");
    std::fs::write(&path, b"module bytes").unwrap();
    let url = Url::from_file_path(&path).unwrap();

    let cache = AssetCache::new(&config_with_dir(dir.path()));
    let fetcher = FakeFetcher::always_failing();

    let resolved = cache.resolve(&url, &fetcher, None).await.unwrap();

    assert_eq!(resolved, Resolved::File(path));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_file_url_with_decompress_returns_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guest.wasm.z");
    std::fs::write(&path, [3, 2, 1]).unwrap();
    let url = Url::from_file_path(&path).unwrap();

    let cache = AssetCache::new(&config_with_dir(dir.path()));
    let fetcher = FakeFetcher::always_failing();
    let decompress = |mut bytes: Vec<u8>| -> Result<Vec<u8>, BridgeError> {
        bytes.reverse();
        Ok(bytes)
    };

    let resolved = cache.resolve(&url, &fetcher, Some(&decompress)).await.unwrap();

    assert_eq!(resolved, Resolved::Bytes(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_miss_fetches_persists_and_later_hits() {
    let dir = tempfile::tempdir().unwrap();
    let cache = AssetCache::new(&config_with_dir(dir.path()));
    let fetcher = FakeFetcher::always_ok(b"module bytes".to_vec());
    let url = network_url();

    let first = cache.resolve(&url, &fetcher, None).await.unwrap();
    let Resolved::File(path) = first else {
        panic!("expected a cached file, got {first:?}");
    };
    assert_eq!(std::fs::read(&path).unwrap(), b"module bytes");
    assert_eq!(fetcher.calls(), 1);

    // The hash-named file short-circuits the network from now on.
    let second = cache.resolve(&url, &fetcher, None).await.unwrap();
    assert_eq!(second, Resolved::File(path));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_decompress_applied_before_persist() {
    let dir = tempfile::tempdir().unwrap();
    let cache = AssetCache::new(&config_with_dir(dir.path()));
    let fetcher = FakeFetcher::always_ok(vec![1, 2, 3]);
    let decompress = |mut bytes: Vec<u8>| -> Result<Vec<u8>, BridgeError> {
        bytes.reverse();
        Ok(bytes)
    };

    let resolved = cache
        .resolve(&network_url(), &fetcher, Some(&decompress))
        .await
        .unwrap();

    let Resolved::File(path) = resolved else {
        panic!("expected a cached file");
    };
    // The persisted artifact is the decompressed form; a later hit is
    // returned without running the callback again.
    assert_eq!(std::fs::read(&path).unwrap(), vec![3, 2, 1]);
}

#[tokio::test]
async fn test_cache_disabled_returns_bytes_directly() {
    let config = LoaderConfig {
        cache_enabled: false,
        cache_dir: Some(std::path::PathBuf::from("/tmp/never-used")),
        retry: zero_backoff(),
        ..Default::default()
    };
    let cache = AssetCache::new(&config);
    let fetcher = FakeFetcher::always_ok(b"module bytes".to_vec());

    let resolved = cache.resolve(&network_url(), &fetcher, None).await.unwrap();

    assert_eq!(resolved, Resolved::Bytes(b"module bytes".to_vec()));
    assert!(cache.cache_dir().is_none());
}

#[tokio::test]
async fn test_unwritable_cache_degrades_to_bytes() {
    // Point the cache directory underneath a regular file so every write
    // attempt fails.
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let cache = AssetCache::new(&config_with_dir(&blocker.join("cache")));
    let fetcher = FakeFetcher::always_ok(b"module bytes".to_vec());

    let resolved = cache.resolve(&network_url(), &fetcher, None).await.unwrap();

    assert_eq!(resolved, Resolved::Bytes(b"module bytes".to_vec()));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_fetch_failure_propagates_as_transport() {
    let dir = tempfile::tempdir().unwrap();
    let cache = AssetCache::new(&config_with_dir(dir.path()));
    let fetcher = FakeFetcher::always_failing();

    let result = cache.resolve(&network_url(), &fetcher, None).await;

    assert!(matches!(result, Err(BridgeError::Transport { .. })));
    assert_eq!(fetcher.calls(), 6);
}
