//! The caller-owned bridge context.
//!
//! [`Bridge`] is the front door: construct one (there is no hidden
//! module-level state, so multiple independent bridges can coexist in a
//! process), then call the conversions. The first conversion instantiates
//! the guest; everything after that is synchronous.

use std::sync::Arc;

use vellum_common::{
    BridgeConfig, BridgeError, MarkdownHtml, MarkdownOptions, PlaintextOptions,
};

use crate::cache::DecompressFn;
use crate::fetch::Fetch;
use crate::loader::ModuleLoader;

/// Host/guest bridge for the text-transform guest module.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> Result<(), vellum_common::BridgeError> {
/// use vellum_loader::Bridge;
/// use vellum_common::MarkdownOptions;
///
/// let bridge = Bridge::builder()
///     .module_url("https://cdn.example.com/vellum_guest_bg.wasm")
///     .build()?;
///
/// let output = bridge
///     .markdown_to_html("## Hello\n", &MarkdownOptions::default())
///     .await?;
/// assert!(output.html.contains("Hello"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Bridge {
    loader: ModuleLoader,
}

impl Bridge {
    /// Create a bridge with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a bridge from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn with_config(config: BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            loader: ModuleLoader::new(config)?,
        })
    }

    /// Start building a customized bridge.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    /// Convert Markdown to HTML.
    ///
    /// # Errors
    ///
    /// Loader errors on first use, then the per-call taxonomy of
    /// [`Guest::markdown_to_html`](crate::Guest::markdown_to_html).
    pub async fn markdown_to_html(
        &self,
        markdown: &str,
        options: &MarkdownOptions,
    ) -> Result<MarkdownHtml, BridgeError> {
        self.loader.load().await?.markdown_to_html(markdown, options)
    }

    /// Convert Markdown to plaintext (for broadcast email or RSS, say).
    ///
    /// # Errors
    ///
    /// Loader errors on first use, then the per-call taxonomy of
    /// [`Guest::markdown_to_plaintext`](crate::Guest::markdown_to_plaintext).
    pub async fn markdown_to_plaintext(
        &self,
        markdown: &str,
        options: &PlaintextOptions,
    ) -> Result<String, BridgeError> {
        self.loader
            .load()
            .await?
            .markdown_to_plaintext(markdown, options)
    }

    /// Convert MJML to HTML.
    ///
    /// # Errors
    ///
    /// Loader errors on first use, then the per-call taxonomy of
    /// [`Guest::mjml_to_html`](crate::Guest::mjml_to_html).
    pub async fn mjml_to_html(&self, mjml: &str) -> Result<String, BridgeError> {
        self.loader.load().await?.mjml_to_html(mjml)
    }

    /// Instantiate the guest eagerly instead of on first conversion.
    ///
    /// # Errors
    ///
    /// Returns the load outcome.
    pub async fn warm_up(&self) -> Result<(), BridgeError> {
        self.loader.load().await.map(|_| ())
    }

    /// Returns `true` if the guest singleton is populated.
    pub fn is_loaded(&self) -> bool {
        self.loader.is_loaded()
    }

    /// Access the underlying loader.
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }
}

/// Builder for [`Bridge`].
#[derive(Default)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    fetcher: Option<Arc<dyn Fetch>>,
    decompress: Option<Arc<DecompressFn>>,
}

impl BridgeBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the guest module source URL.
    pub fn module_url(mut self, url: impl Into<String>) -> Self {
        self.config.loader.module_url = Some(url.into());
        self
    }

    /// Enable or disable the on-disk module cache.
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.loader.cache_enabled = enabled;
        self
    }

    /// Override the cache directory.
    pub fn cache_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.loader.cache_dir = Some(dir.into());
        self
    }

    /// Substitute the transport (used by tests; the default is HTTP).
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Apply a decompression callback to raw fetched bytes before
    /// instantiation (e.g. when the artifact is shipped compressed).
    pub fn decompress<F>(mut self, decompress: F) -> Self
    where
        F: Fn(Vec<u8>) -> Result<Vec<u8>, BridgeError> + Send + Sync + 'static,
    {
        self.decompress = Some(Arc::new(decompress));
        self
    }

    /// Build the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn build(self) -> Result<Bridge, BridgeError> {
        let loader = match self.fetcher {
            Some(fetcher) => ModuleLoader::with_fetcher(self.config, fetcher, self.decompress)?,
            None => ModuleLoader::with_fetcher(
                self.config,
                Arc::new(crate::fetch::HttpFetcher::new()),
                self.decompress,
            )?,
        };
        Ok(Bridge { loader })
    }
}

impl std::fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
