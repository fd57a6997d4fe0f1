//! OCI image resolution for jcontainer: parses image references, talks to a
//! Docker Hub-compatible v2 registry, and flattens layers into a cached
//! rootfs directory.
//!
//! # Architecture
//!
//! ```text
//! Oci (public API)
//!  ├── Store (cache_root/namespace/image/tag layout, staging + sentinel)
//!  ├── registry:: (manifest/blob resolution via oci_client::Client)
//!  └── extract:: (gzipped tar → rootfs, whiteout-aware)
//! ```
//!
//! `oci_client` is async; the rest of this workspace is not. `Oci` bridges
//! the two at its own boundary with a private, current-thread `tokio`
//! runtime spun up per pull, so callers keep a plain synchronous API and
//! nothing upstream of this crate needs to know `tokio` exists.

#![allow(clippy::missing_docs_in_private_items)]

mod extract;
mod reference;
mod registry;
mod store;

use std::path::{Path, PathBuf};

use oci_client::client::{Client, ClientConfig};
use oci_client::secrets::RegistryAuth;
pub use reference::ImageRef;
pub use reference::ParseError as ReferenceParseError;
use store::Store;

/// Result type for jcontainer-oci operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from OCI image operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The image reference string could not be parsed.
    #[error("invalid image reference: {0}")]
    InvalidReference(#[from] ReferenceParseError),

    /// Non-200 response or malformed JSON from the registry.
    #[error("registry error: {0}")]
    Registry(String),

    /// Tar or gzip stream was corrupt or truncated.
    #[error("layer extraction failed: {0}")]
    Extract(String),

    /// Filesystem I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for initializing [`Oci`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct OciConfig {
    /// Root directory for the image cache. Defaults to `$HOME/.jcontainer/cache`.
    pub cache_root: PathBuf,
}

impl Default for OciConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
        }
    }
}

/// Result of a successful pull or cache hit.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct PullResult {
    /// The resolved image reference.
    pub reference: ImageRef,
    /// Path to the extracted rootfs directory.
    pub rootfs: PathBuf,
}

/// OCI image manager: resolves an image reference to a ready rootfs,
/// downloading and caching it on first use.
#[derive(Debug, Clone)]
pub struct Oci {
    store: Store,
    client: Client,
    auth: RegistryAuth,
}

impl Oci {
    /// Opens the image cache with default configuration (`$HOME/.jcontainer/cache`).
    pub fn open() -> Self {
        Self::open_with(OciConfig::default())
    }

    /// Opens the image cache with explicit configuration.
    #[must_use]
    pub fn open_with(config: OciConfig) -> Self {
        Self {
            store: Store::new(config.cache_root),
            client: Client::new(ClientConfig::default()),
            auth: RegistryAuth::Anonymous,
        }
    }

    /// Opens the image cache rooted at a specific directory.
    #[must_use]
    pub fn open_at(cache_root: PathBuf) -> Self {
        Self::open_with(OciConfig { cache_root })
    }

    /// Returns a cached [`PullResult`] if the image is already fully
    /// extracted, otherwise pulls it. This is the entry point `run --image`
    /// should use — instant on a cache hit.
    pub fn ensure(&self, image: &str, on_status: impl Fn(&str)) -> Result<PullResult> {
        let reference = ImageRef::parse(image)?;
        if self.store.is_complete(&reference) {
            return Ok(PullResult {
                rootfs: self.store.rootfs_dir(&reference),
                reference,
            });
        }
        self.pull_parsed(reference, on_status)
    }

    /// Pulls an image from its registry, caches layers, and extracts rootfs.
    ///
    /// Follows the cache contract precisely: a stale partial tree from an
    /// interrupted previous attempt is discarded before the pull starts, and
    /// the `.complete` sentinel is only written after every layer has been
    /// extracted.
    pub fn pull(&self, image: &str, on_status: impl Fn(&str)) -> Result<PullResult> {
        let reference = ImageRef::parse(image)?;
        self.pull_parsed(reference, on_status)
    }

    fn pull_parsed(&self, reference: ImageRef, on_status: impl Fn(&str)) -> Result<PullResult> {
        if self.store.is_complete(&reference) {
            return Ok(PullResult {
                rootfs: self.store.rootfs_dir(&reference),
                reference,
            });
        }

        self.store.clear_partial(&reference)?;
        self.store.prepare(&reference)?;

        on_status(&format!("pulling {reference}"));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Registry(format!("starting registry runtime: {e}")))?;
        let rootfs = self.store.rootfs_dir(&reference);
        runtime.block_on(self.pull_layers(&reference, &rootfs, &on_status))?;

        self.store.finish(&reference)?;
        on_status("done");

        Ok(PullResult { reference, rootfs })
    }

    /// Resolves the manifest and downloads, extracts, and discards each
    /// layer in order. Runs on the private runtime built in [`Self::pull_parsed`].
    async fn pull_layers(&self, reference: &ImageRef, rootfs: &Path, on_status: &impl Fn(&str)) -> Result<()> {
        let (client_ref, manifest) = registry::fetch_manifest(&self.client, &self.auth, reference, on_status).await?;

        let layer_count = manifest.layers.len();
        for (i, layer) in manifest.layers.iter().enumerate() {
            on_status(&format!("layer {}/{layer_count} ({})", i + 1, layer.digest));
            let download_path = self.store.layer_download_path(reference, &layer.digest);
            registry::fetch_blob(&self.client, &client_ref, layer, &download_path).await?;

            let rootfs = rootfs.to_path_buf();
            let download_path_owned = download_path.clone();
            tokio::task::spawn_blocking(move || extract::extract_layer(&download_path_owned, &rootfs))
                .await
                .map_err(|e| Error::Extract(format!("extraction task panicked: {e}")))?
                .map_err(|e| Error::Extract(e.to_string()))?;

            std::fs::remove_file(&download_path)?;
        }
        Ok(())
    }
}

/// Returns `$HOME/.jcontainer/cache`.
/// Deliberately reads `$HOME` directly rather than a platform-data-dir
/// crate: this contract is a literal path, not a platform convention.
fn default_cache_root() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    PathBuf::from(home).join(".jcontainer").join("cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_root_is_home_relative() {
        let saved = std::env::var("HOME").ok();
        // SAFETY: test runs single-threaded within this process's test harness slot.
        unsafe {
            std::env::set_var("HOME", "/tmp/jcontainer-home-test");
        }
        let root = default_cache_root();
        assert_eq!(root, PathBuf::from("/tmp/jcontainer-home-test/.jcontainer/cache"));
        unsafe {
            match saved {
                Some(v) => std::env::set_var("HOME", v),
                None => std::env::remove_var("HOME"),
            }
        }
    }
}
