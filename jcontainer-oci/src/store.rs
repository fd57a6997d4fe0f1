//! On-disk image cache layout and the atomic operations over it.
//!
//! ```text
//! {cache_root}/{namespace}/{image}/
//!   layers/            — scratch space for in-flight layer downloads,
//!                         removed once extraction finishes
//!   {tag}/
//!     rootfs/           — extracted, flattened root filesystem
//!     .complete         — zero-byte marker; its presence is the only
//!                         signal that `rootfs/` is valid
//! ```
//!
//! The cache key is `(namespace, image, tag)` — the registry host is not
//! part of it, so two registries serving the same namespace/image/tag share
//! a cache slot.

use std::fs;
use std::path::PathBuf;

use crate::reference::ImageRef;
use crate::Result;

/// On-disk image cache rooted at a configurable directory.
#[derive(Debug, Clone)]
pub struct Store {
    /// Cache root, typically `$HOME/.jcontainer/cache`.
    root: PathBuf,
}

impl Store {
    /// Binds a [`Store`] to `root` without touching the filesystem; the
    /// directory tree is created lazily as images are pulled.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `{cache_root}/{namespace}/{image}`.
    fn image_dir(&self, image: &ImageRef) -> PathBuf {
        self.root.join(&image.namespace).join(&image.image)
    }

    /// Scratch directory for in-flight layer downloads of `image`.
    pub fn layers_dir(&self, image: &ImageRef) -> PathBuf {
        self.image_dir(image).join("layers")
    }

    /// `{cache_root}/{namespace}/{image}/{tag}`.
    fn tag_dir(&self, image: &ImageRef) -> PathBuf {
        self.image_dir(image).join(&image.tag)
    }

    /// Extracted rootfs directory for `image`.
    pub fn rootfs_dir(&self, image: &ImageRef) -> PathBuf {
        self.tag_dir(image).join("rootfs")
    }

    /// Sentinel marking a finished, valid extraction.
    fn complete_marker(&self, image: &ImageRef) -> PathBuf {
        self.tag_dir(image).join(".complete")
    }

    /// `true` iff the sentinel is present and `rootfs/` is a directory.
    pub fn is_complete(&self, image: &ImageRef) -> bool {
        self.complete_marker(image).is_file() && self.rootfs_dir(image).is_dir()
    }

    /// Deletes any partial tag directory left over from an interrupted pull.
    pub fn clear_partial(&self, image: &ImageRef) -> Result<()> {
        let dir = self.tag_dir(image);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Creates `rootfs/` and the `layers/` scratch directory for a fresh pull.
    pub fn prepare(&self, image: &ImageRef) -> Result<()> {
        fs::create_dir_all(self.rootfs_dir(image))?;
        fs::create_dir_all(self.layers_dir(image))?;
        Ok(())
    }

    /// Path to a layer's temporary download file within the scratch dir.
    pub fn layer_download_path(&self, image: &ImageRef, digest: &str) -> PathBuf {
        self.layers_dir(image).join(sanitize(digest))
    }

    /// Removes the now-empty `layers/` directory and drops the `.complete`
    /// sentinel, marking the cache entry valid.
    pub fn finish(&self, image: &ImageRef) -> Result<()> {
        let layers = self.layers_dir(image);
        if layers.exists() {
            fs::remove_dir_all(&layers)?;
        }
        fs::write(self.complete_marker(image), b"")?;
        Ok(())
    }
}

/// Replaces path-hostile characters (notably `:` in digests) with `-`.
fn sanitize(s: &str) -> String {
    s.replace([':', '/'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> Store {
        let dir = std::env::temp_dir().join(format!(
            "jcontainer-store-test-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        Store::new(dir)
    }

    fn sample_ref() -> ImageRef {
        ImageRef::parse("alpine:3.19").unwrap()
    }

    #[test]
    fn cache_miss_until_complete() {
        let store = temp_store("miss");
        let image = sample_ref();
        assert!(!store.is_complete(&image));
        store.prepare(&image).unwrap();
        assert!(!store.is_complete(&image));
        store.finish(&image).unwrap();
        assert!(store.is_complete(&image));
        assert!(!store.layers_dir(&image).exists());
    }

    #[test]
    fn clear_partial_removes_tag_dir_only() {
        let store = temp_store("partial");
        let image = sample_ref();
        store.prepare(&image).unwrap();
        fs::write(store.rootfs_dir(&image).join("stub"), b"x").unwrap();
        store.clear_partial(&image).unwrap();
        assert!(!store.rootfs_dir(&image).exists());
    }

    #[test]
    fn cache_key_ignores_registry() {
        let store = temp_store("key");
        let docker_hub = ImageRef::parse("alpine:3.19").unwrap();
        let other_registry = ImageRef::parse("example.com/library/alpine:3.19").unwrap();
        assert_eq!(store.rootfs_dir(&docker_hub), store.rootfs_dir(&other_registry));
    }
}
