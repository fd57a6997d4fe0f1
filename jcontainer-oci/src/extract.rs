//! Applies gzipped tar layers onto a rootfs with OCI whiteout semantics.
//!
//! Ordering within one layer follows tar order; layers are applied in
//! manifest order (index 0 first) by the caller, one [`extract_layer`] call
//! per layer. Whiteouts are authoritative at the instant they are processed
//! and do not retroactively affect later layers.

use std::fs::{self, File};
use std::io::{Read, Result};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

/// Extracts a single gzipped tar layer onto `rootfs`.
pub fn extract_layer(layer_path: &Path, rootfs: &Path) -> Result<()> {
    let file = File::open(layer_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_name = entry.path()?.to_string_lossy().into_owned();
        let Some(name) = normalize_name(&raw_name) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let Some(target) = safe_join(rootfs, &name) else {
            // Path-traversal defense: silently skip.
            continue;
        };

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();

        if file_name == ".wh..wh..opq" {
            empty_dir(&parent)?;
            continue;
        }
        if let Some(victim) = file_name.strip_prefix(".wh.") {
            remove_entry(&parent.join(victim))?;
            continue;
        }

        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                apply_mode(&target, entry.header().mode().unwrap_or(0o755));
            }
            EntryType::Symlink => {
                let link_target = entry
                    .link_name()?
                    .map(|p| p.to_path_buf())
                    .unwrap_or_default();
                remove_entry(&target)?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(&link_target, &target)?;
                #[cfg(not(unix))]
                let _ = link_target;
            }
            EntryType::Link => {
                let Some(link_name) = entry.link_name()? else {
                    continue;
                };
                let Some(source) = safe_join(rootfs, &link_name.to_string_lossy()) else {
                    continue;
                };
                if source.exists() {
                    remove_entry(&target)?;
                    fs::hard_link(&source, &target)?;
                }
            }
            EntryType::Regular | EntryType::Continuous => {
                remove_entry(&target)?;
                let mode = entry.header().mode().unwrap_or(0o644);
                let mut out = File::create(&target)?;
                std::io::copy(&mut entry, &mut out)?;
                apply_mode(&target, mode);
            }
            _ => {
                // Device nodes, FIFOs, etc. are not modeled; skip.
            }
        }
    }
    Ok(())
}

/// Strips a leading `./`, skips empty names and the literal `.`.
fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.strip_prefix("./").unwrap_or(name);
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    Some(trimmed.to_owned())
}

/// Joins `name` onto `rootfs`, rejecting any path that escapes `rootfs`.
fn safe_join(rootfs: &Path, name: &str) -> Option<PathBuf> {
    let mut result = rootfs.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() || !result.starts_with(rootfs) {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if result.starts_with(rootfs) {
        Some(result)
    } else {
        None
    }
}

/// Deletes every child of `dir`, recursively, leaving `dir` itself in place.
fn empty_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        remove_entry(&entry.path())?;
    }
    Ok(())
}

/// Removes a file, symlink, or directory tree if it exists.
fn remove_entry(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Translates a tar mode's low 9 bits into POSIX permissions. Best-effort:
/// failure on non-POSIX hosts is ignored.
fn apply_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777));
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tar::{Builder, Header};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "jcontainer-extract-test-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn build_layer(path: &Path, entries: impl FnOnce(&mut Builder<Vec<u8>>)) {
        let mut builder = Builder::new(Vec::new());
        entries(&mut builder);
        let data = builder.into_inner().unwrap();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&data).unwrap();
        let gz = encoder.finish().unwrap();
        fs::write(path, gz).unwrap();
    }

    fn add_file(builder: &mut Builder<Vec<u8>>, name: &str, mode: u32, content: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append(&header, content).unwrap();
    }

    #[test]
    fn simple_extraction() {
        let rootfs = temp_dir("simple");
        let layer = rootfs.with_extension("tar.gz");
        build_layer(&layer, |b| add_file(b, "hello.txt", 0o644, b"Hello, World!"));
        extract_layer(&layer, &rootfs).unwrap();
        let content = fs::read_to_string(rootfs.join("hello.txt")).unwrap();
        assert_eq!(content, "Hello, World!");
    }

    #[test]
    fn whiteout_deletes_sibling() {
        let rootfs = temp_dir("whiteout");
        fs::write(rootfs.join("deleteme.txt"), b"x").unwrap();
        let layer = rootfs.with_extension("tar.gz");
        build_layer(&layer, |b| add_file(b, ".wh.deleteme.txt", 0o644, b""));
        extract_layer(&layer, &rootfs).unwrap();
        assert!(!rootfs.join("deleteme.txt").exists());
    }

    #[test]
    fn opaque_whiteout_empties_directory() {
        let rootfs = temp_dir("opaque");
        fs::create_dir_all(rootfs.join("etc")).unwrap();
        fs::write(rootfs.join("etc/old.conf"), b"x").unwrap();
        fs::write(rootfs.join("etc/other.conf"), b"y").unwrap();
        let layer = rootfs.with_extension("tar.gz");
        build_layer(&layer, |b| add_file(b, "etc/.wh..wh..opq", 0o644, b""));
        extract_layer(&layer, &rootfs).unwrap();
        assert!(rootfs.join("etc").is_dir());
        assert_eq!(fs::read_dir(rootfs.join("etc")).unwrap().count(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn permission_mapping() {
        use std::os::unix::fs::PermissionsExt;
        let rootfs = temp_dir("perms");
        let layer = rootfs.with_extension("tar.gz");
        build_layer(&layer, |b| add_file(b, "script.sh", 0o755, b"#!/bin/sh\n"));
        extract_layer(&layer, &rootfs).unwrap();
        let mode = fs::metadata(rootfs.join("script.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn path_traversal_is_skipped() {
        let rootfs = temp_dir("traversal");
        let layer = rootfs.with_extension("tar.gz");
        build_layer(&layer, |b| add_file(b, "../escape.txt", 0o644, b"bad"));
        extract_layer(&layer, &rootfs).unwrap();
        assert!(!rootfs.parent().unwrap().join("escape.txt").exists());
    }
}
