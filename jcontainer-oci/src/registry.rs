//! OCI registry client: manifest resolution and blob download, via
//! `oci_client`'s `Client` rather than hand-rolled HTTP and JSON — the same
//! purpose-built registry crate used elsewhere in this workspace's lineage
//! for exactly this concern (token auth, manifest/index resolution, blob
//! streaming).

use std::path::Path;

use oci_client::client::Client;
use oci_client::manifest::{OciDescriptor, OciImageManifest, OciManifest};
use oci_client::secrets::RegistryAuth;
use oci_client::Reference;

use crate::reference::ImageRef;
use crate::{Error, Result};

/// Builds the `oci_client::Reference` for `image`, parsed from its own
/// canonical `full_name()` string so registry/namespace/image/tag stay in
/// lockstep with this crate's own parsing rules.
fn to_client_reference(image: &ImageRef) -> Result<Reference> {
    image
        .full_name()
        .parse()
        .map_err(|e: oci_client::ParseError| Error::Registry(format!("building registry reference: {e}")))
}

/// Resolves `image`'s manifest, following a multi-platform index one level
/// deep: selects `(os=linux, arch=current)` with `amd64`≡`x86_64`/
/// `arm64`≡`aarch64` normalization, or falls back to the first entry with a
/// warning if nothing matches. Returns the reference actually pulled (the
/// original tag reference, reused for subsequent blob pulls) alongside the
/// resolved single-platform manifest.
pub async fn fetch_manifest(
    client: &Client,
    auth: &RegistryAuth,
    image: &ImageRef,
    on_status: &dyn Fn(&str),
) -> Result<(Reference, OciImageManifest)> {
    let reference = to_client_reference(image)?;

    match pull_manifest(client, auth, &reference).await? {
        OciManifest::Image(manifest) => Ok((reference, manifest)),
        OciManifest::ImageIndex(index) => {
            let digest = select_platform(&index.manifests).unwrap_or_else(|| {
                on_status("no matching platform in manifest index, using first entry");
                index.manifests[0].digest.clone()
            });
            let by_digest = format!("{}/{}@{digest}", image.registry, image.repository());
            let digest_ref: Reference = by_digest
                .parse()
                .map_err(|e: oci_client::ParseError| Error::Registry(format!("building digest reference: {e}")))?;
            match pull_manifest(client, auth, &digest_ref).await? {
                OciManifest::Image(manifest) => Ok((reference, manifest)),
                OciManifest::ImageIndex(_) => Err(Error::Registry("nested manifest index".to_owned())),
            }
        }
    }
}

async fn pull_manifest(client: &Client, auth: &RegistryAuth, reference: &Reference) -> Result<OciManifest> {
    client
        .pull_manifest(reference, auth)
        .await
        .map(|(manifest, _digest)| manifest)
        .map_err(|e| Error::Registry(e.to_string()))
}

/// Selects the manifest digest matching `(os=linux, arch=current)`.
fn select_platform(entries: &[OciDescriptor]) -> Option<String> {
    let current = normalize_arch(std::env::consts::ARCH);
    entries
        .iter()
        .find(|e| {
            e.platform
                .as_ref()
                .is_some_and(|p| p.os == "linux" && normalize_arch(&p.architecture) == current)
        })
        .map(|e| e.digest.clone())
}

/// Normalizes architecture aliases: `amd64`≡`x86_64`, `arm64`≡`aarch64`.
fn normalize_arch(arch: &str) -> &str {
    match arch {
        "amd64" | "x86_64" => "x86_64",
        "arm64" | "aarch64" => "aarch64",
        other => other,
    }
}

/// Streams a blob (layer or config) described by `layer` into a fresh file
/// at `dest`. `reference` must be the same reference the owning manifest was
/// pulled through, so `client` can reuse its cached bearer token.
pub async fn fetch_blob(client: &Client, reference: &Reference, layer: &OciDescriptor, dest: &Path) -> Result<()> {
    let mut file = tokio::fs::File::create(dest).await?;
    client
        .pull_blob(reference, layer, &mut file)
        .await
        .map_err(|e| Error::Registry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use oci_client::manifest::Platform;

    use super::*;

    fn descriptor(digest: &str, os: &str, architecture: &str) -> OciDescriptor {
        OciDescriptor {
            media_type: "application/vnd.oci.image.manifest.v1+json".to_owned(),
            digest: digest.to_owned(),
            size: 0,
            urls: None,
            annotations: None,
            platform: Some(Platform {
                architecture: architecture.to_owned(),
                os: os.to_owned(),
                os_version: None,
                os_features: None,
                variant: None,
                features: None,
            }),
        }
    }

    #[test]
    fn arch_normalization() {
        assert_eq!(normalize_arch("amd64"), normalize_arch("x86_64"));
        assert_eq!(normalize_arch("arm64"), normalize_arch("aarch64"));
    }

    #[test]
    fn selects_matching_platform() {
        let entries = vec![
            descriptor("sha256:aaa", "windows", "amd64"),
            descriptor("sha256:bbb", "linux", "arm64"),
        ];
        if normalize_arch(std::env::consts::ARCH) == "aarch64" {
            assert_eq!(select_platform(&entries).as_deref(), Some("sha256:bbb"));
        }
    }

    #[test]
    fn falls_back_to_none_when_nothing_matches_unrelated_arch() {
        let entries = vec![descriptor("sha256:aaa", "windows", "amd64")];
        if normalize_arch(std::env::consts::ARCH) != "x86_64" {
            assert_eq!(select_platform(&entries), None);
        }
    }
}
