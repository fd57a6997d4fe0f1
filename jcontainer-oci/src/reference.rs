//! Parses textual image references into `(registry, namespace, image, tag)`.

use std::fmt;

/// Default registry hostname used when a reference omits one.
const DEFAULT_REGISTRY: &str = "docker.io";
/// Default namespace used when a reference omits one.
const DEFAULT_NAMESPACE: &str = "library";
/// Default tag used when a reference omits one.
const DEFAULT_TAG: &str = "latest";

/// A parsed OCI image reference.
///
/// Parsing rule: the rightmost `:` is a tag separator iff no `/` follows it.
/// The leading path segment is a registry iff it contains `.` or `:`;
/// otherwise it is (the start of) the namespace. Intermediate namespace
/// segments are joined with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry host, optionally with a port (e.g. `ghcr.io`, `localhost:5000`).
    pub registry: String,
    /// Namespace, possibly multiple `/`-joined segments (e.g. `org/sub`).
    pub namespace: String,
    /// Image name. Always non-empty.
    pub image: String,
    /// Tag.
    pub tag: String,
}

/// Error returned when an image reference string cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid image reference: {0}")]
pub struct ParseError(String);

impl ImageRef {
    /// Parses a textual image reference per the rules documented on [`ImageRef`].
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() {
            return Err(ParseError("empty reference".to_owned()));
        }

        let (rest, tag) = split_tag(s);

        let parts: Vec<&str> = rest.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(ParseError(s.to_owned()));
        }

        let (registry, name_parts): (String, &[&str]) = if parts.len() > 1
            && (parts[0].contains('.') || parts[0].contains(':'))
        {
            (parts[0].to_owned(), &parts[1..])
        } else {
            (DEFAULT_REGISTRY.to_owned(), &parts[..])
        };

        if name_parts.is_empty() {
            return Err(ParseError(s.to_owned()));
        }

        let image = (*name_parts.last().expect("non-empty")).to_owned();
        if image.is_empty() {
            return Err(ParseError(s.to_owned()));
        }

        let namespace = if name_parts.len() > 1 {
            name_parts[..name_parts.len() - 1].join("/")
        } else {
            DEFAULT_NAMESPACE.to_owned()
        };

        Ok(Self {
            registry,
            namespace,
            image,
            tag: tag.unwrap_or_else(|| DEFAULT_TAG.to_owned()),
        })
    }

    /// The `<namespace>/<image>` repository path used in registry URLs.
    #[must_use]
    pub fn repository(&self) -> String {
        format!("{}/{}", self.namespace, self.image)
    }

    /// Canonical `registry/namespace/image:tag` form. Round-trips through
    /// [`ImageRef::parse`] to an equivalent reference.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!(
            "{}/{}/{}:{}",
            self.registry, self.namespace, self.image, self.tag
        )
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Splits a trailing `:tag` off a reference string, per the rightmost-colon
/// rule. Returns `(rest, Some(tag))` or `(s, None)` if no tag is present.
fn split_tag(s: &str) -> (&str, Option<String>) {
    match s.rfind(':') {
        Some(idx) if !s[idx + 1..].contains('/') && !s[idx + 1..].is_empty() => {
            (&s[..idx], Some(s[idx + 1..].to_owned()))
        }
        _ => (s, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let r = ImageRef::parse("ubuntu").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.namespace, "library");
        assert_eq!(r.image, "ubuntu");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn tag_suffix() {
        let r = ImageRef::parse("ubuntu:20.04").unwrap();
        assert_eq!(r.image, "ubuntu");
        assert_eq!(r.tag, "20.04");
    }

    #[test]
    fn deep_namespace_with_registry() {
        let r = ImageRef::parse("ghcr.io/org/sub/myimage:v3").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.namespace, "org/sub");
        assert_eq!(r.image, "myimage");
        assert_eq!(r.tag, "v3");
    }

    #[test]
    fn namespace_without_registry() {
        let r = ImageRef::parse("myuser/myimage").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.namespace, "myuser");
        assert_eq!(r.image, "myimage");
    }

    #[test]
    fn registry_with_port_not_mistaken_for_tag() {
        let r = ImageRef::parse("localhost:5000/myimage").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.namespace, "library");
        assert_eq!(r.image, "myimage");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn full_name_round_trips() {
        for s in [
            "ubuntu",
            "ubuntu:20.04",
            "ghcr.io/org/sub/myimage:v3",
            "myuser/myimage",
            "localhost:5000/myimage:edge",
        ] {
            let r = ImageRef::parse(s).unwrap();
            let r2 = ImageRef::parse(&r.full_name()).unwrap();
            assert_eq!(r, r2, "round trip failed for {s}");
        }
    }

    #[test]
    fn empty_image_is_rejected() {
        assert!(ImageRef::parse("").is_err());
    }
}
