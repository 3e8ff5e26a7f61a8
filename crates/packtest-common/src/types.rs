//! Domain primitive types used across the packtest workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to a container image (a tag or digest understood by the engine).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Creates an image reference from a string value.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Generates a collision-free, lowercase image tag.
    ///
    /// The result has the form `<prefix>-<slug>-<8 hex chars>` where `slug`
    /// is `label` reduced to characters allowed in a repository name.
    #[must_use]
    pub fn unique(prefix: &str, label: &str) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let slug = slugify(label);
        if slug.is_empty() {
            Self(format!("{prefix}-{}", &suffix[..8]))
        } else {
            Self(format!("{prefix}-{slug}-{}", &suffix[..8]))
        }
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a running (or exited) container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Repository names only allow [a-z0-9] separated by single '-'.
fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        let _ = slug.pop();
    }
    slug.truncate(40);
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_tags_differ() {
        let a = ImageRef::unique("packtest-app", "yarn_lock");
        let b = ImageRef::unique("packtest-app", "yarn_lock");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("packtest-app-yarn-lock-"), "{a}");
    }

    #[test]
    fn unique_tag_sanitizes_label() {
        let image = ImageRef::unique("packtest-app", "node_modules/.bin Custom Entrypoint");
        let tag = image.as_str();
        assert!(tag.starts_with("packtest-app-node-modules-bin-custom-entrypoint-"), "{tag}");
        assert!(tag.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn unique_tag_with_empty_label() {
        let image = ImageRef::unique("packtest-builder", "");
        assert_eq!(image.as_str().len(), "packtest-builder-".len() + 8);
    }

    #[test]
    fn container_id_display() {
        assert_eq!(ContainerId::new("abc123").to_string(), "abc123");
    }

    #[test]
    fn image_ref_serializes_as_plain_string() {
        let json = serde_json::to_string(&ImageRef::new("gcr.io/run:latest")).unwrap();
        assert_eq!(json, "\"gcr.io/run:latest\"");
    }
}
