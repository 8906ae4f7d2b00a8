//! Descriptors and platform metadata.
//!
//! A descriptor identifies one node of a content-addressed DAG. Two
//! descriptors are equal iff their digest and size are equal; the media type
//! classifies the node but carries no identity.

use crate::digest::Digest;
use crate::media_type;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A (media-type, digest, size) content descriptor.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,

    /// Digest of the referenced content.
    pub digest: Digest,

    /// Size of the referenced content in bytes.
    pub size: u64,

    /// Platform requirements, present on index entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    /// Create a descriptor from its parts.
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            platform: None,
        }
    }

    /// Create a descriptor for a byte slice, computing its digest and size.
    pub fn from_bytes(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::new(media_type, Digest::compute(data), data.len() as u64)
    }

    /// Attach platform metadata.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Whether this descriptor is a manifest (non-leaf node).
    pub fn is_manifest(&self) -> bool {
        media_type::is_manifest(&self.media_type)
    }

    /// Whether this descriptor is an index manifest.
    pub fn is_index(&self) -> bool {
        media_type::is_index(&self.media_type)
    }

    /// Whether this descriptor is a foreign layer, which is never
    /// transferred.
    pub fn is_foreign_layer(&self) -> bool {
        media_type::is_foreign_layer(&self.media_type)
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.size == other.size
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
        self.size.hash(state);
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("media_type", &self.media_type)
            .field("digest", &self.digest)
            .field("size", &self.size)
            .finish()
    }
}

/// Platform requirements of a piece of content, as found on index entries
/// and in image configurations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, e.g. `amd64`.
    pub architecture: String,

    /// Operating system, e.g. `linux`.
    pub os: String,

    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    #[serde(rename = "os.features", default, skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,

    /// Architecture variant, e.g. `v8`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// Create a platform from os and architecture.
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            os_version: None,
            os_features: None,
            variant: None,
        }
    }

    /// Set the architecture variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Whether this platform satisfies a requested one. Architecture and os
    /// must match exactly; version and variant only when the request names
    /// them; requested os features must be a subset of ours.
    pub fn satisfies(&self, requested: &Platform) -> bool {
        if self.architecture != requested.architecture || self.os != requested.os {
            return false;
        }
        if let Some(version) = &requested.os_version
            && self.os_version.as_ref() != Some(version)
        {
            return false;
        }
        if let Some(variant) = &requested.variant
            && self.variant.as_ref() != Some(variant)
        {
            return false;
        }
        if let Some(features) = &requested.os_features {
            let ours = self.os_features.as_deref().unwrap_or_default();
            if !features.iter().all(|f| ours.contains(f)) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}
