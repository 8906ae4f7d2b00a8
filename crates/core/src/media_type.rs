//! Media type constants and classification.

/// OCI image manifest.
pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index.
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Docker image manifest, schema 2.
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker manifest list.
pub const DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI image configuration.
pub const OCI_IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

/// Docker image configuration.
pub const DOCKER_IMAGE_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

/// OCI layer, gzip-compressed tar.
pub const OCI_IMAGE_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Docker layer, gzip-compressed tar.
pub const DOCKER_IMAGE_LAYER_GZIP: &str =
    "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Prefix identifying foreign layers. Their bytes are hosted elsewhere and
/// must never be transferred.
pub const FOREIGN_LAYER_PREFIX: &str = "application/vnd.docker.image.rootfs.foreign.diff.";

/// Whether a media type denotes a manifest (a node whose body enumerates
/// successor descriptors). Everything else is a leaf blob.
pub fn is_manifest(media_type: &str) -> bool {
    matches!(
        media_type,
        OCI_IMAGE_MANIFEST | OCI_IMAGE_INDEX | DOCKER_MANIFEST | DOCKER_MANIFEST_LIST
    )
}

/// Whether a media type denotes an index (a manifest whose successors are
/// themselves manifests).
pub fn is_index(media_type: &str) -> bool {
    matches!(media_type, OCI_IMAGE_INDEX | DOCKER_MANIFEST_LIST)
}

/// Whether a media type denotes a foreign layer.
pub fn is_foreign_layer(media_type: &str) -> bool {
    media_type.starts_with(FOREIGN_LAYER_PREFIX)
}
