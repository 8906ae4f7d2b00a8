//! Graph builders for copy tests.

use bytes::Bytes;
use ferry_core::{Descriptor, Error, media_type};
use ferry_storage::{MemoryStore, Store, bytes_stream};
use serde_json::json;

/// Push a blob and return its descriptor.
pub async fn seed_blob(store: &MemoryStore, media_type: &str, data: &[u8]) -> Descriptor {
    let desc = Descriptor::from_bytes(media_type, data);
    match store
        .push(&desc, bytes_stream(Bytes::copy_from_slice(data)))
        .await
    {
        Ok(()) | Err(Error::AlreadyExists(_)) => {}
        Err(err) => panic!("unexpected push error: {err:?}"),
    }
    desc
}

/// A foreign-layer descriptor. Deliberately not present anywhere; the
/// copier must never try to fetch it.
pub fn foreign_layer(data: &[u8]) -> Descriptor {
    Descriptor::from_bytes(
        "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip",
        data,
    )
}

/// Build and push an image manifest over a config and layers.
pub async fn seed_manifest(
    store: &MemoryStore,
    config: &Descriptor,
    layers: &[Descriptor],
) -> Descriptor {
    let body = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": media_type::OCI_IMAGE_MANIFEST,
        "config": config,
        "layers": layers,
    }))
    .unwrap();
    let desc = Descriptor::from_bytes(media_type::OCI_IMAGE_MANIFEST, &body);
    store
        .push(&desc, bytes_stream(Bytes::from(body)))
        .await
        .unwrap();
    desc
}

/// Build and push an index over manifest entries.
pub async fn seed_index(store: &MemoryStore, manifests: &[Descriptor]) -> Descriptor {
    let body = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": media_type::OCI_IMAGE_INDEX,
        "manifests": manifests,
    }))
    .unwrap();
    let desc = Descriptor::from_bytes(media_type::OCI_IMAGE_INDEX, &body);
    store
        .push(&desc, bytes_stream(Bytes::from(body)))
        .await
        .unwrap();
    desc
}

/// A complete single-image graph seeded into a store.
pub struct ImageGraph {
    pub manifest: Descriptor,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// Seed a config, `layer_count` layers and the manifest referencing them.
/// `name` keeps the contents of separate images distinct.
pub async fn seed_image(store: &MemoryStore, name: &str, layer_count: usize) -> ImageGraph {
    seed_image_for(store, name, "amd64", layer_count).await
}

/// As [`seed_image`], with an explicit architecture in the config blob.
pub async fn seed_image_for(
    store: &MemoryStore,
    name: &str,
    architecture: &str,
    layer_count: usize,
) -> ImageGraph {
    let config_body = serde_json::to_vec(&json!({
        "architecture": architecture,
        "os": "linux",
        "config": {"Labels": {"image.name": name}},
        "rootfs": {"type": "layers"},
    }))
    .unwrap();
    let config = seed_blob(store, media_type::OCI_IMAGE_CONFIG, &config_body).await;

    let mut layers = Vec::new();
    for i in 0..layer_count {
        let data = format!("{name} layer {i}");
        layers.push(seed_blob(store, media_type::OCI_IMAGE_LAYER_GZIP, data.as_bytes()).await);
    }

    let manifest = seed_manifest(store, &config, &layers).await;
    ImageGraph {
        manifest,
        config,
        layers,
    }
}
