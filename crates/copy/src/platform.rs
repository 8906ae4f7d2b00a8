//! Platform-directed root selection.

use ferry_core::{Descriptor, Error, Platform, Result};
use ferry_storage::{Fetcher, ReadOnlyStore, read_all, successors};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct ManifestEnvelope {
    config: Descriptor,
}

#[derive(Deserialize)]
struct ImageConfig {
    architecture: String,
    os: String,
    #[serde(default)]
    variant: Option<String>,
}

/// Pick the node under `root` that matches `platform`.
///
/// For an index the first entry whose platform satisfies the request wins.
/// For an image manifest the platform is read from the config blob and the
/// root itself is returned on a match. Other media types are unsupported.
pub async fn select_manifest(
    store: Arc<dyn ReadOnlyStore>,
    root: Descriptor,
    platform: &Platform,
) -> Result<Descriptor> {
    if root.is_index() {
        let nodes = successors(store.as_ref(), &root).await?;
        return nodes
            .into_iter()
            .find(|node| {
                node.platform
                    .as_ref()
                    .is_some_and(|p| p.satisfies(platform))
            })
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no manifest for platform {platform} under {}",
                    root.digest
                ))
            });
    }

    if root.is_manifest() {
        let body = read_all(store.fetch(&root).await?).await?;
        let manifest: ManifestEnvelope = serde_json::from_slice(&body)
            .map_err(|e| Error::Serialization(format!("invalid manifest body: {e}")))?;
        let config_body = read_all(store.fetch(&manifest.config).await?).await?;
        let config: ImageConfig = serde_json::from_slice(&config_body)
            .map_err(|e| Error::Serialization(format!("invalid image config: {e}")))?;

        let actual = Platform {
            architecture: config.architecture,
            os: config.os,
            os_version: None,
            os_features: None,
            variant: config.variant,
        };
        if actual.satisfies(platform) {
            return Ok(root);
        }
        return Err(Error::NotFound(format!(
            "manifest {} is {actual}, not {platform}",
            root.digest
        )));
    }

    Err(Error::Unsupported(format!(
        "platform selection over {}",
        root.media_type
    )))
}
