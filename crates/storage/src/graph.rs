//! Successor discovery for manifest bodies.
//!
//! Manifest and index bodies enumerate the descriptors they reference.
//! Non-manifest media types have no successors and are never fetched.

use crate::traits::{Fetcher, read_all};
use ferry_core::{Descriptor, Error, Result};
use serde::Deserialize;

#[derive(Deserialize)]
struct ImageManifest {
    config: Descriptor,
    #[serde(default)]
    layers: Vec<Descriptor>,
    #[serde(default)]
    subject: Option<Descriptor>,
}

#[derive(Deserialize)]
struct ImageIndex {
    manifests: Vec<Descriptor>,
}

/// Find the successors of a node, fetching its body through `fetcher` when
/// the node is a manifest. Leaves produce an empty list without any fetch.
pub async fn successors<F: Fetcher + ?Sized>(
    fetcher: &F,
    desc: &Descriptor,
) -> Result<Vec<Descriptor>> {
    if !desc.is_manifest() {
        return Ok(Vec::new());
    }
    let body = read_all(fetcher.fetch(desc).await?).await?;
    parse_successors(desc, &body)
}

/// Parse the successors out of a body already in hand.
///
/// For an index: the manifests, in order. For an image manifest: the config,
/// the layers in order, then the subject when present. Anything else: empty.
pub fn parse_successors(desc: &Descriptor, body: &[u8]) -> Result<Vec<Descriptor>> {
    if desc.is_index() {
        let index: ImageIndex = serde_json::from_slice(body)
            .map_err(|e| Error::Serialization(format!("invalid index body: {e}")))?;
        Ok(index.manifests)
    } else if desc.is_manifest() {
        let manifest: ImageManifest = serde_json::from_slice(body)
            .map_err(|e| Error::Serialization(format!("invalid manifest body: {e}")))?;
        let mut nodes = Vec::with_capacity(manifest.layers.len() + 2);
        nodes.push(manifest.config);
        nodes.extend(manifest.layers);
        if let Some(subject) = manifest.subject {
            nodes.push(subject);
        }
        Ok(nodes)
    } else {
        Ok(Vec::new())
    }
}
