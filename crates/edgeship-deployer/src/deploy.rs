//! The deploy action: copy a build artifact into the site's object store.
//!
//! Deployment is not atomic. Existing objects with the same key are
//! overwritten, objects absent from the artifact are left in place, and
//! nothing is ever deleted. HTML documents are written after every other
//! object so that pages never reference assets that are not uploaded yet.

use edgeship_core::artifact::ArtifactTree;
use edgeship_core::store::ObjectStore;
use edgeship_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReport {
    pub bucket: String,
    /// Keys written, in write order.
    pub written: Vec<String>,
    pub bytes: u64,
}

/// Content type served for an object key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" | "md" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn is_html(key: &str) -> bool {
    content_type_for(key).starts_with("text/html")
}

/// Write every file of `tree` to `store`, HTML last.
///
/// On failure the returned [`Error::Deploy`] lists the keys that were
/// written before the failing one.
pub async fn deploy_tree(store: &dyn ObjectStore, tree: &ArtifactTree) -> Result<DeployReport> {
    let (html, assets): (Vec<_>, Vec<_>) = tree.iter().partition(|(key, _)| is_html(key));

    let mut written = Vec::with_capacity(tree.len());
    let mut bytes = 0u64;

    for (key, data) in assets.into_iter().chain(html) {
        if let Err(e) = store.put(key, data.clone(), content_type_for(key)).await {
            warn!(
                bucket = %store.bucket(),
                key = %key,
                written = written.len(),
                error = %e,
                "Deploy failed"
            );
            return Err(Error::Deploy {
                message: format!("failed to write '{}' to {}: {}", key, store.bucket(), e),
                written,
            });
        }
        written.push(key.to_string());
        bytes += data.len() as u64;
    }

    info!(
        bucket = %store.bucket(),
        objects = written.len(),
        bytes,
        "Deployed artifact"
    );

    Ok(DeployReport {
        bucket: store.bucket().to_string(),
        written,
        bytes,
    })
}
