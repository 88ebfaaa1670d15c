//! Static website hosting rules for an object store.

use bytes::Bytes;
use edgeship_core::{Error, Result};
use edgeship_core::store::{ObjectStore, WebsiteConfig};

/// A response chosen by the website rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedObject {
    /// HTTP status: 200 or 404.
    pub status: u16,
    /// Key of the object served, if any.
    pub key: Option<String>,
    pub body: Bytes,
    pub content_type: String,
}

impl ServedObject {
    fn not_found() -> Self {
        Self {
            status: 404,
            key: None,
            body: Bytes::from_static(b"Not Found"),
            content_type: "text/plain; charset=utf-8".to_string(),
        }
    }
}

/// Resolve a request path against the store.
///
/// The root and any path ending in `/` serve that directory's index
/// document. A path naming a directory without the trailing slash also
/// serves its index. Anything else that is missing serves the error
/// document with a 404, or a bare 404 when no error document exists.
pub async fn serve(store: &dyn ObjectStore, website: &WebsiteConfig, path: &str) -> Result<ServedObject> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let relative = path.trim_start_matches('/');

    let candidates = if relative.is_empty() {
        vec![website.index_document.clone()]
    } else if relative.ends_with('/') {
        vec![format!("{}{}", relative, website.index_document)]
    } else {
        vec![
            relative.to_string(),
            format!("{}/{}", relative, website.index_document),
        ]
    };

    for key in candidates {
        match store.get(&key).await {
            Ok(Some(obj)) => {
                return Ok(ServedObject {
                    status: 200,
                    key: Some(obj.key),
                    body: obj.data,
                    content_type: obj.content_type,
                });
            }
            // Malformed keys (e.g., "..") are treated as absent.
            Ok(None) | Err(Error::Artifact(_)) => {}
            Err(e) => return Err(e),
        }
    }

    match store.get(&website.error_document).await? {
        Some(obj) => Ok(ServedObject {
            status: 404,
            key: Some(obj.key),
            body: obj.data,
            content_type: obj.content_type,
        }),
        None => Ok(ServedObject::not_found()),
    }
}
