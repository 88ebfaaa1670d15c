//! Object store abstraction (the bucket serving the site).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

/// An object as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub data: Bytes,
    pub content_type: String,
}

/// Static website hosting rules for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteConfig {
    /// Served for requests at the site root or a directory path.
    pub index_document: String,
    /// Served with a 404 status for anything not found.
    pub error_document: String,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            index_document: "index.html".to_string(),
            error_document: "error.html".to_string(),
        }
    }
}

/// Trait for object store backends.
///
/// Objects are publicly readable; there is no per-object authorization.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Identity of the bucket, exposed to operators as an output.
    fn bucket(&self) -> &str;

    /// Write an object, overwriting any existing object with the same key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Read an object.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    /// List every key in the store, sorted.
    async fn list(&self) -> Result<Vec<String>>;
}
