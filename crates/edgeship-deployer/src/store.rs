//! Object store backends.

use async_trait::async_trait;
use bytes::Bytes;
use edgeship_core::artifact::validate_key;
use edgeship_core::store::{ObjectStore, StoredObject};
use edgeship_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::deploy::content_type_for;

/// In-memory bucket, for local runs and tests.
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Copy of every object's content, keyed by object key.
    pub async fn snapshot(&self) -> BTreeMap<String, Bytes> {
        self.objects
            .read()
            .await
            .iter()
            .map(|(k, o)| (k.clone(), o.data.clone()))
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        validate_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                key: key.to_string(),
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.objects.read().await.keys().cloned().collect())
    }
}

/// Bucket stored as a directory tree, one file per object.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written object.
///
/// Key limits that follow from the directory layout:
/// - a key cannot also be a prefix of another key, so `a` and `a/b` cannot
///   both exist; the second `put` fails with an I/O error.
/// - a final segment of the form `.<name>.partial` is reserved for staged
///   writes and never appears in `list`.
pub struct FsObjectStore {
    bucket: String,
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(bucket: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, part| p.join(part)))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| Error::Internal(format!("object path for '{}' has no parent", key)))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = parent.join(format!(".{}.partial", file_name));
        tokio::fs::write(&staging, &data).await?;
        tokio::fs::rename(&staging, &path).await?;

        debug!(bucket = %self.bucket, key = %key, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(StoredObject {
                key: key.to_string(),
                data: Bytes::from(data),
                content_type: content_type_for(key).to_string(),
            })),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(None)
            }
            // A directory at this key is not an object.
            Err(_) if path.is_dir() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            if root.is_dir() {
                walk(&root, "", &mut keys)?;
            }
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(|e| Error::Internal(format!("list task failed: {}", e)))?
    }
}

fn walk(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".partial") && name.starts_with('.') {
            continue;
        }
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), &key, keys)?;
        } else if file_type.is_file() {
            keys.push(key);
        }
    }
    Ok(())
}
