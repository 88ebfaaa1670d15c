//! Artifacts passed between pipeline actions.
//!
//! An artifact is declared empty when a run starts, populated exactly once by
//! its producing action, and read-only afterwards.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use crate::{Error, Result};

/// A tree of files keyed by relative, `/`-separated path.
///
/// Keys are kept sorted so iteration and checksums are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTree {
    files: BTreeMap<String, Bytes>,
}

impl ArtifactTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, replacing any previous content under the same key.
    pub fn insert(&mut self, key: impl Into<String>, data: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;
        self.files.insert(key, data.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.files.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total payload size in bytes.
    pub fn size(&self) -> u64 {
        self.files.values().map(|b| b.len() as u64).sum()
    }

    /// Hex SHA-256 over every key and its content, in key order.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, data) in &self.files {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key.as_bytes());
            hasher.update((data.len() as u64).to_be_bytes());
            hasher.update(data);
        }
        hex::encode(hasher.finalize())
    }
}

/// Object keys must be relative, `/`-separated, and stay inside their tree.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(Error::Artifact(format!("invalid object key '{}'", key)));
    }
    Ok(())
}

/// A populated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Declared artifact name.
    pub name: String,
    /// Name of the action that produced it.
    pub producer: String,
    /// File content.
    pub tree: ArtifactTree,
    /// Small, deterministic key/value facts (e.g., source revision).
    pub metadata: BTreeMap<String, String>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, producer: impl Into<String>, tree: ArtifactTree) -> Self {
        Self {
            name: name.into(),
            producer: producer.into(),
            tree,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Per-run set of artifact slots.
///
/// Every declared slot starts empty. Concurrent actions may read populated
/// slots; each slot accepts exactly one write.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    slots: HashMap<String, OnceLock<Arc<Artifact>>>,
}

impl ArtifactRegistry {
    pub fn declare<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            slots: names
                .into_iter()
                .map(|n| (n.to_string(), OnceLock::new()))
                .collect(),
        }
    }

    /// Publish an artifact into its declared slot.
    pub fn populate(&self, artifact: Artifact) -> Result<Arc<Artifact>> {
        let slot = self
            .slots
            .get(&artifact.name)
            .ok_or_else(|| Error::Artifact(format!("artifact '{}' was never declared", artifact.name)))?;

        let name = artifact.name.clone();
        let artifact = Arc::new(artifact);
        slot.set(artifact.clone())
            .map_err(|_| Error::Artifact(format!("artifact '{}' is already populated", name)))?;
        Ok(artifact)
    }

    /// Read a populated artifact.
    pub fn get(&self, name: &str) -> Result<Arc<Artifact>> {
        self.slots
            .get(name)
            .ok_or_else(|| Error::Artifact(format!("artifact '{}' was never declared", name)))?
            .get()
            .cloned()
            .ok_or_else(|| Error::Artifact(format!("artifact '{}' is not populated yet", name)))
    }
}
