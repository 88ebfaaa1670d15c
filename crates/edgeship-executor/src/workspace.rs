//! Moving artifact trees to and from directories on disk.

use edgeship_core::artifact::ArtifactTree;
use edgeship_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Directory names never collected into an artifact.
const SKIPPED_DIRS: &[&str] = &[".git"];

/// Materialise `tree` under `dir`.
pub async fn write_tree(dir: &Path, tree: &ArtifactTree) -> Result<()> {
    let dir = dir.to_path_buf();
    let tree = tree.clone();
    tokio::task::spawn_blocking(move || write_tree_blocking(&dir, &tree))
        .await
        .map_err(|e| Error::Internal(format!("write task failed: {}", e)))?
}

/// Collect every regular file under `dir` into a tree.
///
/// Symlinks and `.git` directories are skipped.
pub async fn read_tree(dir: &Path) -> Result<ArtifactTree> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || read_tree_blocking(&dir))
        .await
        .map_err(|e| Error::Internal(format!("read task failed: {}", e)))?
}

fn write_tree_blocking(dir: &Path, tree: &ArtifactTree) -> Result<()> {
    for (key, data) in tree.iter() {
        let path = dir.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, data)?;
    }
    Ok(())
}

fn read_tree_blocking(root: &Path) -> Result<ArtifactTree> {
    let mut tree = ArtifactTree::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                let skipped = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                if !skipped {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                tree.insert(object_key(root, &path)?, std::fs::read(&path)?)?;
            }
        }
    }

    Ok(tree)
}

fn object_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::Internal(format!("{} is outside {}", path.display(), root.display())))?;

    let parts: Option<Vec<&str>> = relative.iter().map(|p| p.to_str()).collect();
    parts
        .map(|p| p.join("/"))
        .ok_or_else(|| Error::Artifact(format!("non UTF-8 path: {}", relative.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_skips_git_dir() {
        let dir = tempfile::tempdir().unwrap();

        let mut tree = ArtifactTree::new();
        tree.insert("index.html", "<h1>docs</h1>").unwrap();
        tree.insert("assets/css/site.css", "body{}").unwrap();
        write_tree(dir.path(), &tree).await.unwrap();

        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "[remote]").unwrap();

        let read = read_tree(dir.path()).await.unwrap();
        assert_eq!(read, tree);
        assert!(!read.contains(".git/config"));
    }

    #[tokio::test]
    async fn test_read_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_tree(&dir.path().join("nope")).await.is_err());
    }
}
