//! Directory-backed cache storage.

use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::warn;

use crate::cache::StorageAdapter;
use crate::cache::storage::{StorageError, validate_name};

/// Storage rooted at one directory; each entry is a regular file inside it.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl StorageAdapter for DirectoryStorage {
    async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // A directory entry that exists but cannot be followed (dangling
                // symlink) is a fault, not an absent entry.
                match fs::symlink_metadata(&path).await {
                    Ok(_) => Err(StorageError::io(name, err)),
                    Err(_) => Err(StorageError::NotFound {
                        name: name.to_string(),
                    }),
                }
            }
            Err(err) => Err(StorageError::io(name, err)),
        }
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<(), StorageError> {
        let target = self.resolve(name)?;
        let root = self.root.clone();
        let owned_name = name.to_string();

        tokio::task::spawn_blocking(move || write_atomically(&root, &target, &data))
            .await
            .map_err(|err| StorageError::io(&owned_name, std::io::Error::other(err)))?
            .map_err(|err| {
                warn!(
                    target = "mensa::storage",
                    op = "storage::write",
                    result = "error",
                    entry = %owned_name,
                    error = %err,
                    "Failed to persist cache entry"
                );
                StorageError::io(&owned_name, err)
            })
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let root_name = self.root.display().to_string();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|err| StorageError::io(&root_name, err))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StorageError::io(&root_name, err))?
        {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Write into a sibling temporary file, flush it, then rename over the target.
fn write_atomically(root: &Path, target: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(root)?;
    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(root)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, DirectoryStorage) {
        let dir = TempDir::new().expect("tempdir");
        let storage = DirectoryStorage::new(dir.path()).expect("storage");
        (dir, storage)
    }

    #[tokio::test]
    async fn creates_missing_root() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("nested").join("cache");
        let storage = DirectoryStorage::new(&root).expect("storage");
        assert!(storage.root().is_dir());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.read("2022-09-02.json").await.expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn writes_replace_contents_without_leftovers() {
        let (dir, storage) = storage();
        storage
            .write("2022-09-02.json", Bytes::from_static(b"[]"))
            .await
            .expect("first write");
        storage
            .write("2022-09-02.json", Bytes::from_static(b"[{}]"))
            .await
            .expect("second write");

        let contents = std::fs::read(dir.path().join("2022-09-02.json")).expect("read back");
        assert_eq!(contents, b"[{}]");
        assert_eq!(
            storage.list().await.expect("list"),
            vec!["2022-09-02.json".to_string()]
        );
    }

    #[tokio::test]
    async fn directory_in_place_of_file_is_a_fault() {
        let (dir, storage) = storage();
        std::fs::create_dir(dir.path().join("2022-09-02.json")).expect("mkdir");
        let err = storage.read("2022-09-02.json").await.expect_err("fault");
        assert!(!err.is_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_symlink_is_a_fault() {
        let (dir, storage) = storage();
        std::os::unix::fs::symlink(
            dir.path().join("nowhere.json"),
            dir.path().join("2022-09-02.json"),
        )
        .expect("symlink");
        let err = storage.read("2022-09-02.json").await.expect_err("fault");
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn rejects_path_escapes() {
        let (_dir, storage) = storage();
        let err = storage
            .write("../escape.json", Bytes::from_static(b"[]"))
            .await
            .expect_err("escape");
        assert!(matches!(err, StorageError::InvalidName { .. }));
    }
}
