//! Persistence for merged audio.
//!
//! Paths handed to a [`FileStorage`] are relative to its data directory.
//! Generated audio lives under `audios/{podcast_id}/{version_id}.wav`.

use std::{
    collections::HashMap,
    io,
    path::{Component, Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::StorageError;

/// Directory under the data root that holds every generated file.
pub const AUDIO_DIR: &str = "audios";

/// `audios/{podcast_id}/{version_id}.wav`
pub fn audio_relative_path(podcast_id: &str, version_id: &str) -> String {
    format!("{AUDIO_DIR}/{podcast_id}/{version_id}.wav")
}

/// Relative path for a new version of `podcast_id`, with a random version id.
pub fn new_audio_path(podcast_id: &str) -> String {
    audio_relative_path(podcast_id, &uuid::Uuid::new_v4().to_string())
}

/// Byte store keyed by relative path.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Write `bytes`, replacing any existing file. Returns the full path.
    async fn save(&self, relative_path: &str, bytes: &[u8]) -> Result<PathBuf, StorageError>;

    /// `None` when nothing is stored at `relative_path`.
    async fn read(&self, relative_path: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns whether a file was removed.
    async fn delete(&self, relative_path: &str) -> Result<bool, StorageError>;

    async fn exists(&self, relative_path: &str) -> Result<bool, StorageError>;

    async fn size(&self, relative_path: &str) -> Result<Option<u64>, StorageError>;

    fn data_dir(&self) -> &Path;

    /// Remove every generated audio file.
    async fn clear_all(&self) -> Result<(), StorageError>;

    /// Bytes used by generated audio.
    async fn total_used(&self) -> Result<u64, StorageError>;
}

/// Accept only plain relative paths that cannot escape the data directory.
fn checked_relative(relative_path: &str) -> Result<&Path, StorageError> {
    let path = Path::new(relative_path);
    if relative_path.trim().is_empty() {
        return Err(StorageError::InvalidPath(relative_path.to_string()));
    }
    let plain = path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let names_a_file = path.components().any(|c| matches!(c, Component::Normal(_)));
    if !plain || !names_a_file {
        return Err(StorageError::InvalidPath(relative_path.to_string()));
    }
    Ok(path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Local filesystem
// ─────────────────────────────────────────────────────────────────────────────

/// Storage rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.audiofy/data`, or `None` when the home directory is unknown.
    pub fn default_location() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".audiofy").join("data"))
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(checked_relative(relative_path)?))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, relative_path: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.resolve(relative_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StorageError::from_io(parent, e))?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        if let Err(e) = fs::write(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::from_io(&path, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::from_io(&path, e));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "saved file");
        Ok(path)
    }

    async fn read(&self, relative_path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(relative_path)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    async fn delete(&self, relative_path: &str) -> Result<bool, StorageError> {
        let path = self.resolve(relative_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    async fn exists(&self, relative_path: &str) -> Result<bool, StorageError> {
        let path = self.resolve(relative_path)?;
        fs::try_exists(&path).await.map_err(|e| StorageError::from_io(path, e))
    }

    async fn size(&self, relative_path: &str) -> Result<Option<u64>, StorageError> {
        let path = self.resolve(relative_path)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    fn data_dir(&self) -> &Path {
        &self.root
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let dir = self.root.join(AUDIO_DIR);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(dir, e)),
        }
    }

    async fn total_used(&self) -> Result<u64, StorageError> {
        let mut total = 0u64;
        let mut pending = vec![self.root.join(AUDIO_DIR)];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::from_io(dir, e)),
            };
            while let Some(entry) =
                entries.next_entry().await.map_err(|e| StorageError::from_io(&dir, e))?
            {
                let meta =
                    entry.metadata().await.map_err(|e| StorageError::from_io(entry.path(), e))?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Map-backed storage for tests and hosts that persist bytes themselves.
#[derive(Debug)]
pub struct MemoryStorage {
    root: PathBuf,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self { root: PathBuf::from("memory"), files: Mutex::new(HashMap::new()) }
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(relative_path: &str) -> Result<String, StorageError> {
        let path = checked_relative(relative_path)?;
        let parts: Vec<_> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            })
            .collect();
        Ok(parts.join("/"))
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn save(&self, relative_path: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let key = Self::key(relative_path)?;
        let path = self.root.join(&key);
        self.lock().insert(key, bytes.to_vec());
        Ok(path)
    }

    async fn read(&self, relative_path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = Self::key(relative_path)?;
        Ok(self.lock().get(&key).cloned())
    }

    async fn delete(&self, relative_path: &str) -> Result<bool, StorageError> {
        let key = Self::key(relative_path)?;
        Ok(self.lock().remove(&key).is_some())
    }

    async fn exists(&self, relative_path: &str) -> Result<bool, StorageError> {
        let key = Self::key(relative_path)?;
        Ok(self.lock().contains_key(&key))
    }

    async fn size(&self, relative_path: &str) -> Result<Option<u64>, StorageError> {
        let key = Self::key(relative_path)?;
        Ok(self.lock().get(&key).map(|b| b.len() as u64))
    }

    fn data_dir(&self) -> &Path {
        &self.root
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let prefix = format!("{AUDIO_DIR}/");
        self.lock().retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn total_used(&self) -> Result<u64, StorageError> {
        let prefix = format!("{AUDIO_DIR}/");
        Ok(self
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.len() as u64)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_paths() {
        assert_eq!(audio_relative_path("p1", "v1"), "audios/p1/v1.wav");
        let a = new_audio_path("p1");
        let b = new_audio_path("p1");
        assert!(a.starts_with("audios/p1/") && a.ends_with(".wav"), "got: {a}");
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for bad in ["", "  ", ".", "./", "././", "/etc/passwd", "../x.wav", "audios/../../x.wav"] {
            assert!(
                matches!(checked_relative(bad), Err(StorageError::InvalidPath(_))),
                "accepted {bad:?}"
            );
        }
        assert!(checked_relative("audios/p/v.wav").is_ok());
        assert!(checked_relative("./audios/v.wav").is_ok());
    }

    #[tokio::test]
    async fn test_local_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        let rel = audio_relative_path("p", "v");

        assert_eq!(storage.read(&rel).await.unwrap(), None);
        assert!(!storage.exists(&rel).await.unwrap());

        let path = storage.save(&rel, b"RIFFdata").await.unwrap();
        assert_eq!(path, dir.path().join("audios").join("p").join("v.wav"));
        assert!(path.exists());
        assert!(storage.exists(&rel).await.unwrap());
        assert_eq!(storage.size(&rel).await.unwrap(), Some(8));
        assert_eq!(storage.read(&rel).await.unwrap().as_deref(), Some(&b"RIFFdata"[..]));

        // No temp file left behind.
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["v.wav".to_string()]);

        assert!(storage.delete(&rel).await.unwrap());
        assert!(!storage.delete(&rel).await.unwrap());
        assert_eq!(storage.size(&rel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_usage_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        assert_eq!(storage.total_used().await.unwrap(), 0);

        storage.save(&audio_relative_path("a", "1"), &[0u8; 100]).await.unwrap();
        storage.save(&audio_relative_path("b", "2"), &[0u8; 50]).await.unwrap();
        storage.save("config.json", b"{}").await.unwrap();
        assert_eq!(storage.total_used().await.unwrap(), 150);

        storage.clear_all().await.unwrap();
        assert_eq!(storage.total_used().await.unwrap(), 0);
        assert!(storage.exists("config.json").await.unwrap());
        storage.clear_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_local_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        // A non-empty directory at the target path makes the rename fail.
        std::fs::create_dir_all(dir.path().join("audios/p/v.wav/inner")).unwrap();

        let err = storage.save("audios/p/v.wav", b"RIFF").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }), "got: {err}");
        assert!(!dir.path().join("audios/p/v.wav.part").exists());
    }

    #[tokio::test]
    async fn test_local_rejects_current_dir_only_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        for bad in [".", "./"] {
            let err = storage.save(bad, b"x").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidPath(_)), "accepted {bad:?}");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_local_rejects_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        let err = storage.save("/tmp/evil.wav", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());
        let path = storage.save("audios/p/v.wav", b"abc").await.unwrap();
        assert_eq!(path, Path::new("memory/audios/p/v.wav"));
        assert!(storage.exists("./audios/p/v.wav").await.unwrap());
        assert_eq!(storage.size("audios/p/v.wav").await.unwrap(), Some(3));
        storage.save("notes.txt", b"hello").await.unwrap();
        assert_eq!(storage.total_used().await.unwrap(), 3);

        storage.clear_all().await.unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.read("audios/p/v.wav").await.unwrap(), None);
        assert!(matches!(storage.read("../x").await, Err(StorageError::InvalidPath(_))));
    }
}
