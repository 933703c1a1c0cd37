//! External stores the reader depends on: archive bytes and reading progress.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::SessionError;

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Raw archive bytes stored under `storage_path`.
    async fn fetch_archive_bytes(&self, storage_path: &str) -> Result<Vec<u8>, SessionError>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load_progress(&self, book_id: &str) -> anyhow::Result<Option<ReadingProgress>>;
    async fn save_progress(
        &self,
        book_id: &str,
        location: Location,
        percent: Option<f64>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub percent_complete: f64,
    pub last_location: Location,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub spine_index: usize,
}

/// Storage key of an archive with the given content hash.
pub fn archive_storage_path(content_hash: &str) -> String {
    format!("{content_hash}.epub")
}

/// Archive store backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalFsArchiveStore {
    base_dir: PathBuf,
}

impl LocalFsArchiveStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn object_path(&self, storage_path: &str) -> anyhow::Result<PathBuf> {
        if storage_path.is_empty()
            || storage_path
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            anyhow::bail!("invalid storage path: {storage_path:?}");
        }
        Ok(self.base_dir.join(storage_path))
    }

    /// Store archive bytes under `storage_path`, replacing any previous object.
    pub fn put(&self, storage_path: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.object_path(storage_path)?;
        crate::content::write_atomic(&path, bytes)
            .with_context(|| format!("store archive: {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl ArchiveStore for LocalFsArchiveStore {
    async fn fetch_archive_bytes(&self, storage_path: &str) -> Result<Vec<u8>, SessionError> {
        let path = self
            .object_path(storage_path)
            .map_err(|err| SessionError::Fetch(format!("{err:#}")))?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::AssetNotFound(storage_path.to_owned()))
            }
            Err(err) => Err(SessionError::Fetch(format!("{}: {err}", path.display()))),
        }
    }
}

/// Progress store backed by JSON files, one per (user, book) pair.
#[derive(Debug, Clone)]
pub struct LocalFsProgressStore {
    base_dir: PathBuf,
    user_id: String,
}

impl LocalFsProgressStore {
    pub fn new(base_dir: impl Into<PathBuf>, user_id: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            user_id: user_id.into(),
        }
    }

    fn user_dir(&self) -> PathBuf {
        self.base_dir.join(file_safe(&self.user_id))
    }

    fn progress_json_path(&self, book_id: &str) -> PathBuf {
        self.user_dir().join(format!("{}.json", file_safe(book_id)))
    }
}

#[async_trait]
impl ProgressStore for LocalFsProgressStore {
    async fn load_progress(&self, book_id: &str) -> anyhow::Result<Option<ReadingProgress>> {
        let path = self.progress_json_path(book_id);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn save_progress(
        &self,
        book_id: &str,
        location: Location,
        percent: Option<f64>,
    ) -> anyhow::Result<()> {
        let path = self.progress_json_path(book_id);
        let percent_complete = match percent {
            Some(percent) => percent,
            None => read_json::<ReadingProgress>(&path)
                .await?
                .map(|previous| previous.percent_complete)
                .unwrap_or(0.0),
        };
        let progress = ReadingProgress {
            percent_complete: percent_complete.clamp(0.0, 100.0),
            last_location: location,
            updated_at: Utc::now(),
        };
        write_json_atomic(&path, &progress)
            .await
            .context("write progress json")?;
        Ok(())
    }
}

fn file_safe(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || crate::content::write_atomic(&path, &data))
        .await
        .context("join json writer")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_round_trips_per_user() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let alice = LocalFsProgressStore::new(dir.path(), "alice");
        let bob = LocalFsProgressStore::new(dir.path(), "bob");

        assert!(alice.load_progress("book-1").await?.is_none());
        alice
            .save_progress("book-1", Location { spine_index: 2 }, Some(75.0))
            .await?;

        let saved = alice.load_progress("book-1").await?.expect("progress saved");
        assert_eq!(saved.last_location, Location { spine_index: 2 });
        assert_eq!(saved.percent_complete, 75.0);
        assert!(bob.load_progress("book-1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn save_without_percent_keeps_previous_value() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsProgressStore::new(dir.path(), "u");
        store
            .save_progress("b", Location { spine_index: 0 }, Some(150.0))
            .await?;
        store
            .save_progress("b", Location { spine_index: 1 }, None)
            .await?;
        let saved = store.load_progress("b").await?.expect("progress saved");
        assert_eq!(saved.percent_complete, 100.0);
        assert_eq!(saved.last_location.spine_index, 1);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_saves_leave_a_single_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsProgressStore::new(dir.path(), "reader one");
        for spine_index in 0..3 {
            store
                .save_progress("book/1", Location { spine_index }, Some(10.0))
                .await?;
        }

        let names: Vec<String> = std::fs::read_dir(dir.path().join("reader_one"))?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<Result<_, _>>()?;
        assert_eq!(names, vec!["book_1.json"]);
        Ok(())
    }

    #[tokio::test]
    async fn archive_store_reports_missing_objects() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsArchiveStore::new(dir.path());
        store.put(&archive_storage_path("abc"), b"zip-bytes")?;

        assert_eq!(store.fetch_archive_bytes("abc.epub").await?, b"zip-bytes");
        assert!(matches!(
            store.fetch_archive_bytes("def.epub").await,
            Err(SessionError::AssetNotFound(path)) if path == "def.epub"
        ));
        assert!(matches!(
            store.fetch_archive_bytes("../escape.epub").await,
            Err(SessionError::Fetch(_))
        ));
        Ok(())
    }
}
