use crate::core::{CoreError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Backing medium for a single aggregate document - allows pluggable storage backends
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Load the raw document payload, or `None` if no record exists yet
    async fn load(&self) -> Result<Option<String>>;

    /// Replace the raw document payload wholesale
    async fn store(&self, payload: &str) -> Result<()>;

    /// Identifier used in error messages (file path, collection name)
    fn describe(&self) -> String;
}

/// File-backed medium: one pretty-printed JSON file per document.
///
/// Writes go to a sibling temp file first and are renamed over the target, so
/// a reader never observes a partially written file.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(data_dir: impl AsRef<Path>, file_name: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|e| {
            CoreError::Io(format!(
                "Failed to create data directory '{}': {}",
                data_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            path: data_dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Io(format!(
                "Failed to read '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn store(&self, payload: &str) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, payload).await.map_err(|e| {
            CoreError::Io(format!(
                "Failed to write '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            CoreError::Io(format!(
                "Failed to replace '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory medium for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBackend {
    payload: Mutex<Option<String>>,
    name: String,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            payload: Mutex::new(None),
            name: name.into(),
        }
    }

    /// Pre-seed the backing record, e.g. with a corrupt payload in tests.
    pub fn with_payload(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            payload: Mutex::new(Some(payload.into())),
            name: name.into(),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<String>> {
        let guard = self.payload.lock()?;
        Ok(guard.clone())
    }

    async fn store(&self, payload: &str) -> Result<()> {
        let mut guard = self.payload.lock()?;
        *guard = Some(payload.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}
