//! Persistent cache of the negotiated configuration.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use rowsync_protocol::CodecError;
use rowsync_schema::{SerializationFormat, SyncSchema};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keeps the last configuration a peer negotiated.
///
/// A cached configuration lets later sessions skip the schema build unless
/// an overwrite is requested.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Returns the cached configuration, if any.
    async fn get(&self) -> SyncResult<Option<SyncSchema>>;

    /// Replaces the cached configuration.
    async fn set(&self, schema: &SyncSchema) -> SyncResult<()>;

    /// Drops the cached configuration.
    async fn invalidate(&self) -> SyncResult<()>;
}

/// Configuration cache held in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigurationStore {
    schema: RwLock<Option<SyncSchema>>,
}

impl MemoryConfigurationStore {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigurationStore for MemoryConfigurationStore {
    async fn get(&self) -> SyncResult<Option<SyncSchema>> {
        Ok(self.schema.read().clone())
    }

    async fn set(&self, schema: &SyncSchema) -> SyncResult<()> {
        *self.schema.write() = Some(schema.clone());
        Ok(())
    }

    async fn invalidate(&self) -> SyncResult<()> {
        *self.schema.write() = None;
        Ok(())
    }
}

/// Configuration cache kept as a JSON file.
///
/// Writes go to a sibling temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileConfigurationStore {
    path: PathBuf,
}

impl FileConfigurationStore {
    /// Creates a cache at `path`. The file is created on the first `set`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigurationStore for FileConfigurationStore {
    async fn get(&self) -> SyncResult<Option<SyncSchema>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let schema = serde_json::from_slice(&bytes)
            .map_err(|e| CodecError::decoding_failed(SerializationFormat::Json, e))?;
        Ok(Some(schema))
    }

    async fn set(&self, schema: &SyncSchema) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(schema)
            .map_err(|e| CodecError::encoding_failed(SerializationFormat::Json, e))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), "configuration cached");
        Ok(())
    }

    async fn invalidate(&self) -> SyncResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Io(e)),
        }
    }
}
