//! Batch building with optional spooling to disk.

use crate::error::{SyncError, SyncResult};
use crate::tracker::ChangeCursor;
use rowsync_protocol::{decode, encode, Batch, ChangeRecord, SerializationFormat};
use rowsync_schema::SyncSchema;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Spooled batches are always written in the binary format.
const SPOOL_FORMAT: SerializationFormat = SerializationFormat::Binary;

enum Slot {
    Memory(Batch),
    Spooled { path: PathBuf, len: usize },
}

/// Groups change records into batches.
///
/// A batch holds changes of a single table and at most `batch_size`
/// records. The first `in_memory_limit` batches stay in memory; later ones
/// are written to the spool directory, if one is set.
pub struct BatchBuilder {
    batch_size: usize,
    in_memory_limit: usize,
    spool_dir: Option<PathBuf>,
    slots: Vec<Slot>,
    current: Option<Batch>,
}

impl BatchBuilder {
    /// Creates a builder.
    pub fn new(batch_size: usize, in_memory_limit: usize, spool_dir: Option<PathBuf>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            in_memory_limit,
            spool_dir,
            slots: Vec::new(),
            current: None,
        }
    }

    /// Creates a builder following a schema's batch settings, spooling
    /// under `<batch_directory>/<session_id>`.
    pub fn for_session(schema: &SyncSchema, session_id: Uuid) -> Self {
        Self::new(
            schema.batch_size,
            schema.in_memory_batches,
            schema
                .batch_directory
                .as_ref()
                .map(|dir| dir.join(session_id.to_string())),
        )
    }

    /// Adds one change of `table`.
    pub async fn push(&mut self, table: &str, change: ChangeRecord) -> SyncResult<()> {
        let full = self
            .current
            .as_ref()
            .map_or(false, |b| b.table != table || b.len() >= self.batch_size);
        if full {
            self.seal().await?;
        }
        let index = self.slots.len();
        self.current
            .get_or_insert_with(|| Batch::new(index, table))
            .changes
            .push(change);
        Ok(())
    }

    /// Drains a cursor into the builder. Returns the number of changes added.
    pub async fn append(&mut self, mut cursor: ChangeCursor<'_>) -> SyncResult<usize> {
        let table = cursor.table().name.clone();
        let mut added = 0;
        while let Some(page) = cursor.next_page().await? {
            added += page.len();
            for change in page {
                self.push(&table, change).await?;
            }
        }
        Ok(added)
    }

    /// Closes the open batch, if it has any changes.
    pub async fn seal(&mut self) -> SyncResult<()> {
        let Some(batch) = self.current.take() else {
            return Ok(());
        };
        if batch.is_empty() {
            return Ok(());
        }

        let in_memory = self
            .slots
            .iter()
            .filter(|s| matches!(s, Slot::Memory(_)))
            .count();
        let slot = match &self.spool_dir {
            Some(dir) if in_memory >= self.in_memory_limit => {
                let path = dir.join(format!("batch_{:06}.cbor", batch.index));
                tokio::fs::create_dir_all(dir).await?;
                tokio::fs::write(&path, encode(SPOOL_FORMAT, &batch)?).await?;
                debug!(
                    index = batch.index,
                    table = %batch.table,
                    path = %path.display(),
                    "batch spooled"
                );
                Slot::Spooled {
                    path,
                    len: batch.len(),
                }
            }
            _ => Slot::Memory(batch),
        };
        self.slots.push(slot);
        Ok(())
    }

    /// Seals the open batch and returns the finished set.
    pub async fn finish(mut self) -> SyncResult<BatchSet> {
        self.seal().await?;
        Ok(BatchSet {
            slots: self.slots,
            spool_dir: self.spool_dir,
        })
    }
}

/// The batches of one session direction, indexed from zero.
pub struct BatchSet {
    slots: Vec<Slot>,
    spool_dir: Option<PathBuf>,
}

impl BatchSet {
    /// Number of batches.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if there are no batches.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of change records across every batch.
    pub fn total_changes(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Memory(batch) => batch.len(),
                Slot::Spooled { len, .. } => *len,
            })
            .sum()
    }

    /// Number of batches written to disk.
    pub fn spooled(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Spooled { .. }))
            .count()
    }

    /// Returns a batch by index, reading it back from disk if spooled.
    pub async fn get(&self, index: usize) -> SyncResult<Batch> {
        match self.slots.get(index) {
            Some(Slot::Memory(batch)) => Ok(batch.clone()),
            Some(Slot::Spooled { path, .. }) => {
                let bytes = tokio::fs::read(path).await?;
                Ok(decode(SPOOL_FORMAT, &bytes)?)
            }
            None => Err(SyncError::protocol(format!(
                "batch {index} requested, {} available",
                self.slots.len()
            ))),
        }
    }

    /// Removes spooled files.
    pub async fn cleanup(&self) -> SyncResult<()> {
        if self.spooled() == 0 {
            return Ok(());
        }
        if let Some(dir) = &self.spool_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
