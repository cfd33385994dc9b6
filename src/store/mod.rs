//! The per-node durable record store.
//!
//! Backed by `redb`, an embedded ordered byte-keyed store: a single-file, transactional,
//! ordered map that needs no external process. There is no teacher/example precedent for
//! this module's shape (none of the retrieved repos embed a KV engine); the
//! `spawn_blocking`-per-operation pattern and the `thiserror` per-operation error enum
//! are this implementation's own design, chosen to fit `redb`'s synchronous API onto the
//! cooperative executor.

mod error;

pub use error::StoreError;

use crate::record::Record;
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

/// The capability the coordinator needs from the local, single-node record store: the
/// same shape as [`crate::coordinator::Storage`] minus the `ack`/`from` quorum
/// parameters, so the coordinator can depend on it without knowing about quorum math,
/// and so tests can substitute an in-memory fake.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get(&self, key: Vec<u8>) -> Result<Record, StoreError>;
    async fn upsert(&self, key: Vec<u8>, record: Record) -> Result<(), StoreError>;
    async fn compact(&self) -> Result<(), StoreError>;
    async fn close(&self) -> Result<(), StoreError>;
}

/// A durable, ordered map from byte key to [`Record`], opened against either a
/// user-provided directory or a fresh temporary one.
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    temp_dir: Mutex<Option<TempDir>>,
}

impl LocalStore {
    /// Open a store rooted at `directory`, or allocate a fresh temporary directory if
    /// `directory` is `None`. The temporary directory is removed on [`LocalStore::close`]
    /// (or on drop, mirroring the Python original's `shutil.rmtree` on `aclose`).
    pub async fn open(directory: Option<PathBuf>) -> Result<Self, StoreError> {
        let (path, temp_dir) = match directory {
            Some(dir) => {
                tokio::fs::create_dir_all(&dir).await?;
                tracing::info!(path = %dir.display(), "serving data from directory");
                (dir.join("quorumdb.redb"), None)
            }
            None => {
                let temp_dir = tempfile::Builder::new().prefix("quorumdb").tempdir()?;
                tracing::info!(path = %temp_dir.path().display(), "serving data from a temporary path");
                let path = temp_dir.path().join("quorumdb.redb");
                (path, Some(temp_dir))
            }
        };

        let db = tokio::task::spawn_blocking(move || Database::create(path))
            .await
            .map_err(|e| StoreError::TaskPanic(e.to_string()))??;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            temp_dir: Mutex::new(temp_dir),
        })
    }

    /// Ordered iteration starting at `from_key` (inclusive), stopping before `to_key`
    /// (exclusive) if given, else at the end of the map. Restartable: each call opens a
    /// fresh read transaction and eagerly materializes the page so the transaction isn't
    /// held open across awaits.
    pub async fn range(
        &self,
        from_key: Vec<u8>,
        to_key: Option<Vec<u8>>,
    ) -> Result<Vec<(Vec<u8>, Record)>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap();
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE)?;
            let mut out = Vec::new();
            for entry in table.range::<&[u8]>(from_key.as_slice()..)? {
                let (k, v) = entry?;
                let key = k.value().to_vec();
                if let Some(to) = &to_key {
                    if key.as_slice() >= to.as_slice() {
                        break;
                    }
                }
                let record = Record::decode(v.value()).ok_or(StoreError::Corrupt)?;
                out.push((key, record));
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::TaskPanic(e.to_string()))?
    }

    async fn drop_stale_tombstones(&self) -> Result<(), StoreError> {
        const TOMBSTONE_HORIZON: chrono::Duration = chrono::Duration::hours(24);
        let horizon = chrono::Utc::now() - TOMBSTONE_HORIZON;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap();
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                let mut stale = Vec::new();
                for entry in table.iter()? {
                    let (k, v) = entry?;
                    if let Some(record) = Record::decode(v.value()) {
                        if record.is_tombstone() && record.timestamp < horizon {
                            stale.push(k.value().to_vec());
                        }
                    }
                }
                for key in stale {
                    table.remove(key.as_slice())?;
                }
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::TaskPanic(e.to_string()))?
    }
}

#[async_trait]
impl LocalStorage for LocalStore {
    async fn get(&self, key: Vec<u8>) -> Result<Record, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap();
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE)?;
            match table.get(key.as_slice())? {
                Some(guard) => Record::decode(guard.value()).ok_or(StoreError::Corrupt),
                None => Err(StoreError::NotFound),
            }
        })
        .await
        .map_err(|e| StoreError::TaskPanic(e.to_string()))?
    }

    async fn upsert(&self, key: Vec<u8>, record: Record) -> Result<(), StoreError> {
        let db = self.db.clone();
        let encoded = record.encode();
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap();
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.insert(key.as_slice(), encoded.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::TaskPanic(e.to_string()))?
    }

    /// Reorganize on-disk storage, dropping tombstones older than a 24 hour horizon.
    /// `redb::Database::compact` requires exclusive access to the database, so
    /// concurrent readers/writers block on the same mutex this grabs for every
    /// operation; that's acceptable under this node's single-threaded execution model.
    async fn compact(&self) -> Result<(), StoreError> {
        self.drop_stale_tombstones().await?;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = db.lock().unwrap();
            db.compact()?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::TaskPanic(e.to_string()))?
    }

    /// Release resources, deleting the backing temporary directory if one was
    /// allocated at [`LocalStore::open`] time. Idempotent: a second call finds nothing
    /// left to remove.
    async fn close(&self) -> Result<(), StoreError> {
        let temp_dir = self.temp_dir.lock().unwrap().take();
        if let Some(dir) = temp_dir {
            tokio::task::spawn_blocking(move || drop(dir))
                .await
                .map_err(|e| StoreError::TaskPanic(e.to_string()))?;
        }
        Ok(())
    }
}
