#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("storage backend error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("storage backend error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage backend error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("storage backend error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("storage backend error: {0}")]
    Compaction(#[from] redb::CompactionError),

    #[error("a stored record was corrupt and could not be decoded")]
    Corrupt,

    #[error("background task panicked: {0}")]
    TaskPanic(String),
}
