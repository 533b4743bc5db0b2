use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{ReadableTable as _, TableDefinition};
use snafu::ResultExt as _;
use tracing::debug;

use super::{StorageKey, TokenStorage};
use crate::LOG_TARGET;
use crate::error::{
    CommitSnafu, DatabaseSnafu, JoinSnafu, StorageResult, StorageSnafu, TableSnafu,
    TransactionSnafu,
};

/// Key: [`StorageKey::as_str`]
/// Value: the raw token
const TOKENS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("portico::tokens");

/// Token storage persisted in a redb database file
///
/// All database access happens on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct RedbTokenStorage {
    db: Arc<redb::Database>,
}

impl RedbTokenStorage {
    /// Open (or create) the database at `path` and make sure the tokens
    /// table exists
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_owned();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening token storage");
        tokio::task::spawn_blocking(move || {
            let db = redb::Database::create(&path).context(DatabaseSnafu)?;
            Self::from_database(Arc::new(db))
        })
        .await
        .context(JoinSnafu)?
    }

    /// Use an already open database. Performs blocking I/O.
    pub fn from_database(db: Arc<redb::Database>) -> StorageResult<Self> {
        {
            let write_txn = db.begin_write().context(TransactionSnafu)?;
            // Opening the table in a write transaction creates it
            let _ = write_txn.open_table(TOKENS_TABLE).context(TableSnafu)?;
            write_txn.commit().context(CommitSnafu)?;
        }

        Ok(Self { db })
    }

    async fn write<F>(&self, f: F) -> StorageResult<()>
    where
        F: FnOnce(&mut redb::Table<'_, &'static str, &'static str>) -> Result<(), redb::StorageError>
            + Send
            + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().context(TransactionSnafu)?;
            {
                let mut table = write_txn.open_table(TOKENS_TABLE).context(TableSnafu)?;
                f(&mut table).context(StorageSnafu)?;
            }
            write_txn.commit().context(CommitSnafu)?;
            Ok(())
        })
        .await
        .context(JoinSnafu)?
    }
}

#[async_trait]
impl TokenStorage for RedbTokenStorage {
    async fn load(&self, key: StorageKey) -> StorageResult<Option<String>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().context(TransactionSnafu)?;
            let table = read_txn.open_table(TOKENS_TABLE).context(TableSnafu)?;

            Ok(table
                .get(key.as_str())
                .context(StorageSnafu)?
                .map(|guard| guard.value().to_owned()))
        })
        .await
        .context(JoinSnafu)?
    }

    async fn store(&self, key: StorageKey, value: &str) -> StorageResult<()> {
        let value = value.to_owned();
        self.write(move |table| {
            table.insert(key.as_str(), value.as_str())?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: StorageKey) -> StorageResult<()> {
        self.write(move |table| {
            table.remove(key.as_str())?;
            Ok(())
        })
        .await
    }
}
