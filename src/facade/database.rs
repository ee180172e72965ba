use crate::core::{StoreError, StoreResult};
use crate::storage::{DurabilityMode, PersistenceManager, Tables, WalEntry};
use crate::transaction::{Change, RowKey, Transaction, TransactionManager, TransactionStats};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How a [`Database`] is opened.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Directory for the WAL and snapshot. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub durability: DurabilityMode,
    /// WAL entries between automatic checkpoints.
    pub checkpoint_every: usize,
    /// How many times [`Database::transaction`] re-runs a body after a
    /// write-write conflict.
    pub commit_retries: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            durability: DurabilityMode::default(),
            checkpoint_every: 1000,
            commit_retries: 3,
        }
    }
}

impl DatabaseOptions {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    pub fn checkpoint_every(mut self, entries: usize) -> Self {
        self.checkpoint_every = entries;
        self
    }

    pub fn commit_retries(mut self, retries: u32) -> Self {
        self.commit_retries = retries;
        self
    }
}

struct Committed {
    version: u64,
    tables: Tables,
    /// Version of the last commit that wrote each row since open.
    row_versions: HashMap<RowKey, u64>,
    persistence: Option<PersistenceManager>,
}

struct DatabaseInner {
    committed: RwLock<Committed>,
    transactions: TransactionManager,
    commit_retries: u32,
}

/// Handle to the transactional record store.
///
/// Cheap to clone; every clone refers to the same committed state. Create one
/// at startup with [`Database::open`] and call [`Database::close`] on
/// shutdown.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn in_memory() -> Self {
        Self::build(
            0,
            Tables::new(),
            None,
            TransactionManager::new(),
            DatabaseOptions::default().commit_retries,
        )
    }

    /// Opens the store, recovering snapshot and WAL contents when `data_dir`
    /// is set.
    pub fn open(options: DatabaseOptions) -> StoreResult<Self> {
        let Some(data_dir) = options.data_dir.as_ref() else {
            return Ok(Self::build(
                0,
                Tables::new(),
                None,
                TransactionManager::new(),
                options.commit_retries,
            ));
        };

        let mut persistence = PersistenceManager::new(data_dir, options.durability)?;
        persistence.set_checkpoint_threshold(options.checkpoint_every);

        let (version, tables) = match persistence.recover()? {
            Some(recovered) => (recovered.version, recovered.tables),
            None => (0, Tables::new()),
        };
        info!(
            data_dir = %data_dir.display(),
            durability = ?options.durability,
            version,
            "record store opened"
        );

        Ok(Self::build(
            version,
            tables,
            Some(persistence),
            TransactionManager::starting_at(version + 1),
            options.commit_retries,
        ))
    }

    fn build(
        version: u64,
        tables: Tables,
        persistence: Option<PersistenceManager>,
        transactions: TransactionManager,
        commit_retries: u32,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                committed: RwLock::new(Committed {
                    version,
                    tables,
                    row_versions: HashMap::new(),
                    persistence,
                }),
                transactions,
                commit_retries,
            }),
        }
    }

    /// Starts a transaction on the latest committed state.
    pub async fn begin(&self) -> Transaction {
        let committed = self.inner.committed.read().await;
        self.inner
            .transactions
            .begin(committed.version, committed.tables.clone())
    }

    /// Commits `txn`, returning the new committed version.
    ///
    /// Fails with [`StoreError::SerializationFailure`] when a row written by
    /// `txn` was also written by a transaction that committed after `txn`
    /// began. When only other rows changed, the changes of `txn` are replayed
    /// onto the newer state, so writers of disjoint rows never conflict.
    pub async fn commit(&self, mut txn: Transaction) -> StoreResult<u64> {
        if !txn.state().is_active() {
            return Err(StoreError::TransactionNotActive(txn.id().as_u64()));
        }

        let mut committed = self.inner.committed.write().await;

        if txn.change_count() == 0 {
            self.inner.transactions.record_commit(&mut txn);
            return Ok(committed.version);
        }

        let base = txn.base_version();
        let stale_row = txn.changes().iter().map(Change::row).find(|row| {
            committed
                .row_versions
                .get(row)
                .is_some_and(|&written| written > base)
        });
        if let Some(row) = stale_row {
            let err = StoreError::SerializationFailure {
                txn: txn.id().as_u64(),
                based_on: base,
                current: committed.version,
            };
            self.inner.transactions.record_conflict(&mut txn);
            debug!(txn = %txn.id(), row = %row, error = %err, "commit rejected");
            return Err(err);
        }

        let tables = if committed.version == base {
            txn.take_tables()
        } else {
            let mut tables = committed.tables.clone();
            if let Err(cause) = txn
                .changes()
                .iter()
                .try_for_each(|change| tables.apply(change))
            {
                // Changes made against the old snapshot no longer fit.
                let err = StoreError::SerializationFailure {
                    txn: txn.id().as_u64(),
                    based_on: base,
                    current: committed.version,
                };
                self.inner.transactions.record_conflict(&mut txn);
                debug!(txn = %txn.id(), cause = %cause, "commit rejected on replay");
                return Err(err);
            }
            tables
        };

        let version = committed.version + 1;
        if let Some(persistence) = committed.persistence.as_mut() {
            let entry = WalEntry::Commit {
                txn: txn.id().as_u64(),
                version,
                changes: txn.changes().to_vec(),
            };
            if let Err(err) = persistence.log(&entry) {
                self.inner.transactions.record_abort(&mut txn);
                return Err(err);
            }
        }

        for change in txn.changes() {
            committed.row_versions.insert(change.row(), version);
        }
        committed.tables = tables;
        committed.version = version;

        let Committed {
            version,
            tables,
            persistence,
            ..
        } = &mut *committed;
        if let Some(persistence) = persistence.as_mut()
            && persistence.needs_checkpoint()
            && let Err(err) = persistence.checkpoint(*version, tables)
        {
            warn!(error = %err, "automatic checkpoint failed, WAL retained");
        }

        self.inner.transactions.record_commit(&mut txn);
        debug!(
            txn = %txn.id(),
            version = *version,
            changes = txn.change_count(),
            elapsed_us = txn.duration().as_micros() as u64,
            "transaction committed"
        );
        Ok(*version)
    }

    pub fn rollback(&self, mut txn: Transaction) {
        self.inner.transactions.record_abort(&mut txn);
    }

    /// Runs `body` inside a transaction and commits it.
    ///
    /// Errors returned by `body` roll the transaction back and are returned
    /// as-is. A write-write conflict on a row at commit re-runs `body` against
    /// fresh state, up to the configured number of retries.
    pub async fn transaction<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&mut Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut attempt = 0;
        loop {
            let mut txn = self.begin().await;
            let value = match body(&mut txn) {
                Ok(value) => value,
                Err(err) => {
                    self.rollback(txn);
                    return Err(err);
                }
            };

            match self.commit(txn).await {
                Ok(_) => return Ok(value),
                Err(StoreError::SerializationFailure { .. })
                    if attempt < self.inner.commit_retries =>
                {
                    attempt += 1;
                    debug!(attempt, "retrying transaction after write-write conflict");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Runs a read-only closure against the latest committed state.
    pub async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let committed = self.inner.committed.read().await;
        f(&committed.tables)
    }

    pub async fn version(&self) -> u64 {
        self.inner.committed.read().await.version
    }

    pub fn stats(&self) -> TransactionStats {
        self.inner.transactions.stats()
    }

    pub async fn is_persistent(&self) -> bool {
        self.inner.committed.read().await.persistence.is_some()
    }

    /// Writes a snapshot and truncates the WAL.
    pub async fn checkpoint(&self) -> StoreResult<()> {
        let mut committed = self.inner.committed.write().await;
        let Committed {
            version,
            tables,
            persistence,
            ..
        } = &mut *committed;
        if let Some(persistence) = persistence.as_mut() {
            persistence.checkpoint(*version, tables)?;
        }
        Ok(())
    }

    /// Flushes durable state before shutdown.
    pub async fn close(&self) -> StoreResult<()> {
        self.checkpoint().await?;
        let stats = self.stats();
        info!(
            committed = stats.committed,
            aborted = stats.aborted,
            conflicts = stats.conflicts,
            "record store closed"
        );
        Ok(())
    }
}
