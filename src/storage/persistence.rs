//! Write-ahead log and snapshot persistence for the record store.

use crate::core::StoreResult;
use crate::storage::table::Tables;
use crate::transaction::Change;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

const WAL_FILE: &str = "mortuary.wal";
const SNAPSHOT_FILE: &str = "mortuary.snapshot";
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// WAL Entry Types
// ============================================================================

/// One committed transaction. Only committed work reaches the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    Commit {
        txn: u64,
        version: u64,
        changes: Vec<Change>,
    },
}

// ============================================================================
// Database Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub format: u32,
    pub version: u64,
    pub tables: Tables,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub chamber_count: usize,
    pub deceased_count: usize,
}

impl DatabaseSnapshot {
    pub fn new(version: u64, tables: Tables) -> Self {
        let metadata = SnapshotMetadata {
            created_at: Utc::now(),
            chamber_count: tables.chamber_count(),
            deceased_count: tables.deceased_count(),
        };
        Self {
            format: SNAPSHOT_FORMAT_VERSION,
            version,
            tables,
            metadata,
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every commit.
    Sync,
    /// Flush to the OS after every commit.
    #[default]
    Async,
    /// Nothing is written.
    None,
}

impl FromStr for DurabilityMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "none" | "off" => Ok(Self::None),
            other => Err(format!(
                "durability must be one of: sync, async, none (got '{other}')"
            )),
        }
    }
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    /// Length of the file up to the end of the last complete record.
    valid_len: u64,
    /// Set when a failed append could not be cut back; no further writes.
    poisoned: bool,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    /// Opens the log for appending. A torn record left at the end by a crash
    /// is truncated so new records follow the last complete one.
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> StoreResult<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut valid_len = 0;
        let wal_file = if durability_mode != DurabilityMode::None {
            valid_len = scan_records(&wal_path)?.1;
            let file = OpenOptions::new().create(true).append(true).open(&wal_path)?;
            let on_disk = file.metadata()?.len();
            if on_disk > valid_len {
                warn!(
                    path = %wal_path.display(),
                    dropped_bytes = on_disk - valid_len,
                    "truncating torn WAL tail"
                );
                file.set_len(valid_len)?;
            }
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            valid_len,
            poisoned: false,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    /// Appends a length-prefixed MessagePack record.
    ///
    /// On failure the file is cut back to the previous record boundary, so a
    /// later append never lands behind a partial record.
    pub fn append(&mut self, entry: &WalEntry) -> StoreResult<()> {
        if self.poisoned {
            return Err(io::Error::other("write-ahead log is unusable after a failed append").into());
        }
        if self.wal_file.is_none() {
            return Ok(());
        }

        let payload = rmp_serde::to_vec(entry)?;
        let mut record = Vec::with_capacity(payload.len() + 4);
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);

        if let Err(err) = self.write_record(&record) {
            warn!(path = %self.wal_path.display(), error = %err, "WAL append failed");
            self.discard_partial_record();
            return Err(err);
        }
        self.valid_len += record.len() as u64;
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    fn write_record(&mut self, record: &[u8]) -> StoreResult<()> {
        let Some(file) = self.wal_file.as_mut() else {
            return Ok(());
        };
        file.write_all(record)?;
        file.flush()?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn discard_partial_record(&mut self) {
        if let Err(err) = self.truncate_to(self.valid_len) {
            error!(
                path = %self.wal_path.display(),
                error = %err,
                "could not roll back failed WAL append, refusing further writes"
            );
            self.poisoned = true;
        }
    }

    fn truncate_to(&mut self, len: u64) -> StoreResult<()> {
        // Dropping the writer may flush leftover bytes; they land past `len`.
        self.wal_file = None;
        let file = OpenOptions::new().write(true).open(&self.wal_path)?;
        file.set_len(len)?;
        file.sync_all()?;
        drop(file);
        let file = OpenOptions::new().append(true).open(&self.wal_path)?;
        self.wal_file = Some(BufWriter::new(file));
        Ok(())
    }

    /// Reads every complete record. A torn trailing record is ignored.
    pub fn read_all(&self) -> StoreResult<Vec<WalEntry>> {
        Ok(scan_records(&self.wal_path)?.0)
    }

    pub fn clear(&mut self) -> StoreResult<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.truncate_to(0)?;
        self.valid_len = 0;
        self.poisoned = false;
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }
}

/// Complete records in the log and the byte offset just past the last one.
fn scan_records(path: &Path) -> StoreResult<(Vec<WalEntry>, u64)> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut offset = 0u64;
    loop {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!(path = %path.display(), "ignoring torn WAL record");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        entries.push(rmp_serde::from_slice(&data)?);
        offset += 4 + len as u64;
    }
    Ok((entries, offset))
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Writes to a temp file in the same directory, syncs, then renames over
    /// the previous snapshot.
    pub fn save(&self, snapshot: &DatabaseSnapshot) -> StoreResult<()> {
        let dir = self
            .snapshot_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        let serialized = rmp_serde::to_vec(snapshot)?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.snapshot_path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn load(&self) -> StoreResult<Option<DatabaseSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.snapshot_path)?;
        let snapshot: DatabaseSnapshot = rmp_serde::from_slice(&data)?;
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

/// State reconstructed from disk at startup.
pub struct Recovered {
    pub version: u64,
    pub tables: Tables,
    pub replayed: usize,
}

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        let wal = WalManager::new(data_dir.join(WAL_FILE), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(SNAPSHOT_FILE));
        Ok(Self {
            wal,
            snapshot,
            durability_mode,
        })
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.wal.set_checkpoint_threshold(threshold);
    }

    pub fn log(&mut self, entry: &WalEntry) -> StoreResult<()> {
        self.wal.append(entry)
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    pub fn checkpoint(&mut self, version: u64, tables: &Tables) -> StoreResult<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let snapshot = DatabaseSnapshot::new(version, tables.clone());
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        debug!(
            version,
            chambers = snapshot.metadata.chamber_count,
            deceased = snapshot.metadata.deceased_count,
            "checkpoint written"
        );
        Ok(())
    }

    /// Loads the latest snapshot and replays WAL entries newer than it.
    pub fn recover(&self) -> StoreResult<Option<Recovered>> {
        let (mut version, mut tables) = match self.snapshot.load()? {
            Some(snapshot) => (snapshot.version, snapshot.tables),
            None => (0, Tables::new()),
        };
        tables.rebuild_indexes()?;

        let entries = self.wal.read_all()?;
        if version == 0 && entries.is_empty() && !self.snapshot.exists() {
            return Ok(None);
        }

        let mut replayed = 0;
        for entry in entries {
            match entry {
                WalEntry::Commit {
                    version: entry_version,
                    changes,
                    ..
                } => {
                    if entry_version <= version {
                        continue;
                    }
                    for change in &changes {
                        tables.apply(change)?;
                    }
                    version = entry_version;
                    replayed += 1;
                }
            }
        }

        info!(version, replayed, "record store recovered");
        Ok(Some(Recovered {
            version,
            tables,
            replayed,
        }))
    }
}
