use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, Slice};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{LedgerError, Result};
use super::keys::{
    Orientation, encode_entry_key, encode_ledger_key, encode_marker_value, encode_message_key,
};
use super::sequence::{SequenceGenerator, SequenceIndex};

const EVENTS_PARTITION: &str = "events";

/// Tuning knobs passed through to fjall
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub cache_size: u64,
    pub write_buffer_size: u64,
    pub block_size: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_size: 32 * 1024 * 1024,
            write_buffer_size: 60 * 1024 * 1024,
            block_size: 4 * 1024,
        }
    }
}

/// Fjall-backed event ledger
///
/// One `events` partition holds the ledger, by-entry and by-message key
/// families (see [`super::keys`]). The store owns the sequence generator and
/// the process-wide shutdown token; clones share both.
#[derive(Clone)]
pub struct LedgerStore {
    keyspace: Keyspace,
    events: PartitionHandle,
    sequence: Arc<SequenceGenerator>,
    shutdown: CancellationToken,
}

impl LedgerStore {
    /// Open or create a store at the given path with default tuning
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger store at: {}", path.display());

        std::fs::create_dir_all(path)?;

        let keyspace = Config::new(path)
            .cache_size(options.cache_size)
            .max_write_buffer_size(options.write_buffer_size)
            .open()?;

        let events = keyspace.open_partition(
            EVENTS_PARTITION,
            PartitionCreateOptions::default().block_size(options.block_size),
        )?;

        info!("Ledger store opened successfully");
        Ok(Self {
            keyspace,
            events,
            sequence: Arc::new(SequenceGenerator::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn sequence(&self) -> &SequenceGenerator {
        &self.sequence
    }

    /// Token cancelled once the store starts closing
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Store one received payload under its entry id
    ///
    /// Writes the ledger data record and the by-entry row in one batch.
    pub fn insert(&self, entry_id: &str, payload: &[u8]) -> Result<SequenceIndex> {
        let seq = self.sequence.next();
        self.apply(vec![
            WriteOp::Put(encode_ledger_key(&seq), entry_id.as_bytes().to_vec()),
            WriteOp::Put(encode_entry_key(entry_id, &seq), payload.to_vec()),
        ])?;
        debug!(entry_id, %seq, size = payload.len(), "Inserted entry");
        Ok(seq)
    }

    /// Index an entry under a normalized message id
    ///
    /// Allocates its own sequence index and writes a marker record plus the
    /// forward and reverse index rows in one batch.
    pub fn attach_message_id(&self, entry_id: &str, message_id: &str) -> Result<SequenceIndex> {
        let seq = self.sequence.next();
        let mut ops = vec![WriteOp::Put(
            encode_ledger_key(&seq),
            encode_marker_value(message_id),
        )];
        for orientation in Orientation::ALL {
            ops.push(WriteOp::Put(
                encode_message_key(orientation, message_id, &seq),
                entry_id.as_bytes().to_vec(),
            ));
        }
        self.apply(ops)?;
        debug!(entry_id, message_id, %seq, "Attached message id");
        Ok(seq)
    }

    /// Apply a set of writes atomically
    pub fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        if self.is_closing() {
            return Err(LedgerError::Closing);
        }
        let mut batch = self.keyspace.batch();
        for op in ops {
            match op {
                WriteOp::Put(key, value) => batch.insert(&self.events, key, value),
                WriteOp::Delete(key) => batch.remove(&self.events, key),
            }
        }
        batch.commit()?;
        Ok(())
    }

    /// Ordered scan over `range`, stopping at `limit` rows or at shutdown
    pub fn scan(&self, range: Range<Vec<u8>>, limit: Option<usize>) -> RangeScan<'_> {
        RangeScan {
            inner: Box::new(self.events.range(range)),
            shutdown: self.shutdown.clone(),
            remaining: limit,
            done: false,
        }
    }

    /// Ordered scan over the whole partition
    pub fn scan_all(&self) -> RangeScan<'_> {
        RangeScan {
            inner: Box::new(self.events.iter()),
            shutdown: self.shutdown.clone(),
            remaining: None,
            done: false,
        }
    }

    pub(crate) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub(crate) fn events(&self) -> &PartitionHandle {
        &self.events
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Stop accepting writes, flush and release this handle
    ///
    /// Other clones observe the cancelled token and wind down on their own;
    /// the keyspace closes once the last clone is dropped.
    pub fn close(self) -> Result<()> {
        info!("Closing ledger store");
        self.shutdown.cancel();
        self.persist()?;
        info!("Ledger store closed");
        Ok(())
    }
}

/// One write inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Lazy, cancellable iterator over key/value pairs
///
/// Yields [`LedgerError::Closing`] once if shutdown starts mid-scan, then
/// ends. Dropping it releases the underlying fjall iterator.
pub struct RangeScan<'a> {
    inner: Box<dyn Iterator<Item = std::result::Result<(Slice, Slice), fjall::Error>> + 'a>,
    shutdown: CancellationToken,
    remaining: Option<usize>,
    done: bool,
}

impl Iterator for RangeScan<'_> {
    type Item = Result<(Slice, Slice)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        if self.shutdown.is_cancelled() {
            self.done = true;
            return Some(Err(LedgerError::Closing));
        }
        let item = self.inner.next()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(item.map_err(|err| {
            self.done = true;
            LedgerError::from(err)
        }))
    }
}
