//! Fjall-backed event ledger
//!
//! Every received datagram lands in one ordered keyspace under three key
//! families (see [`keys`]):
//!
//! - Ledger rows keyed by sequence index, the retention order
//! - By-entry rows holding the raw payload, grouped per entry id
//! - Forward and reverse message-id index rows pointing back at entry ids
//!
//! Rows written together share one sequence index and are committed in one
//! batch, so the sweeper can always reconstruct and drop the whole set.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zonelog::ledger::LedgerStore;
//!
//! let store = LedgerStore::open("data/ledger")?;
//! store.insert("Q1", &payload)?;
//! let entries = store.get_by_entry_id("Q1")?;
//! ```

pub mod error;
pub mod keys;
pub mod pruning;
pub mod query;
pub mod sequence;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::{RetentionPolicy, RetentionSweeper, SweepPhase, SweepReport};
pub use query::{FIND_SCAN_LIMIT, KeyStream, LoggedEntry, MessageMatch, StoreStats};
pub use sequence::{SequenceGenerator, SequenceIndex};
pub use store::{LedgerStore, StoreOptions, WriteOp};
