//! Ingestion and retention counters plus tracing setup

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Process-wide counters shown on the stats endpoint
#[derive(Debug, Default)]
pub struct Metrics {
    datagrams_received: AtomicU64,
    datagrams_rejected: AtomicU64,
    entries_stored: AtomicU64,
    message_ids_attached: AtomicU64,
    write_failures: AtomicU64,
    rows_swept: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagram_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn datagram_rejected(&self) {
        self.datagrams_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "datagrams_rejected", "Metric incremented");
    }

    pub fn entry_stored(&self) {
        self.entries_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_id_attached(&self) {
        self.message_ids_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "write_failures", "Metric incremented");
    }

    pub fn rows_swept(&self, rows: u64) {
        self.rows_swept.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_rejected: self.datagrams_rejected.load(Ordering::Relaxed),
            entries_stored: self.entries_stored.load(Ordering::Relaxed),
            message_ids_attached: self.message_ids_attached.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            rows_swept: self.rows_swept.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_received: u64,
    pub datagrams_rejected: u64,
    pub entries_stored: u64,
    pub message_ids_attached: u64,
    pub write_failures: u64,
    pub rows_swept: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "datagrams_received: {}", self.datagrams_received)?;
        writeln!(f, "datagrams_rejected: {}", self.datagrams_rejected)?;
        writeln!(f, "entries_stored: {}", self.entries_stored)?;
        writeln!(f, "message_ids_attached: {}", self.message_ids_attached)?;
        writeln!(f, "write_failures: {}", self.write_failures)?;
        write!(f, "rows_swept: {}", self.rows_swept)
    }
}

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over the configured level when set. Calling this twice is
/// harmless; the second call keeps the first subscriber.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
