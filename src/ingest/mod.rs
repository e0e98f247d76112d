//! Datagram ingestion
//!
//! [`Ingestor`] turns one received payload into ledger rows; [`UdpListener`]
//! feeds it from a socket until shutdown. Transport is lossy by contract:
//! nothing is ever sent back and a failed write is logged, not retried.

mod listener;

pub use listener::{MAX_DATAGRAM_SIZE, UdpListener};

use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, error, info};

use crate::event::EventMessage;
use crate::ledger::{LedgerError, LedgerStore, SequenceIndex};
use crate::observability::Metrics;

/// What happened to one datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored {
        entry_id: String,
        seq: SequenceIndex,
        /// Marker index when the message id was indexed
        marker: Option<SequenceIndex>,
    },
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not a MessagePack map
    Undecodable,
    /// No usable `id` field
    MissingId,
    /// The store rejected the batch
    WriteFailed,
}

#[derive(Clone)]
pub struct Ingestor {
    store: LedgerStore,
    metrics: Arc<Metrics>,
}

impl Ingestor {
    pub fn new(store: LedgerStore, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Decode, validate and store one datagram
    pub fn receive(&self, payload: &[u8], source: SocketAddr) -> IngestOutcome {
        self.metrics.datagram_received();

        let message = match EventMessage::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                info!(
                    from = %source,
                    error = %err,
                    encoded = %BASE64.encode(payload),
                    "INVALIDMSG"
                );
                self.metrics.datagram_rejected();
                return IngestOutcome::Dropped(DropReason::Undecodable);
            }
        };

        let Some(entry_id) = message.entry_id() else {
            info!(
                from = %source,
                message = %serde_json::to_string(&message).unwrap_or_default(),
                "INVALIDMSG"
            );
            self.metrics.datagram_rejected();
            return IngestOutcome::Dropped(DropReason::MissingId);
        };

        info!(id = entry_id, from = %source, size = payload.len(), "LOGMSG");

        let seq = match self.store.insert(entry_id, payload) {
            Ok(seq) => seq,
            Err(err) => {
                self.report_write_failure(entry_id, &err);
                return IngestOutcome::Dropped(DropReason::WriteFailed);
            }
        };
        self.metrics.entry_stored();

        let marker = message
            .indexable_message_id()
            .and_then(|message_id| match self.store.attach_message_id(entry_id, &message_id) {
                Ok(marker) => {
                    self.metrics.message_id_attached();
                    Some(marker)
                }
                Err(err) => {
                    // The data record is already committed; only the index is lost
                    self.report_write_failure(entry_id, &err);
                    None
                }
            });

        IngestOutcome::Stored {
            entry_id: entry_id.to_string(),
            seq,
            marker,
        }
    }

    fn report_write_failure(&self, entry_id: &str, err: &LedgerError) {
        self.metrics.write_failed();
        match err {
            LedgerError::Closing => debug!(id = entry_id, "Store closing, datagram dropped"),
            _ => error!(id = entry_id, error = %err, "DBERR"),
        }
    }
}
