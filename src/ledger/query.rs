//! Read paths over the ledger: entry lookup, message-id search, key listing
//! and engine statistics.

use std::collections::HashSet;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::{debug, error};

use super::error::Result;
use super::keys::{Orientation, decode_entry_key, decode_message_key, entry_range, message_range};
use super::store::{LedgerStore, RangeScan};
use crate::event::{EventMessage, normalize_message_id};

/// Cap on rows read per orientation by [`LedgerStore::find_by_message_id`]
pub const FIND_SCAN_LIMIT: usize = 100;

/// A stored event decoded for display
///
/// Serializes as the event's own fields plus `timestamp`, which takes the
/// place of any `timestamp` field the event carried.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEntry {
    pub message: EventMessage,
    pub timestamp: DateTime<Utc>,
}

impl Serialize for LoggedEntry {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let message = &self.message;
        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = &message.id {
            map.serialize_entry("id", id)?;
        }
        if let Some(action) = &message.action {
            map.serialize_entry("action", action)?;
        }
        if let Some(message_id) = &message.message_id {
            map.serialize_entry("message-id", message_id)?;
        }
        let attributes = message
            .attributes
            .iter()
            .filter(|(key, _)| key.as_str() != "timestamp");
        for (key, value) in attributes {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.end()
    }
}

/// An entry id found through the message-id index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMatch {
    pub entry_id: String,
    /// Matched message id in `<...>` form
    pub message_id: String,
}

/// Engine-level statistics snapshot
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub disk_space: u64,
    pub journal_count: usize,
    pub partition_count: usize,
    pub approximate_rows: usize,
    pub write_buffer_size: u64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "disk_space: {}", self.disk_space)?;
        writeln!(f, "journal_count: {}", self.journal_count)?;
        writeln!(f, "partition_count: {}", self.partition_count)?;
        writeln!(f, "approximate_rows: {}", self.approximate_rows)?;
        write!(f, "write_buffer_size: {}", self.write_buffer_size)
    }
}

impl LedgerStore {
    /// All stored events for an entry id, oldest first
    ///
    /// Rows whose payload no longer decodes are logged and skipped. An empty
    /// result means nothing is stored; scan failures come back as errors.
    pub fn get_by_entry_id(&self, entry_id: &str) -> Result<Vec<LoggedEntry>> {
        let mut entries = Vec::new();

        for item in self.scan(entry_range(entry_id), None) {
            let (key, value) = item?;
            let Some((row_entry_id, seq)) = decode_entry_key(&key) else {
                debug!(entry_id, "Skipping malformed by-entry key");
                continue;
            };
            // Ids containing spaces can share a range prefix with this one
            if row_entry_id != entry_id {
                continue;
            }

            match EventMessage::decode(&value) {
                Ok(message) => entries.push(LoggedEntry {
                    message,
                    timestamp: self.sequence().time_of(&seq),
                }),
                Err(err) => {
                    error!(
                        entry_id,
                        %seq,
                        error = %err,
                        encoded = %BASE64.encode(&value),
                        "DECODEFAIL"
                    );
                }
            }
        }

        Ok(entries)
    }

    /// Search the message-id index from both ends of the id
    ///
    /// The forward scan matches ids starting with the normalized query, the
    /// reverse scan ids ending with it. Results are unique per entry id
    /// (forward matches win) and sorted by entry id.
    pub fn find_by_message_id(&self, raw: &str) -> Result<Vec<MessageMatch>> {
        let normalized = normalize_message_id(raw);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for orientation in Orientation::ALL {
            let fragment = orientation.apply(&normalized);
            let range = message_range(orientation, &fragment);

            for item in self.scan(range, Some(FIND_SCAN_LIMIT)) {
                let (key, value) = item?;
                let Some(decoded) = decode_message_key(&key) else {
                    debug!(query = %normalized, "Skipping malformed by-message key");
                    continue;
                };
                let entry_id = String::from_utf8_lossy(&value).into_owned();
                if seen.insert(entry_id.clone()) {
                    matches.push(MessageMatch {
                        entry_id,
                        message_id: format!("<{}>", decoded.message_id),
                    });
                }
            }
        }

        matches.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        Ok(matches)
    }

    /// Lazily list every key in the store
    pub fn list_keys(&self) -> KeyStream<'_> {
        KeyStream {
            scan: self.scan_all(),
        }
    }

    pub fn stat_snapshot(&self) -> StoreStats {
        StoreStats {
            disk_space: self.keyspace().disk_space(),
            journal_count: self.keyspace().journal_count(),
            partition_count: self.keyspace().partition_count(),
            approximate_rows: self.events().approximate_len(),
            write_buffer_size: self.keyspace().write_buffer_size(),
        }
    }
}

/// Raw keys in store order; stops after the first error
pub struct KeyStream<'a> {
    scan: RangeScan<'a>,
}

impl Iterator for KeyStream<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.scan.next()?;
        Some(item.map(|(key, _)| String::from_utf8_lossy(&key).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (LedgerStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::open(temp_dir.path().join("test_ledger")).unwrap();
        (store, temp_dir)
    }

    fn payload(value: serde_json::Value) -> Vec<u8> {
        rmp_serde::to_vec_named(&value).unwrap()
    }

    #[test]
    fn test_get_returns_entries_in_insertion_order() {
        let (store, _temp) = create_test_store();
        for step in 0..5 {
            store
                .insert("Q1", &payload(json!({"id": "Q1", "step": step})))
                .unwrap();
        }
        store.insert("Q2", &payload(json!({"id": "Q2"}))).unwrap();

        let entries = store.get_by_entry_id("Q1").unwrap();
        assert_eq!(entries.len(), 5);
        for (step, entry) in entries.iter().enumerate() {
            assert_eq!(entry.message.attributes["step"], json!(step));
        }
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_get_unknown_entry_is_empty() {
        let (store, _temp) = create_test_store();
        store.insert("Q1", &payload(json!({"id": "Q1"}))).unwrap();
        assert!(store.get_by_entry_id("missing").unwrap().is_empty());
    }

    #[test]
    fn test_get_skips_undecodable_rows() {
        let (store, _temp) = create_test_store();
        store.insert("Q1", &payload(json!({"id": "Q1", "n": 1}))).unwrap();
        store.insert("Q1", &[0xc1]).unwrap();
        store.insert("Q1", &payload(json!({"id": "Q1", "n": 2}))).unwrap();

        let entries = store.get_by_entry_id("Q1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message.attributes["n"], json!(2));
    }

    #[test]
    fn test_get_does_not_leak_ids_sharing_a_prefix() {
        let (store, _temp) = create_test_store();
        store.insert("Q1 extra", &payload(json!({"id": "Q1 extra"}))).unwrap();
        store.insert("Q1", &payload(json!({"id": "Q1"}))).unwrap();

        let entries = store.get_by_entry_id("Q1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.id.as_deref(), Some("Q1"));
    }

    #[test]
    fn test_entry_timestamp_replaces_event_timestamp() {
        let (store, _temp) = create_test_store();
        store
            .insert(
                "Q1",
                &payload(json!({"id": "Q1", "timestamp": "from the mta", "n": 1})),
            )
            .unwrap();

        let entries = store.get_by_entry_id("Q1").unwrap();
        let rendered = serde_json::to_string(&entries[0]).unwrap();
        assert_eq!(rendered.matches("\"timestamp\"").count(), 1);

        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["id"], json!("Q1"));
        assert_eq!(value["n"], json!(1));
        assert_eq!(value["timestamp"], json!(entries[0].timestamp));
    }

    #[test]
    fn test_find_matches_non_ascii_continuation() {
        let (store, _temp) = create_test_store();
        store.attach_message_id("Q1", "abcé@x").unwrap();
        store.attach_message_id("Q2", "abc~@x").unwrap();

        let ids: Vec<_> = store
            .find_by_message_id("abc")
            .unwrap()
            .into_iter()
            .map(|m| m.entry_id)
            .collect();
        assert_eq!(ids, vec!["Q1", "Q2"]);
    }

    #[test]
    fn test_find_is_normalization_insensitive() {
        let (store, _temp) = create_test_store();
        store.attach_message_id("Q1", "foo@bar").unwrap();

        let expected = vec![MessageMatch {
            entry_id: "Q1".to_string(),
            message_id: "<foo@bar>".to_string(),
        }];
        for query in ["<Foo@Bar>", "foo@bar", " FOO@BAR "] {
            assert_eq!(store.find_by_message_id(query).unwrap(), expected);
        }
    }

    #[test]
    fn test_find_matches_prefix_and_suffix() {
        let (store, _temp) = create_test_store();
        store.attach_message_id("Q1", "abc@example.com").unwrap();
        store.attach_message_id("Q2", "xyz@example.com").unwrap();
        store.attach_message_id("Q3", "abc@other.org").unwrap();

        let by_prefix: Vec<_> = store
            .find_by_message_id("abc@")
            .unwrap()
            .into_iter()
            .map(|m| m.entry_id)
            .collect();
        assert_eq!(by_prefix, vec!["Q1", "Q3"]);

        let by_suffix = store.find_by_message_id("@example.com").unwrap();
        assert_eq!(
            by_suffix,
            vec![
                MessageMatch {
                    entry_id: "Q1".to_string(),
                    message_id: "<abc@example.com>".to_string(),
                },
                MessageMatch {
                    entry_id: "Q2".to_string(),
                    message_id: "<xyz@example.com>".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_find_dedupes_and_sorts_by_entry_id() {
        let (store, _temp) = create_test_store();
        store.attach_message_id("Q9", "dup@x").unwrap();
        store.attach_message_id("Q1", "dup@x").unwrap();
        store.attach_message_id("Q9", "dup@x").unwrap();

        let matches = store.find_by_message_id("dup@x").unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["Q1", "Q9"]);
    }

    #[test]
    fn test_find_empty_query_returns_nothing() {
        let (store, _temp) = create_test_store();
        store.attach_message_id("Q1", "abc@x").unwrap();
        assert!(store.find_by_message_id(" <> ").unwrap().is_empty());
    }

    #[test]
    fn test_list_keys_is_lazy_and_ordered() {
        let (store, _temp) = create_test_store();
        store.insert("Q1", b"x").unwrap();
        store.attach_message_id("Q1", "abc@x").unwrap();

        let first_two: Vec<_> = store.list_keys().take(2).map(|k| k.unwrap()).collect();
        assert_eq!(first_two.len(), 2);
        assert!(first_two[0].starts_with("by-entry Q1 "));
        assert!(first_two[1].starts_with("by-message fwd abc@x "));

        assert_eq!(store.list_keys().count(), 5);
    }

    #[test]
    fn test_list_keys_reports_shutdown() {
        let (store, _temp) = create_test_store();
        store.insert("Q1", b"x").unwrap();
        store.shutdown_token().cancel();

        let items: Vec<_> = store.list_keys().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(LedgerError::Closing)));
    }

    #[test]
    fn test_stat_snapshot_renders() {
        let (store, _temp) = create_test_store();
        store.insert("Q1", b"x").unwrap();

        let stats = store.stat_snapshot();
        assert!(stats.partition_count >= 1);
        assert!(stats.to_string().contains("approximate_rows:"));
    }
}
