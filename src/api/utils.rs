//! API utility functions
//!
//! Pure helpers for request processing, kept apart from the handlers so they
//! can be unit tested.

use serde_json::Value;

use crate::ledger::LoggedEntry;

/// Split a `/get` path segment into entry id and optional `seq` filter
///
/// `Q1.2` asks for entries of `Q1` whose `seq` attribute is `2`. The split
/// happens at the last dot; a trailing dot means no filter.
pub fn split_entry_filter(raw: &str) -> (&str, Option<&str>) {
    match raw.rsplit_once('.') {
        Some((id, seq)) if !seq.is_empty() => (id, Some(seq)),
        Some((id, _)) => (id, None),
        None => (raw, None),
    }
}

/// Entries without a `seq` attribute always match
pub fn matches_seq(entry: &LoggedEntry, seq: &str) -> bool {
    match entry.message.attributes.get("seq") {
        None | Some(Value::Null) => true,
        Some(Value::String(value)) => value.is_empty() || value == seq,
        Some(Value::Number(value)) => value.to_string() == seq,
        Some(_) => false,
    }
}
