//! Key layout and encoding utilities for the `events` partition
//!
//! All three key families share one ordered keyspace:
//! - `ledger {seq}` -> entry id (data record) or `\0mid\0{message_id}` (marker record)
//! - `by-entry {entry_id} {seq}` -> raw datagram payload
//! - `by-message fwd {message_id} {seq}` -> entry id
//! - `by-message rev {reversed message_id} {seq}` -> entry id
//!
//! Entry scans run from `"{prefix} "` to `"{prefix} ~"`; what follows the
//! prefix there is always a hex sequence index. Message-id scans follow the
//! prefix with arbitrary UTF-8, so they end at a `0xff` byte instead, which
//! never occurs in UTF-8.

use std::ops::Range;

use super::sequence::SequenceIndex;

pub const LEDGER: &str = "ledger";
pub const BY_ENTRY: &str = "by-entry";
pub const BY_MESSAGE: &str = "by-message";

pub const SCAN_END: char = '~';

/// Upper bound byte for scans over free-form UTF-8 segments
pub const UTF8_SCAN_END: u8 = 0xff;

/// Prefix that distinguishes marker records from data records
pub const MARKER_SENTINEL: &[u8] = b"\0mid\0";

/// Which end of a message id the index row is searchable from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reverse,
}

impl Orientation {
    pub const ALL: [Orientation; 2] = [Orientation::Forward, Orientation::Reverse];

    fn tag(self) -> &'static str {
        match self {
            Orientation::Forward => "fwd",
            Orientation::Reverse => "rev",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "fwd" => Some(Orientation::Forward),
            "rev" => Some(Orientation::Reverse),
            _ => None,
        }
    }

    /// Orient a message id. Reversal is its own inverse.
    pub fn apply(self, message_id: &str) -> String {
        match self {
            Orientation::Forward => message_id.to_string(),
            Orientation::Reverse => reverse(message_id),
        }
    }
}

pub fn reverse(value: &str) -> String {
    value.chars().rev().collect()
}

/// A ledger row decoded back into the rows that depend on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub seq: SequenceIndex,
    pub kind: RecordKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Data { entry_id: String },
    Marker { message_id: String },
}

impl LedgerRecord {
    /// Every key sharing this record's sequence index, ledger row included
    pub fn delete_set(&self) -> Vec<Vec<u8>> {
        let mut keys = vec![encode_ledger_key(&self.seq)];
        match &self.kind {
            RecordKind::Data { entry_id } => {
                keys.push(encode_entry_key(entry_id, &self.seq));
            }
            RecordKind::Marker { message_id } => {
                for orientation in Orientation::ALL {
                    keys.push(encode_message_key(orientation, message_id, &self.seq));
                }
            }
        }
        keys
    }
}

/// Encode a ledger key: ledger {seq}
pub fn encode_ledger_key(seq: &SequenceIndex) -> Vec<u8> {
    format!("{} {}", LEDGER, seq).into_bytes()
}

/// Half-open range over ledger rows strictly below `cutoff`
pub fn ledger_range_until(cutoff: &SequenceIndex) -> Range<Vec<u8>> {
    format!("{} ", LEDGER).into_bytes()..encode_ledger_key(cutoff)
}

/// Decode a ledger row into its record, using the value to tell the kinds apart
pub fn decode_ledger_record(key: &[u8], value: &[u8]) -> Option<LedgerRecord> {
    let key_str = std::str::from_utf8(key).ok()?;
    let seq = key_str
        .strip_prefix(LEDGER)?
        .strip_prefix(' ')?
        .parse()
        .ok()?;

    let kind = match value.strip_prefix(MARKER_SENTINEL) {
        Some(message_id) => RecordKind::Marker {
            message_id: String::from_utf8(message_id.to_vec()).ok()?,
        },
        None => RecordKind::Data {
            entry_id: String::from_utf8(value.to_vec()).ok()?,
        },
    };

    Some(LedgerRecord { seq, kind })
}

/// Encode a marker record value: \0mid\0{message_id}
pub fn encode_marker_value(message_id: &str) -> Vec<u8> {
    let mut value = MARKER_SENTINEL.to_vec();
    value.extend_from_slice(message_id.as_bytes());
    value
}

/// Encode a by-entry key: by-entry {entry_id} {seq}
pub fn encode_entry_key(entry_id: &str, seq: &SequenceIndex) -> Vec<u8> {
    format!("{} {} {}", BY_ENTRY, entry_id, seq).into_bytes()
}

/// Range covering every by-entry row of one entry id
pub fn entry_range(entry_id: &str) -> Range<Vec<u8>> {
    format!("{} {} ", BY_ENTRY, entry_id).into_bytes()
        ..format!("{} {} {}", BY_ENTRY, entry_id, SCAN_END).into_bytes()
}

/// Decode a by-entry key: by-entry {entry_id} {seq} -> (entry_id, seq)
pub fn decode_entry_key(key: &[u8]) -> Option<(String, SequenceIndex)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let rest = key_str.strip_prefix(BY_ENTRY)?.strip_prefix(' ')?;
    let (entry_id, seq) = rest.rsplit_once(' ')?;
    Some((entry_id.to_string(), seq.parse().ok()?))
}

/// Encode a message-id index key; `message_id` is given in forward form
pub fn encode_message_key(
    orientation: Orientation,
    message_id: &str,
    seq: &SequenceIndex,
) -> Vec<u8> {
    format!(
        "{} {} {} {}",
        BY_MESSAGE,
        orientation.tag(),
        orientation.apply(message_id),
        seq
    )
    .into_bytes()
}

/// Range over index rows whose oriented id starts with `fragment`
pub fn message_range(orientation: Orientation, fragment: &str) -> Range<Vec<u8>> {
    let prefix = format!("{} {} {}", BY_MESSAGE, orientation.tag(), fragment).into_bytes();
    let mut end = prefix.clone();
    end.push(UTF8_SCAN_END);
    prefix..end
}

/// A decoded message-id index key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    pub orientation: Orientation,
    /// Always in forward form, whatever the orientation of the row
    pub message_id: String,
    pub seq: SequenceIndex,
}

pub fn decode_message_key(key: &[u8]) -> Option<MessageKey> {
    let key_str = std::str::from_utf8(key).ok()?;
    let rest = key_str.strip_prefix(BY_MESSAGE)?.strip_prefix(' ')?;
    let (tag, rest) = rest.split_once(' ')?;
    let orientation = Orientation::from_tag(tag)?;
    let (oriented, seq) = rest.rsplit_once(' ')?;
    Some(MessageKey {
        orientation,
        message_id: orientation.apply(oriented),
        seq: seq.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq() -> SequenceIndex {
        "0000018f00000001".parse().unwrap()
    }

    #[test]
    fn test_ledger_key_encoding() {
        assert_eq!(encode_ledger_key(&seq()), b"ledger 0000018f00000001");
    }

    #[test]
    fn test_ledger_range_is_half_open() {
        let cutoff = seq();
        let range = ledger_range_until(&cutoff);
        let below: SequenceIndex = "0000018f00000000".parse().unwrap();

        assert!(range.contains(&encode_ledger_key(&below)));
        assert!(!range.contains(&encode_ledger_key(&cutoff)));
        assert!(!range.contains(&encode_entry_key("Q1", &below)));
    }

    #[test]
    fn test_entry_key_roundtrip() {
        let key = encode_entry_key("Q1.001", &seq());
        assert_eq!(key, b"by-entry Q1.001 0000018f00000001");

        let (entry_id, decoded_seq) = decode_entry_key(&key).unwrap();
        assert_eq!(entry_id, "Q1.001");
        assert_eq!(decoded_seq, seq());
    }

    #[test]
    fn test_entry_range_bounds_one_entry() {
        let range = entry_range("Q1");
        assert!(range.contains(&encode_entry_key("Q1", &seq())));
        assert!(!range.contains(&encode_entry_key("Q10", &seq())));
        assert!(!range.contains(&encode_entry_key("Q", &seq())));
    }

    #[test]
    fn test_message_key_orientations() {
        let forward = encode_message_key(Orientation::Forward, "abc@x", &seq());
        let reverse = encode_message_key(Orientation::Reverse, "abc@x", &seq());

        assert_eq!(forward, b"by-message fwd abc@x 0000018f00000001");
        assert_eq!(reverse, b"by-message rev x@cba 0000018f00000001");

        let decoded = decode_message_key(&reverse).unwrap();
        assert_eq!(decoded.orientation, Orientation::Reverse);
        assert_eq!(decoded.message_id, "abc@x");
        assert_eq!(decoded.seq, seq());
    }

    #[test]
    fn test_message_range_matches_prefix_and_suffix() {
        let forward = message_range(Orientation::Forward, "abc");
        assert!(forward.contains(&encode_message_key(Orientation::Forward, "abc@x", &seq())));
        assert!(!forward.contains(&encode_message_key(Orientation::Forward, "abd@x", &seq())));

        let reverse = message_range(Orientation::Reverse, &reverse("@x"));
        assert!(reverse.contains(&encode_message_key(Orientation::Reverse, "abc@x", &seq())));
        assert!(!reverse.contains(&encode_message_key(Orientation::Reverse, "abc@y", &seq())));
    }

    #[test]
    fn test_message_range_covers_non_ascii_continuations() {
        let forward = message_range(Orientation::Forward, "abc");
        for message_id in ["abcé@x", "abc~@x", "abc\u{10ffff}@x"] {
            let key = encode_message_key(Orientation::Forward, message_id, &seq());
            assert!(forward.contains(&key), "{message_id} not in range");
        }
        assert!(!forward.contains(&encode_message_key(Orientation::Forward, "abd", &seq())));

        let reverse = message_range(Orientation::Reverse, &reverse("@éxample.org"));
        assert!(reverse.contains(&encode_message_key(
            Orientation::Reverse,
            "ü@éxample.org",
            &seq()
        )));
    }

    #[test]
    fn test_decode_ledger_record_kinds() {
        let key = encode_ledger_key(&seq());

        let data = decode_ledger_record(&key, b"Q1").unwrap();
        assert_eq!(
            data.kind,
            RecordKind::Data {
                entry_id: "Q1".to_string()
            }
        );

        let marker = decode_ledger_record(&key, &encode_marker_value("abc@x")).unwrap();
        assert_eq!(
            marker.kind,
            RecordKind::Marker {
                message_id: "abc@x".to_string()
            }
        );

        assert!(decode_ledger_record(b"by-entry Q1 0000018f00000001", b"Q1").is_none());
    }

    #[test]
    fn test_delete_sets() {
        let data = LedgerRecord {
            seq: seq(),
            kind: RecordKind::Data {
                entry_id: "Q1".to_string(),
            },
        };
        assert_eq!(
            data.delete_set(),
            vec![encode_ledger_key(&seq()), encode_entry_key("Q1", &seq())]
        );

        let marker = LedgerRecord {
            seq: seq(),
            kind: RecordKind::Marker {
                message_id: "abc@x".to_string(),
            },
        };
        assert_eq!(
            marker.delete_set(),
            vec![
                encode_ledger_key(&seq()),
                encode_message_key(Orientation::Forward, "abc@x", &seq()),
                encode_message_key(Orientation::Reverse, "abc@x", &seq()),
            ]
        );
    }
}
