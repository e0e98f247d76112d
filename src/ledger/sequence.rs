//! Monotonic, time-ordered sequence indexes
//!
//! A token is 16 lowercase hex digits. The high 48 bits hold milliseconds
//! since the Unix epoch, the low 16 bits a counter that disambiguates calls
//! within the same millisecond. Fixed width keeps string order equal to
//! numeric order, so tokens sort correctly inside store keys.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use super::error::LedgerError;

const COUNTER_BITS: u32 = 16;
const TOKEN_LEN: usize = 16;

/// Opaque sequence index as stored inside keys
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceIndex(String);

impl SequenceIndex {
    fn from_raw(raw: u64) -> Self {
        Self(format!("{:016x}", raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn raw(&self) -> u64 {
        // Constructors only admit valid hex
        u64::from_str_radix(&self.0, 16).unwrap_or_default()
    }

    /// Wall-clock time embedded in the token (millisecond precision)
    pub fn time(&self) -> DateTime<Utc> {
        let millis = (self.raw() >> COUNTER_BITS) as i64;
        Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
    }
}

impl fmt::Display for SequenceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SequenceIndex {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == TOKEN_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(LedgerError::InvalidKey(format!("bad sequence index: {s}")));
        }
        Ok(Self(s.to_string()))
    }
}

/// Generator for strictly increasing sequence indexes
///
/// State is a single packed `u64` (millis << 16 | counter). When the clock
/// has not advanced, the next value is the previous one plus one, so a
/// counter overflow carries into the time component instead of wrapping.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh index for the current time
    pub fn next(&self) -> SequenceIndex {
        self.next_at(Utc::now())
    }

    /// Allocate a fresh index as if the clock read `now`
    ///
    /// The result is still strictly greater than anything handed out before,
    /// even when `now` is earlier than a previous call.
    pub fn next_at(&self, now: DateTime<Utc>) -> SequenceIndex {
        let floor = pack(now);
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = if floor > current { floor } else { current + 1 };
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return SequenceIndex::from_raw(candidate),
                Err(actual) => current = actual,
            }
        }
    }

    /// The index `next()` would produce at `time` with the counter zeroed
    pub fn bound_for(&self, time: DateTime<Utc>) -> SequenceIndex {
        SequenceIndex::from_raw(pack(time))
    }

    /// Approximate inverse of `next()`
    pub fn time_of(&self, index: &SequenceIndex) -> DateTime<Utc> {
        index.time()
    }
}

fn pack(time: DateTime<Utc>) -> u64 {
    let millis = time.timestamp_millis().max(0) as u64;
    millis << COUNTER_BITS
}
