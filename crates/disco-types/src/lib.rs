use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Identifier of the node that originated an entry version.
pub type NodeId = String;

/// Address of a replication peer, e.g. `http://10.0.0.7:17001`.
pub type PeerEndpoint = String;

/// The unit of replication within a named store.
///
/// `value == None` is a tombstone. Tombstones carry a version and timestamp
/// like any other entry so that a deletion outranks stale copies of the key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    /// Per-key logical counter assigned by `origin`.
    pub version: u64,
    pub origin: NodeId,
    /// Wall-clock milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// `None` means the entry never expires on its own.
    pub max_age_ms: Option<u64>,
}

impl Entry {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Absolute expiry in epoch milliseconds, if the entry has a TTL.
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.max_age_ms
            .filter(|&ms| ms > 0)
            .map(|ms| self.timestamp_ms.saturating_add(ms.min(i64::MAX as u64) as i64))
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms().is_some_and(|exp| exp <= now_ms)
    }

    /// A live entry is neither a tombstone nor expired.
    pub fn is_live(&self, now_ms: i64) -> bool {
        !self.is_tombstone() && !self.is_expired(now_ms)
    }

    /// Structural checks applied to entries received from peers.
    pub fn validate(&self) -> Result<(), DiscoError> {
        if self.key.is_empty() {
            return Err(DiscoError::InvalidArgument("entry key must not be empty".into()));
        }
        if self.origin.is_empty() {
            return Err(DiscoError::InvalidArgument("entry origin must not be empty".into()));
        }
        if self.version == 0 {
            return Err(DiscoError::InvalidArgument("entry version must be positive".into()));
        }
        if self.timestamp_ms < 0 {
            return Err(DiscoError::InvalidArgument(format!(
                "entry timestamp out of range: {}",
                self.timestamp_ms
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time for entry timestamps and expiry.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        ManualClock { now_ms: AtomicI64::new(start_ms) }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum DiscoError {
    #[error("not found")]
    NotFound,
    #[error("operation timed out")]
    Timeout,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: Option<&[u8]>, timestamp_ms: i64, max_age_ms: Option<u64>) -> Entry {
        Entry {
            key: b"k".to_vec(),
            value: value.map(|v| v.to_vec()),
            version: 1,
            origin: "node-a".into(),
            timestamp_ms,
            max_age_ms,
        }
    }

    #[test]
    fn entry_without_ttl_never_expires() {
        let e = entry(Some(b"v"), 100, None);
        assert_eq!(e.expires_at_ms(), None);
        assert!(e.is_live(i64::MAX));

        // Zero is treated the same as absent.
        let e = entry(Some(b"v"), 100, Some(0));
        assert!(!e.is_expired(i64::MAX));
    }

    #[test]
    fn entry_expires_at_timestamp_plus_max_age() {
        let e = entry(Some(b"v"), 1_000, Some(500));
        assert_eq!(e.expires_at_ms(), Some(1_500));
        assert!(e.is_live(1_499));
        assert!(!e.is_live(1_500));
    }

    #[test]
    fn tombstone_is_never_live() {
        let e = entry(None, 1_000, None);
        assert!(e.is_tombstone());
        assert!(!e.is_live(1_000));
    }

    #[test]
    fn validate_rejects_malformed_entries() {
        assert!(entry(Some(b"v"), 1, None).validate().is_ok());

        let mut e = entry(Some(b"v"), 1, None);
        e.key.clear();
        assert!(matches!(e.validate(), Err(DiscoError::InvalidArgument(_))));

        let mut e = entry(Some(b"v"), 1, None);
        e.origin.clear();
        assert!(e.validate().is_err());

        let mut e = entry(Some(b"v"), 1, None);
        e.version = 0;
        assert!(e.validate().is_err());

        assert!(entry(Some(b"v"), -5, None).validate().is_err());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(10);
        clock.advance(Duration::from_millis(90));
        assert_eq!(clock.now_ms(), 100);
        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
