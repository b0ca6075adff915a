//! Per-device snapshot history.
//!
//! [`HistoryStore`] holds an append-only, time-ordered log of snapshots per
//! device. Durable storage is delegated to a [`SnapshotPersistence`]
//! implementation injected at construction.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use switchlog::history::{HistoryStore, MemoryPersistence};
//! use switchlog::record::{Record, StpPortRecord};
//! use switchlog::snapshot::Snapshot;
//!
//! let mut store = HistoryStore::open(MemoryPersistence::new())?;
//! let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let snapshot = Snapshot::build("sw1", at, [Record::from(StpPortRecord::new("Gi0/1"))])?;
//! store.append(snapshot)?;
//!
//! assert_eq!(store.latest("sw1")?.timestamp(), at);
//! assert!(store.previous("sw1").is_err());
//! store.close()?;
//! # Ok::<(), switchlog::Error>(())
//! ```

mod jsonl;
mod memory;

pub use jsonl::{DEFAULT_MAX_KEEP, JsonLinesPersistence};
pub use memory::MemoryPersistence;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::snapshot::Snapshot;

/// Durable storage behind a [`HistoryStore`].
pub trait SnapshotPersistence {
    /// Load every stored snapshot, grouped by device id, in stored order.
    fn load(&mut self) -> Result<BTreeMap<String, Vec<Snapshot>>, HistoryError>;

    /// Durably record one snapshot after the device's existing ones.
    fn append(&mut self, snapshot: &Snapshot) -> Result<(), HistoryError>;

    /// Flush pending writes and apply any retention policy.
    fn flush(&mut self) -> Result<(), HistoryError>;
}

/// Which stored snapshot a diff compares the latest one against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Baseline {
    /// The second most recent snapshot.
    #[default]
    Previous,

    /// The oldest retained snapshot.
    Oldest,
}

impl FromStr for Baseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "previous" => Ok(Self::Previous),
            "oldest" => Ok(Self::Oldest),
            other => Err(format!("unknown baseline '{}' (expected previous or oldest)", other)),
        }
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Previous => f.write_str("previous"),
            Self::Oldest => f.write_str("oldest"),
        }
    }
}

/// Read-only view of one device's snapshots, oldest first.
///
/// Cheap to copy; every call to [`iter`](Self::iter) starts over from the
/// oldest snapshot.
#[derive(Debug, Clone, Copy)]
pub struct History<'a> {
    snapshots: &'a [Snapshot],
}

impl<'a> History<'a> {
    pub fn iter(&self) -> std::slice::Iter<'a, Snapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn oldest(&self) -> Option<&'a Snapshot> {
        self.snapshots.first()
    }

    pub fn newest(&self) -> Option<&'a Snapshot> {
        self.snapshots.last()
    }
}

impl<'a> IntoIterator for History<'a> {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

/// Append-only snapshot log keyed by device id.
#[derive(Debug)]
pub struct HistoryStore<P: SnapshotPersistence> {
    persistence: P,
    devices: BTreeMap<String, Vec<Snapshot>>,
}

impl<P: SnapshotPersistence> HistoryStore<P> {
    /// Load existing history from `persistence`.
    ///
    /// Fails if stored snapshots for a device are not strictly ordered by
    /// timestamp.
    pub fn open(mut persistence: P) -> Result<Self, HistoryError> {
        let devices = persistence.load()?;

        for (device_id, snapshots) in &devices {
            for pair in snapshots.windows(2) {
                if pair[1].timestamp() <= pair[0].timestamp() {
                    return Err(HistoryError::OutOfOrder {
                        device_id: device_id.clone(),
                        last: pair[0].timestamp(),
                        attempted: pair[1].timestamp(),
                    });
                }
            }
            debug!("Loaded {} snapshot(s) for {}", snapshots.len(), device_id);
        }

        Ok(Self {
            persistence,
            devices,
        })
    }

    /// Append a snapshot to the end of its device's log.
    ///
    /// The timestamp must be strictly after the last stored one. The
    /// snapshot becomes visible only once persistence accepted it.
    pub fn append(&mut self, snapshot: Snapshot) -> Result<&Snapshot, HistoryError> {
        if let Some(last) = self
            .devices
            .get(snapshot.device_id())
            .and_then(|log| log.last())
            && snapshot.timestamp() <= last.timestamp()
        {
            return Err(HistoryError::OutOfOrder {
                device_id: snapshot.device_id().to_string(),
                last: last.timestamp(),
                attempted: snapshot.timestamp(),
            });
        }

        self.persistence.append(&snapshot)?;

        info!(
            "Stored snapshot for {} at {} ({} records)",
            snapshot.device_id(),
            snapshot.timestamp(),
            snapshot.len()
        );

        let log = self
            .devices
            .entry(snapshot.device_id().to_string())
            .or_default();
        log.push(snapshot);
        Ok(&log[log.len() - 1])
    }

    /// Most recent snapshot for a device.
    pub fn latest(&self, device_id: &str) -> Result<&Snapshot, HistoryError> {
        self.nth_back(device_id, 1)
    }

    /// Second most recent snapshot for a device.
    pub fn previous(&self, device_id: &str) -> Result<&Snapshot, HistoryError> {
        self.nth_back(device_id, 2)
    }

    /// Snapshot to diff the latest one against.
    ///
    /// Both baselines need at least two snapshots so the baseline is never
    /// the latest snapshot itself.
    pub fn baseline(&self, device_id: &str, baseline: Baseline) -> Result<&Snapshot, HistoryError> {
        match baseline {
            Baseline::Previous => self.previous(device_id),
            Baseline::Oldest => {
                self.require(device_id, 2)?;
                self.nth_back(device_id, self.all(device_id).len())
            }
        }
    }

    /// All snapshots for a device, oldest first. Unknown devices have an
    /// empty history.
    pub fn all(&self, device_id: &str) -> History<'_> {
        History {
            snapshots: self
                .devices
                .get(device_id)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }

    /// Device ids with at least one snapshot.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Flush persistence without closing the store.
    pub fn flush(&mut self) -> Result<(), HistoryError> {
        self.persistence.flush()
    }

    /// Flush persistence and release the store.
    pub fn close(mut self) -> Result<(), HistoryError> {
        self.persistence.flush()
    }

    fn require(&self, device_id: &str, required: usize) -> Result<(), HistoryError> {
        let available = self.all(device_id).len();
        if available < required {
            return Err(HistoryError::NoHistory {
                device_id: device_id.to_string(),
                required,
                available,
            });
        }
        Ok(())
    }

    fn nth_back(&self, device_id: &str, n: usize) -> Result<&Snapshot, HistoryError> {
        self.require(device_id, n)?;
        let history = self.all(device_id).snapshots;
        Ok(&history[history.len() - n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, StpPortRecord, StpState};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn snapshot(device: &str, minute: u32) -> Snapshot {
        let record = StpPortRecord::new("Gi0/1").with_state(StpState::Forwarding);
        Snapshot::build(device, at(minute), [Record::from(record)]).unwrap()
    }

    #[test]
    fn test_latest_and_previous() {
        let mut store = HistoryStore::open(MemoryPersistence::new()).unwrap();
        assert!(matches!(
            store.latest("sw1"),
            Err(HistoryError::NoHistory {
                required: 1,
                available: 0,
                ..
            })
        ));

        store.append(snapshot("sw1", 1)).unwrap();
        assert_eq!(store.latest("sw1").unwrap().timestamp(), at(1));
        assert!(matches!(
            store.previous("sw1"),
            Err(HistoryError::NoHistory {
                required: 2,
                available: 1,
                ..
            })
        ));

        store.append(snapshot("sw1", 2)).unwrap();
        assert_eq!(store.latest("sw1").unwrap().timestamp(), at(2));
        assert_eq!(store.previous("sw1").unwrap().timestamp(), at(1));
    }

    #[test]
    fn test_append_rejects_out_of_order() {
        let mut store = HistoryStore::open(MemoryPersistence::new()).unwrap();
        store.append(snapshot("sw1", 5)).unwrap();

        let err = store.append(snapshot("sw1", 5)).unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrder { .. }));
        let err = store.append(snapshot("sw1", 3)).unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrder { .. }));

        // Other devices keep their own ordering
        store.append(snapshot("sw2", 1)).unwrap();
        assert_eq!(store.all("sw1").len(), 1);
        assert_eq!(store.persistence().len(), 2);
    }

    #[test]
    fn test_all_is_ordered_and_restartable() {
        let mut store = HistoryStore::open(MemoryPersistence::new()).unwrap();
        for minute in [1, 2, 3] {
            store.append(snapshot("sw1", minute)).unwrap();
        }

        let history = store.all("sw1");
        let first: Vec<_> = history.iter().map(Snapshot::timestamp).collect();
        let second: Vec<_> = history.into_iter().map(Snapshot::timestamp).collect();
        assert_eq!(first, vec![at(1), at(2), at(3)]);
        assert_eq!(first, second);
        assert!(store.all("unknown").is_empty());
    }

    #[test]
    fn test_baseline() {
        let mut store = HistoryStore::open(MemoryPersistence::new()).unwrap();
        store.append(snapshot("sw1", 1)).unwrap();
        assert!(store.baseline("sw1", Baseline::Oldest).is_err());

        store.append(snapshot("sw1", 2)).unwrap();
        store.append(snapshot("sw1", 3)).unwrap();
        let previous = store.baseline("sw1", Baseline::Previous).unwrap();
        let oldest = store.baseline("sw1", Baseline::Oldest).unwrap();
        assert_eq!(previous.timestamp(), at(2));
        assert_eq!(oldest.timestamp(), at(1));
    }

    #[test]
    fn test_open_rejects_unordered_history() {
        let persistence =
            MemoryPersistence::with_snapshots(vec![snapshot("sw1", 4), snapshot("sw1", 2)]);
        let err = HistoryStore::open(persistence).unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrder { .. }));
    }

    #[test]
    fn test_appended_snapshot_unchanged() {
        let mut store = HistoryStore::open(MemoryPersistence::new()).unwrap();
        let original = snapshot("sw1", 1);
        store.append(original.clone()).unwrap();
        store.append(snapshot("sw1", 2)).unwrap();
        assert_eq!(store.all("sw1").oldest(), Some(&original));
    }

    #[test]
    fn test_flush_reaches_persistence() {
        let mut store = HistoryStore::open(MemoryPersistence::new()).unwrap();
        store.append(snapshot("sw1", 1)).unwrap();
        assert_eq!(store.persistence().flushes(), 0);

        store.flush().unwrap();
        store.flush().unwrap();
        assert_eq!(store.persistence().flushes(), 2);
        assert_eq!(store.persistence().len(), 1);
    }

    #[test]
    fn test_baseline_from_str() {
        assert_eq!("previous".parse::<Baseline>().unwrap(), Baseline::Previous);
        assert_eq!("Oldest".parse::<Baseline>().unwrap(), Baseline::Oldest);
        assert!("first".parse::<Baseline>().is_err());
    }
}
