//! In-memory persistence for tests and dry runs.

use std::collections::BTreeMap;

use super::SnapshotPersistence;
use crate::error::HistoryError;
use crate::snapshot::Snapshot;

/// Keeps snapshots in memory; nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    devices: BTreeMap<String, Vec<Snapshot>>,
    flushes: usize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with already stored snapshots, kept in the given order.
    pub fn with_snapshots(snapshots: impl IntoIterator<Item = Snapshot>) -> Self {
        let mut persistence = Self::new();
        for snapshot in snapshots {
            persistence
                .devices
                .entry(snapshot.device_id().to_string())
                .or_default()
                .push(snapshot);
        }
        persistence
    }

    /// Number of stored snapshots across all devices.
    pub fn len(&self) -> usize {
        self.devices.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times the store flushed.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl SnapshotPersistence for MemoryPersistence {
    fn load(&mut self) -> Result<BTreeMap<String, Vec<Snapshot>>, HistoryError> {
        Ok(self.devices.clone())
    }

    fn append(&mut self, snapshot: &Snapshot) -> Result<(), HistoryError> {
        self.devices
            .entry(snapshot.device_id().to_string())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), HistoryError> {
        self.flushes += 1;
        Ok(())
    }
}
