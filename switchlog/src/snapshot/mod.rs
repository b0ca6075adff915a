//! Snapshots: one immutable, timestamped capture of a device's parsed state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::record::{EtherChannelRecord, GroupState, Keyed, Record, StpPortRecord, StpState};

/// Parsed state of one device at one collection time.
///
/// Built once by [`SnapshotBuilder`] and never mutated afterwards; there are
/// no setters. Record sets are ordered so serialization is deterministic.
///
/// Decoding re-checks that identity keys are unique: interface names are
/// canonicalized on the way in, so stored spellings may collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredSnapshot")]
pub struct Snapshot {
    device_id: String,
    timestamp: DateTime<Utc>,
    stp_records: BTreeSet<StpPortRecord>,
    etherchannel_records: BTreeSet<EtherChannelRecord>,
}

impl Snapshot {
    /// Build a snapshot from one run's records.
    pub fn build(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self, SnapshotError> {
        SnapshotBuilder::new(device_id, timestamp)
            .with_records(records)
            .build()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn stp_records(&self) -> &BTreeSet<StpPortRecord> {
        &self.stp_records
    }

    pub fn etherchannel_records(&self) -> &BTreeSet<EtherChannelRecord> {
        &self.etherchannel_records
    }

    /// Total number of records across both domains.
    pub fn len(&self) -> usize {
        self.stp_records.len() + self.etherchannel_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate counts for reporting.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary::of(self)
    }
}

#[derive(Deserialize)]
struct StoredSnapshot {
    device_id: String,
    timestamp: DateTime<Utc>,
    stp_records: Vec<StpPortRecord>,
    etherchannel_records: Vec<EtherChannelRecord>,
}

impl TryFrom<StoredSnapshot> for Snapshot {
    type Error = SnapshotError;

    fn try_from(stored: StoredSnapshot) -> Result<Self, Self::Error> {
        let stp_records = unique_keys(&stored.device_id, stored.stp_records)?;
        let etherchannel_records = unique_keys(&stored.device_id, stored.etherchannel_records)?;
        Ok(Self {
            device_id: stored.device_id,
            timestamp: stored.timestamp,
            stp_records,
            etherchannel_records,
        })
    }
}

/// Identical records collapse; differing records under one key are rejected.
fn unique_keys<R>(device_id: &str, records: Vec<R>) -> Result<BTreeSet<R>, SnapshotError>
where
    R: Keyed + Ord,
{
    let mut keyed: BTreeMap<R::Key, R> = BTreeMap::new();
    for record in records {
        let key = record.key();
        if let Some(existing) = keyed.get(&key) {
            if *existing == record {
                continue;
            }
            return Err(SnapshotError::DuplicateKey {
                device_id: device_id.to_string(),
                key: format!("{:?}", key),
            });
        }
        keyed.insert(key, record);
    }
    Ok(keyed.into_values().collect())
}

/// Counters kept while building a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Structurally identical records dropped.
    pub duplicates: usize,

    /// Records that replaced an earlier record with the same identity key
    /// but different attributes.
    pub conflicts: usize,
}

/// Assembles one run's records into a [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    device_id: String,
    timestamp: DateTime<Utc>,
    stp: BTreeMap<<StpPortRecord as Keyed>::Key, StpPortRecord>,
    etherchannel: BTreeMap<String, EtherChannelRecord>,
    stats: BuildStats,
}

impl SnapshotBuilder {
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            stp: BTreeMap::new(),
            etherchannel: BTreeMap::new(),
            stats: BuildStats::default(),
        }
    }

    /// Add one record.
    ///
    /// Identical records collapse into one. A record with the same identity
    /// key but different attributes replaces the earlier one.
    pub fn add(&mut self, record: Record) {
        match record {
            Record::Stp(stp) => insert(&mut self.stp, stp, &mut self.stats),
            Record::EtherChannel(group) => insert(&mut self.etherchannel, group, &mut self.stats),
        }
    }

    /// Add many records.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.add(record);
        }
    }

    /// Consuming form of [`extend`](Self::extend).
    pub fn with_records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.extend(records);
        self
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Finish the snapshot.
    ///
    /// Fails when neither domain holds a record: an empty run means
    /// collection or parsing failed upstream.
    pub fn build(self) -> Result<Snapshot, SnapshotError> {
        if self.stp.is_empty() && self.etherchannel.is_empty() {
            return Err(SnapshotError::Empty {
                device_id: self.device_id,
            });
        }

        debug!(
            "Built snapshot for {} at {}: {} STP, {} EtherChannel ({} duplicates, {} conflicts)",
            self.device_id,
            self.timestamp,
            self.stp.len(),
            self.etherchannel.len(),
            self.stats.duplicates,
            self.stats.conflicts
        );

        Ok(Snapshot {
            device_id: self.device_id,
            timestamp: self.timestamp,
            stp_records: self.stp.into_values().collect(),
            etherchannel_records: self.etherchannel.into_values().collect(),
        })
    }
}

fn insert<R>(map: &mut BTreeMap<R::Key, R>, record: R, stats: &mut BuildStats)
where
    R: Keyed + PartialEq + std::fmt::Debug,
{
    let key = record.key();
    match map.get(&key) {
        Some(existing) if *existing == record => {
            stats.duplicates += 1;
            return;
        }
        Some(_) => {
            warn!("Conflicting records for {:?}; keeping the later one", key);
            stats.conflicts += 1;
        }
        None => {}
    }
    map.insert(key, record);
}

/// Aggregate view of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub stp_ports: usize,
    pub forwarding: usize,
    pub blocking: usize,
    pub vlans: BTreeSet<String>,
    pub groups: usize,
    pub groups_up: usize,
    pub groups_down: usize,
    pub group_members: usize,
}

impl SnapshotSummary {
    fn of(snapshot: &Snapshot) -> Self {
        let stp = snapshot.stp_records();
        let groups = snapshot.etherchannel_records();
        Self {
            stp_ports: stp.len(),
            forwarding: stp.iter().filter(|r| r.state == StpState::Forwarding).count(),
            blocking: stp.iter().filter(|r| r.state == StpState::Blocking).count(),
            vlans: stp.iter().filter_map(|r| r.vlan.clone()).collect(),
            groups: groups.len(),
            groups_up: groups
                .iter()
                .filter(|g| g.group_state() == GroupState::Up)
                .count(),
            groups_down: groups
                .iter()
                .filter(|g| g.group_state() == GroupState::Down)
                .count(),
            group_members: groups.iter().map(|g| g.members().len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ChannelProtocol, InterfaceName, StpRole};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn port(name: &str, state: StpState) -> Record {
        StpPortRecord::new(name)
            .with_vlan("1")
            .with_role(StpRole::Designated)
            .with_state(state)
            .with_cost(4)
            .into()
    }

    #[test]
    fn test_empty_run_fails() {
        let err = Snapshot::build("sw1", at(1), Vec::new()).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::Empty {
                device_id: "sw1".to_string()
            }
        );
    }

    #[test]
    fn test_identical_records_deduplicated() {
        let mut builder = SnapshotBuilder::new("sw1", at(1));
        builder.extend([
            port("Gi0/1", StpState::Forwarding),
            port("GigabitEthernet0/1", StpState::Forwarding),
            port("Gi0/2", StpState::Blocking),
        ]);
        assert_eq!(builder.stats().duplicates, 1);
        assert_eq!(builder.stats().conflicts, 0);

        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.stp_records().len(), 2);
        assert!(snapshot.etherchannel_records().is_empty());
    }

    #[test]
    fn test_conflicting_records_keep_latest() {
        let mut builder = SnapshotBuilder::new("sw1", at(1));
        builder.add(port("Gi0/1", StpState::Blocking));
        builder.add(port("Gi0/1", StpState::Forwarding));
        assert_eq!(builder.stats().conflicts, 1);

        let snapshot = builder.build().unwrap();
        let only = snapshot.stp_records().iter().next().unwrap();
        assert_eq!(only.state, StpState::Forwarding);
    }

    #[test]
    fn test_summary_counts() {
        let group = EtherChannelRecord::new(
            "Po1",
            ["Gi0/3", "Gi0/4"].map(InterfaceName::new),
            ChannelProtocol::Lacp,
            GroupState::Up,
        );
        let snapshot = Snapshot::build(
            "sw1",
            at(2),
            vec![
                port("Gi0/1", StpState::Forwarding),
                port("Gi0/2", StpState::Blocking),
                group.into(),
            ],
        )
        .unwrap();

        let summary = snapshot.summary();
        assert_eq!(summary.stp_ports, 2);
        assert_eq!(summary.forwarding, 1);
        assert_eq!(summary.blocking, 1);
        assert_eq!(summary.vlans.len(), 1);
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.groups_up, 1);
        assert_eq!(summary.group_members, 2);
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_serde_round_trip_preserves_equality() {
        let snapshot = Snapshot::build("sw1", at(3), vec![port("Gi0/1", StpState::Forwarding)])
            .unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_decode_rejects_colliding_keys() {
        let snapshot = Snapshot::build("sw1", at(3), vec![port("Gi0/1", StpState::Forwarding)])
            .unwrap();
        let mut value = serde_json::to_value(&snapshot).unwrap();
        let mut long_name = value["stp_records"][0].clone();
        long_name["interface"] = "GigabitEthernet0/1".into();
        value["stp_records"].as_array_mut().unwrap().push(long_name.clone());

        let same: Snapshot = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(same, snapshot);

        long_name["state"] = serde_json::to_value(StpState::Blocking).unwrap();
        value["stp_records"][1] = long_name;
        let err = serde_json::from_value::<Snapshot>(value).unwrap_err();
        assert!(err.to_string().contains("Gi0/1"), "{}", err);
    }
}
