//! Read-only report view over a device's history.
//!
//! A [`Report`] borrows the latest snapshot, the chosen baseline and the
//! change set between them. It serializes to JSON and renders as plain text;
//! spreadsheet rendering is left to external tooling.

use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::diff::{ChangeSet, diff_snapshots};
use crate::error::{HistoryError, Result};
use crate::history::{Baseline, HistoryStore, SnapshotPersistence};
use crate::record::{EtherChannelRecord, StpPortRecord};
use crate::snapshot::{Snapshot, SnapshotSummary};

/// Summary of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotView {
    pub timestamp: DateTime<Utc>,
    pub summary: SnapshotSummary,
}

impl From<&Snapshot> for SnapshotView {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp(),
            summary: snapshot.summary(),
        }
    }
}

/// Latest state of a device and how it changed since the baseline.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub device_id: &'a str,

    /// Snapshots stored for the device.
    pub snapshots: usize,

    pub baseline: Baseline,

    pub latest: SnapshotView,

    /// `None` when the device has a single snapshot.
    pub previous: Option<SnapshotView>,

    /// `None` when there is nothing to compare against.
    pub changes: Option<ChangeSet<'a>>,
}

impl<'a> Report<'a> {
    /// Build a report for `device_id` from stored history.
    ///
    /// Fails with [`HistoryError::NoHistory`] when the device has no
    /// snapshot. With a single snapshot the report has no changes.
    pub fn from_store<P: SnapshotPersistence>(
        store: &'a HistoryStore<P>,
        device_id: &str,
        baseline: Baseline,
    ) -> Result<Self> {
        let latest = store.latest(device_id)?;
        let base = match store.baseline(device_id, baseline) {
            Ok(base) => Some(base),
            Err(HistoryError::NoHistory { .. }) => {
                debug!("No baseline for {}; reporting without changes", device_id);
                None
            }
            Err(e) => return Err(e.into()),
        };

        let changes = base.map(|base| diff_snapshots(base, latest)).transpose()?;

        Ok(Self {
            device_id: latest.device_id(),
            snapshots: store.all(device_id).len(),
            baseline,
            latest: latest.into(),
            previous: base.map(SnapshotView::from),
            changes,
        })
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Device {} ({} snapshot(s), baseline: {})",
            self.device_id, self.snapshots, self.baseline
        )?;
        write_summary(f, "Latest", &self.latest)?;
        if let Some(previous) = &self.previous {
            write_summary(f, "Baseline", previous)?;
        }

        let Some(changes) = &self.changes else {
            return writeln!(f, "No baseline to compare against.");
        };

        let m = &changes.metrics;
        writeln!(
            f,
            "Metrics: flaps={} role_changes={} cost_changes={} membership_churn={} \
             members +{}/-{} group_state_changes={}",
            m.flap_count,
            m.role_changes,
            m.cost_changes,
            m.membership_churn,
            m.members_added,
            m.members_removed,
            m.group_state_changes
        )?;

        if changes.is_empty() {
            return writeln!(f, "No changes.");
        }

        for record in &changes.stp.added {
            writeln!(f, "  + STP {}", describe_port(record))?;
        }
        for record in &changes.stp.removed {
            writeln!(f, "  - STP {}", describe_port(record))?;
        }
        for pair in &changes.stp.modified {
            writeln!(
                f,
                "  ~ STP {} -> {}",
                describe_port(pair.old),
                describe_port(pair.new)
            )?;
        }
        for group in &changes.etherchannel.added {
            writeln!(f, "  + EtherChannel {}", describe_group(group))?;
        }
        for group in &changes.etherchannel.removed {
            writeln!(f, "  - EtherChannel {}", describe_group(group))?;
        }
        for pair in &changes.etherchannel.modified {
            writeln!(
                f,
                "  ~ EtherChannel {}: {}",
                pair.new.group_id(),
                describe_group_change(pair.old, pair.new)
            )?;
        }
        Ok(())
    }
}

fn write_summary(f: &mut fmt::Formatter<'_>, label: &str, view: &SnapshotView) -> fmt::Result {
    let s = &view.summary;
    writeln!(
        f,
        "{} {}: {} STP port(s) ({} forwarding, {} blocking, {} VLAN(s)), \
         {} group(s) ({} up, {} down, {} member(s))",
        label,
        view.timestamp.to_rfc3339(),
        s.stp_ports,
        s.forwarding,
        s.blocking,
        s.vlans.len(),
        s.groups,
        s.groups_up,
        s.groups_down,
        s.group_members
    )
}

fn describe_port(record: &StpPortRecord) -> String {
    let mut out = record.interface.to_string();
    if let Some(vlan) = &record.vlan {
        let _ = write!(out, " vlan {}", vlan);
    }
    let _ = write!(out, " {} {}", record.role, record.state);
    if let Some(cost) = record.cost {
        let _ = write!(out, " cost {}", cost);
    }
    out
}

fn describe_group(group: &EtherChannelRecord) -> String {
    let members: Vec<&str> = group.members().iter().map(|m| m.as_str()).collect();
    format!(
        "{} {} {} [{}]",
        group.group_id(),
        group.protocol(),
        group.group_state(),
        members.join(", ")
    )
}

fn describe_group_change(old: &EtherChannelRecord, new: &EtherChannelRecord) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(new.members_not_in(old).iter().map(|m| format!("+{}", m)));
    parts.extend(old.members_not_in(new).iter().map(|m| format!("-{}", m)));
    if old.group_state() != new.group_state() {
        parts.push(format!("state {} -> {}", old.group_state(), new.group_state()));
    }
    if old.protocol() != new.protocol() {
        parts.push(format!("protocol {} -> {}", old.protocol(), new.protocol()));
    }
    parts.join(" ")
}
