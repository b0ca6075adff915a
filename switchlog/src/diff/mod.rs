//! Snapshot comparison.
//!
//! [`diff_snapshots`] matches records of two snapshots of the same device by
//! identity key (interface and VLAN for STP, group id for EtherChannel) and
//! reports what was added, removed, or modified, plus scalar [`Metrics`].
//! The result borrows from both snapshots and depends on nothing else.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::error::DiffError;
use crate::record::{EtherChannelRecord, Keyed, StpPortRecord};
use crate::snapshot::Snapshot;

/// A record present under the same key in both snapshots with different
/// attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Modified<'a, R> {
    pub old: &'a R,
    pub new: &'a R,
}

/// Changes within one record domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainChanges<'a, R> {
    /// Key only in the new snapshot.
    pub added: Vec<&'a R>,

    /// Key only in the old snapshot.
    pub removed: Vec<&'a R>,

    pub modified: Vec<Modified<'a, R>>,
}

impl<'a, R: Keyed + PartialEq> DomainChanges<'a, R> {
    /// Compare two record sets by identity key.
    pub fn between(old: &'a BTreeSet<R>, new: &'a BTreeSet<R>) -> Self {
        let old_by_key: BTreeMap<R::Key, &R> = old.iter().map(|r| (r.key(), r)).collect();
        let new_by_key: BTreeMap<R::Key, &R> = new.iter().map(|r| (r.key(), r)).collect();

        let mut changes = Self {
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
        };

        for (key, &new_record) in &new_by_key {
            match old_by_key.get(key) {
                None => changes.added.push(new_record),
                Some(&old_record) if old_record != new_record => changes.modified.push(Modified {
                    old: old_record,
                    new: new_record,
                }),
                Some(_) => {}
            }
        }
        for (key, &old_record) in &old_by_key {
            if !new_by_key.contains_key(key) {
                changes.removed.push(old_record);
            }
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of changed records.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Scalar aggregates over a [`ChangeSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    /// STP ports whose forwarding state changed.
    pub flap_count: usize,
    pub role_changes: usize,
    pub cost_changes: usize,
    pub stp_added: usize,
    pub stp_removed: usize,

    /// EtherChannel groups that gained or lost members.
    pub membership_churn: usize,
    pub members_added: usize,
    pub members_removed: usize,
    pub group_state_changes: usize,
    pub protocol_changes: usize,
    pub groups_added: usize,
    pub groups_removed: usize,
}

impl Metrics {
    fn from_changes(
        stp: &DomainChanges<'_, StpPortRecord>,
        etherchannel: &DomainChanges<'_, EtherChannelRecord>,
    ) -> Self {
        let mut metrics = Metrics {
            stp_added: stp.added.len(),
            stp_removed: stp.removed.len(),
            groups_added: etherchannel.added.len(),
            groups_removed: etherchannel.removed.len(),
            ..Default::default()
        };

        for Modified { old, new } in &stp.modified {
            metrics.flap_count += usize::from(old.state != new.state);
            metrics.role_changes += usize::from(old.role != new.role);
            metrics.cost_changes += usize::from(old.cost != new.cost);
        }

        for Modified { old, new } in &etherchannel.modified {
            let added = new.members_not_in(old).len();
            let removed = old.members_not_in(new).len();
            metrics.members_added += added;
            metrics.members_removed += removed;
            metrics.membership_churn += usize::from(added + removed > 0);
            metrics.group_state_changes += usize::from(old.group_state() != new.group_state());
            metrics.protocol_changes += usize::from(old.protocol() != new.protocol());
        }

        metrics
    }

    /// True when every counter is zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Structured difference between two snapshots of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet<'a> {
    pub device_id: &'a str,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub stp: DomainChanges<'a, StpPortRecord>,
    pub etherchannel: DomainChanges<'a, EtherChannelRecord>,
    pub metrics: Metrics,
}

impl ChangeSet<'_> {
    pub fn is_empty(&self) -> bool {
        self.stp.is_empty() && self.etherchannel.is_empty()
    }
}

/// Compare `old` against `new`.
///
/// Both snapshots must belong to the same device; anything else is a
/// caller bug and is reported as [`DiffError::DeviceMismatch`].
pub fn diff_snapshots<'a>(old: &'a Snapshot, new: &'a Snapshot) -> Result<ChangeSet<'a>, DiffError> {
    if old.device_id() != new.device_id() {
        return Err(DiffError::DeviceMismatch {
            old: old.device_id().to_string(),
            new: new.device_id().to_string(),
        });
    }

    let stp = DomainChanges::between(old.stp_records(), new.stp_records());
    let etherchannel = DomainChanges::between(old.etherchannel_records(), new.etherchannel_records());
    let metrics = Metrics::from_changes(&stp, &etherchannel);

    debug!(
        "Diff {} {} -> {}: {} STP change(s), {} EtherChannel change(s)",
        new.device_id(),
        old.timestamp(),
        new.timestamp(),
        stp.len(),
        etherchannel.len()
    );

    Ok(ChangeSet {
        device_id: new.device_id(),
        from: old.timestamp(),
        to: new.timestamp(),
        stp,
        etherchannel,
        metrics,
    })
}
