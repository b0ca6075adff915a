//! Typed domain records.
//!
//! Matcher output is loosely shaped; everything past the normalizer works on
//! the closed set of record types defined here.

mod interface;
mod normalize;

pub use interface::{InterfaceName, canonical_interface, compare_interfaces, expand_interface};
pub use normalize::{
    Domain, Normalized, normalize_batch, normalize_etherchannel, normalize_stp,
};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Spanning-tree port role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StpRole {
    Root,
    Designated,
    Alternate,
    Backup,
    Disabled,
    Unknown,
}

impl StpRole {
    /// Parse vendor role text. Unrecognized text maps to `Unknown`.
    ///
    /// Full names match case-insensitively; IOS column abbreviations
    /// (`Desg`, `Altn`, ...) only as the device prints them.
    pub fn parse(text: &str) -> Self {
        let text = text.trim().trim_end_matches('*');
        match text {
            "Desg" | "Mstr" => return Self::Designated,
            "Altn" => return Self::Alternate,
            "Back" => return Self::Backup,
            "Disb" => return Self::Disabled,
            _ => {}
        }
        match text.to_ascii_lowercase().as_str() {
            "root" => Self::Root,
            "designated" | "master" => Self::Designated,
            "alternate" => Self::Alternate,
            "backup" => Self::Backup,
            "disabled" => Self::Disabled,
            _ => Self::Unknown,
        }
    }
}

/// Spanning-tree port state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StpState {
    Forwarding,
    Blocking,
    Listening,
    Learning,
    Disabled,
    Unknown,
}

impl StpState {
    /// Parse vendor state text. Unrecognized text maps to `Unknown`.
    ///
    /// Full names match case-insensitively; IOS abbreviations (`FWD`, `BLK`,
    /// ...) only in upper case, as printed.
    pub fn parse(text: &str) -> Self {
        let text = text.trim().trim_end_matches('*');
        match text {
            "FWD" => return Self::Forwarding,
            "BLK" | "BKN" => return Self::Blocking,
            "LIS" => return Self::Listening,
            "LRN" => return Self::Learning,
            "DIS" => return Self::Disabled,
            _ => {}
        }
        match text.to_ascii_lowercase().as_str() {
            "forwarding" => Self::Forwarding,
            "blocking" | "broken" | "discarding" => Self::Blocking,
            "listening" => Self::Listening,
            "learning" => Self::Learning,
            "disabled" => Self::Disabled,
            _ => Self::Unknown,
        }
    }
}

/// EtherChannel negotiation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelProtocol {
    Lacp,
    Pagp,
    Static,
    Unknown,
}

impl ChannelProtocol {
    /// Parse protocol text. IOS prints `-` for statically bundled groups.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "lacp" => Self::Lacp,
            "pagp" => Self::Pagp,
            "-" | "on" | "none" | "static" => Self::Static,
            _ => Self::Unknown,
        }
    }
}

/// EtherChannel bundle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupState {
    Up,
    Down,
    Suspended,
    Unknown,
}

impl GroupState {
    /// Parse a status word (`up`, `down`, `suspended`).
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "up" | "in use" | "in-use" => Self::Up,
            "down" => Self::Down,
            "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }

    /// Derive state from IOS bundle flags (`SU`, `RD`, `s`, ...).
    ///
    /// `U` (in use) wins over `D` (down); `s` marks a suspended bundle.
    pub fn from_flags(flags: &str) -> Self {
        if flags.contains('U') {
            Self::Up
        } else if flags.contains('D') {
            Self::Down
        } else if flags.contains('s') {
            Self::Suspended
        } else {
            Self::Unknown
        }
    }
}

macro_rules! display_as_debug {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        })*
    };
}

display_as_debug!(StpRole, StpState, ChannelProtocol, GroupState);

/// Records that can be matched across snapshots by an identity key.
pub trait Keyed {
    type Key: Ord + Clone + fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// One spanning-tree port entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StpPortRecord {
    pub interface: InterfaceName,

    /// Spanning-tree instance (VLAN id); `None` when the output has none.
    pub vlan: Option<String>,

    pub role: StpRole,

    pub state: StpState,

    /// Port path cost; `None` when not reported or not numeric.
    pub cost: Option<u32>,
}

impl StpPortRecord {
    /// Create a record with unknown role, state and cost.
    pub fn new(interface: &str) -> Self {
        Self {
            interface: InterfaceName::new(interface),
            vlan: None,
            role: StpRole::Unknown,
            state: StpState::Unknown,
            cost: None,
        }
    }

    pub fn with_vlan(mut self, vlan: impl Into<String>) -> Self {
        self.vlan = Some(vlan.into());
        self
    }

    pub fn with_role(mut self, role: StpRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_state(mut self, state: StpState) -> Self {
        self.state = state;
        self
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = Some(cost);
        self
    }
}

impl Keyed for StpPortRecord {
    /// Interface plus instance: per-VLAN spanning tree lists a port once per VLAN.
    type Key = (InterfaceName, Option<String>);

    fn key(&self) -> Self::Key {
        (self.interface.clone(), self.vlan.clone())
    }
}

/// One EtherChannel (port-channel) group.
///
/// Members are kept de-duplicated and in canonical interface order, so two
/// records with the same member set always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "EtherChannelFields")]
pub struct EtherChannelRecord {
    group_id: String,
    member_interfaces: Vec<InterfaceName>,
    protocol: ChannelProtocol,
    group_state: GroupState,
}

/// Wire shape of [`EtherChannelRecord`]; decoding re-applies member ordering.
#[derive(Deserialize)]
struct EtherChannelFields {
    group_id: String,
    member_interfaces: Vec<InterfaceName>,
    protocol: ChannelProtocol,
    group_state: GroupState,
}

impl From<EtherChannelFields> for EtherChannelRecord {
    fn from(fields: EtherChannelFields) -> Self {
        Self::new(
            fields.group_id,
            fields.member_interfaces,
            fields.protocol,
            fields.group_state,
        )
    }
}

impl EtherChannelRecord {
    /// Create a record, sorting and de-duplicating members.
    pub fn new(
        group_id: impl Into<String>,
        members: impl IntoIterator<Item = InterfaceName>,
        protocol: ChannelProtocol,
        group_state: GroupState,
    ) -> Self {
        let mut member_interfaces: Vec<InterfaceName> = members.into_iter().collect();
        member_interfaces.sort();
        member_interfaces.dedup();
        Self {
            group_id: group_id.into(),
            member_interfaces,
            protocol,
            group_state,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn members(&self) -> &[InterfaceName] {
        &self.member_interfaces
    }

    pub fn protocol(&self) -> ChannelProtocol {
        self.protocol
    }

    pub fn group_state(&self) -> GroupState {
        self.group_state
    }

    /// Fold another fragment of the same group into this one.
    ///
    /// Members are unioned; protocol and state keep the first known value.
    pub fn merge(&mut self, other: EtherChannelRecord) {
        self.member_interfaces.extend(other.member_interfaces);
        self.member_interfaces.sort();
        self.member_interfaces.dedup();
        if self.protocol == ChannelProtocol::Unknown {
            self.protocol = other.protocol;
        }
        if self.group_state == GroupState::Unknown {
            self.group_state = other.group_state;
        }
    }

    /// Members present here but not in `other`.
    pub fn members_not_in<'a>(&'a self, other: &EtherChannelRecord) -> Vec<&'a InterfaceName> {
        self.member_interfaces
            .iter()
            .filter(|m| other.member_interfaces.binary_search(*m).is_err())
            .collect()
    }
}

impl Keyed for EtherChannelRecord {
    type Key = String;

    fn key(&self) -> Self::Key {
        self.group_id.clone()
    }
}

/// A normalized record of any known domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum Record {
    Stp(StpPortRecord),
    EtherChannel(EtherChannelRecord),
}

impl From<StpPortRecord> for Record {
    fn from(record: StpPortRecord) -> Self {
        Record::Stp(record)
    }
}

impl From<EtherChannelRecord> for Record {
    fn from(record: EtherChannelRecord) -> Self {
        Record::EtherChannel(record)
    }
}
