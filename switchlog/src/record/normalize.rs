//! Field record to typed record conversion.
//!
//! This is the only place loosely shaped matcher output becomes typed data.
//! Unknown enum text degrades to `Unknown` and missing optional fields to
//! `None`; only a missing identity field rejects a record.

use std::fmt;

use indexmap::IndexMap;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{
    ChannelProtocol, EtherChannelRecord, GroupState, InterfaceName, Record, StpPortRecord,
    StpRole, StpState,
};
use crate::error::NormalizeError;
use crate::template::{FieldRecord, compile_command_pattern, exec_command};

// Field names accepted for each attribute, in preference order. Covers the
// built-in templates and the ntc-templates naming.
const STP_INTERFACE: &[&str] = &["interface", "port", "intf", "name"];
const STP_VLAN: &[&str] = &["vlan_id", "vlan", "instance"];
const STP_ROLE: &[&str] = &["role"];
const STP_STATE: &[&str] = &["status", "state", "sts"];
const STP_COST: &[&str] = &["cost"];

const EC_BUNDLE: &[&str] = &["bundle_name", "port_channel", "portchannel", "po", "bundle"];
const EC_GROUP: &[&str] = &["group", "group_id", "channel_group"];
const EC_MEMBERS: &[&str] = &[
    "members",
    "member_interfaces",
    "member_interface",
    "member_ports",
    "interfaces",
    "ports",
];
const EC_PROTOCOL: &[&str] = &["protocol"];
const EC_STATUS: &[&str] = &["bundle_status", "status", "state"];
const EC_FLAGS: &[&str] = &["bundle_flags", "flags"];

/// Record domains the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Stp,
    EtherChannel,
}

// Commands served by the built-in index (see `template/templates/index`).
// Output of other variants (`summary`, `detail`, NX-OS `port-channel`) has
// a different layout and is left alone.
static DOMAIN_COMMANDS: Lazy<Vec<(Domain, Regex)>> = Lazy::new(|| {
    [
        (Domain::Stp, r"sh[[ow]] spa[[nning-tree]](?: vl[[an]] \d+(?:[-,]\d+)*)?"),
        (Domain::EtherChannel, r"sh[[ow]] etherc[[hannel]](?: \d+)? su[[mmary]]"),
    ]
    .into_iter()
    .map(|(domain, pattern)| (domain, compile_command_pattern(pattern).unwrap()))
    .collect()
});

impl Domain {
    /// Infer the domain of a command's output.
    pub fn detect(command: &str) -> Option<Self> {
        let command = exec_command(command);
        DOMAIN_COMMANDS
            .iter()
            .find(|(_, re)| re.is_match(&command))
            .map(|(domain, _)| *domain)
    }

    /// Infer the domain from a template file name.
    pub fn from_template(template: &str) -> Option<Self> {
        let name = template.to_ascii_lowercase();
        if name.contains("spanning") {
            Some(Self::Stp)
        } else if name.contains("etherchannel") || name.contains("port-channel") {
            Some(Self::EtherChannel)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Domain::Stp => "STP",
            Domain::EtherChannel => "EtherChannel",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalize one STP field record.
pub fn normalize_stp(record: &FieldRecord) -> Result<StpPortRecord, NormalizeError> {
    let interface = record
        .pick(STP_INTERFACE)
        .ok_or(NormalizeError::MissingField {
            domain: Domain::Stp.name(),
            field: "interface",
        })?;

    Ok(StpPortRecord {
        interface: InterfaceName::new(interface),
        vlan: record.pick(STP_VLAN).and_then(normalize_vlan),
        role: record.pick(STP_ROLE).map_or(StpRole::Unknown, StpRole::parse),
        state: record.pick(STP_STATE).map_or(StpState::Unknown, StpState::parse),
        cost: record.pick(STP_COST).and_then(|c| c.parse().ok()),
    })
}

/// Normalize one EtherChannel field record.
///
/// The group id is the canonical bundle name (`Po1`); when only the group
/// number is present it becomes `Po<number>`.
pub fn normalize_etherchannel(record: &FieldRecord) -> Result<EtherChannelRecord, NormalizeError> {
    let group_id = match record.pick(EC_BUNDLE) {
        Some(bundle) => InterfaceName::new(bundle).to_string(),
        None => match record.pick(EC_GROUP) {
            Some(group) => format!("Po{}", strip_leading_zeros(group)),
            None => {
                return Err(NormalizeError::MissingField {
                    domain: Domain::EtherChannel.name(),
                    field: "group",
                });
            }
        },
    };

    let members = record.pick(EC_MEMBERS).map(parse_members).unwrap_or_default();
    let protocol = record
        .pick(EC_PROTOCOL)
        .map_or(ChannelProtocol::Unknown, ChannelProtocol::parse);

    let mut state = record
        .pick(EC_STATUS)
        .map_or(GroupState::Unknown, GroupState::parse);
    if state == GroupState::Unknown {
        state = record
            .pick(EC_FLAGS)
            .map_or(GroupState::Unknown, GroupState::from_flags);
    }

    Ok(EtherChannelRecord::new(group_id, members, protocol, state))
}

/// Output of normalizing one batch of field records.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<Record>,

    /// Records rejected for a missing identity field.
    pub skipped: Vec<NormalizeError>,
}

/// Normalize every field record of one command's output.
///
/// Malformed records are skipped and reported in [`Normalized::skipped`].
/// EtherChannel fragments (continuation lines) sharing a group id are merged.
pub fn normalize_batch(domain: Domain, records: &[FieldRecord]) -> Normalized {
    let mut out = Normalized::default();

    match domain {
        Domain::Stp => {
            for record in records {
                match normalize_stp(record) {
                    Ok(stp) => out.records.push(stp.into()),
                    Err(e) => skip(&mut out, e),
                }
            }
        }
        Domain::EtherChannel => {
            let mut groups: IndexMap<String, EtherChannelRecord> = IndexMap::new();
            for record in records {
                match normalize_etherchannel(record) {
                    Ok(group) => match groups.get_mut(group.group_id()) {
                        Some(existing) => existing.merge(group),
                        None => {
                            groups.insert(group.group_id().to_string(), group);
                        }
                    },
                    Err(e) => skip(&mut out, e),
                }
            }
            out.records.extend(groups.into_values().map(Record::from));
        }
    }

    out
}

fn skip(out: &mut Normalized, error: NormalizeError) {
    warn!("Skipping record: {}", error);
    out.skipped.push(error);
}

/// `VLAN0010`, `0010` and `10` all become `10`.
fn normalize_vlan(text: &str) -> Option<String> {
    let text = text.trim();
    let digits = text
        .strip_prefix("VLAN")
        .or_else(|| text.strip_prefix("vlan"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(strip_leading_zeros(digits).to_string())
    } else {
        Some(digits.to_string())
    }
}

/// Member lists arrive as `Gi1/0/1(P) Gi1/0/2(P)`, `Gi1/0/1, Gi1/0/2` or
/// `[Gi1/0/1; Gi1/0/2]`.
fn parse_members(text: &str) -> Vec<InterfaceName> {
    static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;\[\]]+").unwrap());

    SEPARATORS
        .split(text)
        .filter_map(|token| token.split('(').next())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(InterfaceName::new)
        .collect()
}

fn strip_leading_zeros(digits: &str) -> &str {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() && !digits.is_empty() {
        "0"
    } else {
        stripped
    }
}
