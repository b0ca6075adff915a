//! Canonical interface names.
//!
//! Every spelling of a port ("GigabitEthernet0/1", "Gig 0/1", "Gi0/1") is
//! reduced to one short form so the same physical port compares equal across
//! runs. [`expand_interface`] maps the short form back to the long one.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Short form and the long spellings it stands for. The first long spelling
/// is the one [`expand_interface`] produces.
struct Abbreviation {
    short: &'static str,
    long: &'static [&'static str],
}

const ABBREVIATIONS: &[Abbreviation] = &[
    Abbreviation {
        short: "Te",
        long: &["TenGigabitEthernet", "TenGigE"],
    },
    Abbreviation {
        short: "Twe",
        long: &["TwentyFiveGigE", "TwentyFiveGigabitEthernet"],
    },
    Abbreviation {
        short: "Fo",
        long: &["FortyGigabitEthernet", "FortyGigE"],
    },
    Abbreviation {
        short: "Hu",
        long: &["HundredGigE", "HundredGigabitEthernet"],
    },
    Abbreviation {
        short: "Gi",
        long: &["GigabitEthernet", "GigE"],
    },
    Abbreviation {
        short: "Fa",
        long: &["FastEthernet"],
    },
    Abbreviation {
        short: "Ap",
        long: &["AppGigabitEthernet"],
    },
    Abbreviation {
        short: "Et",
        long: &["Ethernet"],
    },
    Abbreviation {
        short: "Po",
        long: &["Port-channel"],
    },
    Abbreviation {
        short: "Vl",
        long: &["Vlan"],
    },
    Abbreviation {
        short: "Lo",
        long: &["Loopback"],
    },
    Abbreviation {
        short: "Tu",
        long: &["Tunnel"],
    },
];

impl Abbreviation {
    /// A prefix matches if it is the short form, or a prefix of a long form
    /// at least as long as the short form (case-insensitive).
    fn matches(&self, prefix: &str) -> bool {
        let prefix = prefix.to_ascii_lowercase();
        if prefix == self.short.to_ascii_lowercase() {
            return true;
        }
        prefix.len() >= self.short.len()
            && self
                .long
                .iter()
                .any(|long| long.to_ascii_lowercase().starts_with(&prefix))
    }
}

fn lookup(prefix: &str) -> Option<&'static Abbreviation> {
    ABBREVIATIONS.iter().find(|a| a.matches(prefix))
}

/// Split `GigabitEthernet 1/0/1` into (`GigabitEthernet`, `1/0/1`).
///
/// Returns `None` when the name has no alphabetic prefix followed by a number.
fn split(name: &str) -> Option<(&str, &str)> {
    let end = name
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '-'))
        .unwrap_or(name.len());
    let (prefix, rest) = name.split_at(end);
    let rest = rest.trim_start();
    if prefix.is_empty() || !rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some((prefix, rest))
}

/// Reduce an interface name to its canonical short form.
///
/// Total (any input yields a name) and idempotent. Unknown prefixes are kept
/// as written.
pub fn canonical_interface(name: &str) -> String {
    let name = name.trim();
    match split(name) {
        Some((prefix, rest)) => {
            let prefix = lookup(prefix).map(|a| a.short).unwrap_or(prefix);
            format!("{}{}", prefix, rest)
        }
        None => name.to_string(),
    }
}

/// Expand an interface name to its long form (`Gi0/1` → `GigabitEthernet0/1`).
pub fn expand_interface(name: &str) -> String {
    let name = name.trim();
    match split(name) {
        Some((prefix, rest)) => match lookup(prefix) {
            Some(a) => format!("{}{}", a.long[0], rest),
            None => format!("{}{}", prefix, rest),
        },
        None => name.to_string(),
    }
}

/// Compare interface names by prefix, then numerically by path component.
///
/// `Gi1/0/2` sorts before `Gi1/0/10`.
pub fn compare_interfaces(a: &str, b: &str) -> Ordering {
    sort_key(a).cmp(&sort_key(b)).then_with(|| a.cmp(b))
}

fn sort_key(name: &str) -> (String, Vec<u64>) {
    let (prefix, rest) = split(name).unwrap_or((name, ""));
    let numbers = rest
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().unwrap_or(u64::MAX))
        .collect();
    (prefix.to_ascii_lowercase(), numbers)
}

/// An interface name held in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Canonicalize and wrap a name.
    pub fn new(name: &str) -> Self {
        Self(canonical_interface(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InterfaceName {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<&str> for InterfaceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> Self {
        name.0
    }
}

impl Deref for InterfaceName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl PartialOrd for InterfaceName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InterfaceName {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_interfaces(&self.0, &other.0)
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_and_short_forms_agree() {
        assert_eq!(canonical_interface("GigabitEthernet0/1"), "Gi0/1");
        assert_eq!(canonical_interface("Gi0/1"), "Gi0/1");
        assert_eq!(canonical_interface("gig 0/1"), "Gi0/1");
        assert_eq!(canonical_interface("TenGigabitEthernet1/1/1"), "Te1/1/1");
        assert_eq!(canonical_interface("Port-channel10"), "Po10");
        assert_eq!(canonical_interface("port-channel 10"), "Po10");
        assert_eq!(canonical_interface("Ethernet1/49"), "Et1/49");
        assert_eq!(canonical_interface("Eth1/49"), "Et1/49");
        assert_eq!(canonical_interface("TwentyFiveGigE1/0/3"), "Twe1/0/3");
        assert_eq!(canonical_interface("FastEthernet0/24"), "Fa0/24");
        assert_eq!(canonical_interface("FortyGigabitEthernet1/1/2"), "Fo1/1/2");
    }

    #[test]
    fn test_canonical_is_total() {
        assert_eq!(canonical_interface(""), "");
        assert_eq!(canonical_interface("  "), "");
        assert_eq!(canonical_interface("mgmt"), "mgmt");
        assert_eq!(canonical_interface("Serial 0/0/0"), "Serial0/0/0");
        assert_eq!(canonical_interface("1/0/1"), "1/0/1");
        assert_eq!(canonical_interface("G0/1"), "G0/1");
    }

    #[test]
    fn test_canonical_is_idempotent() {
        let inputs = [
            "GigabitEthernet1/0/1",
            "Te1/1/1",
            "Port-Channel 2",
            "Vlan100",
            "Serial 0/0",
            "weird-name",
            "Gi1/0/1.100",
            "",
        ];
        for input in inputs {
            let once = canonical_interface(input);
            assert_eq!(canonical_interface(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand_interface("Gi0/1"), "GigabitEthernet0/1");
        assert_eq!(expand_interface("Po1"), "Port-channel1");
        assert_eq!(expand_interface("GigabitEthernet0/1"), "GigabitEthernet0/1");
        assert_eq!(expand_interface("mgmt0"), "mgmt0");
        assert_eq!(canonical_interface(&expand_interface("Te1/1/4")), "Te1/1/4");
    }

    #[test]
    fn test_numeric_ordering() {
        let mut names: Vec<InterfaceName> = ["Gi1/0/10", "Gi1/0/2", "Fa0/1", "Gi1/0/1"]
            .into_iter()
            .map(InterfaceName::new)
            .collect();
        names.sort();
        let sorted: Vec<&str> = names.iter().map(InterfaceName::as_str).collect();
        assert_eq!(sorted, vec!["Fa0/1", "Gi1/0/1", "Gi1/0/2", "Gi1/0/10"]);
    }

    #[test]
    fn test_serde_canonicalizes() {
        let name: InterfaceName = serde_json::from_str("\"GigabitEthernet0/3\"").unwrap();
        assert_eq!(name.as_str(), "Gi0/3");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"Gi0/3\"");
    }
}
