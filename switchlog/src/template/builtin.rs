//! Templates compiled into the crate.

/// The built-in index (see `templates/index`).
pub(crate) const INDEX: &str = include_str!("templates/index");

const TEMPLATES: &[(&str, &str)] = &[
    (
        "cisco_ios_show_spanning-tree.textfsm",
        include_str!("templates/cisco_ios_show_spanning-tree.textfsm"),
    ),
    (
        "cisco_ios_show_etherchannel_summary.textfsm",
        include_str!("templates/cisco_ios_show_etherchannel_summary.textfsm"),
    ),
];

/// Look up a built-in template by file name.
pub(crate) fn template(name: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, text)| *text)
}

/// Names of all built-in templates.
pub fn names() -> impl Iterator<Item = &'static str> {
    TEMPLATES.iter().map(|(file, _)| *file)
}
