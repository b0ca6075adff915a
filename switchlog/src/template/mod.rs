//! Template matching: raw command text to flat field records.
//!
//! Command output is run through a TextFSM template chosen automatically from
//! the platform and command (see [`TemplateIndex`]). Lines the template does
//! not recognize (banners, prompts, headers) produce no records.

pub mod builtin;
mod index;

pub use index::{IndexEntry, TemplateIndex, TemplateSource, compile_command_pattern};

use std::path::Path;

use indexmap::IndexMap;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use textfsm_rust::Template;

use crate::error::TemplateError;

/// Platform assumed when a block does not name one.
pub const DEFAULT_PLATFORM: &str = "cisco_ios";

/// Lines that hold nothing but a device prompt.
static PROMPT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+[>#]\s*$").unwrap());

/// A prompt at the start of a line, e.g. `sw1#` in `sw1#show vlan`.
static PROMPT_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+?[>#]").unwrap());

/// The command as the exec parser sees it: whitespace collapsed and the
/// config-mode `do` prefix removed.
///
/// `do  show spanning-tree` becomes `show spanning-tree`.
pub fn exec_command(command: &str) -> String {
    let words: Vec<&str> = command.split_whitespace().collect();
    match words.as_slice() {
        [first, rest @ ..] if first.eq_ignore_ascii_case("do") && !rest.is_empty() => rest.join(" "),
        _ => words.join(" "),
    }
}

/// Output of one command, plus the context used to pick its template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// The command as sent to the device.
    pub command: String,

    /// Platform name (e.g., "cisco_ios").
    pub platform: String,

    /// The raw command output.
    pub text: String,

    /// Explicit template name; bypasses index lookup when set.
    pub template: Option<String>,
}

impl RawBlock {
    /// Create a block for the default platform.
    pub fn new(command: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            platform: DEFAULT_PLATFORM.to_string(),
            text: text.into(),
            template: None,
        }
    }

    /// Set the platform.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Force a specific template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// One row of matcher output: field name to value, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldRecord(IndexMap<String, String>);

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a parser row, ordering keys by `order`.
    ///
    /// Keys are lowercased. Keys missing from `order` follow in sorted order.
    pub fn from_row<K, V>(row: impl IntoIterator<Item = (K, V)>, order: &[String]) -> Self
    where
        K: AsRef<str>,
        V: ToString,
    {
        let mut unordered: Vec<(String, String)> = row
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_lowercase(), v.to_string()))
            .collect();
        unordered.sort();

        let mut fields = IndexMap::with_capacity(unordered.len());
        for name in order {
            if let Some(pos) = unordered.iter().position(|(k, _)| k == name) {
                let (k, v) = unordered.remove(pos);
                fields.insert(k, v);
            }
        }
        fields.extend(unordered);
        Self(fields)
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Get the first non-blank value among several candidate field names.
    pub fn pick(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    /// Iterate fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Records extracted from one block, with the template that produced them.
#[derive(Debug, Clone)]
pub struct Matched {
    pub template: String,
    pub records: Vec<FieldRecord>,
}

/// Template matcher over one or more indexes.
///
/// Indexes are searched in priority order; the built-in index is the
/// fallback when a template directory is layered on top.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    indexes: Vec<TemplateIndex>,
}

impl TemplateMatcher {
    /// Create a matcher with no indexes.
    pub fn new() -> Self {
        Self {
            indexes: Vec::new(),
        }
    }

    /// Create a matcher serving the built-in templates.
    pub fn builtin() -> Result<Self, TemplateError> {
        Ok(Self::new().with_index(TemplateIndex::builtin()?))
    }

    /// Add an index with higher priority than those already present.
    pub fn with_index(mut self, index: TemplateIndex) -> Self {
        self.indexes.insert(0, index);
        self
    }

    /// Layer a template directory (containing an `index` file) on top.
    pub fn with_directory(self, dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        Ok(self.with_index(TemplateIndex::from_dir(dir)?))
    }

    /// Resolve the template for a platform/command pair.
    pub fn resolve(
        &self,
        platform: &str,
        command: &str,
    ) -> Result<(&TemplateIndex, &str), TemplateError> {
        let exec = exec_command(command);
        self.indexes
            .iter()
            .find_map(|index| {
                index
                    .lookup(platform, &exec)
                    .map(|entry| (index, entry.template.as_str()))
            })
            .ok_or_else(|| TemplateError::NotFound {
                platform: platform.to_string(),
                command: command.to_string(),
            })
    }

    /// Parse one block into field records.
    pub fn match_block(&self, block: &RawBlock) -> Result<Matched, TemplateError> {
        let (index, name) = match &block.template {
            Some(name) => {
                let index = self
                    .indexes
                    .iter()
                    .find(|index| index.provides(name))
                    .ok_or_else(|| TemplateError::UnknownTemplate { name: name.clone() })?;
                (index, name.as_str())
            }
            None => self.resolve(&block.platform, &block.command)?,
        };

        let template_text = index.load(name)?;
        let cleaned = clean_output(&block.text, &block.command);
        let records = parse_records(name, &template_text, &cleaned)?;

        debug!(
            "Template {} ({:?}) matched {} record(s) for '{}'",
            name,
            index.source(),
            records.len(),
            block.command
        );

        Ok(Matched {
            template: name.to_string(),
            records,
        })
    }
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a template over already-cleaned text.
pub fn parse_records(
    name: &str,
    template_text: &str,
    text: &str,
) -> Result<Vec<FieldRecord>, TemplateError> {
    let order = declared_values(template_text);

    let template = Template::parse_str(template_text).map_err(|e| TemplateError::Parse {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    let mut parser = template.parser();
    let rows = parser
        .parse_text_to_dicts(text)
        .map_err(|e| TemplateError::Match {
            name: name.to_string(),
            message: e.to_string(),
        })?;

    Ok(rows
        .into_iter()
        .map(|row| FieldRecord::from_row(row, &order))
        .collect())
}

/// Value names declared by a template, lowercased, in declaration order.
///
/// `Value Filldown,Required VLAN (\d+)` declares `vlan`.
pub fn declared_values(template_text: &str) -> Vec<String> {
    template_text
        .lines()
        .filter_map(|line| line.strip_prefix("Value "))
        .filter_map(|rest| {
            let tokens: Vec<&str> = rest.split_whitespace().take(2).collect();
            match tokens.as_slice() {
                [options, name] if !name.starts_with('(') && !options.starts_with('(') => {
                    Some(name.to_lowercase())
                }
                [name, ..] if !name.starts_with('(') => Some(name.to_lowercase()),
                _ => None,
            }
        })
        .collect()
}

/// Strip noise that confuses templates.
///
/// Normalizes line endings, removes ANSI escapes, prompt-only lines and the
/// leading command echo, and trims blank lines at both ends.
pub fn clean_output(raw: &str, command: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let stripped = strip_ansi_escapes::strip(unified.as_bytes());
    let text = String::from_utf8_lossy(&stripped);

    let mut lines: Vec<&str> = text
        .lines()
        .filter(|line| !PROMPT_LINE.is_match(line))
        .collect();

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    if lines.first().is_some_and(|l| is_command_echo(l, command)) {
        lines.remove(0);
    }
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

fn is_command_echo(line: &str, command: &str) -> bool {
    let command = squash(command);
    if command.is_empty() {
        return false;
    }
    let line = line.trim();
    let line = match PROMPT_PREFIX.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    squash(line) == command
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
