//! Template index for automatic template selection.
//!
//! The index format is the one used by ntc-templates:
//!
//! ```text
//! Template, Hostname, Platform, Command
//!
//! cisco_ios_show_spanning-tree.textfsm, .*, cisco_ios, sh[[ow]] spa[[nning-tree]]
//! ```
//!
//! `Platform` and `Command` are regular expressions matched against the whole
//! attribute. Inside `Command`, `[[xyz]]` expands to an optional completion so
//! that `sh[[ow]]` accepts `sh`, `sho` and `show`.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use regex::Regex;

use super::builtin;
use crate::error::TemplateError;

/// Where the template files named by an index live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Templates compiled into the binary.
    Builtin,

    /// Templates read from a directory on demand.
    Directory(PathBuf),
}

/// One row of a template index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Template file name.
    pub template: String,

    /// Platform pattern as written in the index.
    pub platform_pattern: String,

    /// Command pattern as written in the index.
    pub command_pattern: String,

    platform: Regex,
    command: Regex,
}

impl IndexEntry {
    /// Create an entry, compiling both patterns.
    pub fn new(
        template: impl Into<String>,
        platform_pattern: &str,
        command_pattern: &str,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            template: template.into(),
            platform_pattern: platform_pattern.to_string(),
            command_pattern: command_pattern.to_string(),
            platform: anchored(platform_pattern)?,
            command: compile_command_pattern(command_pattern)?,
        })
    }

    /// Check whether this entry applies to a platform/command pair.
    pub fn matches(&self, platform: &str, command: &str) -> bool {
        self.platform.is_match(platform.trim()) && self.command.is_match(&squash(command))
    }
}

/// An ordered template index. The first matching entry wins.
#[derive(Debug, Clone)]
pub struct TemplateIndex {
    source: TemplateSource,
    entries: Vec<IndexEntry>,
}

impl TemplateIndex {
    /// Create an empty index backed by the given source.
    pub fn new(source: TemplateSource) -> Self {
        Self {
            source,
            entries: Vec::new(),
        }
    }

    /// The index compiled into the crate.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::parse(builtin::INDEX, TemplateSource::Builtin)
    }

    /// Load `<dir>/index` and serve templates from `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        let path = dir.join("index");
        let text = fs::read_to_string(&path).map_err(|source| TemplateError::Io {
            path: path.clone(),
            source,
        })?;
        let index = Self::parse(&text, TemplateSource::Directory(dir.to_path_buf()))?;
        debug!(
            "Loaded template index {} ({} entries)",
            path.display(),
            index.len()
        );
        Ok(index)
    }

    /// Parse index text.
    pub fn parse(text: &str, source: TemplateSource) -> Result<Self, TemplateError> {
        let mut index = Self::new(source);
        let mut columns: Option<Columns> = None;

        for (n, raw) in text.lines().enumerate() {
            let line_no = n + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if columns.is_none() {
                columns = Some(Columns::from_header(line, line_no)?);
                continue;
            }
            let Some(cols) = columns.as_ref() else {
                continue;
            };

            let fields: Vec<&str> = line.splitn(cols.count, ',').map(str::trim).collect();
            if fields.len() != cols.count {
                return Err(TemplateError::Index {
                    line: line_no,
                    message: format!("expected {} columns, found {}", cols.count, fields.len()),
                });
            }

            // Multi-template rows ("a.textfsm:b.textfsm") are merged by clitable;
            // only the first template is used here.
            let template = fields[cols.template]
                .split(':')
                .next()
                .unwrap_or_default()
                .trim();
            if template.is_empty() {
                return Err(TemplateError::Index {
                    line: line_no,
                    message: "empty template column".to_string(),
                });
            }
            let platform = cols.platform.map(|i| fields[i]).unwrap_or(".*");

            index.push(IndexEntry::new(template, platform, fields[cols.command])?);
        }

        if columns.is_none() {
            return Err(TemplateError::Index {
                line: 0,
                message: "missing header line".to_string(),
            });
        }
        Ok(index)
    }

    /// Append an entry.
    pub fn push(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    /// Find the first entry matching a platform/command pair.
    pub fn lookup(&self, platform: &str, command: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.matches(platform, command))
    }

    /// Check if a template file is named by this index.
    pub fn contains(&self, template: &str) -> bool {
        self.entries.iter().any(|e| e.template == template)
    }

    /// Check if this index can serve a template by name, listed or not.
    pub fn provides(&self, template: &str) -> bool {
        match &self.source {
            TemplateSource::Builtin => builtin::template(template).is_some(),
            TemplateSource::Directory(dir) => {
                self.contains(template) || dir.join(template).is_file()
            }
        }
    }

    /// Read the text of a template named by this index.
    pub fn load(&self, template: &str) -> Result<Cow<'static, str>, TemplateError> {
        match &self.source {
            TemplateSource::Builtin => {
                builtin::template(template)
                    .map(Cow::Borrowed)
                    .ok_or_else(|| TemplateError::UnknownTemplate {
                        name: template.to_string(),
                    })
            }
            TemplateSource::Directory(dir) => {
                let path = dir.join(template);
                fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|source| TemplateError::Io { path, source })
            }
        }
    }

    /// Where this index reads templates from.
    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    /// All entries in lookup order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Column positions taken from the header line.
struct Columns {
    count: usize,
    template: usize,
    platform: Option<usize>,
    command: usize,
}

impl Columns {
    fn from_header(line: &str, line_no: usize) -> Result<Self, TemplateError> {
        let names: Vec<String> = line.split(',').map(|s| s.trim().to_lowercase()).collect();
        let position = |name: &str| names.iter().position(|n| n == name);

        let missing = |name: &str| TemplateError::Index {
            line: line_no,
            message: format!("header has no '{}' column", name),
        };
        let template = position("template").ok_or_else(|| missing("Template"))?;
        let command = position("command").ok_or_else(|| missing("Command"))?;

        // Command patterns may contain commas, so it has to be the last column.
        if command != names.len() - 1 {
            return Err(TemplateError::Index {
                line: line_no,
                message: "'Command' must be the last column".to_string(),
            });
        }

        Ok(Self {
            count: names.len(),
            template,
            platform: position("platform"),
            command,
        })
    }
}

/// Compile an index command pattern, expanding `[[...]]` completions.
///
/// `sh[[ow]]` becomes `sh(?:o(?:w)?)?`. The result is anchored at both ends.
pub fn compile_command_pattern(pattern: &str) -> Result<Regex, TemplateError> {
    let mut expanded = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;

    while let Some(start) = rest.find("[[") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("]]") else {
            return Err(TemplateError::Index {
                line: 0,
                message: format!("unterminated '[[' in command pattern '{}'", pattern),
            });
        };
        let word = &after[..end];
        for ch in word.chars() {
            expanded.push_str("(?:");
            expanded.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4])));
        }
        for _ in word.chars() {
            expanded.push_str(")?");
        }
        rest = &after[end + 2..];
    }
    expanded.push_str(rest);

    anchored(&expanded).map_err(|e| match e {
        TemplateError::Pattern { source, .. } => TemplateError::Pattern {
            pattern: pattern.to_string(),
            source,
        },
        other => other,
    })
}

fn anchored(pattern: &str) -> Result<Regex, TemplateError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| TemplateError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Collapse runs of whitespace so `show  spanning-tree` still matches.
fn squash(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pattern_completion() {
        let re = compile_command_pattern("sh[[ow]] spa[[nning-tree]]").unwrap();
        assert!(re.is_match("show spanning-tree"));
        assert!(re.is_match("sh spa"));
        assert!(re.is_match("sho spanning"));
        assert!(!re.is_match("s spanning-tree"));
        assert!(!re.is_match("show spanning-tree detail"));
    }

    #[test]
    fn test_command_pattern_unterminated() {
        assert!(compile_command_pattern("sh[[ow spa").is_err());
    }

    #[test]
    fn test_builtin_lookup() {
        let index = TemplateIndex::builtin().unwrap();
        assert_eq!(index.len(), 2);

        let entry = index.lookup("cisco_ios", "show  spanning-tree").unwrap();
        assert_eq!(entry.template, "cisco_ios_show_spanning-tree.textfsm");

        let entry = index.lookup("cisco_xe", "sh etherchannel summ").unwrap();
        assert_eq!(entry.template, "cisco_ios_show_etherchannel_summary.textfsm");

        assert!(index.lookup("juniper_junos", "show spanning-tree").is_none());
        assert!(index.lookup("cisco_ios", "show version").is_none());
    }

    #[test]
    fn test_builtin_templates_load() {
        let index = TemplateIndex::builtin().unwrap();
        for entry in index.entries() {
            let text = index.load(&entry.template).unwrap();
            assert!(text.contains("Value"));
        }
        for name in builtin::names() {
            assert!(index.contains(name), "{} is not indexed", name);
        }
        assert_eq!(index.source(), &TemplateSource::Builtin);
        assert!(matches!(
            index.load("missing.textfsm"),
            Err(TemplateError::UnknownTemplate { .. })
        ));
    }

    #[test]
    fn test_parse_header_order() {
        let text = "Template, Platform, Command\n\nfoo.textfsm, arista_eos, sh[[ow]] lacp\n";
        let index = TemplateIndex::parse(text, TemplateSource::Builtin).unwrap();
        assert!(index.lookup("arista_eos", "show lacp").is_some());
        assert!(index.lookup("cisco_ios", "show lacp").is_none());
    }

    #[test]
    fn test_parse_rejects_missing_header() {
        let err = TemplateIndex::parse("# only comments\n", TemplateSource::Builtin).unwrap_err();
        assert!(matches!(err, TemplateError::Index { .. }));

        let err = TemplateIndex::parse("Template, Command, Platform\n", TemplateSource::Builtin)
            .unwrap_err();
        assert!(matches!(err, TemplateError::Index { .. }));
    }

    #[test]
    fn test_multi_template_row_uses_first() {
        let text = "Template, Hostname, Platform, Command\na.textfsm:b.textfsm, .*, cisco_ios, sh[[ow]] x\n";
        let index = TemplateIndex::parse(text, TemplateSource::Builtin).unwrap();
        assert_eq!(index.lookup("cisco_ios", "show x").unwrap().template, "a.textfsm");
    }
}
