//! JSON Lines persistence: one `<device>.jsonl` file per device.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::SnapshotPersistence;
use crate::error::HistoryError;
use crate::snapshot::Snapshot;

/// Default number of snapshots kept per device after compaction.
pub const DEFAULT_MAX_KEEP: usize = 10;

/// Bytes of a device id kept verbatim in its file name.
const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Stores each device's snapshots as JSON Lines in a directory.
///
/// Appends add one line to the device's file. On flush, files that were
/// appended to are compacted to the newest `max_keep` lines by writing a
/// temporary file and renaming it over the original.
///
/// A file that cannot be decoded is skipped on load so other devices stay
/// usable; appends for its device are refused until it is repaired. An
/// unterminated last line that does not decode is the remains of an
/// interrupted append and is cut from the file.
#[derive(Debug, Clone)]
pub struct JsonLinesPersistence {
    dir: PathBuf,
    max_keep: Option<usize>,
    dirty: BTreeSet<PathBuf>,
    unreadable: BTreeMap<PathBuf, usize>,
    torn_tails: usize,
}

/// Decoded lines of one history file.
struct FileContents {
    snapshots: Vec<Snapshot>,

    /// Byte length of the file without its torn last line, if it has one.
    torn_at: Option<usize>,
}

impl JsonLinesPersistence {
    /// Persist under `dir`, keeping [`DEFAULT_MAX_KEEP`] snapshots per device.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_keep: Some(DEFAULT_MAX_KEEP),
            dirty: BTreeSet::new(),
            unreadable: BTreeMap::new(),
            torn_tails: 0,
        }
    }

    /// Set retention; `None` keeps everything. A limit of zero is treated
    /// as one so the latest snapshot is never dropped.
    pub fn with_max_keep(mut self, max_keep: Option<usize>) -> Self {
        self.max_keep = max_keep.map(|n| n.max(1));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_keep(&self) -> Option<usize> {
        self.max_keep
    }

    /// File holding a device's history.
    pub fn path_for(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(device_id)))
    }

    /// Files skipped by the last load, with the first line that failed.
    pub fn unreadable(&self) -> impl Iterator<Item = (&Path, usize)> {
        self.unreadable.iter().map(|(path, line)| (path.as_path(), *line))
    }

    /// Interrupted appends cut from the end of history files.
    pub fn torn_tails(&self) -> usize {
        self.torn_tails
    }

    fn read_file(path: &Path) -> Result<FileContents, HistoryError> {
        let text = fs::read_to_string(path).map_err(|source| persistence(path, source))?;
        let mut snapshots = Vec::new();
        let mut offset = 0;

        for (index, line) in text.split_inclusive('\n').enumerate() {
            let start = offset;
            offset += line.len();
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(_) if !line.ends_with('\n') => {
                    return Ok(FileContents {
                        snapshots,
                        torn_at: Some(start),
                    });
                }
                Err(source) => {
                    return Err(HistoryError::Corrupt {
                        path: path.to_path_buf(),
                        line: index + 1,
                        source,
                    });
                }
            }
        }

        Ok(FileContents {
            snapshots,
            torn_at: None,
        })
    }

    /// End the file on a line boundary before appending to it.
    ///
    /// An unterminated last line that decodes is terminated; one that does
    /// not is cut.
    fn seal(&mut self, path: &Path) -> Result<(), HistoryError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(persistence(path, source)),
        };
        if text.is_empty() || text.ends_with('\n') {
            return Ok(());
        }

        let start = text.rfind('\n').map_or(0, |i| i + 1);
        if serde_json::from_str::<Snapshot>(&text[start..]).is_ok() {
            OpenOptions::new()
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(b"\n"))
                .map_err(|source| persistence(path, source))
        } else {
            warn!("Cutting interrupted append from the end of {}", path.display());
            self.torn_tails += 1;
            truncate(path, start)
        }
    }

    fn compact(path: &Path, max_keep: usize) -> Result<(), HistoryError> {
        let text = fs::read_to_string(path).map_err(|source| persistence(path, source))?;
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() <= max_keep {
            return Ok(());
        }

        let mut kept = lines[lines.len() - max_keep..].join("\n");
        kept.push('\n');

        let temp_path = path.with_extension("jsonl.tmp");
        fs::write(&temp_path, kept).map_err(|source| persistence(&temp_path, source))?;
        fs::rename(&temp_path, path).map_err(|source| persistence(path, source))?;

        info!(
            "Compacted {}: dropped {} old snapshot(s)",
            path.display(),
            lines.len() - max_keep
        );
        Ok(())
    }
}

impl SnapshotPersistence for JsonLinesPersistence {
    fn load(&mut self) -> Result<BTreeMap<String, Vec<Snapshot>>, HistoryError> {
        let mut devices: BTreeMap<String, Vec<Snapshot>> = BTreeMap::new();
        self.unreadable.clear();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("History directory {} does not exist yet", self.dir.display());
                return Ok(devices);
            }
            Err(source) => return Err(persistence(&self.dir, source)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|source| persistence(&self.dir, source))?.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let contents = match Self::read_file(&path) {
                Ok(contents) => contents,
                Err(HistoryError::Corrupt { path, line, source }) => {
                    error!(
                        "Skipping {}: line {} does not decode: {}",
                        path.display(),
                        line,
                        source
                    );
                    self.unreadable.insert(path, line);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(len) = contents.torn_at {
                warn!("Cutting interrupted append from the end of {}", path.display());
                truncate(&path, len)?;
                self.torn_tails += 1;
            }

            debug!(
                "Read {} snapshot(s) from {}",
                contents.snapshots.len(),
                path.display()
            );
            for snapshot in contents.snapshots {
                devices
                    .entry(snapshot.device_id().to_string())
                    .or_default()
                    .push(snapshot);
            }
        }

        Ok(devices)
    }

    fn append(&mut self, snapshot: &Snapshot) -> Result<(), HistoryError> {
        let path = self.path_for(snapshot.device_id());
        if let Some(&line) = self.unreadable.get(&path) {
            return Err(HistoryError::Unreadable { path, line });
        }

        fs::create_dir_all(&self.dir).map_err(|source| persistence(&self.dir, source))?;
        self.seal(&path)?;

        let mut line = serde_json::to_string(snapshot).map_err(HistoryError::Encode)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| persistence(&path, source))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| persistence(&path, source))?;

        debug!("Appended snapshot to {}", path.display());
        self.dirty.insert(path);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), HistoryError> {
        if let Some(max_keep) = self.max_keep {
            for path in &self.dirty {
                Self::compact(path, max_keep)?;
            }
        }
        self.dirty.clear();
        Ok(())
    }
}

fn persistence(path: &Path, source: io::Error) -> HistoryError {
    HistoryError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

fn truncate(path: &Path, len: usize) -> Result<(), HistoryError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(len as u64))
        .map_err(|source| persistence(path, source))
}

/// Device ids come from prompts. Percent-encode them so every id gets its
/// own portable file name.
fn file_stem(device_id: &str) -> String {
    let stem = utf8_percent_encode(device_id, FILE_NAME).to_string();
    match stem.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None if stem.is_empty() => "%".to_string(),
        None => stem,
    }
}
