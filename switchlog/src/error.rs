//! Error types for switchlog.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for switchlog operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Template lookup and matching errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Record normalization errors
    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    /// Snapshot construction errors
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// History store errors
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Diff engine errors
    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    /// Capture (session transcript) errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
}

/// Template matcher errors. Fatal for one command only.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// No index entry matches the platform/command pair
    #[error("No template for platform '{platform}' command '{command}'")]
    NotFound { platform: String, command: String },

    /// A named template is not known to the index
    #[error("Unknown template '{name}'")]
    UnknownTemplate { name: String },

    /// The template grammar could not be compiled
    #[error("Template '{name}' failed to compile: {message}")]
    Parse { name: String, message: String },

    /// The template compiled but failed while consuming text
    #[error("Template '{name}' failed on input: {message}")]
    Match { name: String, message: String },

    /// Malformed index file
    #[error("Invalid template index line {line}: {message}")]
    Index { line: usize, message: String },

    /// Invalid command pattern in the index
    #[error("Invalid command pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Reading a template directory failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Record normalization errors. Fatal for one record only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// A required field is absent or empty
    #[error("{domain} record is missing required field '{field}'")]
    MissingField {
        domain: &'static str,
        field: &'static str,
    },
}

/// Snapshot construction errors. Fatal for the whole run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The run produced neither STP nor EtherChannel records
    #[error("Run for '{device_id}' collected no STP or EtherChannel records")]
    Empty { device_id: String },

    /// Two stored records of one snapshot share an identity key
    #[error("Snapshot for '{device_id}' holds more than one record for {key}")]
    DuplicateKey { device_id: String, key: String },
}

/// History store errors.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Appended snapshot is not strictly newer than the last stored one
    #[error("Snapshot for '{device_id}' at {attempted} is not after last stored {last}")]
    OutOfOrder {
        device_id: String,
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    /// Fewer snapshots stored than the operation needs
    #[error("Device '{device_id}' has {available} snapshot(s), need {required}")]
    NoHistory {
        device_id: String,
        required: usize,
        available: usize,
    },

    /// Persistence I/O failure
    #[error("Persistence error on {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored snapshot could not be decoded
    #[error("Corrupt history in {path} line {line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The device's history file failed to load; appending is refused until it is repaired
    #[error("History in {path} is unreadable at line {line}; repair or remove the file")]
    Unreadable { path: PathBuf, line: usize },

    /// A snapshot could not be encoded
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Diff engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    /// The two snapshots belong to different devices (caller bug)
    #[error("Cannot diff snapshots of different devices: '{old}' vs '{new}'")]
    DeviceMismatch { old: String, new: String },
}

/// Capture (collection collaborator input) errors.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The transcript contains no prompt+command line
    #[error("No commands found in capture")]
    NoCommands,

    /// No device id was given and none could be read from the prompt
    #[error("Cannot determine device id from capture")]
    NoDeviceId,

    /// I/O error reading the capture
    #[error("Failed to read capture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using switchlog's Error.
pub type Result<T> = std::result::Result<T, Error>;
