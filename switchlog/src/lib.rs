//! # Switchlog
//!
//! Parse switch CLI output into typed spanning-tree and EtherChannel
//! snapshots, keep a per-device history of them, and report what changed
//! between runs.
//!
//! ## Pipeline
//!
//! ```text
//! RawBlock ──► TemplateMatcher ──► FieldRecord ──► normalizer ──► Record
//!                                                                   │
//!        ChangeSet + Metrics ◄── diff ◄── HistoryStore ◄── Snapshot ◄┘
//! ```
//!
//! - [`template`]: TextFSM templates chosen from an ntc-templates style index
//! - [`record`]: typed records with canonical interface names
//! - [`snapshot`]: one immutable, timestamped capture per run
//! - [`history`]: append-only, time-ordered snapshot log per device
//! - [`diff`]: added/removed/modified records and scalar metrics
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use switchlog::{HistoryStore, MemoryPersistence, Pipeline, RawBlock, TemplateMatcher};
//!
//! let output = "\
//! VLAN0001
//! Interface           Role Sts Cost      Prio.Nbr Type
//! ------------------- ---- --- --------- -------- ----
//! Gi0/1               Root FWD 4         128.1    P2p
//! ";
//!
//! let pipeline = Pipeline::new(TemplateMatcher::builtin()?);
//! let mut store = HistoryStore::open(MemoryPersistence::new())?;
//!
//! let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let blocks = [RawBlock::new("show spanning-tree", output)];
//! let stats = pipeline.record(&mut store, "sw1", at, &blocks)?;
//!
//! assert_eq!(stats.records, 1);
//! assert_eq!(store.latest("sw1")?.stp_records().len(), 1);
//! # Ok::<(), switchlog::Error>(())
//! ```

pub mod capture;
pub mod config;
pub mod diff;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod snapshot;
pub mod template;

// Re-export main types for convenience
pub use capture::Capture;
pub use config::RunConfig;
pub use diff::{ChangeSet, Metrics, diff_snapshots};
pub use error::{Error, Result};
pub use history::{Baseline, HistoryStore, JsonLinesPersistence, MemoryPersistence};
pub use pipeline::{Pipeline, RunStats};
pub use record::{EtherChannelRecord, InterfaceName, Record, StpPortRecord};
pub use report::Report;
pub use snapshot::Snapshot;
pub use template::{FieldRecord, RawBlock, TemplateMatcher};
