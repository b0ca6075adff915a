//! One collection run: raw command blocks to a snapshot.
//!
//! Per-command failures (no template, broken template) and per-record
//! failures (missing identity field) are contained: they are logged, counted
//! in [`RunStats`], and the rest of the run proceeds. Only a run that yields
//! no records at all fails.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{Result, SnapshotError};
use crate::history::{HistoryStore, SnapshotPersistence};
use crate::record::{Domain, normalize_batch};
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::template::{RawBlock, TemplateMatcher};

/// What happened to one command's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// The command that produced the output.
    pub command: String,

    /// Domain the command belongs to; `None` for commands the pipeline
    /// does not parse.
    pub domain: Option<Domain>,

    /// Template that parsed the output.
    pub template: Option<String>,

    /// Field records the template extracted.
    pub matched: usize,

    /// Typed records produced.
    pub records: usize,

    /// Field records rejected by the normalizer.
    pub skipped: usize,

    /// Failure message if the command's output could not be parsed.
    pub failure_message: Option<String>,
}

impl CommandOutcome {
    fn new(command: &str, domain: Option<Domain>) -> Self {
        Self {
            command: command.to_string(),
            domain,
            template: None,
            matched: 0,
            records: 0,
            skipped: 0,
            failure_message: None,
        }
    }

    /// Check if the command's output was parsed.
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Commands seen.
    pub commands: usize,

    /// Commands outside the STP and EtherChannel domains.
    pub commands_ignored: usize,

    /// Commands whose output could not be parsed.
    pub commands_failed: usize,

    /// Typed records handed to the snapshot builder.
    pub records: usize,

    /// Field records rejected by the normalizer.
    pub records_skipped: usize,

    /// Identical records collapsed by the builder.
    pub duplicates: usize,

    /// Records that replaced a differing record with the same key.
    pub conflicts: usize,

    /// Per-command detail, in input order.
    pub outcomes: Vec<CommandOutcome>,
}

impl RunStats {
    /// True when nothing was failed, skipped, or overridden.
    pub fn is_clean(&self) -> bool {
        self.commands_failed == 0 && self.records_skipped == 0 && self.conflicts == 0
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Run {
    pub snapshot: Snapshot,
    pub stats: RunStats,
}

/// Matcher, normalizer, and snapshot builder wired together.
#[derive(Debug, Clone)]
pub struct Pipeline {
    matcher: TemplateMatcher,
}

impl Pipeline {
    pub fn new(matcher: TemplateMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &TemplateMatcher {
        &self.matcher
    }

    /// Turn one run's command output into a snapshot.
    ///
    /// Fails only with [`SnapshotError::Empty`]; every narrower failure is
    /// recorded in the returned [`RunStats`].
    pub fn run(
        &self,
        device_id: &str,
        timestamp: DateTime<Utc>,
        blocks: &[RawBlock],
    ) -> std::result::Result<Run, SnapshotError> {
        let mut builder = SnapshotBuilder::new(device_id, timestamp);
        let mut stats = RunStats::default();

        for block in blocks {
            stats.commands += 1;
            let outcome = self.process(block, &mut builder);

            if outcome.domain.is_none() {
                stats.commands_ignored += 1;
            } else if !outcome.is_success() {
                stats.commands_failed += 1;
            }
            stats.records += outcome.records;
            stats.records_skipped += outcome.skipped;
            stats.outcomes.push(outcome);
        }

        let build = builder.stats();
        stats.duplicates = build.duplicates;
        stats.conflicts = build.conflicts;

        debug!(
            "Run for {}: {} command(s), {} ignored, {} failed, {} record(s), {} skipped",
            device_id,
            stats.commands,
            stats.commands_ignored,
            stats.commands_failed,
            stats.records,
            stats.records_skipped
        );

        let snapshot = builder.build()?;
        Ok(Run { snapshot, stats })
    }

    /// Run the pipeline and append the snapshot to `store`.
    pub fn record<P: SnapshotPersistence>(
        &self,
        store: &mut HistoryStore<P>,
        device_id: &str,
        timestamp: DateTime<Utc>,
        blocks: &[RawBlock],
    ) -> Result<RunStats> {
        let Run { snapshot, stats } = self.run(device_id, timestamp, blocks)?;
        let stored = store.append(snapshot)?.len();
        info!(
            "Recorded {} record(s) for {} ({} stored snapshot(s))",
            stored,
            device_id,
            store.all(device_id).len()
        );
        Ok(stats)
    }

    fn process(&self, block: &RawBlock, builder: &mut SnapshotBuilder) -> CommandOutcome {
        let domain = block
            .template
            .as_deref()
            .and_then(Domain::from_template)
            .or_else(|| Domain::detect(&block.command));

        let mut outcome = CommandOutcome::new(&block.command, domain);
        let Some(domain) = domain else {
            debug!("Ignoring output of '{}'", block.command);
            return outcome;
        };

        let matched = match self.matcher.match_block(block) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Command '{}' not parsed: {}", block.command, e);
                outcome.failure_message = Some(e.to_string());
                return outcome;
            }
        };

        let normalized = normalize_batch(domain, &matched.records);
        outcome.template = Some(matched.template);
        outcome.matched = matched.records.len();
        outcome.records = normalized.records.len();
        outcome.skipped = normalized.skipped.len();
        builder.extend(normalized.records);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::history::MemoryPersistence;
    use crate::record::StpState;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    const STP_OUTPUT: &str = "\
VLAN0001
  Spanning tree enabled protocol rstp
  Root ID    Priority    32769

Interface           Role Sts Cost      Prio.Nbr Type
------------------- ---- --- --------- -------- --------------------------------
Gi0/1               Root FWD 4         128.1    P2p
Gi0/2               Altn BLK 4         128.2    P2p
";

    const ETHERCHANNEL_OUTPUT: &str = "\
Flags:  D - down        P - bundled in port-channel
        U - in use      S - Layer2

Number of channel-groups in use: 1
Number of aggregators:           1

Group  Port-channel  Protocol    Ports
------+-------------+-----------+-----------------------------------------------
1      Po1(SU)         LACP      Gi0/3(P)    Gi0/4(P)
";

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 10, minute, 0).unwrap()
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(TemplateMatcher::builtin().unwrap())
    }

    #[test]
    fn test_run_builds_snapshot() {
        let blocks = vec![
            RawBlock::new("show spanning-tree", STP_OUTPUT),
            RawBlock::new("show etherchannel summary", ETHERCHANNEL_OUTPUT),
        ];

        let run = pipeline().run("sw1", at(0), &blocks).unwrap();
        assert_eq!(run.snapshot.stp_records().len(), 2);
        assert_eq!(run.snapshot.etherchannel_records().len(), 1);
        assert!(run.stats.is_clean());
        assert_eq!(run.stats.commands, 2);
        assert!(run.stats.outcomes.iter().all(CommandOutcome::is_success));

        let blocking = run
            .snapshot
            .stp_records()
            .iter()
            .find(|r| r.interface.as_str() == "Gi0/2")
            .unwrap();
        assert_eq!(blocking.state, StpState::Blocking);
    }

    #[test]
    fn test_unrelated_commands_are_ignored() {
        let blocks = vec![
            RawBlock::new("show version", "Cisco IOS Software"),
            RawBlock::new("show spanning-tree", STP_OUTPUT),
        ];

        let run = pipeline().run("sw1", at(0), &blocks).unwrap();
        assert_eq!(run.stats.commands_ignored, 1);
        assert_eq!(run.stats.commands_failed, 0);
        assert_eq!(run.stats.outcomes[0].domain, None);
    }

    #[test]
    fn test_failed_command_is_contained() {
        let blocks = vec![
            RawBlock::new("show spanning-tree", STP_OUTPUT).with_platform("juniper_junos"),
            RawBlock::new("show etherchannel summary", ETHERCHANNEL_OUTPUT),
        ];

        let run = pipeline().run("sw1", at(0), &blocks).unwrap();
        assert_eq!(run.stats.commands_failed, 1);
        assert!(!run.stats.outcomes[0].is_success());
        assert!(run.snapshot.stp_records().is_empty());
        assert_eq!(run.snapshot.etherchannel_records().len(), 1);
    }

    #[test]
    fn test_command_variants_are_parsed() {
        let blocks = vec![
            RawBlock::new("show spanning-tree vlan 1", STP_OUTPUT),
            RawBlock::new("do show etherchannel 1 summary", ETHERCHANNEL_OUTPUT),
            RawBlock::new("show spanning-tree summary", "Switch is in rapid-pvst mode"),
        ];

        let run = pipeline().run("sw1", at(0), &blocks).unwrap();
        assert_eq!(run.stats.commands_failed, 0);
        assert_eq!(run.stats.commands_ignored, 1);
        assert_eq!(run.snapshot.stp_records().len(), 2);
        assert_eq!(run.snapshot.etherchannel_records().len(), 1);
    }

    #[test]
    fn test_config_mode_command_is_parsed() {
        let blocks = vec![RawBlock::new("do show spanning-tree", STP_OUTPUT)];
        let run = pipeline().run("sw1", at(0), &blocks).unwrap();
        assert_eq!(run.stats.outcomes[0].domain, Some(Domain::Stp));
        assert_eq!(run.snapshot.stp_records().len(), 2);
    }

    #[test]
    fn test_broken_template_is_contained() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("index"),
            "Template, Platform, Command\nbroken_stp.textfsm, cisco_ios, sh[[ow]] spa[[nning-tree]]\n",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("broken_stp.textfsm"),
            "Value Required X (\\d+(\n\nStart\n  ^${X} -> Record\n",
        )
        .unwrap();

        let matcher = TemplateMatcher::builtin()
            .unwrap()
            .with_directory(temp_dir.path())
            .unwrap();
        let blocks = vec![
            RawBlock::new("show spanning-tree", STP_OUTPUT),
            RawBlock::new("show etherchannel summary", ETHERCHANNEL_OUTPUT),
        ];

        let run = Pipeline::new(matcher).run("sw1", at(0), &blocks).unwrap();
        assert_eq!(run.stats.commands_failed, 1);
        assert!(run.stats.outcomes[0].failure_message.is_some());
        assert!(run.stats.outcomes[1].is_success());
        assert!(run.snapshot.stp_records().is_empty());
        assert_eq!(run.snapshot.etherchannel_records().len(), 1);
    }

    #[test]
    fn test_record_without_interface_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("index"),
            "Template, Platform, Command\nlab_stp.textfsm, lab_os, sh[[ow]] spa[[nning-tree]]\n",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("lab_stp.textfsm"),
            "Value PORT (\\S+)\nValue STATE (\\S+)\n\nStart\n  \
             ^port\\s+${PORT}\\s+is\\s+${STATE}\\s*$$ -> Record\n  \
             ^unnamed\\s+is\\s+${STATE}\\s*$$ -> Record\n",
        )
        .unwrap();

        let matcher = TemplateMatcher::builtin()
            .unwrap()
            .with_directory(temp_dir.path())
            .unwrap();
        let blocks = vec![
            RawBlock::new(
                "show spanning-tree",
                "port Ethernet1/1 is forwarding\nunnamed is blocking\n",
            )
            .with_platform("lab_os"),
        ];

        let run = Pipeline::new(matcher).run("lab1", at(0), &blocks).unwrap();
        assert_eq!(run.stats.outcomes[0].matched, 2);
        assert_eq!(run.stats.records, 1);
        assert_eq!(run.stats.records_skipped, 1);
        assert_eq!(run.stats.commands_failed, 0);
        assert!(!run.stats.is_clean());
        assert_eq!(run.snapshot.stp_records().len(), 1);
    }

    #[test]
    fn test_nothing_collected_fails_the_run() {
        let blocks = vec![RawBlock::new("show spanning-tree", "% Invalid input detected")];
        let err = pipeline().run("sw1", at(0), &blocks).unwrap_err();
        assert!(matches!(err, SnapshotError::Empty { .. }));
    }

    #[test]
    fn test_record_appends_to_store() {
        let pipeline = pipeline();
        let mut store = HistoryStore::open(MemoryPersistence::new()).unwrap();
        let blocks = vec![RawBlock::new("show spanning-tree", STP_OUTPUT)];

        pipeline.record(&mut store, "sw1", at(1), &blocks).unwrap();
        pipeline.record(&mut store, "sw1", at(2), &blocks).unwrap();
        assert_eq!(store.all("sw1").len(), 2);

        let err = pipeline.record(&mut store, "sw1", at(2), &blocks).unwrap_err();
        assert!(matches!(err, Error::History(_)));
        assert_eq!(store.all("sw1").len(), 2);
    }
}
