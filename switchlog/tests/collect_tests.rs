//! End-to-end: captured sessions through the pipeline into JSON Lines history.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use switchlog::record::{ChannelProtocol, GroupState, StpRole, StpState};
use switchlog::{
    Baseline, Capture, HistoryStore, JsonLinesPersistence, Pipeline, RawBlock, Report,
    TemplateMatcher,
};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, hour, 30, 0).unwrap()
}

fn collect(store: &mut HistoryStore<JsonLinesPersistence>, name: &str, hour: u32) {
    let capture = Capture::from_file(fixture(name), "cisco_ios").unwrap();
    let pipeline = Pipeline::new(TemplateMatcher::builtin().unwrap());
    pipeline
        .record(store, capture.hostname(), at(hour), capture.blocks())
        .unwrap();
}

#[test]
fn test_first_run_snapshot_contents() {
    let capture = Capture::from_file(fixture("sw1_run1.log"), "cisco_ios").unwrap();
    assert_eq!(capture.hostname(), "access-sw1");

    let pipeline = Pipeline::new(TemplateMatcher::builtin().unwrap());
    let run = pipeline
        .run(capture.hostname(), at(8), capture.blocks())
        .unwrap();

    assert_eq!(run.stats.commands, 6);
    assert_eq!(run.stats.commands_ignored, 4);
    assert_eq!(run.stats.commands_failed, 0);
    assert!(run.stats.is_clean());

    let snapshot = &run.snapshot;
    assert_eq!(snapshot.stp_records().len(), 6);

    let blocked: Vec<_> = snapshot
        .stp_records()
        .iter()
        .filter(|r| r.state == StpState::Blocking)
        .collect();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].interface.as_str(), "Gi1/0/2");
    assert_eq!(blocked[0].role, StpRole::Alternate);
    assert_eq!(blocked[0].vlan.as_deref(), Some("1"));
    assert_eq!(blocked[0].cost, Some(4));

    let groups: Vec<_> = snapshot.etherchannel_records().iter().collect();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].group_id(), "Po1");
    assert_eq!(groups[0].protocol(), ChannelProtocol::Lacp);
    assert_eq!(groups[0].group_state(), GroupState::Up);

    let po2 = groups[1];
    assert_eq!(po2.group_id(), "Po2");
    assert_eq!(po2.protocol(), ChannelProtocol::Static);
    assert_eq!(po2.group_state(), GroupState::Down);
    let members: Vec<&str> = po2.members().iter().map(|m| m.as_str()).collect();
    assert_eq!(members, vec!["Gi1/0/7", "Gi1/0/8", "Gi1/0/9"]);

    let summary = snapshot.summary();
    assert_eq!(summary.vlans.len(), 2);
    assert_eq!(summary.groups_down, 1);
    assert_eq!(summary.group_members, 5);
}

#[test]
fn test_two_runs_report_changes() {
    let temp_dir = TempDir::new().unwrap();

    let mut store = HistoryStore::open(JsonLinesPersistence::new(temp_dir.path())).unwrap();
    collect(&mut store, "sw1_run1.log", 8);
    collect(&mut store, "sw1_run2.log", 9);
    store.close().unwrap();

    let store = HistoryStore::open(JsonLinesPersistence::new(temp_dir.path())).unwrap();
    assert_eq!(store.all("access-sw1").len(), 2);

    let report = Report::from_store(&store, "access-sw1", Baseline::Previous).unwrap();
    let changes = report.changes.as_ref().unwrap();

    assert_eq!(changes.stp.modified.len(), 1);
    assert_eq!(changes.stp.modified[0].new.interface.as_str(), "Gi1/0/2");
    assert_eq!(changes.stp.removed.len(), 1);
    assert_eq!(changes.stp.removed[0].interface.as_str(), "Gi1/0/10");
    assert!(changes.stp.added.is_empty());

    let metrics = &changes.metrics;
    assert_eq!(metrics.flap_count, 1);
    assert_eq!(metrics.role_changes, 1);
    assert_eq!(metrics.stp_removed, 1);
    assert_eq!(metrics.membership_churn, 1);
    assert_eq!(metrics.members_added, 1);
    assert_eq!(metrics.members_removed, 1);
    assert_eq!(metrics.group_state_changes, 1);
    assert_eq!(metrics.protocol_changes, 0);

    let text = report.to_string();
    assert!(text.contains("~ EtherChannel Po1: +Gi1/0/5 -Gi1/0/4"));
    assert!(text.contains("~ EtherChannel Po2: state Down -> Up"));
}

#[test]
fn test_replayed_capture_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = HistoryStore::open(JsonLinesPersistence::new(temp_dir.path())).unwrap();
    collect(&mut store, "sw1_run1.log", 8);

    let capture = Capture::from_file(fixture("sw1_run1.log"), "cisco_ios").unwrap();
    let pipeline = Pipeline::new(TemplateMatcher::builtin().unwrap());
    let result = pipeline.record(&mut store, capture.hostname(), at(8), capture.blocks());
    assert!(result.is_err());
    assert_eq!(store.all("access-sw1").len(), 1);
}

#[test]
fn test_template_directory_adds_platform() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("index"),
        "Template, Hostname, Platform, Command\n\n\
         lab_stp.textfsm, .*, lab_os, sh[[ow]] spa[[nning-tree]]\n",
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("lab_stp.textfsm"),
        "Value Required PORT (\\S+)\nValue STATE (\\S+)\n\nStart\n  ^port\\s+${PORT}\\s+is\\s+${STATE}\\s*$$ -> Record\n",
    )
    .unwrap();

    let matcher = TemplateMatcher::builtin()
        .unwrap()
        .with_directory(temp_dir.path())
        .unwrap();
    let pipeline = Pipeline::new(matcher);

    let blocks = vec![
        RawBlock::new(
            "show spanning-tree",
            "port Ethernet1/1 is forwarding\nport Ethernet1/2 is blocking\n",
        )
        .with_platform("lab_os"),
    ];
    let run = pipeline.run("lab1", at(10), &blocks).unwrap();

    assert_eq!(run.stats.outcomes[0].template.as_deref(), Some("lab_stp.textfsm"));
    let ports: Vec<(&str, StpState)> = run
        .snapshot
        .stp_records()
        .iter()
        .map(|r| (r.interface.as_str(), r.state))
        .collect();
    assert_eq!(
        ports,
        vec![("Et1/1", StpState::Forwarding), ("Et1/2", StpState::Blocking)]
    );
}
