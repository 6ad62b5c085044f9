//! scenario_replay_script
//!
//! Invariants under test:
//! - A scripted session replays to the same event sequence every time
//!   (ids aside).
//! - Selects in a script create anchors that appear in the next frame.
//! - The config hash of the loaded config is carried into the report.
//! - A config `world_parent_node` is resolved against the script's nodes and
//!   composes with the left-handed mirror.
//! - Scripts load from YAML and JSON files alike.

use std::io::Write;

use glam::Vec3;
use xra_config::load_layered_yaml_from_strings;
use xra_testkit::{Orchestrator, OrchestratorConfig, ReplayReport, ReplayScript};

const SCRIPT: &str = r#"
frames:
  - timestamp_us: 100
    anchors:
      - { handle: 1, last_changed_us: 100, pose: [1,0,0,0, 0,1,0,0, 0,0,1,0, 1,2,3,1] }
  - timestamp_us: 200
    anchors:
      - { handle: 1, last_changed_us: 100 }
      - { handle: 2, last_changed_us: 200 }
    select:
      - input_source: 0
        hits: [[1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,-1,1]]
  - timestamp_us: 300
    anchors:
      - { handle: 2, last_changed_us: 200 }
  - timestamp_us: 400
    anchors_reported: false
"#;

async fn replay(script: &ReplayScript) -> ReplayReport {
    let mut orch =
        Orchestrator::from_script(OrchestratorConfig::test_defaults(), script, None).unwrap();
    orch.run_script(script).await.unwrap()
}

fn shape(report: &ReplayReport) -> Vec<(usize, &'static str, u64)> {
    report
        .events
        .iter()
        .map(|r| (r.frame, r.event.kind(), r.event.anchor().handle.0))
        .collect()
}

#[tokio::test]
async fn scripted_session_produces_expected_events() {
    let script = ReplayScript::from_yaml_str(SCRIPT).unwrap();
    let report = replay(&script).await;

    assert_eq!(report.frames_pumped, 4);
    assert_eq!(report.selects_delivered, 0, "select listener is off by default");
    assert_eq!(shape(&report), [(0, "added", 1), (1, "added", 2), (2, "removed", 1)]);
    assert!(report.config_hash.is_none());

    let tracked: Vec<u64> = report.tracked.iter().map(|a| a.handle.0).collect();
    assert_eq!(tracked, [2]);
}

#[tokio::test]
async fn replay_is_deterministic() {
    let script = ReplayScript::from_yaml_str(SCRIPT).unwrap();
    let a = replay(&script).await;
    let b = replay(&script).await;

    assert_eq!(shape(&a), shape(&b));
    assert_ne!(a.run_id, b.run_id);
}

#[tokio::test]
async fn select_in_script_creates_anchor_when_enabled() {
    let script = ReplayScript::from_yaml_str(SCRIPT).unwrap();
    let config =
        load_layered_yaml_from_strings(&["anchors:\n  add_anchor_on_select: true\n"]).unwrap();

    let mut orch =
        Orchestrator::from_script(OrchestratorConfig::test_defaults(), &script, Some(&config))
            .unwrap();
    let report = orch.run_script(&script).await.unwrap();

    assert_eq!(report.selects_delivered, 1);
    assert_eq!(report.creations_requested, 1);
    assert_eq!(report.config_hash.as_deref(), Some(config.config_hash.as_str()));

    let created: Vec<_> = report
        .events
        .iter()
        .filter(|r| r.event.anchor().handle.0 == xra_testkit::CREATED_HANDLE_BASE)
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].frame, 2, "created after frame 1, reported in frame 2");
    let t = created[0].event.anchor().transformation_matrix.map(|m| m.w_axis.truncate());
    assert_eq!(t, Some(Vec3::new(0.0, 0.0, -1.0)));
}

#[tokio::test]
async fn configured_world_parent_composes_with_left_handed_mirror() {
    let script = ReplayScript::from_yaml_str(
        r#"
right_handed: false
nodes:
  xr-root: [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,3,0,1]
frames:
  - timestamp_us: 1
    anchors:
      - { handle: 1, last_changed_us: 1, pose: [1,0,0,0, 0,1,0,0, 0,0,1,0, 1,2,3,1] }
"#,
    )
    .unwrap();
    let config =
        load_layered_yaml_from_strings(&["anchors:\n  world_parent_node: xr-root\n"]).unwrap();

    let mut orch =
        Orchestrator::from_script(OrchestratorConfig::test_defaults(), &script, Some(&config))
            .unwrap();
    let report = orch.run_script(&script).await.unwrap();

    let m = report.tracked[0].transformation_matrix.unwrap();
    assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 5.0, -3.0));
}

#[test]
fn unknown_world_parent_node_is_an_error() {
    let script = ReplayScript::from_yaml_str(SCRIPT).unwrap();
    let config =
        load_layered_yaml_from_strings(&["anchors:\n  world_parent_node: nowhere\n"]).unwrap();

    let err = Orchestrator::from_script(OrchestratorConfig::test_defaults(), &script, Some(&config))
        .err()
        .unwrap();
    assert!(err.to_string().contains("nowhere"));
}

#[tokio::test]
async fn frame_limit_is_enforced() {
    let script = ReplayScript::from_yaml_str(SCRIPT).unwrap();
    let cfg = OrchestratorConfig { max_frames: 2 };
    let mut orch = Orchestrator::from_script(cfg, &script, None).unwrap();

    assert!(orch.run_script(&script).await.is_err());
}

#[tokio::test]
async fn yaml_and_json_files_replay_alike() {
    let dir = tempfile::tempdir().unwrap();
    let yaml_path = dir.path().join("session.yaml");
    std::fs::File::create(&yaml_path)
        .unwrap()
        .write_all(SCRIPT.as_bytes())
        .unwrap();

    let from_yaml = ReplayScript::load(&yaml_path).unwrap();
    let json_path = dir.path().join("session.json");
    std::fs::write(&json_path, serde_json::to_string(&from_yaml).unwrap()).unwrap();
    let from_json = ReplayScript::load(&json_path).unwrap();

    assert_eq!(from_yaml, from_json);
    assert_eq!(shape(&replay(&from_yaml).await), shape(&replay(&from_json).await));
}

#[tokio::test]
async fn report_serializes_events_with_type_tag() {
    let script = ReplayScript::from_yaml_str(SCRIPT).unwrap();
    let report = replay(&script).await;

    let v = serde_json::to_value(&report.events[0]).unwrap();
    assert_eq!(v["type"], "added");
    assert_eq!(v["frame"], 0);
    assert_eq!(v["timestamp_us"], 100);
    assert_eq!(v["anchor"]["handle"], 1);
}
