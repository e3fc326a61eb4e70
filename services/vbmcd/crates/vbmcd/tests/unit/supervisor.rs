//! Supervisor lifecycle: add/start/stop/delete against a temporary store.

#![allow(clippy::expect_used)]

use vbmc_common::{AddOptions, BmcError, BmcStatus};
use vbmcd::application::ports::ConfigStore;

use crate::mocks::{FakeProbe, bare_metal, hypervisor, supervisor};

// ── add ───────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_persists_disabled_config() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    let created = sup.add(hypervisor("bmc1")).await.expect("add");
    assert!(!created.enabled);

    let view = sup.show("bmc1").expect("show");
    assert_eq!(view.config, created);
    assert_eq!(view.status, BmcStatus::Down);
    assert_eq!(spawner.spawned("bmc1"), 0);
}

#[tokio::test]
async fn add_twice_fails_and_keeps_original() {
    let (mut sup, _spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("first add");

    let mut second = hypervisor("bmc1");
    second.port = Some(7000);
    let err = sup.add(second).await.expect_err("second add");
    assert!(matches!(err, BmcError::AlreadyExists { .. }), "got: {err}");
    assert_eq!(err.rc(), 3);

    let kept = sup.show("bmc1").expect("show").config;
    assert_eq!(kept.port, 1623);
}

#[tokio::test]
async fn one_sided_sasl_is_rejected_before_anything_is_written() {
    let (mut sup, _spawner, _dir) = supervisor(FakeProbe::default());
    let options = AddOptions {
        sasl_username: Some("virt".into()),
        ..hypervisor("bmc1")
    };
    let err = sup.add(options).await.expect_err("add");
    assert_eq!(err.rc(), 4, "got: {err}");
    assert!(!sup.store().exists("bmc1"));
}

#[tokio::test]
async fn unreachable_backend_leaves_no_config() {
    let probe = FakeProbe {
        unreachable: true,
        ..FakeProbe::default()
    };
    let (mut sup, _spawner, _dir) = supervisor(probe);
    let err = sup.add(hypervisor("bmc1")).await.expect_err("add");
    assert!(matches!(err, BmcError::BackendUnreachable(_)), "got: {err}");
    assert!(sup.list().expect("list").is_empty());
}

#[tokio::test]
async fn hung_probe_is_bounded() {
    let probe = FakeProbe {
        hang: true,
        ..FakeProbe::default()
    };
    let (mut sup, _spawner, _dir) = supervisor(probe);
    let err = sup.add(hypervisor("bmc1")).await.expect_err("add");
    assert!(err.to_string().contains("timed out"), "got: {err}");
    assert!(!sup.store().exists("bmc1"));
}

#[tokio::test]
async fn backend_defaults_follow_the_name() {
    let (mut sup, _spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(bare_metal("node-3")).await.expect("add");
    let fields = sup.show("node-3").expect("show").fields(true);
    assert!(fields.contains(&("node_id".into(), "node-3".into())));
    assert!(fields.contains(&("cloud".into(), "overcloud".into())));
    assert!(!fields.iter().any(|(k, _)| k == "uri"));
}

// ── start / stop ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_add_start_stop_delete() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");

    sup.start("bmc1").await.expect("start");
    assert!(sup.show("bmc1").expect("show").config.enabled);
    assert_eq!(sup.status("bmc1"), BmcStatus::Running);
    assert_eq!(spawner.live("bmc1"), 1);

    sup.stop("bmc1").await.expect("stop");
    assert!(!sup.show("bmc1").expect("show").config.enabled);
    assert_eq!(sup.status("bmc1"), BmcStatus::Down);
    assert_eq!(spawner.live("bmc1"), 0);

    sup.delete("bmc1").await.expect("delete");
    let err = sup.show("bmc1").expect_err("show after delete");
    assert!(matches!(err, BmcError::NotFound { .. }));
}

#[tokio::test]
async fn start_is_idempotent() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    sup.start("bmc1").await.expect("start");
    sup.start("bmc1").await.expect("start again");
    assert_eq!(spawner.spawned("bmc1"), 1);
    assert_eq!(spawner.live("bmc1"), 1);
}

#[tokio::test]
async fn stop_twice_is_a_no_op() {
    let (mut sup, _spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    sup.start("bmc1").await.expect("start");
    sup.stop("bmc1").await.expect("stop");
    sup.stop("bmc1").await.expect("stop again");
    assert_eq!(sup.worker_count(), 0);
}

#[tokio::test]
async fn unknown_names_are_not_found() {
    let (mut sup, _spawner, _dir) = supervisor(FakeProbe::default());
    for err in [
        sup.start("ghost").await.expect_err("start"),
        sup.stop("ghost").await.expect_err("stop"),
        sup.delete("ghost").await.expect_err("delete"),
    ] {
        assert!(matches!(err, BmcError::NotFound { .. }), "got: {err}");
    }
}

#[tokio::test]
async fn spawn_failure_surfaces_and_shows_error_status() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    spawner.break_spawn("bmc1");

    let err = sup.start("bmc1").await.expect_err("start");
    assert!(matches!(err, BmcError::ProcessSpawn { .. }), "got: {err}");
    assert_eq!(sup.status("bmc1"), BmcStatus::Error);

    spawner.fix_spawn("bmc1");
    sup.periodic(false).await.expect("periodic");
    assert_eq!(sup.status("bmc1"), BmcStatus::Running);
}

#[tokio::test]
async fn failed_respawn_on_start_is_attempted_once() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    sup.start("bmc1").await.expect("start");
    spawner.kill("bmc1");
    spawner.break_spawn("bmc1");

    let err = sup.start("bmc1").await.expect_err("start");
    assert_eq!(err.rc(), 6);
    assert!(matches!(err, BmcError::ProcessSpawn { .. }), "got: {err}");
    assert_eq!(spawner.attempts("bmc1"), 2);
    assert_eq!(sup.status("bmc1"), BmcStatus::Error);
}

// ── reconciliation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn killed_worker_is_respawned_by_periodic_pass() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    sup.start("bmc1").await.expect("start");

    spawner.kill("bmc1");
    assert_eq!(sup.status("bmc1"), BmcStatus::Error);

    sup.periodic(false).await.expect("periodic");
    assert_eq!(sup.status("bmc1"), BmcStatus::Running);
    assert_eq!(spawner.spawned("bmc1"), 2);
    assert_eq!(spawner.live("bmc1"), 1);
}

#[tokio::test]
async fn restart_recovers_from_enabled_flags_alone() {
    let (mut sup, spawner, dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    sup.add(bare_metal("bmc2")).await.expect("add");
    sup.start("bmc1").await.expect("start");
    drop(sup);

    let mut restarted = vbmcd::application::services::Supervisor::new(
        vbmcd::infra::store::IniConfigStore::new(dir.path()),
        spawner.clone(),
        FakeProbe::default(),
        vbmcd::application::services::SupervisorSettings::default(),
    );
    assert_eq!(restarted.status("bmc1"), BmcStatus::Down);
    restarted.periodic(false).await.expect("periodic");
    assert_eq!(restarted.status("bmc1"), BmcStatus::Running);
    assert_eq!(restarted.status("bmc2"), BmcStatus::Down);
}

#[tokio::test]
async fn shutdown_pass_stops_everything_but_keeps_flags() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    for name in ["bmc1", "bmc2"] {
        sup.add(hypervisor(name)).await.expect("add");
        sup.start(name).await.expect("start");
    }
    sup.periodic(true).await.expect("shutdown");
    assert_eq!(spawner.live("bmc1") + spawner.live("bmc2"), 0);
    assert!(sup.show("bmc1").expect("show").config.enabled);
}

#[tokio::test]
async fn worker_of_vanished_config_is_terminated() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    sup.start("bmc1").await.expect("start");

    sup.store().delete("bmc1").expect("remove behind the supervisor");
    sup.periodic(false).await.expect("periodic");
    assert_eq!(spawner.live("bmc1"), 0);
    assert_eq!(sup.worker_count(), 0);
}

#[tokio::test]
async fn delete_after_crash_is_safe() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    sup.add(hypervisor("bmc1")).await.expect("add");
    sup.start("bmc1").await.expect("start");
    spawner.kill("bmc1");

    sup.delete("bmc1").await.expect("delete");
    assert_eq!(sup.worker_count(), 0);
    assert!(sup.list().expect("list").is_empty());
}

#[tokio::test]
async fn list_reports_status_of_every_instance() {
    let (mut sup, spawner, _dir) = supervisor(FakeProbe::default());
    for name in ["a", "b", "c"] {
        sup.add(hypervisor(name)).await.expect("add");
    }
    sup.start("a").await.expect("start");
    sup.start("b").await.expect("start");
    spawner.kill("b");

    let mut statuses: Vec<(String, BmcStatus)> = sup
        .list()
        .expect("list")
        .into_iter()
        .map(|v| (v.config.name, v.status))
        .collect();
    statuses.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        statuses,
        vec![
            ("a".into(), BmcStatus::Running),
            ("b".into(), BmcStatus::Error),
            ("c".into(), BmcStatus::Down),
        ]
    );
}
