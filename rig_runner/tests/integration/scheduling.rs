//! Fan-out, exclusion and barrier behavior of the dispatcher.

use super::{HOLD, Probe, ProbeTest, build_rig};
use rig_runner::dispatch::Dispatcher;
use rig_runner::registry::{TestCase, TestRegistry};
use rig_runner::report::TargetOutcome;
use rig_runner::shutdown::ShutdownToken;
use std::time::Duration;

#[test]
fn axis_test_runs_every_axis_and_serializes_coupled_ones() {
    let (_, rig) = build_rig(&["A", "B"], &[&["A.axis0", "B.axis0"]]);
    let probe = Probe::shared();
    let registry = TestRegistry::new().with(TestCase::axis(ProbeTest::new("spin", &probe)));

    Dispatcher::new(&rig, ShutdownToken::new())
        .run_all(&registry)
        .unwrap();

    let mut targets = probe.targets("spin");
    targets.sort();
    assert_eq!(targets, ["A.axis0", "A.axis1", "B.axis0", "B.axis1"]);

    let a0 = probe.span("spin", "A.axis0");
    let b0 = probe.span("spin", "B.axis0");
    assert!(!a0.overlaps(&b0), "coupled axes ran at the same time");

    // Uncoupled axes share the rig with the coupled pair.
    assert!(probe.peak() >= 2);
}

#[test]
fn independent_axes_run_in_parallel() {
    let (_, rig) = build_rig(&["A", "B"], &[]);
    let probe = Probe::shared();
    let test = TestCase::axis(ProbeTest::new("spin", &probe).hold(Duration::from_millis(150)));

    Dispatcher::new(&rig, ShutdownToken::new())
        .dispatch(&test)
        .unwrap();

    assert_eq!(probe.spans().len(), 4);
    assert!(probe.peak() >= 2);
}

#[test]
fn axis_in_two_couplings_excludes_both_partners() {
    let (_, rig) = build_rig(
        &["A", "B", "C"],
        &[&["A.axis0", "B.axis0"], &["B.axis0", "C.axis0"]],
    );
    let probe = Probe::shared();
    let test = TestCase::axis(ProbeTest::new("spin", &probe));

    Dispatcher::new(&rig, ShutdownToken::new())
        .dispatch(&test)
        .unwrap();

    let b0 = probe.span("spin", "B.axis0");
    assert!(!b0.overlaps(&probe.span("spin", "A.axis0")));
    assert!(!b0.overlaps(&probe.span("spin", "C.axis0")));
}

#[test]
fn exclusive_device_test_runs_one_device_at_a_time_in_rig_order() {
    let (_, rig) = build_rig(&["c", "a", "b"], &[]);
    let probe = Probe::shared();
    let test =
        TestCase::exclusive_device(ProbeTest::new("flash", &probe).hold(Duration::from_millis(20)));

    Dispatcher::new(&rig, ShutdownToken::new())
        .dispatch(&test)
        .unwrap();

    assert_eq!(probe.peak(), 1);
    let mut spans = probe.spans();
    spans.sort_by_key(|s| s.start);
    let order: Vec<_> = spans.iter().map(|s| s.target.as_str()).collect();
    assert_eq!(order, ["c", "a", "b"]);
}

#[test]
fn shared_device_test_fans_out() {
    let (_, rig) = build_rig(&["a", "b", "c"], &[]);
    let probe = Probe::shared();
    let test =
        TestCase::device(ProbeTest::new("discover", &probe).hold(Duration::from_millis(150)));

    Dispatcher::new(&rig, ShutdownToken::new())
        .dispatch(&test)
        .unwrap();

    assert_eq!(probe.spans().len(), 3);
    assert!(probe.peak() >= 2);
}

#[test]
fn next_test_waits_for_slowest_branch() {
    let (_, rig) = build_rig(&["A", "B"], &[]);
    let probe = Probe::shared();
    let registry = TestRegistry::new()
        .with(TestCase::axis(
            ProbeTest::new("first", &probe)
                .hold(Duration::from_millis(5))
                .slow_on("B.axis1", Duration::from_millis(200)),
        ))
        .with(TestCase::device(ProbeTest::new("second", &probe).hold(Duration::from_millis(5))));

    Dispatcher::new(&rig, ShutdownToken::new())
        .run_all(&registry)
        .unwrap();

    let last_first = probe
        .spans()
        .into_iter()
        .filter(|s| s.test == "first")
        .map(|s| s.end)
        .max()
        .unwrap();
    for span in probe.spans().iter().filter(|s| s.test == "second") {
        assert!(
            span.start >= last_first,
            "second started on {} before first finished",
            span.target
        );
    }
}

#[test]
fn coupled_pair_test_runs_once_per_coupling_with_sorted_pair() {
    let (_, rig) = build_rig(
        &["A", "B"],
        &[&["B.axis1", "A.axis1"], &["A.axis0", "B.axis0"]],
    );
    let probe = Probe::shared();
    let test = TestCase::coupled_pair(ProbeTest::new("viscous", &probe).hold(HOLD));
    let dispatcher = Dispatcher::new(&rig, ShutdownToken::new());

    dispatcher.dispatch(&test).unwrap();

    let mut targets = probe.targets("viscous");
    targets.sort();
    assert_eq!(targets, ["A.axis0+B.axis0", "A.axis1+B.axis1"]);

    let records = dispatcher.into_records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.outcome == TargetOutcome::Passed));
}

#[test]
fn ignored_axis_is_never_targeted() {
    let connector = rig_runner::sim::SimConnector::new();
    let mut config = super::rig_config(&["A"], &[]);
    config.ignore = vec!["A.axis1".into()];
    let rig = rig_runner::RigContext::build(&config, &connector).unwrap();
    let probe = Probe::shared();

    Dispatcher::new(&rig, ShutdownToken::new())
        .dispatch(&TestCase::axis(ProbeTest::new("spin", &probe)))
        .unwrap();

    assert_eq!(probe.targets("spin"), ["A.axis0"]);
}
