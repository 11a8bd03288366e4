//! Lock ordering and coupling resolution properties.

use super::{Probe, ProbeTest, build_rig};
use proptest::prelude::*;
use rig_common::config::DeviceConfig;
use rig_runner::context::{AxisContext, DeviceContext, NamedMap, resolve_couplings};
use rig_runner::dispatch::Dispatcher;
use rig_runner::lock::LockPlan;
use rig_runner::registry::TestCase;
use rig_runner::shutdown::ShutdownToken;
use rig_runner::sim::SimDevice;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const DEVICES: [&str; 4] = ["odrive0", "odrive1", "odrive2", "odrive3"];

fn axis_pool() -> (Vec<Arc<DeviceContext>>, NamedMap<AxisContext>) {
    let devices: Vec<_> = DEVICES
        .iter()
        .map(|name| {
            DeviceContext::new(*name, DeviceConfig::default(), Arc::new(SimDevice::new(*name)))
        })
        .collect();
    let mut axes = NamedMap::new();
    for device in &devices {
        for axis in device.axes() {
            axes.insert(axis.name(), Arc::clone(axis));
        }
    }
    (devices, axes)
}

fn axis_names() -> Vec<String> {
    DEVICES
        .iter()
        .flat_map(|d| [format!("{d}.axis0"), format!("{d}.axis1")])
        .collect()
}

proptest! {
    /// A lock plan depends only on the set of axis names, never on the
    /// order they were supplied in.
    #[test]
    fn lock_plan_is_sorted_unique_and_order_independent(
        picks in prop::collection::vec(0usize..8, 0..16),
    ) {
        let (_devices, axes) = axis_pool();
        let all: Vec<_> = axes.values().cloned().collect();
        let chosen: Vec<_> = picks.iter().map(|&i| Arc::clone(&all[i])).collect();

        let forward = LockPlan::new(&chosen);
        let backward = LockPlan::new(chosen.iter().rev());

        let expected: Vec<&str> = picks
            .iter()
            .map(|&i| all[i].name())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        prop_assert_eq!(forward.names(), expected.clone());
        prop_assert_eq!(backward.names(), expected);
    }

    /// Resolved couplings always have at least two distinct, known members.
    #[test]
    fn resolved_couplings_are_never_degenerate(
        groups in prop::collection::vec(prop::collection::vec(0usize..10, 0..5), 0..6),
    ) {
        let (_devices, axes) = axis_pool();
        let names = axis_names();
        // Indices 8 and 9 name axes that do not exist.
        let raw: Vec<Vec<String>> = groups
            .iter()
            .map(|g| {
                g.iter()
                    .map(|&i| names.get(i).cloned().unwrap_or_else(|| format!("ghost{i}.axis0")))
                    .collect()
            })
            .collect();

        let couplings = resolve_couplings(&raw, &axes);
        let expected = raw
            .iter()
            .filter(|g| g.iter().filter(|n| axes.contains(n)).collect::<BTreeSet<_>>().len() >= 2)
            .count();
        prop_assert_eq!(couplings.len(), expected);
        for coupling in &couplings {
            let unique: BTreeSet<_> = coupling.axes().iter().map(|a| a.name()).collect();
            prop_assert!(unique.len() >= 2);
            prop_assert_eq!(unique.len(), coupling.axes().len());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Any coupling topology runs to completion without two coupled axes
    /// ever being driven at once.
    #[test]
    fn arbitrary_couplings_never_deadlock_or_overlap(
        pairs in prop::collection::vec((0usize..4, 0usize..4), 0..5),
    ) {
        let names = ["A.axis0", "A.axis1", "B.axis0", "B.axis1"];
        let groups: Vec<Vec<&str>> = pairs.iter().map(|&(a, b)| vec![names[a], names[b]]).collect();
        let group_refs: Vec<&[&str]> = groups.iter().map(Vec::as_slice).collect();
        let (_, rig) = build_rig(&["A", "B"], &group_refs);

        let probe = Probe::shared();
        let test = TestCase::axis(ProbeTest::new("spin", &probe).hold(Duration::from_millis(5)));
        Dispatcher::new(&rig, ShutdownToken::new()).dispatch(&test).unwrap();

        prop_assert_eq!(probe.spans().len(), 4);
        for coupling in rig.couplings() {
            let members: Vec<_> = coupling
                .axes()
                .iter()
                .map(|a| probe.span("spin", a.name()))
                .collect();
            for (i, a) in members.iter().enumerate() {
                for b in &members[i + 1..] {
                    prop_assert!(!a.overlaps(b), "{} overlapped {}", a.target, b.target);
                }
            }
        }
    }
}
