mod common;

use std::f64::consts::PI;
use std::sync::Mutex;

use common::{Call, Fault, FaultKind, MemoryStore, MockFactory};
use umb_core::{window_seed, Window};
use umb_sampler::{
    CancelToken, Phase, ProtocolConfig, RunObserver, RunOpts, Scheduler, WindowOutcome,
    WindowPlan, WindowState,
};

const SEED: u64 = 99;

#[test]
fn two_by_two_runs_every_window_in_order() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();
    let plan = common::plan();
    let reference = common::reference();
    let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED).run(&RunOpts::default());

    assert!(outcome.failure.is_none());
    assert_eq!(
        store.opened(),
        vec![
            "traj_psi_0_phi_0",
            "traj_psi_0_phi_1",
            "traj_psi_1_phi_0",
            "traj_psi_1_phi_1"
        ]
    );
    for (idx, window) in outcome.windows.iter().enumerate() {
        assert_eq!(window.window.linear_index, idx);
        assert_eq!(window.state, WindowState::Complete);
        assert_eq!(window.frames, 5);
        assert_eq!(
            window.phases,
            vec![
                Phase::Idle,
                Phase::Minimizing,
                Phase::Equilibrating,
                Phase::Producing,
                Phase::Done
            ]
        );
        let expected: Vec<f64> = window
            .window
            .indices()
            .iter()
            .map(|&i| -PI + i as f64 * PI)
            .collect();
        assert_eq!(window.window.centers(), expected);
        let stored = store.get(&window.window.file_stem()).unwrap();
        assert!(stored.finished);
        assert_eq!(stored.frames.len(), 5);
    }
    assert_eq!(*factory.contexts.lock().unwrap(), 1);
}

#[test]
fn engine_calls_follow_the_phase_protocol() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();
    let plan = common::plan();
    let reference = common::reference();
    Scheduler::new(&factory, &store, &plan, &reference, SEED)
        .run(&RunOpts::default())
        .into_result()
        .unwrap();

    let calls = factory.calls();
    // Force constants are set once, before the first window.
    assert_eq!(calls[0], Call::SetParameter("k_psi".into(), 100.0));
    assert_eq!(calls[1], Call::SetParameter("k_phi".into(), 100.0));

    let per_window = 2 + 1 + 1 + 3 + 1 + 5;
    assert_eq!(calls.len(), 2 + 4 * per_window);
    for (linear_index, chunk) in calls[2..].chunks(per_window).enumerate() {
        let psi = -PI + (linear_index / 2) as f64 * PI;
        let phi = -PI + (linear_index % 2) as f64 * PI;
        assert_eq!(chunk[0], Call::SetParameter("psi".into(), psi));
        assert_eq!(chunk[1], Call::SetParameter("phi".into(), phi));
        assert_eq!(chunk[2], Call::SetPositions(reference.clone()));
        assert_eq!(chunk[3], Call::Seed(window_seed(SEED, linear_index)));
        assert!(chunk[4..7].iter().all(|call| *call == Call::Minimize(4)));
        assert_eq!(chunk[7], Call::Step(10));
        assert!(chunk[8..].iter().all(|call| *call == Call::Step(2)));
    }
}

#[test]
fn positions_reset_at_every_window() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();
    let plan = common::plan();
    let reference = common::reference();
    Scheduler::new(&factory, &store, &plan, &reference, SEED)
        .run(&RunOpts::default())
        .into_result()
        .unwrap();

    let first = store.get("traj_psi_0_phi_0").unwrap();
    let last = store.get("traj_psi_1_phi_1").unwrap();
    assert_eq!(first.frames, last.frames);
    let resets = factory
        .calls()
        .into_iter()
        .filter(|call| *call == Call::SetPositions(reference.clone()))
        .count();
    assert_eq!(resets, 4);
}

#[test]
fn failure_at_third_window_stops_the_run() {
    let fault = Fault {
        centers: vec![("psi".into(), 0.0), ("phi".into(), -PI)],
        kind: FaultKind::StepAfter(2),
    };
    let factory = MockFactory::with_fault(fault);
    let store = MemoryStore::default();
    let plan = common::plan();
    let reference = common::reference();
    let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED).run(&RunOpts::default());

    let err = outcome.failure.clone().unwrap();
    assert_eq!(err.family(), "numerical");
    assert_eq!(err.info().context["phase"], "producing");
    assert_eq!(
        err.info().context["window"],
        "psi index: 1 out of 2, phi index: 0 out of 2"
    );

    let states: Vec<_> = outcome.windows.iter().map(|w| w.state).collect();
    assert_eq!(
        states,
        vec![
            WindowState::Complete,
            WindowState::Complete,
            WindowState::Failed,
            WindowState::Pending
        ]
    );
    for stem in ["traj_psi_0_phi_0", "traj_psi_0_phi_1"] {
        let stored = store.get(stem).unwrap();
        assert!(stored.finished);
        assert_eq!(stored.frames.len(), 5);
    }
    let failed = store.get("traj_psi_1_phi_0").unwrap();
    assert!(!failed.finished);
    assert_eq!(failed.frames.len(), 2);
    assert!(store.get("traj_psi_1_phi_1").is_none());
}

fn nan_energy_at_third_window() -> MockFactory {
    MockFactory::with_fault(Fault {
        centers: vec![("psi".into(), 0.0), ("phi".into(), -PI)],
        kind: FaultKind::NanEnergy,
    })
}

#[test]
fn non_finite_energy_during_minimization_aborts_before_production() {
    let factory = nan_energy_at_third_window();
    let store = MemoryStore::default();
    let plan = common::plan();
    let reference = common::reference();
    let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED).run(&RunOpts::default());

    let states: Vec<_> = outcome.windows.iter().map(|w| w.state).collect();
    assert_eq!(
        states,
        vec![
            WindowState::Complete,
            WindowState::Complete,
            WindowState::Failed,
            WindowState::Pending
        ]
    );
    let err = outcome.failure.unwrap();
    assert_eq!(err.family(), "numerical");
    assert_eq!(err.info().code, "non-finite-energy");
    assert_eq!(err.info().context["phase"], "minimizing");
    assert_eq!(
        err.info().context["window"],
        "psi index: 1 out of 2, phi index: 0 out of 2"
    );
    assert_eq!(store.opened(), vec!["traj_psi_0_phi_0", "traj_psi_0_phi_1"]);
    assert!(store.get("traj_psi_1_phi_0").is_none());
}

#[test]
fn starting_energy_is_checked_without_minimizer_calls() {
    let factory = nan_energy_at_third_window();
    let store = MemoryStore::default();
    let protocol = ProtocolConfig {
        minimize_calls: 0,
        ..common::short_protocol()
    };
    let plan = WindowPlan::new(common::two_by_two(), protocol);
    let reference = common::reference();
    let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED).run(&RunOpts::default());

    let err = outcome.failure.unwrap();
    assert_eq!(err.info().code, "non-finite-energy");
    assert_eq!(err.info().context["phase"], "minimizing");
    assert_eq!(outcome.windows[2].state, WindowState::Failed);
    assert!(factory
        .calls()
        .iter()
        .all(|call| !matches!(call, Call::Minimize(_))));
    assert_eq!(store.opened().len(), 2);
}

#[test]
fn resume_skips_completed_windows() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();
    store.insert_finished("traj_psi_0_phi_0", 5);
    store.insert_finished("traj_psi_0_phi_1", 3);
    let plan = common::plan();
    let reference = common::reference();
    let opts = RunOpts {
        resume: true,
        ..RunOpts::default()
    };
    let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED).run(&opts);

    assert!(outcome.failure.is_none());
    assert_eq!(outcome.count(WindowState::Reused), 1);
    assert_eq!(outcome.count(WindowState::Complete), 3);
    assert_eq!(outcome.windows[0].state, WindowState::Reused);
    assert_eq!(outcome.windows[0].frames, 5);
    assert_eq!(
        store.opened(),
        vec!["traj_psi_0_phi_1", "traj_psi_1_phi_0", "traj_psi_1_phi_1"]
    );
}

struct CancelAfterFirst {
    token: CancelToken,
    started: Mutex<Vec<usize>>,
}

impl RunObserver for CancelAfterFirst {
    fn window_started(&self, window: &Window, _total: usize) {
        self.started.lock().unwrap().push(window.linear_index);
    }

    fn window_finished(&self, _outcome: &WindowOutcome, _total: usize) {
        self.token.cancel();
    }
}

#[test]
fn cancellation_stops_at_window_boundary() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();
    let plan = common::plan();
    let reference = common::reference();
    let opts = RunOpts::default();
    let observer = CancelAfterFirst {
        token: opts.cancel.clone(),
        started: Mutex::new(Vec::new()),
    };
    let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED)
        .with_observer(&observer)
        .run(&opts);

    let err = outcome.failure.clone().unwrap();
    assert_eq!(err.family(), "cancelled");
    assert_eq!(*observer.started.lock().unwrap(), vec![0]);
    assert_eq!(outcome.count(WindowState::Complete), 1);
    assert_eq!(outcome.count(WindowState::Pending), 3);
    assert!(store.get("traj_psi_0_phi_0").unwrap().finished);
}

#[test]
fn partitioned_run_matches_sequential_frames() {
    let plan = common::plan();
    let reference = common::reference();

    let sequential_store = MemoryStore::default();
    Scheduler::new(&MockFactory::default(), &sequential_store, &plan, &reference, SEED)
        .run(&RunOpts::default())
        .into_result()
        .unwrap();

    for workers in [2, 3, 8] {
        let factory = MockFactory::default();
        let store = MemoryStore::default();
        let opts = RunOpts {
            workers,
            ..RunOpts::default()
        };
        let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED).run(&opts);
        assert!(outcome.failure.is_none());
        let order: Vec<_> = outcome.windows.iter().map(|w| w.window.linear_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(*factory.contexts.lock().unwrap(), workers.min(4));
        assert_eq!(*store.files.lock().unwrap(), *sequential_store.files.lock().unwrap());
    }
}

#[test]
fn partition_failure_leaves_sibling_blocks_complete() {
    let fault = Fault {
        centers: vec![("psi".into(), -PI), ("phi".into(), 0.0)],
        kind: FaultKind::StepAfter(0),
    };
    let factory = MockFactory::with_fault(fault);
    let store = MemoryStore::default();
    let plan = common::plan();
    let reference = common::reference();
    let opts = RunOpts {
        workers: 2,
        ..RunOpts::default()
    };
    let outcome = Scheduler::new(&factory, &store, &plan, &reference, SEED).run(&opts);

    let states: Vec<_> = outcome.windows.iter().map(|w| w.state).collect();
    assert_eq!(
        states,
        vec![
            WindowState::Complete,
            WindowState::Failed,
            WindowState::Complete,
            WindowState::Complete
        ]
    );
    let err = outcome.failure.unwrap();
    assert_eq!(err.family(), "numerical");
    assert_eq!(err.info().context["phase"], "producing");
}
