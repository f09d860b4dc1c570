use poorperf::signal::CancelFlag;
use poorperf::trigger::{ControlFifo, TriggerOutcome, wait_for_trigger};
use poorperf::watchdog::Liveness;
use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

/// Reports healthy for the first `healthy` pings, starved afterwards
struct Scripted {
    healthy: usize,
    pings: Cell<usize>,
}

impl Scripted {
    fn new(healthy: usize) -> Self {
        Scripted {
            healthy,
            pings: Cell::new(0),
        }
    }
}

impl Liveness for Scripted {
    fn ping(&self) -> bool {
        let n = self.pings.get();
        self.pings.set(n + 1);
        n < self.healthy
    }
}

#[test]
fn test_external_write_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl");
    let fifo = ControlFifo::create(&path).unwrap();

    let writer = {
        let path = path.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut f = OpenOptions::new().write(true).open(&path).unwrap();
            f.write_all(b"1").unwrap();
        })
    };

    let liveness = Scripted::new(usize::MAX);
    let outcome = wait_for_trigger(
        &fifo,
        &liveness,
        Duration::from_millis(20),
        &CancelFlag::new(),
    )
    .unwrap();
    writer.join().unwrap();

    assert_eq!(outcome, TriggerOutcome::External);
    // The trigger byte was consumed
    assert_eq!(fifo.drain().unwrap(), 0);
}

#[test]
fn test_starvation_triggers_after_healthy_checks() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = ControlFifo::create(dir.path().join("ctl")).unwrap();

    let liveness = Scripted::new(2);
    let start = Instant::now();
    let outcome = wait_for_trigger(
        &fifo,
        &liveness,
        Duration::from_millis(20),
        &CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(outcome, TriggerOutcome::Starvation);
    assert_eq!(liveness.pings.get(), 3);
    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[test]
fn test_triggers_during_capture_are_coalesced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl");
    let fifo = ControlFifo::create(&path).unwrap();

    // Written before the wait is armed, as if during a capture window
    let mut f = OpenOptions::new().write(true).open(&path).unwrap();
    f.write_all(b"111").unwrap();
    drop(f);

    let liveness = Scripted::new(0);
    let outcome = wait_for_trigger(
        &fifo,
        &liveness,
        Duration::from_millis(20),
        &CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(outcome, TriggerOutcome::Starvation);
}

#[test]
fn test_cancel_from_another_thread() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = ControlFifo::create(dir.path().join("ctl")).unwrap();
    let cancel = CancelFlag::new();

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        })
    };

    let liveness = Scripted::new(usize::MAX);
    let outcome = wait_for_trigger(&fifo, &liveness, Duration::from_millis(20), &cancel).unwrap();
    canceller.join().unwrap();

    assert_eq!(outcome, TriggerOutcome::None);
}
