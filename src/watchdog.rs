//! Starvation detector for real-time workloads.
//!
//! A normal-priority thread raises a flag once per interval. A caller that
//! finds the flag still lowered on its next [`Watchdog::ping`] knows the
//! thread did not get to run, i.e. something with higher priority hogged
//! its CPU.

use crate::error::{Error, Result};
use crate::sched::{self, ThreadPriority};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Something that can report whether it ran since the last ask
pub trait Liveness {
    /// Returns and clears the "has run" flag
    fn ping(&self) -> bool;
}

/// Flag shared between the watchdog thread and its pingers
#[derive(Debug, Default)]
pub struct LivenessFlag(AtomicBool);

impl LivenessFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How often the flag is raised
    pub interval: Duration,
    /// Logical CPU the thread is pinned to
    pub cpu: Option<usize>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            interval: Duration::from_secs(1),
            cpu: None,
        }
    }
}

/// Handle to a running watchdog thread; joins the thread on drop.
pub struct Watchdog {
    alive: Arc<LivenessFlag>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Watchdog {
    /// Spawn the watchdog thread.
    ///
    /// Must be called before the caller switches itself to a real-time
    /// class, threads inherit the scheduling policy of their creator. The
    /// thread also resets itself to SCHED_OTHER explicitly.
    pub fn start(config: WatchdogConfig) -> Result<Self> {
        let alive = Arc::new(LivenessFlag::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let thread = {
            let alive = alive.clone();
            let stop = stop.clone();
            let config = config.clone();

            thread::Builder::new()
                .name("watchdog".to_string())
                .spawn(move || {
                    let setup = setup_thread(&config);
                    let failed = setup.is_err();
                    // Raise before reporting so the first ping sees a live thread
                    alive.raise();
                    let _ = ready_tx.send(setup);
                    if failed {
                        return;
                    }

                    while !stop.load(Ordering::Relaxed) {
                        alive.raise();
                        thread::park_timeout(config.interval);
                    }
                })
                .map_err(|e| Error::Watchdog(format!("Failed to spawn watchdog thread: {}", e)))?
        };

        let mut watchdog = Watchdog {
            alive,
            stop,
            thread: Some(thread),
            interval: config.interval,
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                watchdog.shutdown();
                return Err(Error::Watchdog("watchdog thread exited during setup".into()));
            }
        }

        log::info!(
            "watchdog started (interval {:?}, cpu {})",
            config.interval,
            config
                .cpu
                .map(|c| c.to_string())
                .unwrap_or_else(|| "any".to_string())
        );

        Ok(watchdog)
    }

    /// Whether the watchdog thread ran since the previous ping
    pub fn ping(&self) -> bool {
        self.alive.take()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.store(true, Ordering::Relaxed);
            thread.thread().unpark();
            let start = Instant::now();
            if thread.join().is_err() {
                log::warn!("watchdog thread panicked");
            }
            log::debug!("watchdog joined in {:?}", start.elapsed());
        }
    }
}

impl Liveness for Watchdog {
    fn ping(&self) -> bool {
        Watchdog::ping(self)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn setup_thread(config: &WatchdogConfig) -> Result<()> {
    if let Some(cpu) = config.cpu {
        sched::pin_current_thread(cpu)?;
    }
    sched::set_current_thread_priority(ThreadPriority::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_take_clears() {
        let flag = LivenessFlag::default();
        assert!(!flag.take());

        flag.raise();
        flag.raise();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_ping_after_start_succeeds() {
        let watchdog = Watchdog::start(WatchdogConfig {
            interval: Duration::from_millis(20),
            cpu: None,
        })
        .unwrap();

        assert!(watchdog.ping());

        thread::sleep(Duration::from_millis(100));
        assert!(watchdog.ping());
    }

    #[test]
    fn test_missed_interval_is_reported_once() {
        let watchdog = Watchdog::start(WatchdogConfig {
            interval: Duration::from_millis(300),
            cpu: None,
        })
        .unwrap();

        // Thread has raised the flag and is parked for the rest of the interval
        thread::sleep(Duration::from_millis(50));
        assert!(watchdog.ping());
        assert!(!watchdog.ping());

        thread::sleep(Duration::from_millis(450));
        assert!(watchdog.ping());
    }

    #[test]
    fn test_drop_joins_promptly() {
        let watchdog = Watchdog::start(WatchdogConfig {
            interval: Duration::from_secs(30),
            cpu: None,
        })
        .unwrap();

        let start = Instant::now();
        drop(watchdog);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_bad_cpu_fails_start() {
        let result = Watchdog::start(WatchdogConfig {
            interval: Duration::from_millis(20),
            cpu: Some(nix::sched::CpuSet::count() + 1),
        });
        assert!(result.is_err());
    }
}
