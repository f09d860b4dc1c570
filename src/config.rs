use crate::cli::{Cli, EventKind};
use crate::cpu::{SampledEvent, SessionConfig};
use crate::sched::ThreadPriority;
use crate::watchdog::WatchdogConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the run modes need, derived from a validated [`Cli`]
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    pub output: PathBuf,
    pub fifo: PathBuf,
    /// Length of one capture window
    pub window: Duration,
    pub session: SessionConfig,
    pub watchdog: WatchdogConfig,
    /// How often the watchdog is pinged while waiting for a trigger
    pub check_interval: Duration,
    /// Scheduling class of the profiling thread once the watchdog runs
    pub priority: ThreadPriority,
}

impl ProfilerConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let event = match cli.event {
            EventKind::Cycles => SampledEvent::Cycles,
            EventKind::Instructions => SampledEvent::Instructions,
        };

        ProfilerConfig {
            output: cli.output.clone(),
            fifo: cli.fifo.clone(),
            window: cli.duration,
            session: SessionConfig {
                cpu: cli.cpu,
                frequency: cli.frequency,
                event,
                data_pages: cli.buffer_pages,
            },
            watchdog: WatchdogConfig {
                interval: cli.watchdog_interval,
                cpu: Some(cli.cpu),
            },
            // A healthy watchdog raises its flag at least once between pings
            check_interval: cli.watchdog_interval.saturating_mul(2),
            priority: if cli.no_realtime {
                ThreadPriority::Normal
            } else {
                ThreadPriority::RealTime(cli.rt_priority)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli() {
        let cli = Cli::try_parse_from([
            "poorperf",
            "--event",
            "instructions",
            "--watchdog-interval",
            "300ms",
            "--rt-priority",
            "70",
        ])
        .unwrap();
        let config = ProfilerConfig::from_cli(&cli);

        assert_eq!(config.session.event, SampledEvent::Instructions);
        assert_eq!(config.session.cpu, 0);
        assert_eq!(config.watchdog.cpu, Some(0));
        assert_eq!(config.watchdog.interval, Duration::from_millis(300));
        assert_eq!(config.check_interval, Duration::from_millis(600));
        assert_eq!(config.priority, ThreadPriority::RealTime(70));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let cli = Cli::try_parse_from(["poorperf", "--watchdog-interval", "18446744073709551615"])
            .unwrap();
        assert_eq!(ProfilerConfig::from_cli(&cli).check_interval, Duration::MAX);
    }

    #[test]
    fn test_no_realtime() {
        let cli = Cli::try_parse_from(["poorperf", "--no-realtime"]).unwrap();
        assert_eq!(ProfilerConfig::from_cli(&cli).priority, ThreadPriority::Normal);
    }
}
