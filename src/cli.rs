use crate::sched::{DEFAULT_RT_PRIORITY, cpu_count};
use crate::trigger::DEFAULT_FIFO_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted capture window
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Longest accepted watchdog interval
pub const MAX_WATCHDOG_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser, Debug)]
#[command(name = "poorperf")]
#[command(about = "Self-triggering CPU sampling profiler for real-time Linux hosts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Run mode
    #[arg(long, short = 'm', value_enum, default_value = "watchdog")]
    pub mode: Mode,

    /// Output file, or - for stdout (appended to)
    #[arg(long, short = 'o', default_value = "profile.txt")]
    pub output: PathBuf,

    /// Logical CPU to sample and to watch for starvation
    #[arg(long, short = 'c', default_value = "0")]
    pub cpu: usize,

    /// Length of each capture window
    #[arg(long, short = 'd', default_value = "5s", value_parser = parse_duration)]
    pub duration: Duration,

    /// Sampling frequency in Hz
    #[arg(long, short = 'F', default_value = "7000")]
    pub frequency: u64,

    /// Hardware event driving the sampling
    #[arg(long, value_enum, default_value = "cycles")]
    pub event: EventKind,

    /// Ring buffer data pages (power of two)
    #[arg(long, default_value = "1")]
    pub buffer_pages: usize,

    /// Control FIFO path; writing a byte to it starts a capture
    #[arg(long, default_value = DEFAULT_FIFO_PATH)]
    pub fifo: PathBuf,

    /// How often the watchdog thread checks in
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub watchdog_interval: Duration,

    /// SCHED_FIFO priority of the profiling thread
    #[arg(long, default_value_t = DEFAULT_RT_PRIORITY)]
    pub rt_priority: i32,

    /// Keep the profiling thread at normal priority
    #[arg(long)]
    pub no_realtime: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Capture whenever the control FIFO is written or the watchdog starves
    Watchdog,
    /// Capture one window immediately and exit
    Oneshot,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Cycles,
    Instructions,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    // Try humantime first
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Try bare number as seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 500ms, 5s, 1m, 90",
        s
    ))
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        let cpus = cpu_count();
        if self.cpu >= cpus {
            return Err(format!(
                "CPU {} does not exist, this host has {} logical CPUs",
                self.cpu, cpus
            ));
        }

        if self.duration.is_zero() {
            return Err("Capture duration must be greater than zero".to_string());
        }

        if self.duration > MAX_WINDOW {
            return Err(format!(
                "Capture duration must be at most {}, got {}",
                humantime::format_duration(MAX_WINDOW),
                humantime::format_duration(self.duration)
            ));
        }

        if self.frequency == 0 || self.frequency > 100_000 {
            return Err(format!(
                "Sampling frequency must be between 1 and 100000 Hz, got {}",
                self.frequency
            ));
        }

        if !self.buffer_pages.is_power_of_two() {
            return Err(format!(
                "Buffer pages must be a power of two, got {}",
                self.buffer_pages
            ));
        }

        if self.watchdog_interval < Duration::from_millis(10) {
            return Err(format!(
                "Watchdog interval must be at least 10ms, got {:?}",
                self.watchdog_interval
            ));
        }

        if self.watchdog_interval > MAX_WATCHDOG_INTERVAL {
            return Err(format!(
                "Watchdog interval must be at most {}, got {}",
                humantime::format_duration(MAX_WATCHDOG_INTERVAL),
                humantime::format_duration(self.watchdog_interval)
            ));
        }

        if !self.no_realtime && !(1..=99).contains(&self.rt_priority) {
            return Err(format!(
                "Real-time priority must be between 1 and 99, got {}",
                self.rt_priority
            ));
        }

        Ok(())
    }
}
