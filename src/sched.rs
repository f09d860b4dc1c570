//! Scheduling class and CPU affinity of the calling thread.

use crate::error::{Error, Result};
use nix::sched::{CpuSet, sched_setaffinity};
use nix::unistd::Pid;

/// Default SCHED_FIFO priority for the profiling thread
pub const DEFAULT_RT_PRIORITY: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPriority {
    /// SCHED_OTHER
    Normal,
    /// SCHED_FIFO at the given priority (1..=99)
    RealTime(i32),
}

impl ThreadPriority {
    fn policy_and_priority(self) -> (libc::c_int, libc::c_int) {
        match self {
            ThreadPriority::Normal => (libc::SCHED_OTHER, 0),
            ThreadPriority::RealTime(prio) => (libc::SCHED_FIFO, prio),
        }
    }
}

/// Change the scheduling class of the calling thread
pub fn set_current_thread_priority(priority: ThreadPriority) -> Result<()> {
    let (policy, prio) = priority.policy_and_priority();
    let param = libc::sched_param {
        sched_priority: prio,
    };

    let ret = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy, &param) };
    if ret != 0 {
        let err = std::io::Error::from_raw_os_error(ret);
        return Err(match ret {
            libc::EPERM => Error::PermissionDenied(format!(
                "Cannot switch to {:?}: {}. Run as root or grant CAP_SYS_NICE",
                priority, err
            )),
            _ => Error::Scheduling(format!("Failed to set {:?}: {}", priority, err)),
        });
    }

    Ok(())
}

/// Restrict the calling thread to a single logical CPU
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu)
        .map_err(|e| Error::Scheduling(format!("CPU {} out of range: {}", cpu, e)))?;

    // pid 0 is the calling thread
    sched_setaffinity(Pid::from_raw(0), &set)
        .map_err(|e| Error::Scheduling(format!("Failed to pin thread to CPU {}: {}", cpu, e)))
}

/// Number of configured logical CPUs
pub fn cpu_count() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if n < 1 { 1 } else { n as usize }
}
