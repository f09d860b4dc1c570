use super::maps::{Region, executable_regions};
use crate::error::Result;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Name used when a process has an empty comm
pub const UNKNOWN_COMM: &str = "??";

/// Source of process and kernel information.
///
/// [`ProcFs`] reads the live system; tests provide synthetic trees.
pub trait ProcSource {
    /// PIDs of every process visible right now
    fn pids(&self) -> io::Result<Vec<u32>>;

    /// Contents of /proc/[pid]/comm
    fn comm(&self, pid: u32) -> io::Result<String>;

    /// Contents of /proc/[pid]/maps
    fn maps(&self, pid: u32) -> io::Result<String>;

    /// Contents of /proc/kallsyms
    fn kallsyms(&self) -> io::Result<String>;
}

/// procfs mounted at `root`
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ProcFs { root: root.into() }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        ProcFs::new("/proc")
    }
}

impl ProcSource for ProcFs {
    fn pids(&self) -> io::Result<Vec<u32>> {
        let mut pids = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            // Only numeric directories are processes
            if let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) {
                pids.push(pid);
            }
        }

        Ok(pids)
    }

    fn comm(&self, pid: u32) -> io::Result<String> {
        fs::read_to_string(self.root.join(pid.to_string()).join("comm"))
    }

    fn maps(&self, pid: u32) -> io::Result<String> {
        fs::read_to_string(self.root.join(pid.to_string()).join("maps"))
    }

    fn kallsyms(&self) -> io::Result<String> {
        fs::read_to_string(self.root.join("kallsyms"))
    }
}

/// A process as seen when the snapshot was taken
#[derive(Debug, Clone, Default)]
pub struct ProcessEntry {
    pub comm: String,
    /// Executable regions in maps order
    pub regions: Vec<Region>,
}

impl ProcessEntry {
    /// First region containing `addr`
    pub fn find_region(&self, addr: u64) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr))
    }
}

/// Executable mappings of every process running at capture time.
///
/// Never refreshed; processes started later are simply absent.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    processes: HashMap<u32, ProcessEntry>,
}

impl ProcessSnapshot {
    /// Walk every process in `source`.
    ///
    /// Processes that exit (or deny access) while being read are skipped.
    pub fn capture<S: ProcSource + ?Sized>(source: &S) -> Result<Self> {
        let mut processes = HashMap::new();

        for pid in source.pids()? {
            let entry = source
                .comm(pid)
                .and_then(|comm| Ok((comm, source.maps(pid)?)));

            match entry {
                Ok((comm, maps)) => {
                    processes.insert(
                        pid,
                        ProcessEntry {
                            comm: comm
                                .lines()
                                .next()
                                .filter(|c| !c.is_empty())
                                .unwrap_or(UNKNOWN_COMM)
                                .to_string(),
                            regions: executable_regions(&maps),
                        },
                    );
                }
                Err(e) => log::debug!("skipping PID {}: {}", pid, e),
            }
        }

        log::info!("took map snapshot of {} running processes", processes.len());

        Ok(ProcessSnapshot { processes })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (u32, ProcessEntry)>) -> Self {
        ProcessSnapshot {
            processes: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessEntry> {
        self.processes.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}
