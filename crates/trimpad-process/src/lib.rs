//! Process lookup and signalling via the `/proc` filesystem.
//!
//! Finds processes by their `comm` name and delivers signals with `kill(2)` directly, without
//! shelling out to `pgrep`/`pkill`. Used to pause a foreground launcher while another program
//! owns the display, and to wake it again afterwards.

#![deny(unsafe_op_in_unsafe_fn)]

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to read {path}: {reason}")]
    ProcRead { path: String, reason: String },

    #[error("Invalid process name: {0}")]
    InvalidName(String),

    #[error("Failed to signal PID {pid} with {signal}: {source}")]
    Signal {
        pid: i32,
        signal: i32,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// One entry under `/proc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    /// Name from `/proc/<pid>/comm` (the kernel truncates it to 15 bytes)
    pub name: String,
}

/// Pause/resume capability for competing foreground programs.
///
/// Both calls are best-effort: the return value is the number of processes that were
/// actually signalled, and zero is not an error.
pub trait ProcessControl {
    fn pause(&self, name: &str) -> Result<usize>;
    fn resume(&self, name: &str) -> Result<usize>;
}

/// Scans a proc root for processes and signals them.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    proc_root: PathBuf,
    own_pid: i32,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Uses an alternative proc root. Only the directory layout matters, which is what the
    /// tests rely on.
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
            own_pid: std::process::id() as i32,
        }
    }

    /// All processes whose `comm` equals `name` exactly. Our own PID is never returned.
    pub fn find_by_name(&self, name: &str) -> Result<Vec<ProcessInfo>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProcessError::InvalidName(
                "name cannot be empty".to_string(),
            ));
        }
        // comm never holds more than 15 bytes, so longer names are compared on the prefix
        let wanted = truncate_comm(name);

        let mut matches = Vec::new();
        for pid in self.list_pids()? {
            if pid == self.own_pid {
                continue;
            }
            if let Some(info) = self.read_process_info(pid) {
                if info.name == wanted {
                    matches.push(info);
                }
            }
        }
        Ok(matches)
    }

    /// Numeric entries of the proc root.
    pub fn list_pids(&self) -> Result<Vec<i32>> {
        let entries = fs::read_dir(&self.proc_root).map_err(|e| ProcessError::ProcRead {
            path: self.proc_root.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            if let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() {
                if pid > 0 {
                    pids.push(pid);
                }
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }

    /// Sends `signal` to every process named `name`, returning how many accepted it.
    pub fn signal_name(&self, name: &str, signal: i32) -> Result<usize> {
        let mut delivered = 0;
        for proc in self.find_by_name(name)? {
            match signal_pid(proc.pid, signal) {
                Ok(()) => {
                    delivered += 1;
                    tracing::debug!(
                        "Signaled process {} ({}) with {}",
                        proc.pid,
                        proc.name,
                        signal
                    );
                }
                Err(err) => tracing::debug!("{}", err),
            }
        }
        Ok(delivered)
    }

    fn read_process_info(&self, pid: i32) -> Option<ProcessInfo> {
        // Processes vanish between read_dir and here; that just means no match.
        let comm = fs::read_to_string(self.proc_root.join(pid.to_string()).join("comm")).ok()?;
        Some(ProcessInfo {
            pid,
            name: comm.trim_end_matches('\n').to_string(),
        })
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for ProcessManager {
    fn pause(&self, name: &str) -> Result<usize> {
        self.signal_name(name, libc::SIGSTOP)
    }

    fn resume(&self, name: &str) -> Result<usize> {
        self.signal_name(name, libc::SIGCONT)
    }
}

/// Sends a signal to a single PID.
pub fn signal_pid(pid: i32, signal: i32) -> Result<()> {
    if pid <= 0 {
        // kill(0, ..) and kill(-1, ..) address process groups; never do that by accident
        return Err(ProcessError::Signal {
            pid,
            signal,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        });
    }
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(ProcessError::Signal {
            pid,
            signal,
            source: io::Error::last_os_error(),
        })
    }
}

fn truncate_comm(name: &str) -> &str {
    const TASK_COMM_LEN: usize = 15;
    if name.len() <= TASK_COMM_LEN {
        return name;
    }
    let mut end = TASK_COMM_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
