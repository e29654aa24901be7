//! Process memory and host identity via `sysinfo`.

use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};

/// Memory use of this process, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub resident: u64,
    pub virtual_bytes: u64,
}

/// Samples this process's memory use. Keeps its `System` between samples
/// so only our own process is refreshed.
pub struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        let pid = match get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "Process memory unavailable");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Current memory use, or `None` where the platform does not say.
    pub fn sample(&mut self) -> Option<MemorySample> {
        let pid = self.pid?;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self.system.process(pid)?;
        Some(MemorySample {
            resident: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// This host's name, `unknown` if it cannot be determined.
pub fn host_name() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}
