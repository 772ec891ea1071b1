use crate::service::process::{ProcessEntry, ProcessId};
use log::debug;
use sysinfo::{CpuRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Process enumeration and liveness shared by the platform backends.
pub struct ProcessTable {
    system: System,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Live processes. Threads are skipped: on Linux sysinfo reports them
    /// next to their process, often under the same name.
    pub fn processes(&mut self) -> Vec<ProcessEntry> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        let entries: Vec<ProcessEntry> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| ProcessEntry {
                id: ProcessId::new(pid.as_u32(), process.start_time()),
                name: process.name().to_string_lossy().to_string(),
            })
            .collect();

        debug!("Enumerated {} processes", entries.len());
        entries
    }

    pub fn is_running(&mut self, id: ProcessId) -> bool {
        let pid = Pid::from_u32(id.pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );

        self.system
            .process(pid)
            .is_some_and(|process| process.start_time() == id.start_time)
    }

    pub fn core_count(&mut self) -> usize {
        self.system.refresh_cpu_list(CpuRefreshKind::nothing());
        self.system.cpus().len().max(1)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
