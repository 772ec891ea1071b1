use crate::service::process::{
    ControlError, CoreSet, Priority, ProcessControl, ProcessEntry, ProcessId,
};
use crate::service::table::ProcessTable;
use log::debug;
use nix::errno::Errno;
use nix::sched::{CpuSet, sched_getaffinity, sched_setaffinity};
use nix::unistd::Pid as NixPid;

/// Process control through procfs (via sysinfo), `getpriority`/`setpriority`
/// and `sched_{get,set}affinity`.
pub struct LinuxProcessControl {
    table: ProcessTable,
}

impl LinuxProcessControl {
    pub fn new() -> Self {
        debug!("Initializing Linux process control");
        Self {
            table: ProcessTable::new(),
        }
    }

    fn nix_pid(id: ProcessId) -> NixPid {
        NixPid::from_raw(id.pid as i32)
    }
}

impl Default for LinuxProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for LinuxProcessControl {
    fn processes(&mut self) -> Vec<ProcessEntry> {
        self.table.processes()
    }

    fn is_running(&mut self, id: ProcessId) -> bool {
        self.table.is_running(id)
    }

    fn priority(&mut self, id: ProcessId) -> Result<Priority, ControlError> {
        // -1 is a valid nice level, so errno is the only failure signal
        Errno::clear();
        let nice = unsafe { libc::getpriority(libc::PRIO_PROCESS, id.pid as libc::id_t) };
        if nice == -1 && Errno::last_raw() != 0 {
            return Err(ControlError::from_errno(id.pid, Errno::last()));
        }

        Ok(Priority(nice))
    }

    fn set_priority(&mut self, id: ProcessId, priority: Priority) -> Result<(), ControlError> {
        let result =
            unsafe { libc::setpriority(libc::PRIO_PROCESS, id.pid as libc::id_t, priority.0) };
        Errno::result(result).map_err(|errno| ControlError::from_errno(id.pid, errno))?;

        debug!("setpriority({}, {}) succeeded", id.pid, priority.0);
        Ok(())
    }

    fn affinity(&mut self, id: ProcessId) -> Result<CoreSet, ControlError> {
        let cpuset = sched_getaffinity(Self::nix_pid(id))
            .map_err(|errno| ControlError::from_errno(id.pid, errno))?;

        Ok((0..CpuSet::count())
            .filter(|&core| cpuset.is_set(core).unwrap_or(false))
            .collect())
    }

    fn set_affinity(&mut self, id: ProcessId, cores: &CoreSet) -> Result<(), ControlError> {
        let mut cpuset = CpuSet::new();
        for core in cores.iter() {
            cpuset
                .set(core)
                .map_err(|errno| ControlError::from_errno(id.pid, errno))?;
        }

        sched_setaffinity(Self::nix_pid(id), &cpuset)
            .map_err(|errno| ControlError::from_errno(id.pid, errno))?;

        debug!("sched_setaffinity({}, {}) succeeded", id.pid, cores);
        Ok(())
    }

    fn core_count(&mut self) -> usize {
        self.table.core_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::priority::PriorityScheme;
    use crate::service::target::{DesiredProfile, Platform, Tier};
    use crate::service::tracker::TargetGroup;
    use std::sync::mpsc;

    const WORKER_NAME: &str = "procprio_worker";

    fn own_id(control: &mut LinuxProcessControl) -> ProcessId {
        let pid = std::process::id();
        control
            .processes()
            .into_iter()
            .find(|entry| entry.id.pid == pid)
            .map(|entry| entry.id)
            .expect("own process should be listed")
    }

    #[test]
    fn test_threads_are_not_listed_as_processes() {
        let (tid_tx, tid_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let worker = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || {
                tid_tx.send(unsafe { libc::gettid() } as u32).unwrap();
                let _ = done_rx.recv();
            })
            .unwrap();
        let tid = tid_rx.recv().unwrap();

        let mut control = LinuxProcessControl::new();
        let entries = control.processes();

        let mut group = TargetGroup::new(
            WORKER_NAME,
            DesiredProfile::new(Tier::Bad, None, None),
            Platform::UNIX,
            PriorityScheme::NiceLevel,
        )
        .unwrap();
        group.refresh(&mut control);

        done_tx.send(()).unwrap();
        worker.join().unwrap();

        assert_ne!(tid, std::process::id());
        assert!(entries.iter().any(|e| e.id.pid == std::process::id()));
        assert!(
            entries.iter().all(|e| e.id.pid != tid && e.name != WORKER_NAME),
            "thread {} listed as a process",
            tid
        );
        assert_eq!(group.tracked_count(), 0);
    }

    #[test]
    fn test_read_own_priority_and_affinity() {
        let mut control = LinuxProcessControl::new();
        let id = own_id(&mut control);

        let priority = control.priority(id).unwrap();
        assert!((-20..=19).contains(&priority.0));

        let cores = control.affinity(id).unwrap();
        assert!(!cores.is_empty());
        assert!(control.core_count() >= 1);
    }

    #[test]
    fn test_rewrite_own_affinity_is_allowed() {
        let mut control = LinuxProcessControl::new();
        let id = own_id(&mut control);

        let cores = control.affinity(id).unwrap();
        control.set_affinity(id, &cores).unwrap();
        assert_eq!(control.affinity(id).unwrap(), cores);
    }

    #[test]
    fn test_missing_process_is_vanished() {
        let mut control = LinuxProcessControl::new();
        // above the kernel's pid_max ceiling, never allocated
        let ghost = ProcessId::new(0x7fff_fff0, 0);
        assert!(!control.is_running(ghost));
        assert!(control.priority(ghost).unwrap_err().is_vanished());
    }
}
