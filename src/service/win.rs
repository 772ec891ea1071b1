use crate::service::process::{
    ControlError, CoreSet, Priority, ProcessControl, ProcessEntry, ProcessId,
};
use crate::service::table::ProcessTable;
use log::debug;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE,
};
use windows::Win32::System::Threading::{
    GetPriorityClass, GetProcessAffinityMask, OpenProcess, PROCESS_ACCESS_RIGHTS,
    PROCESS_CREATION_FLAGS, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_INFORMATION,
    SetPriorityClass, SetProcessAffinityMask,
};

/// Process control through sysinfo, `{Get,Set}PriorityClass` and
/// `{Get,Set}ProcessAffinityMask`.
pub struct WindowsProcessControl {
    table: ProcessTable,
}

impl WindowsProcessControl {
    pub fn new() -> Self {
        debug!("Initializing Windows process control");
        Self {
            table: ProcessTable::new(),
        }
    }
}

impl Default for WindowsProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Process handle closed on drop.
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    fn open(id: ProcessId, access: PROCESS_ACCESS_RIGHTS) -> Result<Self, ControlError> {
        let handle = unsafe { OpenProcess(access, false, id.pid) }
            .map_err(|e| control_error(id.pid, &e))?;
        Ok(Self(handle))
    }

    fn query(id: ProcessId) -> Result<Self, ControlError> {
        Self::open(id, PROCESS_QUERY_LIMITED_INFORMATION)
    }

    fn modify(id: ProcessId) -> Result<Self, ControlError> {
        Self::open(id, PROCESS_SET_INFORMATION | PROCESS_QUERY_LIMITED_INFORMATION)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

fn control_error(pid: u32, error: &windows::core::Error) -> ControlError {
    let code = error.code();
    if code == ERROR_ACCESS_DENIED.to_hresult() {
        ControlError::PermissionDenied { pid }
    } else if code == ERROR_INVALID_PARAMETER.to_hresult() {
        // OpenProcess reports a PID that no longer exists this way
        ControlError::Vanished { pid }
    } else {
        ControlError::Os { pid, code: code.0 }
    }
}

impl ProcessControl for WindowsProcessControl {
    fn processes(&mut self) -> Vec<ProcessEntry> {
        self.table.processes()
    }

    fn is_running(&mut self, id: ProcessId) -> bool {
        self.table.is_running(id)
    }

    fn priority(&mut self, id: ProcessId) -> Result<Priority, ControlError> {
        let handle = ProcessHandle::query(id)?;
        let class = unsafe { GetPriorityClass(handle.0) };
        if class == 0 {
            return Err(control_error(id.pid, &windows::core::Error::from_win32()));
        }

        Ok(Priority(class as i32))
    }

    fn set_priority(&mut self, id: ProcessId, priority: Priority) -> Result<(), ControlError> {
        let handle = ProcessHandle::modify(id)?;
        unsafe { SetPriorityClass(handle.0, PROCESS_CREATION_FLAGS(priority.0 as u32)) }
            .map_err(|e| control_error(id.pid, &e))?;

        debug!("SetPriorityClass({}, {:#x}) succeeded", id.pid, priority.0);
        Ok(())
    }

    fn affinity(&mut self, id: ProcessId) -> Result<CoreSet, ControlError> {
        let handle = ProcessHandle::query(id)?;
        let mut process_mask: usize = 0;
        let mut system_mask: usize = 0;
        unsafe { GetProcessAffinityMask(handle.0, &mut process_mask, &mut system_mask) }
            .map_err(|e| control_error(id.pid, &e))?;

        Ok(CoreSet::from_mask(process_mask as u64))
    }

    fn set_affinity(&mut self, id: ProcessId, cores: &CoreSet) -> Result<(), ControlError> {
        let mask = cores
            .to_mask()
            .and_then(|mask| usize::try_from(mask).ok())
            .ok_or(ControlError::Unsupported)?;

        let handle = ProcessHandle::modify(id)?;
        unsafe { SetProcessAffinityMask(handle.0, mask) }
            .map_err(|e| control_error(id.pid, &e))?;

        debug!("SetProcessAffinityMask({}, {}) succeeded", id.pid, cores);
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

    fn own_id(control: &mut WindowsProcessControl) -> ProcessId {
        let pid = std::process::id();
        control
            .processes()
            .into_iter()
            .find(|entry| entry.id.pid == pid)
            .map(|entry| entry.id)
            .expect("own process should be listed")
    }

    #[test]
    fn test_read_own_priority_class_and_affinity() {
        let mut control = WindowsProcessControl::new();
        let id = own_id(&mut control);

        let priority = control.priority(id).unwrap();
        let label = PriorityScheme::PriorityClass.label(priority);
        assert!(!label.starts_with("Unknown"), "{}", label);

        let cores = control.affinity(id).unwrap();
        assert!(!cores.is_empty());
    }

    #[test]
    fn test_rewrite_own_affinity_is_allowed() {
        let mut control = WindowsProcessControl::new();
        let id = own_id(&mut control);

        let cores = control.affinity(id).unwrap();
        control.set_affinity(id, &cores).unwrap();
        assert_eq!(control.affinity(id).unwrap(), cores);
    }
}
