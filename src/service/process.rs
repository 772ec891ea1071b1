#[cfg(unix)]
use nix::errno::Errno;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Identity of a live OS process.
///
/// The start time is part of the identity so a recycled PID is never mistaken
/// for the process that previously owned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId {
    pub pid: u32,
    pub start_time: u64,
}

impl ProcessId {
    pub fn new(pid: u32, start_time: u64) -> Self {
        Self { pid, start_time }
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID {}", self.pid)
    }
}

/// Raw platform priority value: a nice level on Unix, a priority class on Windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

/// Set of CPU core indices a process may run on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CoreSet(BTreeSet<usize>);

impl CoreSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, core: usize) -> bool {
        self.0.insert(core)
    }

    pub fn contains(&self, core: usize) -> bool {
        self.0.contains(&core)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Cores whose bit is set in `mask`, bit 0 being core 0.
    pub fn from_mask(mask: u64) -> Self {
        (0..u64::BITS as usize)
            .filter(|&core| mask & (1 << core) != 0)
            .collect()
    }

    /// Bitmask form of the set. `None` if a core does not fit in 64 bits.
    pub fn to_mask(&self) -> Option<u64> {
        self.iter().try_fold(0u64, |mask, core| {
            u32::try_from(core)
                .ok()
                .and_then(|shift| 1u64.checked_shl(shift))
                .map(|bit| mask | bit)
        })
    }
}

impl FromIterator<usize> for CoreSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, core) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", core)?;
        }
        write!(f, "]")
    }
}

/// A live process as seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub id: ProcessId,
    pub name: String,
}

/// Priority and affinity observed before the first modification.
///
/// A field is `None` when it could not be read at capture time; such a field
/// is never written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalState {
    pub priority: Option<Priority>,
    pub affinity: Option<CoreSet>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("permission denied for PID {pid}")]
    PermissionDenied { pid: u32 },
    #[error("PID {pid} is no longer running")]
    Vanished { pid: u32 },
    #[error("OS error {code} for PID {pid}")]
    Os { pid: u32, code: i32 },
    #[error("operation not supported on this platform")]
    Unsupported,
}

impl ControlError {
    #[cfg(unix)]
    pub fn from_errno(pid: u32, errno: Errno) -> Self {
        match errno {
            Errno::EPERM | Errno::EACCES => ControlError::PermissionDenied { pid },
            Errno::ESRCH => ControlError::Vanished { pid },
            errno => ControlError::Os {
                pid,
                code: errno as i32,
            },
        }
    }

    pub fn is_vanished(&self) -> bool {
        matches!(self, ControlError::Vanished { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ControlError::PermissionDenied { .. })
    }
}

/// OS capability for discovering processes and changing their scheduling.
///
/// Every mutation takes effect immediately. No error returned from here is
/// fatal to the caller.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl {
    /// Enumerate all live processes.
    fn processes(&mut self) -> Vec<ProcessEntry>;

    fn is_running(&mut self, id: ProcessId) -> bool;

    fn priority(&mut self, id: ProcessId) -> Result<Priority, ControlError>;

    fn set_priority(&mut self, id: ProcessId, priority: Priority) -> Result<(), ControlError>;

    fn affinity(&mut self, id: ProcessId) -> Result<CoreSet, ControlError>;

    fn set_affinity(&mut self, id: ProcessId, cores: &CoreSet) -> Result<(), ControlError>;

    /// Number of logical CPUs on the host.
    fn core_count(&mut self) -> usize;
}

macro_rules! forward_process_control {
    ($($wrapper:ty),*) => {$(
        impl<C: ProcessControl + ?Sized> ProcessControl for $wrapper {
            fn processes(&mut self) -> Vec<ProcessEntry> {
                (**self).processes()
            }

            fn is_running(&mut self, id: ProcessId) -> bool {
                (**self).is_running(id)
            }

            fn priority(&mut self, id: ProcessId) -> Result<Priority, ControlError> {
                (**self).priority(id)
            }

            fn set_priority(&mut self, id: ProcessId, priority: Priority) -> Result<(), ControlError> {
                (**self).set_priority(id, priority)
            }

            fn affinity(&mut self, id: ProcessId) -> Result<CoreSet, ControlError> {
                (**self).affinity(id)
            }

            fn set_affinity(&mut self, id: ProcessId, cores: &CoreSet) -> Result<(), ControlError> {
                (**self).set_affinity(id, cores)
            }

            fn core_count(&mut self) -> usize {
                (**self).core_count()
            }
        }
    )*};
}

forward_process_control!(&mut C, Box<C>);
