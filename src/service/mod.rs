pub mod controller;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod priority;
pub mod privilege;
pub mod process;
pub mod shutdown;
pub mod table;
pub mod target;
pub mod tracker;
#[cfg(windows)]
pub mod win;

pub use controller::Controller;
pub use priority::PriorityScheme;
pub use process::{ControlError, ProcessControl};
pub use shutdown::ExitSignal;
pub use target::{Platform, Tier};
pub use tracker::TargetGroup;

/// Process control backend for the host platform.
#[cfg(target_os = "linux")]
pub fn host_control() -> anyhow::Result<Box<dyn ProcessControl>> {
    Ok(Box::new(linux::LinuxProcessControl::new()))
}

/// Process control backend for the host platform.
#[cfg(windows)]
pub fn host_control() -> anyhow::Result<Box<dyn ProcessControl>> {
    Ok(Box::new(win::WindowsProcessControl::new()))
}

/// Process control backend for the host platform.
#[cfg(not(any(target_os = "linux", windows)))]
pub fn host_control() -> anyhow::Result<Box<dyn ProcessControl>> {
    anyhow::bail!("process control is not supported on this platform")
}
