use crate::common::config::ConfigError;
use crate::service::priority::PriorityScheme;
use crate::service::privilege::Privilege;
use crate::service::process::{
    ControlError, CoreSet, OriginalState, Priority, ProcessControl, ProcessId,
};
use crate::service::target::{DesiredProfile, ImageName, Platform};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Tracks every live process of one executable name, enforces its desired
/// profile and remembers what each process looked like before we touched it.
///
/// Cached processes and their original states live in one map, so a process
/// is never tracked without a snapshot and a snapshot never outlives its
/// process entry.
pub struct TargetGroup {
    name: ImageName,
    profile: DesiredProfile,
    scheme: PriorityScheme,
    tracked: BTreeMap<ProcessId, OriginalState>,
}

impl TargetGroup {
    pub fn new(
        raw_name: &str,
        profile: DesiredProfile,
        platform: Platform,
        scheme: PriorityScheme,
    ) -> Result<Self, ConfigError> {
        let name = platform.normalize(raw_name)?;
        debug!("Now ready to track processes for: {} ({})", name, profile.tier);

        Ok(Self {
            name,
            profile,
            scheme,
            tracked: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &ImageName {
        &self.name
    }

    pub fn profile(&self) -> &DesiredProfile {
        &self.profile
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_tracking(&self, id: ProcessId) -> bool {
        self.tracked.contains_key(&id)
    }

    pub fn original_state(&self, id: ProcessId) -> Option<&OriginalState> {
        self.tracked.get(&id)
    }

    /// Forget dead processes, start tracking new ones and enforce the profile.
    /// Returns the number of settings changed.
    pub fn refresh<C: ProcessControl + ?Sized>(&mut self, ctl: &mut C) -> usize {
        self.prune(ctl);

        for entry in ctl.processes() {
            if entry.name != self.name.as_str() || self.tracked.contains_key(&entry.id) {
                continue;
            }

            if let Some(original) = self.capture(ctl, entry.id) {
                debug!(
                    "{}: tracking {} (priority: {}, affinity: {})",
                    self.name,
                    entry.id,
                    self.describe_priority(original.priority),
                    describe_affinity(original.affinity.as_ref())
                );
                self.tracked.insert(entry.id, original);
            }
        }

        info!(
            "{} (priority: {}) currently caching {} proc(s)",
            self.name,
            self.describe_priority(self.profile.priority),
            self.tracked.len()
        );

        self.apply_desired(ctl)
    }

    /// Bring every tracked process in line with the desired profile, writing
    /// only the fields that drifted. Returns the number of settings changed.
    pub fn apply_desired<C: ProcessControl + ?Sized>(&mut self, ctl: &mut C) -> usize {
        let mut changed = 0;

        for &id in self.tracked.keys() {
            if let Some(priority) = self.profile.priority {
                match sync_priority(ctl, id, priority) {
                    Ok(Some(_)) => {
                        info!(
                            "{}: set {} to {} priority",
                            self.name,
                            id,
                            self.scheme.label(priority)
                        );
                        changed += 1;
                    }
                    Ok(None) => {}
                    Err(e) => self.report_failure(&e),
                }
            }

            if let Some(ref cores) = self.profile.affinity {
                match sync_affinity(ctl, id, cores) {
                    Ok(Some(_)) => {
                        info!("{}: set {} affinity to CPU cores {}", self.name, id, cores);
                        changed += 1;
                    }
                    Ok(None) => {}
                    Err(e) => self.report_failure(&e),
                }
            }
        }

        changed
    }

    /// Put every still running tracked process back to its original state.
    ///
    /// Snapshots are consumed, so calling this again reports nothing to
    /// restore. Failures are logged and never stop the remaining processes.
    /// Returns the number of settings restored.
    pub fn restore<C: ProcessControl + ?Sized>(&mut self, ctl: &mut C) -> usize {
        info!("Restoring priority and affinity for instances of {}", self.name);
        self.prune(ctl);

        if self.tracked.is_empty() {
            info!("No instances of {} found; nothing to restore", self.name);
            return 0;
        }

        let mut restored = 0;
        for (id, original) in std::mem::take(&mut self.tracked) {
            if let Some(priority) = original.priority {
                match sync_priority(ctl, id, priority) {
                    Ok(Some(before)) => {
                        info!(
                            "Restored {} ({}) priority: {} => {}",
                            self.name,
                            id,
                            self.scheme.label(before),
                            self.scheme.label(priority)
                        );
                        restored += 1;
                    }
                    Ok(None) => {}
                    Err(e) if e.is_vanished() => {
                        debug!("{}: {} exited during restore, skipping", self.name, id);
                        continue;
                    }
                    Err(e) => self.report_failure(&e),
                }
            }

            if let Some(ref cores) = original.affinity {
                match sync_affinity(ctl, id, cores) {
                    Ok(Some(before)) => {
                        info!(
                            "Restored {} ({}) CPU core affinity: {} => {}",
                            self.name, id, before, cores
                        );
                        restored += 1;
                    }
                    Ok(None) => {}
                    Err(e) if e.is_vanished() => {
                        debug!("{}: {} exited during restore, skipping", self.name, id);
                    }
                    Err(e) => self.report_failure(&e),
                }
            }
        }

        restored
    }

    fn prune<C: ProcessControl + ?Sized>(&mut self, ctl: &mut C) {
        let before = self.tracked.len();
        self.tracked.retain(|id, _| ctl.is_running(*id));

        let dropped = before - self.tracked.len();
        if dropped > 0 {
            debug!("{}: dropped {} terminated proc(s)", self.name, dropped);
        }
    }

    /// Read the state a new process is in before any write. `None` if the
    /// process is already gone.
    fn capture<C: ProcessControl + ?Sized>(
        &self,
        ctl: &mut C,
        id: ProcessId,
    ) -> Option<OriginalState> {
        let priority = match ctl.priority(id) {
            Ok(priority) => Some(priority),
            Err(e) if e.is_vanished() => return None,
            Err(e) => {
                self.report_failure(&e);
                None
            }
        };

        let affinity = match ctl.affinity(id) {
            Ok(cores) => Some(cores),
            Err(e) if e.is_vanished() => return None,
            Err(e) => {
                self.report_failure(&e);
                None
            }
        };

        Some(OriginalState { priority, affinity })
    }

    fn report_failure(&self, error: &ControlError) {
        match error {
            ControlError::Vanished { .. } => debug!("{}: {}", self.name, error),
            ControlError::PermissionDenied { .. } => {
                warn!("{}: {}", self.name, error);
                Privilege::hint_elevation();
            }
            _ => warn!("{}: {}", self.name, error),
        }
    }

    fn describe_priority(&self, priority: Option<Priority>) -> String {
        priority
            .map(|p| self.scheme.label(p))
            .unwrap_or_else(|| "unchanged".to_string())
    }
}

fn describe_affinity(cores: Option<&CoreSet>) -> String {
    cores
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write `target` if the current priority differs. Returns the previous value
/// when a write happened.
fn sync_priority<C: ProcessControl + ?Sized>(
    ctl: &mut C,
    id: ProcessId,
    target: Priority,
) -> Result<Option<Priority>, ControlError> {
    let current = ctl.priority(id)?;
    if current == target {
        return Ok(None);
    }

    ctl.set_priority(id, target)?;
    Ok(Some(current))
}

fn sync_affinity<C: ProcessControl + ?Sized>(
    ctl: &mut C,
    id: ProcessId,
    target: &CoreSet,
) -> Result<Option<CoreSet>, ControlError> {
    let current = ctl.affinity(id)?;
    if &current == target {
        return Ok(None);
    }

    ctl.set_affinity(id, target)?;
    Ok(Some(current))
}
