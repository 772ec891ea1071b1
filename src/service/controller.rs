use crate::service::process::ProcessControl;
use crate::service::shutdown::ExitSignal;
use crate::service::target::ImageName;
use crate::service::tracker::TargetGroup;
use log::{debug, info};
use std::time::Duration;

const BANNER_RULE: &str = "= = = = = = = = = = = = = = = = = = = = = = = = = =";

/// Owns every target group and drives the poll cycle.
///
/// Original process state is restored exactly once: by `shutdown`, or on drop
/// if nobody called it (early return, panic unwinding).
pub struct Controller<C: ProcessControl> {
    groups: Vec<TargetGroup>,
    control: C,
    interval: Duration,
    restored: bool,
}

impl<C: ProcessControl> Controller<C> {
    /// `self_name` is the controller's own image name. A group targeting it is
    /// processed last so the controller finishes every other group before it
    /// possibly demotes itself.
    pub fn new(
        mut groups: Vec<TargetGroup>,
        control: C,
        interval: Duration,
        self_name: &ImageName,
    ) -> Self {
        move_self_last(&mut groups, self_name);
        debug!(
            "Controller order: {:?}",
            groups.iter().map(|g| g.name().as_str()).collect::<Vec<_>>()
        );

        Self {
            groups,
            control,
            interval,
            restored: false,
        }
    }

    pub fn groups(&self) -> &[TargetGroup] {
        &self.groups
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    /// Refresh every group once, in order. Stops early if exit is requested.
    /// Returns the number of settings changed.
    pub fn refresh_all(&mut self, exit: &ExitSignal) -> usize {
        let mut changed = 0;
        for group in &mut self.groups {
            if exit.is_set() {
                debug!("Exit requested, abandoning refresh cycle");
                break;
            }
            changed += group.refresh(&mut self.control);
        }
        changed
    }

    /// Poll until `exit` is triggered.
    pub async fn run(&mut self, exit: &ExitSignal) {
        info!(
            "Tracking {} target(s), polling every {}s",
            self.groups.len(),
            self.interval.as_secs()
        );

        let mut announced = false;
        while !exit.is_set() {
            debug!("Proc update...");
            self.refresh_all(exit);

            if !announced && !exit.is_set() {
                info!(
                    "Now active. To revert CPU priority changes, stop this program (Ctrl+C) when you are done."
                );
                announced = true;
            }

            if exit.wait(self.interval).await {
                break;
            }
        }
    }

    /// Restore every group's original process state. Only the first call
    /// does anything.
    pub fn shutdown(&mut self) {
        if self.restored {
            debug!("Original process state already restored");
            return;
        }
        self.restored = true;

        let mut restored = 0;
        for group in &mut self.groups {
            restored += group.restore(&mut self.control);
        }
        debug!("Restored {} setting(s)", restored);

        info!("{}", BANNER_RULE);
        info!("= {} is now exiting. Goodbye!", env!("CARGO_PKG_NAME"));
        info!("{}", BANNER_RULE);
    }
}

impl<C: ProcessControl> Drop for Controller<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn move_self_last(groups: &mut Vec<TargetGroup>, self_name: &ImageName) {
    if let Some(pos) = groups.iter().position(|g| g.name() == self_name) {
        let own = groups.remove(pos);
        groups.push(own);
    }
}
