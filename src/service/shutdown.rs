use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Inner {
    exiting: AtomicBool,
    wake: Notify,
}

/// Cooperative exit flag shared between signal listeners and the poll loop.
///
/// Listeners only flip the flag and wake the loop; restoring happens in the
/// loop's own task once it observes the flag.
#[derive(Clone, Default)]
pub struct ExitSignal {
    inner: Arc<Inner>,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.inner.exiting.load(Ordering::SeqCst)
    }

    /// Request exit and wake a pending `wait`.
    pub fn trigger(&self, reason: &str) {
        if !self.inner.exiting.swap(true, Ordering::SeqCst) {
            info!("Caught {}, shutting down", reason);
        } else {
            debug!("Caught {} while already shutting down", reason);
        }
        // notify_one keeps a permit if nobody is waiting yet
        self.inner.wake.notify_one();
    }

    /// Sleep for `period` unless exit is requested first. Returns whether exit
    /// was requested.
    pub async fn wait(&self, period: Duration) -> bool {
        if self.is_set() {
            return true;
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = self.inner.wake.notified() => {}
        }

        self.is_set()
    }

    /// Spawn a task that triggers on SIGINT, SIGTERM or SIGHUP (terminal closed).
    #[cfg(unix)]
    pub fn listen(&self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let exit = self.clone();

        Ok(tokio::spawn(async move {
            let reason = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
                _ = sighup.recv() => "SIGHUP",
            };
            exit.trigger(reason);
        }))
    }

    /// Spawn a task that triggers on Ctrl+C, Ctrl+Break or the console window
    /// being closed.
    #[cfg(windows)]
    pub fn listen(&self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close};

        let mut interrupt = ctrl_c()?;
        let mut brk = ctrl_break()?;
        let mut close = ctrl_close()?;
        let exit = self.clone();

        Ok(tokio::spawn(async move {
            let reason = tokio::select! {
                _ = interrupt.recv() => "Ctrl+C",
                _ = brk.recv() => "Ctrl+Break",
                _ = close.recv() => "console close",
            };
            exit.trigger(reason);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_times_out_without_trigger() {
        let exit = ExitSignal::new();
        assert!(!exit.wait(Duration::from_millis(10)).await);
        assert!(!exit.is_set());
    }

    #[tokio::test]
    async fn test_trigger_before_wait_returns_immediately() {
        let exit = ExitSignal::new();
        exit.trigger("test");
        let woke = tokio::time::timeout(Duration::from_secs(5), exit.wait(Duration::from_secs(3600)))
            .await
            .expect("wait should not sleep once triggered");
        assert!(woke);
    }

    #[tokio::test]
    async fn test_trigger_interrupts_pending_wait() {
        let exit = ExitSignal::new();
        let trigger = exit.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger("test");
        });

        let woke = tokio::time::timeout(Duration::from_secs(5), exit.wait(Duration::from_secs(3600)))
            .await
            .expect("trigger should abort the sleep");
        assert!(woke);
    }

    #[tokio::test]
    async fn test_repeated_trigger_is_harmless() {
        let exit = ExitSignal::new();
        exit.trigger("first");
        exit.trigger("second");
        assert!(exit.is_set());
        assert!(exit.wait(Duration::from_millis(10)).await);
    }
}
