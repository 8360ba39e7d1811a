use parking_lot::Mutex;
use std::time::Duration;
use timer::{Guard, Timer};

/// Background sweeper that periodically expires documents covered by TTL
/// indexes.
///
/// The task keeps running until the monitor is stopped or dropped.
pub(crate) struct TtlMonitor {
    timer: Timer,
    guard: Mutex<Option<Guard>>,
}

impl TtlMonitor {
    pub(crate) fn new() -> TtlMonitor {
        TtlMonitor {
            timer: Timer::new(),
            guard: Mutex::new(None),
        }
    }

    /// Schedules `sweep` every `interval`, replacing any earlier schedule.
    pub(crate) fn start<F>(&self, interval: Duration, sweep: F)
    where
        F: 'static + FnMut() + Send,
    {
        match chrono::Duration::from_std(interval) {
            Ok(chrono_interval) => {
                let guard = self.timer.schedule_repeating(chrono_interval, sweep);
                *self.guard.lock() = Some(guard);
            }
            Err(e) => {
                log::error!("Invalid TTL monitor interval {:?}: {}, expiry disabled", interval, e);
            }
        }
    }

    pub(crate) fn stop(&self) {
        self.guard.lock().take();
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.guard.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use test_retry::retry;

    #[test]
    #[retry]
    fn sweep_runs_repeatedly() {
        let monitor = TtlMonitor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        monitor.start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert!(monitor.is_running());

        awaitility::at_most(Duration::from_millis(500)).until(|| runs.load(Ordering::Relaxed) >= 2);
    }

    #[test]
    fn stop_cancels_schedule() {
        let monitor = TtlMonitor::new();
        monitor.start(Duration::from_secs(60), || {});
        monitor.stop();
        assert!(!monitor.is_running());
    }
}
