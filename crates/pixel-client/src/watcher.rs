use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::service::PixelBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Scheduled,
    Cancelled,
    Unchanged,
}

struct PendingReset {
    task: JoinHandle<()>,
    /// Set once the delay elapsed and the reset request is on its way.
    fired: Arc<AtomicBool>,
}

/// Schedules a delayed reset-all once the grid is fully adopted.
///
/// Owns at most one timer. Repeated "fully adopted" observations while a
/// timer is pending do nothing; an observation that is no longer fully
/// adopted cancels a timer that has not fired yet.
pub struct ResetWatcher {
    delay: Duration,
    pending: Option<PendingReset>,
}

impl ResetWatcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.task.is_finished())
    }

    pub fn observe<B: PixelBackend>(&mut self, fully_adopted: bool, backend: &Arc<B>) -> WatchAction {
        if fully_adopted {
            if self.is_pending() {
                return WatchAction::Unchanged;
            }
            self.schedule(backend.clone());
            return WatchAction::Scheduled;
        }

        match self.pending.take() {
            Some(pending) if !pending.task.is_finished() && !pending.fired.load(Ordering::Acquire) => {
                pending.task.abort();
                info!("Grid no longer fully adopted, reset cancelled");
                WatchAction::Cancelled
            }
            // A reset already in flight is left to finish.
            _ => WatchAction::Unchanged,
        }
    }

    /// Drop any timer that has not fired yet.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            if !pending.fired.load(Ordering::Acquire) {
                pending.task.abort();
            }
        }
    }

    fn schedule<B: PixelBackend>(&mut self, backend: Arc<B>) {
        let delay = self.delay;
        let fired = Arc::new(AtomicBool::new(false));
        let fired_flag = fired.clone();

        info!("All pixels adopted! Resetting in {} seconds", delay.as_secs());

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fired_flag.store(true, Ordering::Release);
            if !backend.reset_all().await {
                warn!("Automatic reset failed; will retry on the next full-adoption observation");
            }
        });

        self.pending = Some(PendingReset { task, fired });
    }
}

impl Drop for ResetWatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;
    use pixel_types::models::Pixel;

    const DELAY: Duration = Duration::from_secs(10);

    fn fully_adopted(count: u32) -> Arc<MemoryBackend> {
        let rows = (0..count).map(|id| Pixel {
            adopted: true,
            adopter: format!("visitor {}", id),
            version: 1,
            ..Pixel::unadopted(id)
        });
        Arc::new(MemoryBackend::with_rows(rows))
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resets_once_after_the_delay() {
        let backend = fully_adopted(4);
        let mut watcher = ResetWatcher::new(DELAY);

        assert_eq!(watcher.observe(true, &backend), WatchAction::Scheduled);
        assert_eq!(watcher.observe(true, &backend), WatchAction::Unchanged);
        assert!(watcher.is_pending());

        tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
        assert_eq!(backend.reset_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(backend.reset_count(), 1);
        assert!(backend.rows().iter().all(|p| !p.adopted));
        assert!(!watcher.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn losing_full_adoption_cancels_the_timer() {
        let backend = fully_adopted(4);
        let mut watcher = ResetWatcher::new(DELAY);

        watcher.observe(true, &backend);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(watcher.observe(false, &backend), WatchAction::Cancelled);
        assert_eq!(watcher.observe(false, &backend), WatchAction::Unchanged);

        tokio::time::sleep(DELAY * 2).await;
        settle().await;
        assert_eq!(backend.reset_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_timer_is_not_reported_as_cancelled() {
        let backend = fully_adopted(4);
        let mut watcher = ResetWatcher::new(DELAY);

        watcher.observe(true, &backend);
        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(watcher.observe(false, &backend), WatchAction::Unchanged);
        assert_eq!(backend.reset_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reset_can_be_rescheduled() {
        let backend = fully_adopted(4);
        backend.fail_writes(true);
        let mut watcher = ResetWatcher::new(DELAY);

        watcher.observe(true, &backend);
        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(backend.reset_count(), 0);
        assert!(!watcher.is_pending());

        backend.fail_writes(false);
        assert_eq!(watcher.observe(true, &backend), WatchAction::Scheduled);
        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(backend.reset_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_watcher_cancels_the_timer() {
        let backend = fully_adopted(4);
        {
            let mut watcher = ResetWatcher::new(DELAY);
            watcher.observe(true, &backend);
        }

        tokio::time::sleep(DELAY * 2).await;
        settle().await;
        assert_eq!(backend.reset_count(), 0);
    }
}
