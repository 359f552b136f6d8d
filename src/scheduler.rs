// ⏱️ Refresh Scheduler - periodic pull of the authority's queue
//
// One background task, one refresh at a time. Ticks that arrive while a
// refresh is still running are skipped, not queued.

use crate::reconciler::{Reconciler, RefreshOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct RefreshScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

/// Running scheduler; dropping it without `stop` leaves the task running
/// until the runtime shuts down.
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshScheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        RefreshScheduler { reconciler, interval }
    }

    pub fn start(self) -> RefreshHandle {
        let (shutdown, mut stopped) = watch::channel(false);
        let RefreshScheduler { reconciler, interval } = self;

        info!(interval_secs = interval.as_secs(), "Starting authority refresh scheduler");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately; submissions already cover startup
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match reconciler.refresh_from_authority().await {
                            Ok(RefreshOutcome::Applied(_)) => {}
                            Ok(RefreshOutcome::Skipped) => debug!("Refresh tick skipped"),
                            Ok(RefreshOutcome::Disabled) => {
                                info!("No authority configured, scheduler exiting");
                                break;
                            }
                            Err(e) => warn!(error = %e, "Scheduled refresh failed"),
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Authority refresh scheduler stopped");
        });

        RefreshHandle { shutdown, task }
    }
}

impl RefreshHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task and wait for it. An in-flight refresh is allowed to
    /// finish first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Refresh scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{AssessmentRequest, AuthorityAssessment, AuthorityRecord, PriorityAuthority};
    use crate::error::{Result, TriageError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingAuthority {
        fetches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriorityAuthority for CountingAuthority {
        async fn assess(&self, _request: &AssessmentRequest) -> Result<AuthorityAssessment> {
            Err(TriageError::ExternalService("not scripted".into()))
        }

        async fn fetch_queue(&self) -> Result<Vec<AuthorityRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn remove_next(&self) -> Result<()> {
            Ok(())
        }

        async fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_refreshes_on_each_tick() {
        let authority = Arc::new(CountingAuthority::default());
        let reconciler = Arc::new(Reconciler::with_authority(authority.clone()));

        let handle = RefreshScheduler::new(reconciler, Duration::from_secs(300)).start();
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_secs(3 * 300 + 1)).await;
        assert_eq!(authority.fetches.load(Ordering::SeqCst), 3);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_refresh_after_stop() {
        let authority = Arc::new(CountingAuthority::default());
        let reconciler = Arc::new(Reconciler::with_authority(authority.clone()));

        let handle = RefreshScheduler::new(reconciler, Duration::from_secs(60)).start();
        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.stop().await;

        let after_stop = authority.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(authority.fetches.load(Ordering::SeqCst), after_stop);
        assert_eq!(after_stop, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_exits_without_authority() {
        let reconciler = Arc::new(Reconciler::local_only());
        let handle = RefreshScheduler::new(reconciler, Duration::from_secs(10)).start();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!handle.is_running());
        handle.stop().await;
    }
}
