// ⚖️ External Reconciler - local queue + optional prioritization authority
//
// Owns the one QueueStore. Network calls to the authority always happen
// BEFORE the write lock is taken; the lock covers only apply + recalculate.
// The authority is best-effort: if it is unreachable we score locally and
// flag the entry as locally derived.

use crate::authority::{AssessmentRequest, HttpAuthority, PriorityAuthority};
use crate::config::TriageConfig;
use crate::error::{Result, TriageError};
use crate::queue::{EntryScore, MergeReport, QueueEntry, QueueStats, QueueStore, ScoreSource};
use crate::risk::{assess, RiskAssessment};
use crate::vitals::IntakeForm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    /// The stored entry with its position and wait time
    pub entry: QueueEntry,
    /// Local risk breakdown (always computed, even when the authority scored)
    pub local_assessment: RiskAssessment,
    /// Set when the authority was configured but could not be used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl SubmissionOutcome {
    pub fn is_authoritative(&self) -> bool {
        self.entry.score_source == ScoreSource::Authoritative
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallNextOutcome {
    /// None means no patient is waiting
    pub patient: Option<QueueEntry>,
    pub remaining: Vec<QueueEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RefreshOutcome {
    /// Authority view merged into the local cache
    Applied(MergeReport),
    /// Another refresh was still running
    Skipped,
    /// No authority configured
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorityStatus {
    pub configured: bool,
    /// None until the first call completes
    pub reachable: Option<bool>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub refreshes_applied: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub queue_length: usize,
    pub authority: AuthorityStatus,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    store: RwLock<QueueStore>,
    authority: Option<Arc<dyn PriorityAuthority>>,
    status: RwLock<AuthorityStatus>,
    /// Held for the whole of a refresh; try_lock failure means skip
    refresh_guard: Mutex<()>,
}

impl Reconciler {
    /// Local-only mode: every score computed here
    pub fn local_only() -> Self {
        Self::build(None)
    }

    pub fn with_authority(authority: Arc<dyn PriorityAuthority>) -> Self {
        Self::build(Some(authority))
    }

    /// HTTP authority when AUTHORITY_URL is configured, local-only otherwise
    pub fn from_config(config: &TriageConfig) -> Result<Self> {
        match &config.authority_url {
            Some(url) => {
                let authority = HttpAuthority::new(url, config.authority_timeout)?;
                info!(
                    authority_url = %url,
                    timeout_secs = config.authority_timeout.as_secs(),
                    "External prioritization authority configured"
                );
                Ok(Self::with_authority(Arc::new(authority)))
            }
            None => {
                info!("No external authority configured, scoring locally");
                Ok(Self::local_only())
            }
        }
    }

    fn build(authority: Option<Arc<dyn PriorityAuthority>>) -> Self {
        let status = AuthorityStatus {
            configured: authority.is_some(),
            ..Default::default()
        };
        Reconciler {
            store: RwLock::new(QueueStore::new()),
            authority,
            status: RwLock::new(status),
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn has_authority(&self) -> bool {
        self.authority.is_some()
    }

    // ------------------------------------------------------------------------
    // Submit vitals
    // ------------------------------------------------------------------------

    /// Validate, score (remotely if possible), enqueue. Only validation
    /// failures are returned as errors.
    pub async fn submit_vitals(&self, form: &IntakeForm) -> Result<SubmissionOutcome> {
        let intake = form.validate()?;
        let checked_in = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();

        let local_assessment = assess(&intake.vitals, &intake.demographics);
        let local_score = || EntryScore::local(&local_assessment, intake.demographics.age);

        let (score, warning) = match &self.authority {
            None => (local_score(), None),
            Some(authority) => {
                let request = AssessmentRequest::new(&id, &intake);
                match authority.assess(&request).await {
                    Ok(remote) => {
                        self.record_success().await;
                        (remote.to_score(), None)
                    }
                    Err(e) => {
                        warn!(patient_id = %id, error = %e, "Authority unavailable, scoring locally");
                        self.record_failure(&e).await;
                        (
                            local_score(),
                            Some(format!(
                                "External prioritization unavailable ({}); score computed locally",
                                e
                            )),
                        )
                    }
                }
            }
        };

        let entry = QueueEntry::with_check_in(id, intake, score, checked_in);
        let entry = self.store.write().await.enqueue(entry);

        info!(
            patient_id = %entry.id,
            risk_level = %entry.risk_level,
            priority = entry.priority_score,
            source = ?entry.score_source,
            position = entry.queue_position,
            wait_minutes = entry.estimated_wait_time,
            "Patient enqueued"
        );

        Ok(SubmissionOutcome {
            entry,
            local_assessment,
            warning,
        })
    }

    // ------------------------------------------------------------------------
    // Queue operations
    // ------------------------------------------------------------------------

    pub async fn list_queue(&self) -> Vec<QueueEntry> {
        self.store.read().await.snapshot()
    }

    pub async fn peek_next(&self) -> Option<QueueEntry> {
        self.store.read().await.peek()
    }

    pub async fn stats(&self) -> QueueStats {
        self.store.read().await.stats()
    }

    /// Idempotent: unknown ids still return the (unchanged) queue
    pub async fn remove_entry(&self, id: &str) -> Vec<QueueEntry> {
        let (removed, queue) = {
            let mut store = self.store.write().await;
            let removed = store.remove(id);
            (removed, store.snapshot())
        };

        match &removed {
            Some(entry) => {
                info!(patient_id = %id, remaining = queue.len(), "Patient removed from queue");
                if entry.is_authoritative() {
                    if let Some(authority) = &self.authority {
                        let result = authority.remove(id).await;
                        self.note_notification("remove", result).await;
                    }
                }
            }
            None => debug!(patient_id = %id, "Remove of unknown id ignored"),
        }

        queue
    }

    pub async fn call_next(&self) -> CallNextOutcome {
        let (patient, remaining) = {
            let mut store = self.store.write().await;
            // Only fails on an empty queue
            let patient = store.dequeue_highest().ok();
            (patient, store.snapshot())
        };

        match &patient {
            Some(entry) => {
                info!(
                    patient_id = %entry.id,
                    risk_level = %entry.risk_level,
                    remaining = remaining.len(),
                    "Calling next patient"
                );
                // By id: the authority's own head may be someone else
                if entry.is_authoritative() {
                    if let Some(authority) = &self.authority {
                        let result = authority.remove(&entry.id).await;
                        self.note_notification("remove called", result).await;
                    }
                }
            }
            None => info!("Call next on empty queue"),
        }

        CallNextOutcome { patient, remaining }
    }

    /// Returns how many entries were cleared
    pub async fn clear_queue(&self) -> usize {
        let cleared = self.store.write().await.clear();
        info!(cleared, "Queue cleared");

        if let Some(authority) = &self.authority {
            let result = authority.clear().await;
            self.note_notification("clear", result).await;
        }
        cleared
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            queue_length: self.store.read().await.len(),
            authority: self.status.read().await.clone(),
        }
    }

    pub async fn authority_status(&self) -> AuthorityStatus {
        self.status.read().await.clone()
    }

    // ------------------------------------------------------------------------
    // Periodic reconciliation
    // ------------------------------------------------------------------------

    /// Pull the authority's queue and merge it. On failure the current cache
    /// is left untouched and the error returned. Local changes made while the
    /// fetch is in flight win over the fetched view.
    pub async fn refresh_from_authority(&self) -> Result<RefreshOutcome> {
        let Some(authority) = &self.authority else {
            return Ok(RefreshOutcome::Disabled);
        };

        let _running = match self.refresh_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Refresh already in progress, skipping");
                return Ok(RefreshOutcome::Skipped);
            }
        };

        let fetched_at = self.store.read().await.generation();

        let records = match authority.fetch_queue().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Authority refresh failed, keeping cached queue");
                self.record_failure(&e).await;
                return Err(e);
            }
        };

        let remote = records.into_iter().map(|r| r.into_remote()).collect();
        let report = self
            .store
            .write()
            .await
            .merge_remote_since(remote, fetched_at);

        {
            let mut status = self.status.write().await;
            status.last_refresh = Some(Utc::now());
            status.refreshes_applied += 1;
        }
        self.record_success().await;

        info!(
            updated = report.updated,
            added = report.added,
            dropped = report.dropped,
            kept_local = report.kept_local,
            stale = report.stale,
            "Queue reconciled with authority"
        );
        Ok(RefreshOutcome::Applied(report))
    }

    // ------------------------------------------------------------------------
    // Reachability bookkeeping
    // ------------------------------------------------------------------------

    async fn record_success(&self) {
        let mut status = self.status.write().await;
        status.reachable = Some(true);
        status.last_success = Some(Utc::now());
        status.last_error = None;
        status.consecutive_failures = 0;
    }

    async fn record_failure(&self, error: &TriageError) {
        let mut status = self.status.write().await;
        status.reachable = Some(false);
        status.last_error = Some(error.to_string());
        status.consecutive_failures += 1;
    }

    async fn note_notification(&self, what: &str, result: Result<()>) {
        match result {
            Ok(()) => self.record_success().await,
            Err(e) => {
                warn!(operation = what, error = %e, "Authority notification failed");
                self.record_failure(&e).await;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
