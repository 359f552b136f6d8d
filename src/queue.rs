// 📋 Queue Store - the single owned, ordered collection of waiting patients
//
// Every mutation ends with a full recalculation pass (sort, positions, wait
// times) inside the same &mut borrow, so no caller ever sees a half-updated
// queue. The id → name side-table lives here too: the external authority
// does not keep names, and eviction must happen in the same call that
// removes the entry.
//
// Ordering rule:
//   1. priority_score descending
//   2. check_in_time ascending (first come, first served)
//   3. id ascending (total order for identical timestamps)

use crate::error::{Result, TriageError};
use crate::priority::{clamp_priority, priority_score, LOCAL_CONFIDENCE};
use crate::risk::{RiskAssessment, RiskLevel};
use crate::vitals::{Demographics, Intake, VitalSigns};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

// ============================================================================
// SCORE PROVENANCE
// ============================================================================

/// Where an entry's risk level and priority came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    /// Adopted from the external prioritization authority
    Authoritative,
    /// Computed here by the risk assessor + priority scorer
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryScore {
    pub risk_level: RiskLevel,
    /// Accumulated clinical points; the authority does not report one
    pub risk_score: Option<u32>,
    pub priority_score: f64,
    pub confidence_score: f64,
    pub source: ScoreSource,
    /// The authority's own wait estimate, advisory only
    pub authority_wait_estimate: Option<u32>,
}

impl EntryScore {
    pub fn local(assessment: &RiskAssessment, age: f64) -> Self {
        EntryScore {
            risk_level: assessment.risk_level,
            risk_score: Some(assessment.risk_score),
            priority_score: priority_score(assessment, age),
            confidence_score: LOCAL_CONFIDENCE,
            source: ScoreSource::Local,
            authority_wait_estimate: None,
        }
    }

    pub fn authoritative(
        risk_level: RiskLevel,
        priority: f64,
        confidence: Option<f64>,
        wait_estimate: Option<u32>,
    ) -> Self {
        EntryScore {
            risk_level,
            risk_score: None,
            priority_score: clamp_priority(priority),
            confidence_score: confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(LOCAL_CONFIDENCE),
            source: ScoreSource::Authoritative,
            authority_wait_estimate: wait_estimate,
        }
    }
}

// ============================================================================
// QUEUE ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub name: String,
    pub vital_signs: VitalSigns,
    pub demographics: Demographics,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u32>,
    pub priority_score: f64,
    pub confidence_score: f64,
    pub score_source: ScoreSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_wait_estimate: Option<u32>,
    pub check_in_time: DateTime<Utc>,
    /// 1-based, recomputed on every mutation
    pub queue_position: usize,
    /// Minutes, recomputed on every mutation
    pub estimated_wait_time: u32,
}

impl QueueEntry {
    /// New entry checked in now; id left empty for the store to assign
    pub fn new(intake: Intake, score: EntryScore) -> Self {
        Self::with_check_in(String::new(), intake, score, Utc::now())
    }

    pub fn with_check_in(
        id: String,
        intake: Intake,
        score: EntryScore,
        check_in_time: DateTime<Utc>,
    ) -> Self {
        QueueEntry {
            id,
            name: intake.name,
            vital_signs: intake.vitals,
            demographics: intake.demographics,
            risk_level: score.risk_level,
            risk_score: score.risk_score,
            priority_score: clamp_priority(score.priority_score),
            confidence_score: score.confidence_score,
            score_source: score.source,
            authority_wait_estimate: score.authority_wait_estimate,
            check_in_time,
            queue_position: 0,
            estimated_wait_time: 0,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.score_source == ScoreSource::Authoritative
    }

    /// Adopt a new score. An authoritative score is never replaced by a
    /// local one; returns false when the update was refused.
    pub fn adopt(&mut self, score: EntryScore) -> bool {
        if self.is_authoritative() && score.source == ScoreSource::Local {
            return false;
        }
        self.risk_level = score.risk_level;
        if score.risk_score.is_some() {
            self.risk_score = score.risk_score;
        }
        self.priority_score = clamp_priority(score.priority_score);
        self.confidence_score = score.confidence_score;
        self.score_source = score.source;
        self.authority_wait_estimate = score.authority_wait_estimate;
        true
    }
}

/// The queue ordering rule as a comparator
pub fn queue_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| a.check_in_time.cmp(&b.check_in_time))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn placeholder_name(id: &str) -> String {
    format!("Patient {}", id.chars().take(8).collect::<String>())
}

// ============================================================================
// RECALCULATOR
// ============================================================================

/// Sort, then assign positions and cumulative wait times
pub fn recalculate(entries: &mut [QueueEntry]) {
    entries.sort_by(queue_order);

    let mut wait = 0u32;
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.queue_position = index + 1;
        entry.estimated_wait_time = wait;
        wait += entry.risk_level.service_minutes();
    }

    verify_invariants(entries);
}

/// Panics on any ordering/position/wait/score violation. A failure here is
/// a bug in this module, never bad input.
pub fn verify_invariants(entries: &[QueueEntry]) {
    let mut seen = HashSet::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(
            entry.queue_position,
            index + 1,
            "queue position gap or duplicate at index {}",
            index
        );
        assert!(seen.insert(entry.id.as_str()), "duplicate id {} in queue", entry.id);
        assert!(
            (0.0..=100.0).contains(&entry.priority_score),
            "priority {} out of range for {}",
            entry.priority_score,
            entry.id
        );

        if index == 0 {
            assert_eq!(entry.estimated_wait_time, 0, "head of queue must not wait");
        } else {
            let prev = &entries[index - 1];
            assert_ne!(
                queue_order(prev, entry),
                Ordering::Greater,
                "queue out of order at position {}",
                index + 1
            );
            assert!(
                prev.estimated_wait_time <= entry.estimated_wait_time,
                "wait time decreases at position {}",
                index + 1
            );
        }
    }
}

// ============================================================================
// QUEUE STATISTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_waiting: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    pub authoritative: usize,
    pub locally_derived: usize,
    pub average_wait_minutes: f64,
    pub longest_wait_minutes: u32,
    /// Patients popped via call-next since startup
    pub total_served: u64,
}

// ============================================================================
// AUTHORITY VIEW (input to a refresh merge)
// ============================================================================

/// One entry of the authority's queue, already converted to local types
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub id: String,
    pub score: EntryScore,
    pub vital_signs: VitalSigns,
    pub demographics: Demographics,
    pub check_in_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Local entries whose score was replaced by the authority's
    pub updated: usize,
    /// Entries only the authority knew about
    pub added: usize,
    /// Authoritative entries the authority no longer lists
    pub dropped: usize,
    /// Entries kept although the view does not list them: locally derived
    /// ones, or ones that changed locally after the fetch started
    pub kept_local: usize,
    /// Remote records ignored because the id changed locally after the
    /// fetch started
    pub stale: usize,
}

// ============================================================================
// QUEUE STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
    /// id → display name
    names: HashMap<String, String>,
    served: u64,
    /// Bumped on every local mutation
    generation: u64,
    /// id → generation of its last local insert/update/removal
    touched: HashMap<String, u64>,
    /// Generation of the last clear
    cleared_at: u64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or upsert by id) and recalculate. Returns the stored entry
    /// with its final position and wait time.
    pub fn enqueue(&mut self, mut entry: QueueEntry) -> QueueEntry {
        if entry.id.trim().is_empty() {
            entry.id = uuid::Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();

        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == id) {
            existing.name = entry.name.clone();
            existing.vital_signs = entry.vital_signs;
            existing.demographics = entry.demographics;
            existing.adopt(EntryScore {
                risk_level: entry.risk_level,
                risk_score: entry.risk_score,
                priority_score: entry.priority_score,
                confidence_score: entry.confidence_score,
                source: entry.score_source,
                authority_wait_estimate: entry.authority_wait_estimate,
            });
        } else {
            self.entries.push(entry.clone());
        }
        self.names.insert(id.clone(), entry.name);
        self.touch(&id);

        self.recalculate();
        self.find(&id).cloned().unwrap_or_else(|| unreachable!("entry {} vanished during enqueue", id))
    }

    /// Pop the position-1 entry
    pub fn dequeue_highest(&mut self) -> Result<QueueEntry> {
        if self.entries.is_empty() {
            return Err(TriageError::EmptyQueue);
        }
        self.recalculate();

        let next = self.entries.remove(0);
        self.names.remove(&next.id);
        self.served += 1;
        self.touch(&next.id);

        self.recalculate();
        Ok(next)
    }

    /// Remove by id. Unknown ids are a silent no-op (None), not an error.
    pub fn remove(&mut self, id: &str) -> Option<QueueEntry> {
        let removed = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .map(|index| self.entries.remove(index));
        self.names.remove(id);
        if removed.is_some() {
            self.touch(id);
        }

        self.recalculate();
        removed
    }

    /// Empty the queue, returning how many entries were cleared
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        for entry in std::mem::take(&mut self.entries) {
            self.touch(&entry.id);
        }
        self.names.clear();
        self.cleared_at = self.generation;
        cleared
    }

    /// Current mutation generation. Take it before fetching the authority's
    /// queue and hand it back to `merge_remote_since`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self, id: &str) {
        self.generation += 1;
        self.touched.insert(id.to_string(), self.generation);
    }

    fn changed_since(&self, id: &str, since: u64) -> bool {
        self.touched.get(id).is_some_and(|&at| at > since)
    }

    /// Ordered copy with a fresh sort + recalculation applied
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        let mut entries = self.entries.clone();
        recalculate(&mut entries);
        entries
    }

    /// Position-1 entry without removing it
    pub fn peek(&self) -> Option<QueueEntry> {
        self.entries.iter().min_by(|a, b| queue_order(a, b)).cloned()
    }

    pub fn find(&self, id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Side-table lookup
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn name_table_len(&self) -> usize {
        self.names.len()
    }

    pub fn stats(&self) -> QueueStats {
        let entries = self.snapshot();
        let count = |level: RiskLevel| entries.iter().filter(|e| e.risk_level == level).count();
        let authoritative = entries.iter().filter(|e| e.is_authoritative()).count();

        let total_wait: u64 = entries.iter().map(|e| e.estimated_wait_time as u64).sum();

        QueueStats {
            total_waiting: entries.len(),
            high_risk: count(RiskLevel::High),
            medium_risk: count(RiskLevel::Medium),
            low_risk: count(RiskLevel::Low),
            authoritative,
            locally_derived: entries.len() - authoritative,
            average_wait_minutes: if entries.is_empty() {
                0.0
            } else {
                total_wait as f64 / entries.len() as f64
            },
            longest_wait_minutes: entries.last().map_or(0, |e| e.estimated_wait_time),
            total_served: self.served,
        }
    }

    /// Merge a view fetched with nothing changing locally in between
    pub fn merge_remote(&mut self, remote: Vec<RemoteEntry>) -> MergeReport {
        self.merge_remote_since(remote, self.generation)
    }

    /// Replace the authoritative part of the queue with the authority's view.
    /// Names are re-attached from the side-table; locally derived entries the
    /// authority never saw are kept.
    ///
    /// `since` is the generation taken before the view was fetched. Ids that
    /// changed locally after it win over the view: they are neither dropped,
    /// re-scored nor re-added. After the merge the change journal is reset,
    /// so only one fetch may be in flight per store.
    pub fn merge_remote_since(&mut self, remote: Vec<RemoteEntry>, since: u64) -> MergeReport {
        let mut report = MergeReport::default();
        let remote_ids: HashSet<String> = remote.iter().map(|r| r.id.clone()).collect();
        let cleared_after_fetch = self.cleared_at > since;

        let (kept, dropped): (Vec<QueueEntry>, Vec<QueueEntry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| {
                !e.is_authoritative() || remote_ids.contains(&e.id) || self.changed_since(&e.id, since)
            });
        for gone in &dropped {
            self.names.remove(&gone.id);
        }
        report.dropped = dropped.len();
        self.entries = kept;

        let mut seen = HashSet::new();
        for record in remote {
            if !seen.insert(record.id.clone()) {
                continue;
            }
            if self.changed_since(&record.id, since) {
                report.stale += 1;
                continue;
            }

            let name = self
                .names
                .get(&record.id)
                .cloned()
                .unwrap_or_else(|| placeholder_name(&record.id));

            match self.entries.iter_mut().find(|e| e.id == record.id) {
                Some(existing) => {
                    existing.name = name;
                    existing.adopt(record.score);
                    report.updated += 1;
                }
                None if cleared_after_fetch => {
                    report.stale += 1;
                }
                None => {
                    let intake = Intake {
                        name: name.clone(),
                        vitals: record.vital_signs,
                        demographics: record.demographics,
                    };
                    self.entries.push(QueueEntry::with_check_in(
                        record.id.clone(),
                        intake,
                        record.score,
                        record.check_in_time.unwrap_or_else(Utc::now),
                    ));
                    self.names.insert(record.id, name);
                    report.added += 1;
                }
            }
        }

        report.kept_local = self
            .entries
            .iter()
            .filter(|e| !remote_ids.contains(&e.id))
            .count();

        self.touched.clear();
        self.recalculate();
        report
    }

    fn recalculate(&mut self) {
        recalculate(&mut self.entries);
        assert_eq!(
            self.names.len(),
            self.entries.len(),
            "name side-table out of sync with queue"
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
