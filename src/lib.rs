// Triage Queue - Core Library
// Exposes the queue engine for use in the CLI, the HTTP server, and tests

pub mod error;
pub mod config;
pub mod vitals;      // Intake validation
pub mod risk;        // Vital Sign Risk Assessor
pub mod priority;    // Priority Scorer
pub mod queue;       // Queue Store + Recalculator
pub mod authority;   // External prioritization authority client
pub mod reconciler;  // Local queue ⇄ authority
pub mod scheduler;   // Periodic authority refresh

// Re-export commonly used types
pub use error::{Result, TriageError, ValidationError};
pub use config::TriageConfig;
pub use vitals::{Demographics, Intake, IntakeForm, VitalSigns};
pub use risk::{assess, FactorScore, RiskAssessment, RiskFactor, RiskLevel, Tier};
pub use priority::{priority_score, LOCAL_CONFIDENCE, MAX_PRIORITY, MIN_PRIORITY};
pub use queue::{
    EntryScore, MergeReport, QueueEntry, QueueStats, QueueStore, RemoteEntry, ScoreSource,
};
pub use authority::{
    AssessmentRequest, AuthorityAssessment, AuthorityRecord, HttpAuthority, PriorityAuthority,
};
pub use reconciler::{
    AuthorityStatus, CallNextOutcome, HealthReport, Reconciler, RefreshOutcome,
    SubmissionOutcome,
};
pub use scheduler::{RefreshHandle, RefreshScheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
