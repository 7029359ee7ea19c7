//! Confirma Core Library
//!
//! Matching of client trades against bank confirmations, and what follows a match:
//! - Field normalization and weighted comparison
//! - Match resolution with duplicate detection and atomic commit
//! - Priority-ordered settlement rules and account resolution
//! - Deferred confirm/dispute automation with pluggable notifiers
//! - Database access and migrations

pub mod automation;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod settlement;

/// Fixtures shared by unit, integration and server tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use automation::{AutomationScheduler, SweepReport};
pub use compare::{compare, compare_fields, Comparison, FieldOutcome, FieldVerdict};
pub use config::{AutomationConfig, EngineConfig, MatchingConfig, Tolerance};
pub use db::{AuditEntry, ClaimOutcome, Database, Reversal};
pub use error::{Error, NormalizationError, Result};
pub use matching::{BatchMatchReport, MatchOutcome, MatchResolver};
pub use normalize::{normalize, CanonicalValue};
pub use notify::{LogNotifier, MockNotifier, Notifier, NotifierClient, WebhookNotifier};
pub use settlement::resolve_account;
