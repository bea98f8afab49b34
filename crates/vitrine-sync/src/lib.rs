//! Sync orchestration for Vitrine.
//!
//! The orchestrator is the only component that schedules embedding work. It
//! listens for snapshot and settings changes, tracks a freshness state per
//! (shop, product, language) key and drives the embedding pipeline.
//!
//! # Modules
//!
//! - [`orchestrator`]: Change handlers, retries and tombstone purging
//! - [`freshness`]: The `MISSING → STALE → FRESH / FAILED` ledger and observers
//! - [`locks`]: Per-key async locks

pub mod freshness;
pub mod locks;
pub mod orchestrator;

pub use freshness::{FreshnessLedger, FreshnessObserver, LoggingObserver, SyncKey, Transition};
pub use locks::KeyLocks;
pub use orchestrator::{KeyOutcome, PurgeReport, SyncOrchestrator, SyncReport};
