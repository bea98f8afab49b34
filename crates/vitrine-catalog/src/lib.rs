//! Catalog content and shop configuration for Vitrine.
//!
//! # Modules
//!
//! - [`snapshot`]: Per-(product, language) content snapshots with change
//!   detection by canonical content hash
//! - [`settings`]: Shop language settings and the fail-closed resolver
//!
//! Neither module triggers embedding work. The sync orchestrator reads
//! upsert outcomes and settings diffs and decides what to re-embed.

pub mod settings;
pub mod snapshot;

pub use settings::{
    LanguageResolution, SettingsSource, ShopSettings, ShopSettingsResolver, StaticSettingsSource,
};
pub use snapshot::{
    MemorySnapshotStore, ProductSnapshot, SnapshotContent, SnapshotStore, UpsertOutcome,
    UpsertResult,
};
