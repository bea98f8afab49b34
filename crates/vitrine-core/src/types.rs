//! Identifiers and small value types shared by every Vitrine crate.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Catalog product identifier. Ordering is byte order of the raw string,
    /// which is the tie-breaker for equal similarity scores.
    ProductId
);

string_id!(
    /// Shop identifier (e.g. the shop's myshopify domain).
    ShopId
);

/// Language code, normalized to trimmed lowercase (`"EN "` → `"en"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Lang(String);

impl Lang {
    /// Create a normalized language code.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_lowercase())
    }

    /// The normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Lang {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Lang {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Lang> for String {
    fn from(value: Lang) -> Self {
        value.0
    }
}

// ============================================================================
// Content hash
// ============================================================================

/// Hex-encoded blake3 hash of a snapshot's canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Model version
// ============================================================================

/// Identity of an embedding model. Vectors are only comparable within one
/// model version, and every vector of a version has `dimension` components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Model identifier, e.g. `"bge-small-en-v1.5@1"`.
    pub id: String,

    /// Vector dimension produced by this model.
    pub dimension: usize,
}

impl ModelVersion {
    /// Create a model version.
    pub fn new(id: impl Into<String>, dimension: usize) -> Self {
        Self {
            id: id.into(),
            dimension,
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}d", self.id, self.dimension)
    }
}

// ============================================================================
// Freshness
// ============================================================================

/// Freshness of the embedding for one (product, shop, language).
///
/// ```text
/// MISSING ──▶ STALE ──▶ FRESH
///               │  ▲
///               ▼  │ (re-armed)
///             FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FreshnessState {
    /// No embedding has ever been produced.
    Missing,
    /// Content changed since the last embedding.
    Stale,
    /// Embedding matches the current content hash.
    Fresh,
    /// Provider retries were exhausted.
    Failed,
}

impl FreshnessState {
    /// Whether `self → next` is an allowed transition.
    ///
    /// Same-state transitions are allowed (re-marking STALE is a no-op).
    pub fn can_transition_to(self, next: FreshnessState) -> bool {
        use FreshnessState::*;
        matches!(
            (self, next),
            (Missing, Stale)
                | (Stale, Fresh)
                | (Stale, Failed)
                | (Failed, Stale)
                | (Fresh, Stale)
        ) || self == next
    }
}

impl fmt::Display for FreshnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Missing => "MISSING",
            Self::Stale => "STALE",
            Self::Fresh => "FRESH",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Tests
// ============================================================================
