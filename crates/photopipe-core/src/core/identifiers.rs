// crates/photopipe-core/src/core/identifiers.rs
// ============================================================================
// Module: Photopipe Identifiers
// Description: Canonical identifiers for pipeline items, stages, and sites.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Photopipe.
//! `ItemId` is the store-assigned sequential identity and enforces a
//! non-zero, 1-based invariant at construction boundaries. `ObjectId` is the
//! application-supplied natural key (unique per logical exposure),
//! `StageName` names a pipeline step, and `SiteKey` names the telescope or
//! camera a calibration frame belongs to. String identifiers are opaque;
//! no normalization is applied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroI64;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Store-assigned sequential identity for an item (image or calibration frame).
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based, matching SQL autoincrement semantics).
/// - Immutable once assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(NonZeroI64);

impl ItemId {
    /// Creates a new item identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroI64) -> Self {
        Self(id)
    }

    /// Creates an item identifier from a raw row id (returns `None` if not >= 1).
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        if raw < 1 {
            return None;
        }
        NonZeroI64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0.get()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Application-supplied natural key, unique per logical exposure.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
/// - Unique within its item class (image or calibration frame).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Creates a new object identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ObjectId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Named pipeline stage an item passes through.
///
/// # Invariants
/// - Opaque UTF-8 string; the store auto-registers unknown names with zero
///   counters on first use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    /// Stage an image enters when registered by a reduction worker.
    pub const RECEIVED: &'static str = "received";
    /// Terminal intake stage written by acquisition hardware.
    pub const CAPTURED: &'static str = "captured";

    /// Creates a new stage name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the stage name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the registration intake stage (`received`).
    #[must_use]
    pub fn received() -> Self {
        Self::new(Self::RECEIVED)
    }

    /// Returns the acquisition intake stage (`captured`).
    #[must_use]
    pub fn captured() -> Self {
        Self::new(Self::CAPTURED)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StageName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StageName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Telescope or camera key scoping calibration frames.
///
/// # Invariants
/// - Opaque UTF-8 string; flats use the telescope name, darks and biases the
///   camera identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteKey(String);

impl SiteKey {
    /// Creates a new site key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SiteKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SiteKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
