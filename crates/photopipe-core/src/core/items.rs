// crates/photopipe-core/src/core/items.rs
// ============================================================================
// Module: Photopipe Item Records
// Description: Image, stage, timing, and calibration-frame record types.
// Purpose: Define the persistent state shapes tracked by the pipeline store.
// Dependencies: serde, crate::core::identifiers, crate::core::time
// ============================================================================

//! ## Overview
//! These records mirror the persistent tables of the pipeline store: science
//! images, per-item stage status, per-stage aggregate counters, the immutable
//! timing ledger, and calibration frames (flats, darks, biases). All state is
//! owned by the store; these types are snapshots exchanged across the
//! operation contracts and carry no authority of their own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ItemId;
use crate::core::identifiers::ObjectId;
use crate::core::identifiers::SiteKey;
use crate::core::identifiers::StageName;
use crate::core::time::ObsTimestamp;

// ============================================================================
// SECTION: Images
// ============================================================================

/// A science image submitted for registration.
///
/// # Invariants
/// - `object_id` is unique per logical exposure; duplicate submissions
///   resolve to the already-stored identity.
/// - `ra`/`dec` are degrees and either both present or both absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewImage {
    /// Filesystem path of the image data.
    pub file_path: String,
    /// Natural key supplied by the acquisition system.
    pub object_id: ObjectId,
    /// Photometric filter name (`NONE` when the header lacks one).
    pub filter: String,
    /// Right ascension in degrees, when known at submission.
    pub ra: Option<f64>,
    /// Declination in degrees, when known at submission.
    pub dec: Option<f64>,
}

/// A stored science image row.
///
/// # Invariants
/// - `item_id` is immutable once assigned.
/// - `reference_path` and `reference_distance` are set at most once and are
///   either both null or both populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Store-assigned identity.
    pub item_id: ItemId,
    /// Filesystem path of the image data.
    pub file_path: String,
    /// Natural key supplied by the acquisition system.
    pub object_id: ObjectId,
    /// Photometric filter name.
    pub filter: String,
    /// Right ascension in degrees.
    pub ra: Option<f64>,
    /// Declination in degrees.
    pub dec: Option<f64>,
    /// Free-text quality grade assigned during reduction.
    pub quality: Option<String>,
    /// Number of co-added exposures.
    pub n_coadds: Option<i64>,
    /// Number of detected sources.
    pub n_sources: Option<i64>,
    /// Path of the assigned reference image.
    pub reference_path: Option<String>,
    /// Angular distance to the reference image in degrees.
    pub reference_distance: Option<f64>,
}

// ============================================================================
// SECTION: Stage Tracking
// ============================================================================

/// Claim marker for an item in the work queue.
///
/// # Invariants
/// - At most one worker holds a claim on an item at any time.
/// - Values map 1:1 to the stored `claim_state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// Unclaimed and eligible for `claim_next`.
    #[default]
    Idle,
    /// Held by a worker.
    Claimed,
}

impl ClaimState {
    /// Returns the stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Claimed => "claimed",
        }
    }

    /// Parses a stored column value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(Self::Idle),
            "claimed" => Some(Self::Claimed),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current tracking state of one item.
///
/// # Invariants
/// - Exactly one row exists per item.
/// - `pipeline_step` references a registered stage definition.
/// - `claimed_at` is present exactly when `claim_state` is `Claimed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    /// Item this status belongs to.
    pub item_id: ItemId,
    /// Filesystem path of the item data.
    pub file_path: String,
    /// Stage the item currently occupies.
    pub pipeline_step: StageName,
    /// Cumulative processing time across all stages, in seconds.
    pub processing_time: f64,
    /// Free-text message from the most recent transition.
    pub step_message: String,
    /// Claim marker.
    pub claim_state: ClaimState,
    /// Claim timestamp, present while claimed.
    pub claimed_at: Option<ObsTimestamp>,
}

/// Aggregate counters for one pipeline stage.
///
/// # Invariants
/// - `n_current` equals the number of `StageStatus` rows occupying the stage
///   after every transaction.
/// - `total_runtime` and `n_processed` only grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    /// Stage these counters describe.
    pub pipeline_step: StageName,
    /// Abbreviated display name.
    pub shortname: String,
    /// Cumulative runtime across all completions, in seconds.
    pub total_runtime: f64,
    /// Number of completed passes through the stage.
    pub n_processed: i64,
    /// Number of items presently occupying the stage.
    pub n_current: i64,
}

/// Immutable per-(item, stage) completion timing.
///
/// # Invariants
/// - At most one record exists per (item, stage) pair; insertion is
///   insert-if-absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Item the record belongs to.
    pub item_id: ItemId,
    /// Completed stage.
    pub pipeline_step: StageName,
    /// Seconds the item spent in the stage.
    pub runtime: f64,
}

/// Item reference returned by a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedItem {
    /// Claimed item identity.
    pub item_id: ItemId,
    /// Filesystem path of the claimed item's data.
    pub file_path: String,
}

/// Outcome of `register_or_resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    /// A new item row was created.
    New(ItemId),
    /// The natural key was already registered; the stored identity is returned.
    Existing(ItemId),
}

impl Registration {
    /// Returns the item identity regardless of outcome.
    #[must_use]
    pub const fn item_id(self) -> ItemId {
        match self {
            Self::New(id) | Self::Existing(id) => id,
        }
    }
}

/// Outcome of `restart_if_reentrant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reentry {
    /// The object was unknown and has been registered as a new item.
    New(ItemId),
    /// The object was re-enterable and its tracking was reset to `received`.
    Resumed(ItemId),
}

impl Reentry {
    /// Returns the item identity regardless of outcome.
    #[must_use]
    pub const fn item_id(self) -> ItemId {
        match self {
            Self::New(id) | Self::Resumed(id) => id,
        }
    }
}

/// Nearest prior image returned by the spatial assigner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMatch {
    /// Identity of the matched image.
    pub item_id: ItemId,
    /// Natural key of the matched image.
    pub object_id: ObjectId,
    /// Filesystem path of the matched image.
    pub file_path: String,
    /// Right ascension of the matched image in degrees.
    pub ra: f64,
    /// Declination of the matched image in degrees.
    pub dec: f64,
    /// Great-circle distance to the query position in degrees.
    pub distance_deg: f64,
}

// ============================================================================
// SECTION: Calibration Frames
// ============================================================================

/// Calibration frame class.
///
/// # Invariants
/// - Values map 1:1 to the stored `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Flat field frame.
    Flat,
    /// Dark frame.
    Dark,
    /// Bias frame.
    Bias,
}

impl FrameKind {
    /// Returns the stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Dark => "dark",
            Self::Bias => "bias",
        }
    }

    /// Parses a stored column value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "flat" => Some(Self::Flat),
            "dark" => Some(Self::Dark),
            "bias" => Some(Self::Bias),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calibration frame submitted for registration or download marking.
///
/// # Invariants
/// - `object_id` is the composite natural key: flats use
///   `flat_{telescope}_{filter}_{date}_{type}`, darks and biases the
///   camera-supplied exposure identifier.
/// - `filter` and `frame_type` are present for flats and absent otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    /// Filesystem path of the frame data.
    pub file_path: String,
    /// Composite natural key.
    pub object_id: ObjectId,
    /// Telescope (flats) or camera (darks, biases) the frame belongs to.
    pub site_key: SiteKey,
    /// Photometric filter, for flats.
    pub filter: Option<String>,
    /// Frame class.
    pub kind: FrameKind,
    /// Flat subtype participating in the natural key (e.g. `dome`, `sky`).
    pub frame_type: Option<String>,
    /// Observation timestamp.
    pub date_obs: ObsTimestamp,
}

impl FrameSpec {
    /// Builds a flat-frame spec, composing the natural key from telescope,
    /// filter, observation date, and flat subtype.
    #[must_use]
    pub fn flat(
        file_path: impl Into<String>,
        telescope: SiteKey,
        filter: impl Into<String>,
        date: &str,
        frame_type: impl Into<String>,
        date_obs: ObsTimestamp,
    ) -> Self {
        let filter = filter.into();
        let frame_type = frame_type.into();
        let object_id = ObjectId::new(format!("flat_{telescope}_{filter}_{date}_{frame_type}"));
        Self {
            file_path: file_path.into(),
            object_id,
            site_key: telescope,
            filter: Some(filter),
            kind: FrameKind::Flat,
            frame_type: Some(frame_type),
            date_obs,
        }
    }

    /// Builds a dark-frame spec keyed by camera and exposure identifier.
    #[must_use]
    pub fn dark(
        file_path: impl Into<String>,
        object_id: ObjectId,
        camera: SiteKey,
        date_obs: ObsTimestamp,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            object_id,
            site_key: camera,
            filter: None,
            kind: FrameKind::Dark,
            frame_type: None,
            date_obs,
        }
    }

    /// Builds a bias-frame spec keyed by camera and exposure identifier.
    #[must_use]
    pub fn bias(
        file_path: impl Into<String>,
        object_id: ObjectId,
        camera: SiteKey,
        date_obs: ObsTimestamp,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            object_id,
            site_key: camera,
            filter: None,
            kind: FrameKind::Bias,
            frame_type: None,
            date_obs,
        }
    }
}

/// A stored calibration frame row.
///
/// # Invariants
/// - `object_id` is unique across all calibration frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFrame {
    /// Store-assigned identity.
    pub item_id: ItemId,
    /// Filesystem path of the frame data.
    pub file_path: String,
    /// Composite natural key.
    pub object_id: ObjectId,
    /// Telescope or camera the frame belongs to.
    pub site_key: SiteKey,
    /// Photometric filter, for flats.
    pub filter: Option<String>,
    /// Frame class.
    pub kind: FrameKind,
    /// Flat subtype, for flats.
    pub frame_type: Option<String>,
    /// Observation timestamp.
    pub date_obs: ObsTimestamp,
    /// Whether the frame data has been fetched and is usable locally.
    pub downloaded: bool,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::panic,
        reason = "Test-only assertions are permitted."
    )]

    use super::FrameKind;
    use super::FrameSpec;
    use super::Registration;
    use crate::core::identifiers::ItemId;
    use crate::core::identifiers::SiteKey;
    use crate::core::time::ObsTimestamp;

    #[test]
    fn flat_spec_composes_natural_key() {
        let spec = FrameSpec::flat(
            "/data/flat.fits",
            SiteKey::new("T1"),
            "V",
            "2024-03-01",
            "dome",
            ObsTimestamp::from_unix_seconds(0),
        );
        assert_eq!(spec.object_id.as_str(), "flat_T1_V_2024-03-01_dome");
        assert_eq!(spec.kind, FrameKind::Flat);
        assert_eq!(spec.filter.as_deref(), Some("V"));
    }

    #[test]
    fn registration_exposes_identity_for_both_outcomes() {
        let id = ItemId::from_raw(7).unwrap();
        assert_eq!(Registration::New(id).item_id(), id);
        assert_eq!(Registration::Existing(id).item_id(), id);
    }
}
