// crates/photopipe-core/src/interfaces/mod.rs
// ============================================================================
// Module: Photopipe Interfaces
// Description: Backend-agnostic contracts for the pipeline state tracker.
// Purpose: Define the operation surfaces workers use; stores implement them.
// Dependencies: thiserror, crate::core
// ============================================================================

//! ## Overview
//! Workers and acquisition hardware interact with the tracker only through
//! these traits, never through direct table access, so a store may reshape
//! its schema freely as long as the contracts hold. Every multi-step
//! mutation is transactional: a failed call has no partial effect, and
//! nothing here retries automatically — retry policy belongs to callers.
//!
//! Lookup misses are `Ok(None)`, never an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::ItemId;
use crate::core::identifiers::ObjectId;
use crate::core::identifiers::SiteKey;
use crate::core::identifiers::StageName;
use crate::core::items::CalibrationFrame;
use crate::core::items::ClaimedItem;
use crate::core::items::FrameKind;
use crate::core::items::FrameSpec;
use crate::core::items::ImageRecord;
use crate::core::items::NewImage;
use crate::core::items::Reentry;
use crate::core::items::ReferenceMatch;
use crate::core::items::Registration;
use crate::core::items::StageStats;
use crate::core::items::StageStatus;
use crate::core::items::TimingRecord;
use crate::core::solution::SolutionArtifacts;
use crate::core::solution::SolutionDocument;
use crate::core::solution::SolutionRecord;
use crate::core::time::ObsTimestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Any error from a mutating operation implies a full rollback; no partial
///   counter update is ever observable.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or opened; callers may retry with
    /// backoff.
    #[error("pipeline store unavailable: {0}")]
    Unavailable(String),
    /// The storage engine failed inside an operation.
    #[error("pipeline store db error: {0}")]
    Db(String),
    /// A uniqueness constraint was violated where the contract does not
    /// absorb it as "already exists".
    #[error("pipeline store constraint violation: {0}")]
    Constraint(String),
    /// A stage transition referenced an unknown item or violated transition
    /// or re-entry policy. Not retriable.
    #[error("invalid stage transition: {0}")]
    InvalidTransition(String),
    /// Stored or supplied data is invalid.
    #[error("pipeline store invalid data: {0}")]
    Invalid(String),
    /// The on-disk schema version is unsupported.
    #[error("pipeline store version mismatch: {0}")]
    VersionMismatch(String),
}

// ============================================================================
// SECTION: Item Registry
// ============================================================================

/// Registration and identity resolution for science images.
pub trait ItemRegistry {
    /// Registers a new image or resolves an already-known natural key.
    ///
    /// Inserts the item row, a `received` stage-status row, and the counter
    /// increment in one transaction. A concurrent duplicate submission of
    /// the same `object_id` resolves to the stored identity instead of
    /// creating a second row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails.
    fn register_or_resolve(&self, image: &NewImage) -> Result<Registration, StoreError>;

    /// Records an exposure captured by acquisition hardware.
    ///
    /// Like registration, but the item starts in the `captured` intake
    /// stage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails or the natural key
    /// already exists.
    fn register_exposure(&self, image: &NewImage) -> Result<ItemId, StoreError>;

    /// Checks whether an image with this natural key has been seen before.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn image_exists(&self, object_id: &ObjectId) -> Result<bool, StoreError>;

    /// Loads the stored image row for a natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn lookup_image(&self, object_id: &ObjectId) -> Result<Option<ImageRecord>, StoreError>;

    /// Updates the detected-source count for an image.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the item is unknown or the update fails.
    fn set_source_count(&self, item_id: ItemId, n_sources: i64) -> Result<(), StoreError>;

    /// Assigns a reference image and its angular distance to an image.
    ///
    /// Both fields are written together. A second assignment is rejected
    /// with [`StoreError::Constraint`]: the pair is set at most once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the item is unknown, the reference is
    /// already assigned, or the update fails.
    fn assign_reference(
        &self,
        item_id: ItemId,
        reference_path: &str,
        distance_deg: f64,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Stage Tracker
// ============================================================================

/// Claim coordination and stage transitions.
///
/// The claim protocol: `claim_next` atomically flips one idle item in the
/// requested stage to claimed. Entering or finishing stages leaves the claim
/// untouched — an item passes the claim gate once and is only returned to the
/// idle pool by re-entry, [`StageTracker::release_claim`], or
/// [`StageTracker::release_stale_claims`].
pub trait StageTracker {
    /// Claims the next unclaimed item in `stage`.
    ///
    /// Concurrent callers never receive the same item. `Ok(None)` means no
    /// unclaimed item exists, which is not an error. `now` is recorded as
    /// the claim timestamp for staleness accounting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the claim transaction fails.
    fn claim_next(
        &self,
        stage: &StageName,
        now: ObsTimestamp,
    ) -> Result<Option<ClaimedItem>, StoreError>;

    /// Moves an item into a new stage.
    ///
    /// In one transaction: registers `stage` with zero counters if unknown,
    /// moves the item's status row, adds `elapsed_seconds` to its cumulative
    /// processing time, records `message`, and moves the `n_current`
    /// counters of the old and new stage.
    ///
    /// A stage registered this way gets a display shortname derived from the
    /// first six characters of its name; callers do not supply one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] when the item is unknown or
    /// already occupies `stage`; other [`StoreError`] variants when the
    /// transaction fails.
    fn enter_stage(
        &self,
        item_id: ItemId,
        stage: &StageName,
        elapsed_seconds: f64,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Records completion of the stage an item currently occupies.
    ///
    /// In one transaction: adds `elapsed_seconds` to the item's cumulative
    /// processing time and to the stage's `total_runtime`, increments
    /// `n_processed`, records `message`, and inserts the immutable timing
    /// record. A repeated finish for the same (item, stage) is rejected via
    /// the existing timing record with no mutation, keeping completion
    /// accounting exactly-once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] when the item is unknown,
    /// occupies a different stage, or the stage was already finished; other
    /// [`StoreError`] variants when the transaction fails.
    fn finish_stage(
        &self,
        item_id: ItemId,
        stage: &StageName,
        elapsed_seconds: f64,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Applies the re-entry policy to a resubmitted image.
    ///
    /// Unknown `object_id`: registered as a new item. Known with last stage
    /// `captured`: the path is updated and tracking resets to `received`
    /// with step time zero, moving the intake counters. Known and past
    /// intake: rejected, to avoid double-counting completed work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] ("already advanced") when
    /// the item progressed beyond intake; other [`StoreError`] variants when
    /// the transaction fails.
    fn restart_if_reentrant(&self, image: &NewImage) -> Result<Reentry, StoreError>;

    /// Returns an actively claimed item to the idle pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the item is unknown or the update fails.
    fn release_claim(&self, item_id: ItemId) -> Result<(), StoreError>;

    /// Releases claims strictly older than `older_than_seconds`, re-queuing
    /// items claimed by crashed workers. A claim aged exactly the threshold
    /// is kept. Returns the number of claims released.
    ///
    /// Never invoked automatically; deployments choose threshold and
    /// cadence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn release_stale_claims(
        &self,
        older_than_seconds: i64,
        now: ObsTimestamp,
    ) -> Result<u64, StoreError>;

    /// Reads the aggregate counters for a stage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn stage_stats(&self, stage: &StageName) -> Result<Option<StageStats>, StoreError>;

    /// Reads the stage status row for an item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn stage_status(&self, item_id: ItemId) -> Result<Option<StageStatus>, StoreError>;

    /// Reads the completion timing record for an (item, stage) pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn timing_record(
        &self,
        item_id: ItemId,
        stage: &StageName,
    ) -> Result<Option<TimingRecord>, StoreError>;

    /// Zeroes every stage's `n_current` for orderly shutdown.
    ///
    /// This intentionally breaks the row-count invariant until items are
    /// re-registered; it exists for operators draining a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn reset_current_counters(&self) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Calibration Registry
// ============================================================================

/// Bookkeeping for flats, darks, and biases.
pub trait CalibrationRegistry {
    /// Checks whether a calibration frame with this natural key exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn calibration_exists(&self, object_id: &ObjectId) -> Result<bool, StoreError>;

    /// Registers a calibration frame, deduplicating by natural key.
    ///
    /// Returns `Ok(None)` when the key was already registered (not an
    /// error); the frame starts with `downloaded = false`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn add_frame(&self, frame: &FrameSpec) -> Result<Option<ItemId>, StoreError>;

    /// Marks a frame as downloaded, upserting by natural key.
    ///
    /// Updates the stored path and `downloaded` flag when the key exists;
    /// inserts a downloaded row otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails.
    fn mark_downloaded(&self, frame: &FrameSpec) -> Result<ItemId, StoreError>;

    /// Returns the downloaded frame closest in time to `target`.
    ///
    /// Only frames matching `site_key`, `kind`, and (when given) `filter`
    /// with `downloaded = true` are considered. `Ok(None)` when no such
    /// frame exists. Equidistant frames tie-break non-deterministically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn nearest_calibration(
        &self,
        site_key: &SiteKey,
        filter: Option<&str>,
        kind: FrameKind,
        target: ObsTimestamp,
    ) -> Result<Option<CalibrationFrame>, StoreError>;

    /// Returns the most recent frame of `kind` for a camera or telescope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn latest_calibration(
        &self,
        site_key: &SiteKey,
        kind: FrameKind,
    ) -> Result<Option<CalibrationFrame>, StoreError>;
}

// ============================================================================
// SECTION: Reference Finder
// ============================================================================

/// Nearest-neighbor reference lookup by sky position.
pub trait ReferenceFinder {
    /// Finds the angularly closest prior image with the same filter.
    ///
    /// Full-scan ranking: every image with matching filter and non-null
    /// coordinates is scored with the law-of-cosines great-circle distance
    /// and the minimum returned — O(n) per lookup over the filter's image
    /// population, a deliberate simplicity trade-off for the expected
    /// catalog size. Ties are broken arbitrarily.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn find_reference(
        &self,
        ra: f64,
        dec: f64,
        filter: &str,
    ) -> Result<Option<ReferenceMatch>, StoreError>;
}

// ============================================================================
// SECTION: Solution Ledger
// ============================================================================

/// Ingestion of astrometric-solution results.
pub trait SolutionLedger {
    /// Inserts one calibration-result row for a parsed solver document.
    ///
    /// The row is keyed by (`item_id`, `date_proc`); a duplicate solver run
    /// for the same timestamp is rejected. Nothing is partially inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] on a duplicate key; other
    /// [`StoreError`] variants when the insert fails.
    fn ingest_solution(
        &self,
        item_id: ItemId,
        document: &SolutionDocument,
        artifacts: &SolutionArtifacts,
    ) -> Result<(), StoreError>;

    /// Reads the most recent solution recorded for an item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn latest_solution(&self, item_id: ItemId) -> Result<Option<SolutionRecord>, StoreError>;
}
