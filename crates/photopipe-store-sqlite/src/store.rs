// crates/photopipe-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Pipeline Store
// Description: Durable pipeline state store backed by SQLite WAL.
// Purpose: Persist items, stage state, counters, calibration, and solutions.
// Dependencies: photopipe-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements the core operation contracts over `SQLite`. Every
//! mutating operation runs inside a `BEGIN IMMEDIATE` transaction, which
//! takes the single write lock up front: claim handout is serialized, and a
//! failed operation rolls back with no observable partial effect. Readers
//! wait on the write lock up to the configured busy timeout.
//!
//! `SQLite` has no row-level `SKIP LOCKED`; [`StageTracker::claim_next`] is
//! instead a single `UPDATE .. WHERE item_id = (SELECT .. LIMIT 1) RETURNING`
//! statement under the write lock. Claim uniqueness holds, at the cost of
//! writers queueing on the database rather than skipping past each other.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use photopipe_core::CalibrationFrame;
use photopipe_core::CalibrationRegistry;
use photopipe_core::ClaimState;
use photopipe_core::ClaimedItem;
use photopipe_core::FrameKind;
use photopipe_core::FrameSpec;
use photopipe_core::ImageRecord;
use photopipe_core::ItemId;
use photopipe_core::ItemRegistry;
use photopipe_core::NewImage;
use photopipe_core::ObjectId;
use photopipe_core::ObsTimestamp;
use photopipe_core::Reentry;
use photopipe_core::ReferenceFinder;
use photopipe_core::ReferenceMatch;
use photopipe_core::Registration;
use photopipe_core::SiteKey;
use photopipe_core::SolutionArtifacts;
use photopipe_core::SolutionDocument;
use photopipe_core::SolutionLedger;
use photopipe_core::SolutionRecord;
use photopipe_core::StageName;
use photopipe_core::StageStats;
use photopipe_core::StageStatus;
use photopipe_core::StageTracker;
use photopipe_core::StoreError;
use photopipe_core::TimingRecord;
use photopipe_core::angular_distance_deg;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Step messages are stored truncated to this many characters.
const MAX_STEP_MESSAGE_CHARS: usize = 127;
/// Auto-registered stages abbreviate their name to this many characters.
const STAGE_SHORTNAME_CHARS: usize = 6;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` pipeline store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds and bounds how long a
///   worker waits on the write lock before the operation fails.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with defaults for the given database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding row payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Uniqueness constraint violated.
    #[error("sqlite store constraint violation: {0}")]
    Constraint(String),
    /// Stage transition or re-entry policy violated.
    #[error("sqlite store invalid transition: {0}")]
    InvalidTransition(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Unavailable(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Constraint(message) => Self::Constraint(message),
            SqliteStoreError::InvalidTransition(message) => Self::InvalidTransition(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed pipeline state store with WAL support.
///
/// # Invariants
/// - All mutating operations run under `BEGIN IMMEDIATE` transactions.
/// - Connection access is serialized through a mutex; cross-process safety
///   comes from the `SQLite` write lock itself.
#[derive(Debug, Clone)]
pub struct SqlitePipelineStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqlitePipelineStore {
    /// Opens an `SQLite`-backed pipeline store.
    ///
    /// Creates the database file and schema on first open; subsequent opens
    /// validate the stored schema version and fail closed on mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the configured database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Item Registry
// ============================================================================

impl ItemRegistry for SqlitePipelineStore {
    fn register_or_resolve(&self, image: &NewImage) -> Result<Registration, StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT item_id FROM items WHERE object_id = ?1",
                params![image.object_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if let Some(raw) = existing {
            tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let item_id = item_id_from_row(raw)?;
            debug!(object_id = %image.object_id, %item_id, "registration resolved existing item");
            return Ok(Registration::Existing(item_id));
        }
        let item_id = insert_image(&tx, image, StageName::RECEIVED)?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(object_id = %image.object_id, %item_id, "image registered");
        Ok(Registration::New(item_id))
    }

    fn register_exposure(&self, image: &NewImage) -> Result<ItemId, StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT item_id FROM items WHERE object_id = ?1",
                params![image.object_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if exists.is_some() {
            return Err(SqliteStoreError::Constraint(format!(
                "exposure already registered: {}",
                image.object_id
            ))
            .into());
        }
        let item_id = insert_image(&tx, image, StageName::CAPTURED)?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(object_id = %image.object_id, %item_id, "exposure registered");
        Ok(item_id)
    }

    fn image_exists(&self, object_id: &ObjectId) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let found: Option<i64> = guard
            .query_row(
                "SELECT 1 FROM items WHERE object_id = ?1",
                params![object_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(found.is_some())
    }

    fn lookup_image(&self, object_id: &ObjectId) -> Result<Option<ImageRecord>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT item_id, file_path, object_id, filter, ra, dec, quality, n_coadds,
                        n_sources, reference_path, reference_distance
                 FROM items WHERE object_id = ?1",
                params![object_id.as_str()],
                read_image_row,
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        match row {
            None => Ok(None),
            Some(raw) => Ok(Some(raw.into_record()?)),
        }
    }

    fn set_source_count(&self, item_id: ItemId, n_sources: i64) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE items SET n_sources = ?2 WHERE item_id = ?1",
                params![item_id.get(), n_sources],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(SqliteStoreError::Invalid(format!("unknown item: {item_id}")).into());
        }
        Ok(())
    }

    fn assign_reference(
        &self,
        item_id: ItemId,
        reference_path: &str,
        distance_deg: f64,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let changed = tx
            .execute(
                "UPDATE items SET reference_path = ?2, reference_distance = ?3
                 WHERE item_id = ?1 AND reference_path IS NULL",
                params![item_id.get(), reference_path, distance_deg],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM items WHERE item_id = ?1",
                    params![item_id.get()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            return Err(match exists {
                Some(_) => SqliteStoreError::Constraint(format!(
                    "reference already assigned for item {item_id}"
                )),
                None => SqliteStoreError::Invalid(format!("unknown item: {item_id}")),
            }
            .into());
        }
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Stage Tracker
// ============================================================================

impl StageTracker for SqlitePipelineStore {
    fn claim_next(
        &self,
        stage: &StageName,
        now: ObsTimestamp,
    ) -> Result<Option<ClaimedItem>, StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let claimed: Option<(i64, String)> = tx
            .query_row(
                "UPDATE stage_status SET claim_state = 'claimed', claimed_at = ?2
                 WHERE item_id = (
                     SELECT item_id FROM stage_status
                     WHERE pipeline_step = ?1 AND claim_state = 'idle'
                     ORDER BY item_id
                     LIMIT 1
                 )
                 RETURNING item_id, file_path",
                params![stage.as_str(), now.unix_seconds()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        match claimed {
            None => Ok(None),
            Some((raw, file_path)) => {
                let item_id = item_id_from_row(raw)?;
                debug!(%item_id, stage = %stage, "item claimed");
                Ok(Some(ClaimedItem { item_id, file_path }))
            }
        }
    }

    fn enter_stage(
        &self,
        item_id: ItemId,
        stage: &StageName,
        elapsed_seconds: f64,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let current: Option<String> = tx
            .query_row(
                "SELECT pipeline_step FROM stage_status WHERE item_id = ?1",
                params![item_id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some(current) = current else {
            return Err(
                SqliteStoreError::InvalidTransition(format!("unknown item: {item_id}")).into()
            );
        };
        if current == stage.as_str() {
            return Err(SqliteStoreError::InvalidTransition(format!(
                "item {item_id} already occupies stage {stage}"
            ))
            .into());
        }
        ensure_stage_definition(&tx, stage)?;
        tx.execute(
            "UPDATE stage_status
             SET pipeline_step = ?2, processing_time = processing_time + ?3, step_message = ?4
             WHERE item_id = ?1",
            params![item_id.get(), stage.as_str(), elapsed_seconds, truncate_message(message)],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "UPDATE stage_definition SET n_current = n_current + 1 WHERE pipeline_step = ?1",
            params![stage.as_str()],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "UPDATE stage_definition SET n_current = n_current - 1 WHERE pipeline_step = ?1",
            params![current],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(%item_id, from = %current, to = %stage, "stage entered");
        Ok(())
    }

    fn finish_stage(
        &self,
        item_id: ItemId,
        stage: &StageName,
        elapsed_seconds: f64,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let current: Option<String> = tx
            .query_row(
                "SELECT pipeline_step FROM stage_status WHERE item_id = ?1",
                params![item_id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some(current) = current else {
            return Err(
                SqliteStoreError::InvalidTransition(format!("unknown item: {item_id}")).into()
            );
        };
        if current != stage.as_str() {
            return Err(SqliteStoreError::InvalidTransition(format!(
                "item {item_id} occupies stage {current}, not {stage}"
            ))
            .into());
        }
        let finished: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM timing_record WHERE item_id = ?1 AND pipeline_step = ?2",
                params![item_id.get(), stage.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if finished.is_some() {
            return Err(SqliteStoreError::InvalidTransition(format!(
                "stage {stage} already finished for item {item_id}"
            ))
            .into());
        }
        tx.execute(
            "UPDATE stage_status
             SET processing_time = processing_time + ?2, step_message = ?3
             WHERE item_id = ?1",
            params![item_id.get(), elapsed_seconds, truncate_message(message)],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "UPDATE stage_definition
             SET n_processed = n_processed + 1, total_runtime = total_runtime + ?2
             WHERE pipeline_step = ?1",
            params![stage.as_str(), elapsed_seconds],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "INSERT OR IGNORE INTO timing_record (item_id, pipeline_step, runtime)
             VALUES (?1, ?2, ?3)",
            params![item_id.get(), stage.as_str(), elapsed_seconds],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(%item_id, stage = %stage, elapsed_seconds, "stage finished");
        Ok(())
    }

    fn restart_if_reentrant(&self, image: &NewImage) -> Result<Reentry, StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT s.item_id, s.pipeline_step
                 FROM stage_status s
                 JOIN items i ON i.item_id = s.item_id
                 WHERE i.object_id = ?1",
                params![image.object_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some((raw, step)) = existing else {
            let item_id = insert_image(&tx, image, StageName::RECEIVED)?;
            tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            debug!(object_id = %image.object_id, %item_id, "re-entry registered new item");
            return Ok(Reentry::New(item_id));
        };
        if step != StageName::CAPTURED {
            return Err(SqliteStoreError::InvalidTransition(format!(
                "object {} already advanced to stage {step}",
                image.object_id
            ))
            .into());
        }
        let item_id = item_id_from_row(raw)?;
        tx.execute(
            "UPDATE items SET file_path = ?2 WHERE item_id = ?1",
            params![item_id.get(), image.file_path],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "UPDATE stage_status
             SET pipeline_step = ?2, processing_time = 0, step_message = ?3,
                 file_path = ?4, claim_state = 'idle', claimed_at = NULL
             WHERE item_id = ?1",
            params![
                item_id.get(),
                StageName::RECEIVED,
                truncate_message("re-entered intake"),
                image.file_path
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "UPDATE stage_definition SET n_current = n_current - 1 WHERE pipeline_step = ?1",
            params![StageName::CAPTURED],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "UPDATE stage_definition SET n_current = n_current + 1 WHERE pipeline_step = ?1",
            params![StageName::RECEIVED],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(object_id = %image.object_id, %item_id, "captured item resumed as received");
        Ok(Reentry::Resumed(item_id))
    }

    fn release_claim(&self, item_id: ItemId) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE stage_status SET claim_state = 'idle', claimed_at = NULL
                 WHERE item_id = ?1",
                params![item_id.get()],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(SqliteStoreError::Invalid(format!("unknown item: {item_id}")).into());
        }
        debug!(%item_id, "claim released");
        Ok(())
    }

    fn release_stale_claims(
        &self,
        older_than_seconds: i64,
        now: ObsTimestamp,
    ) -> Result<u64, StoreError> {
        let cutoff = now.unix_seconds() - older_than_seconds;
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE stage_status SET claim_state = 'idle', claimed_at = NULL
                 WHERE claim_state = 'claimed' AND claimed_at < ?1",
                params![cutoff],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let released = u64::try_from(changed).unwrap_or(u64::MAX);
        if released > 0 {
            warn!(released, older_than_seconds, "stale claims released");
        }
        Ok(released)
    }

    fn stage_stats(&self, stage: &StageName) -> Result<Option<StageStats>, StoreError> {
        let guard = self.lock()?;
        let stats = guard
            .query_row(
                "SELECT pipeline_step, shortname, total_runtime, n_processed, n_current
                 FROM stage_definition WHERE pipeline_step = ?1",
                params![stage.as_str()],
                |row| {
                    Ok(StageStats {
                        pipeline_step: StageName::new(row.get::<_, String>(0)?),
                        shortname: row.get(1)?,
                        total_runtime: row.get(2)?,
                        n_processed: row.get(3)?,
                        n_current: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(stats)
    }

    fn stage_status(&self, item_id: ItemId) -> Result<Option<StageStatus>, StoreError> {
        let guard = self.lock()?;
        let row: Option<(i64, String, String, f64, String, String, Option<i64>)> = guard
            .query_row(
                "SELECT item_id, file_path, pipeline_step, processing_time, step_message,
                        claim_state, claimed_at
                 FROM stage_status WHERE item_id = ?1",
                params![item_id.get()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some((raw, file_path, step, processing_time, step_message, claim, claimed_at)) = row
        else {
            return Ok(None);
        };
        let claim_state = ClaimState::parse(&claim)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("unknown claim state: {claim}")))?;
        Ok(Some(StageStatus {
            item_id: item_id_from_row(raw)?,
            file_path,
            pipeline_step: StageName::new(step),
            processing_time,
            step_message,
            claim_state,
            claimed_at: claimed_at.map(ObsTimestamp::from_unix_seconds),
        }))
    }

    fn timing_record(
        &self,
        item_id: ItemId,
        stage: &StageName,
    ) -> Result<Option<TimingRecord>, StoreError> {
        let guard = self.lock()?;
        let runtime: Option<f64> = guard
            .query_row(
                "SELECT runtime FROM timing_record WHERE item_id = ?1 AND pipeline_step = ?2",
                params![item_id.get(), stage.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(runtime.map(|runtime| TimingRecord {
            item_id,
            pipeline_step: stage.clone(),
            runtime,
        }))
    }

    fn reset_current_counters(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute("UPDATE stage_definition SET n_current = 0", params![])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        warn!("all n_current counters zeroed");
        Ok(())
    }
}

// ============================================================================
// SECTION: Calibration Registry
// ============================================================================

impl CalibrationRegistry for SqlitePipelineStore {
    fn calibration_exists(&self, object_id: &ObjectId) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let found: Option<i64> = guard
            .query_row(
                "SELECT 1 FROM calibration_frames WHERE object_id = ?1",
                params![object_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(found.is_some())
    }

    fn add_frame(&self, frame: &FrameSpec) -> Result<Option<ItemId>, StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT item_id FROM calibration_frames WHERE object_id = ?1",
                params![frame.object_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if existing.is_some() {
            tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO calibration_frames
                 (file_path, object_id, site_key, filter, kind, frame_type, date_obs, downloaded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                frame.file_path,
                frame.object_id.as_str(),
                frame.site_key.as_str(),
                frame.filter,
                frame.kind.as_str(),
                frame.frame_type,
                frame.date_obs.unix_seconds()
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let item_id = item_id_from_row(tx.last_insert_rowid())?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(object_id = %frame.object_id, %item_id, kind = %frame.kind, "calibration frame added");
        Ok(Some(item_id))
    }

    fn mark_downloaded(&self, frame: &FrameSpec) -> Result<ItemId, StoreError> {
        let mut guard = self.lock()?;
        let tx = begin_immediate(&mut guard)?;
        let changed = tx
            .execute(
                "UPDATE calibration_frames SET file_path = ?2, downloaded = 1
                 WHERE object_id = ?1",
                params![frame.object_id.as_str(), frame.file_path],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let item_id = if changed == 0 {
            tx.execute(
                "INSERT INTO calibration_frames
                     (file_path, object_id, site_key, filter, kind, frame_type, date_obs,
                      downloaded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
                params![
                    frame.file_path,
                    frame.object_id.as_str(),
                    frame.site_key.as_str(),
                    frame.filter,
                    frame.kind.as_str(),
                    frame.frame_type,
                    frame.date_obs.unix_seconds()
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            item_id_from_row(tx.last_insert_rowid())?
        } else {
            let raw: i64 = tx
                .query_row(
                    "SELECT item_id FROM calibration_frames WHERE object_id = ?1",
                    params![frame.object_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            item_id_from_row(raw)?
        };
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(object_id = %frame.object_id, %item_id, "calibration frame marked downloaded");
        Ok(item_id)
    }

    fn nearest_calibration(
        &self,
        site_key: &SiteKey,
        filter: Option<&str>,
        kind: FrameKind,
        target: ObsTimestamp,
    ) -> Result<Option<CalibrationFrame>, StoreError> {
        let guard = self.lock()?;
        let row = match filter {
            Some(filter) => guard
                .query_row(
                    "SELECT item_id, file_path, object_id, site_key, filter, kind, frame_type,
                            date_obs, downloaded
                     FROM calibration_frames
                     WHERE site_key = ?1 AND kind = ?2 AND downloaded = 1 AND filter = ?3
                     ORDER BY ABS(date_obs - ?4)
                     LIMIT 1",
                    params![site_key.as_str(), kind.as_str(), filter, target.unix_seconds()],
                    read_frame_row,
                )
                .optional(),
            None => guard
                .query_row(
                    "SELECT item_id, file_path, object_id, site_key, filter, kind, frame_type,
                            date_obs, downloaded
                     FROM calibration_frames
                     WHERE site_key = ?1 AND kind = ?2 AND downloaded = 1
                     ORDER BY ABS(date_obs - ?3)
                     LIMIT 1",
                    params![site_key.as_str(), kind.as_str(), target.unix_seconds()],
                    read_frame_row,
                )
                .optional(),
        }
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        match row {
            None => Ok(None),
            Some(raw) => Ok(Some(raw.into_frame()?)),
        }
    }

    fn latest_calibration(
        &self,
        site_key: &SiteKey,
        kind: FrameKind,
    ) -> Result<Option<CalibrationFrame>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT item_id, file_path, object_id, site_key, filter, kind, frame_type,
                        date_obs, downloaded
                 FROM calibration_frames
                 WHERE site_key = ?1 AND kind = ?2 AND downloaded = 1
                 ORDER BY date_obs DESC
                 LIMIT 1",
                params![site_key.as_str(), kind.as_str()],
                read_frame_row,
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        match row {
            None => Ok(None),
            Some(raw) => Ok(Some(raw.into_frame()?)),
        }
    }
}

// ============================================================================
// SECTION: Reference Finder
// ============================================================================

impl ReferenceFinder for SqlitePipelineStore {
    fn find_reference(
        &self,
        ra: f64,
        dec: f64,
        filter: &str,
    ) -> Result<Option<ReferenceMatch>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare_cached(
                "SELECT item_id, object_id, file_path, ra, dec
                 FROM items
                 WHERE filter = ?1 AND ra IS NOT NULL AND dec IS NOT NULL",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = statement
            .query_map(params![filter], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut best: Option<ReferenceMatch> = None;
        for row in rows {
            let (raw, object_id, file_path, row_ra, row_dec) =
                row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let distance_deg = angular_distance_deg(ra, dec, row_ra, row_dec);
            let closer = best.as_ref().is_none_or(|found| distance_deg < found.distance_deg);
            if closer {
                best = Some(ReferenceMatch {
                    item_id: item_id_from_row(raw)?,
                    object_id: ObjectId::new(object_id),
                    file_path,
                    ra: row_ra,
                    dec: row_dec,
                    distance_deg,
                });
            }
        }
        Ok(best)
    }
}

// ============================================================================
// SECTION: Solution Ledger
// ============================================================================

impl SolutionLedger for SqlitePipelineStore {
    fn ingest_solution(
        &self,
        item_id: ItemId,
        document: &SolutionDocument,
        artifacts: &SolutionArtifacts,
    ) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let inserted = guard.execute(
            "INSERT INTO calibration_result
                 (item_id, object_id, ra, dec, date_proc, offset_ra, offset_dec, sigma_ra,
                  sigma_dec, correlation, chi_square, dist_map_path, fgroup_map_path,
                  referr_1d_path, referr_2d_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                item_id.get(),
                document.object_id.as_str(),
                document.ra,
                document.dec,
                document.date_proc.unix_seconds(),
                document.offset_ra,
                document.offset_dec,
                document.sigma_ra,
                document.sigma_dec,
                document.correlation,
                document.chi_square,
                artifacts.dist_map_path,
                artifacts.fgroup_map_path,
                artifacts.referr_1d_path,
                artifacts.referr_2d_path
            ],
        );
        match inserted {
            Ok(_) => {
                debug!(%item_id, object_id = %document.object_id, "solution ingested");
                Ok(())
            }
            Err(err) if is_constraint_violation(&err) => {
                Err(SqliteStoreError::Constraint(format!(
                    "solution already recorded for item {item_id} at {}",
                    document.date_proc
                ))
                .into())
            }
            Err(err) => Err(SqliteStoreError::Db(err.to_string()).into()),
        }
    }

    fn latest_solution(&self, item_id: ItemId) -> Result<Option<SolutionRecord>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT object_id, ra, dec, date_proc, offset_ra, offset_dec, sigma_ra,
                        sigma_dec, correlation, chi_square, dist_map_path, fgroup_map_path,
                        referr_1d_path, referr_2d_path
                 FROM calibration_result
                 WHERE item_id = ?1
                 ORDER BY date_proc DESC
                 LIMIT 1",
                params![item_id.get()],
                |row| {
                    Ok(SolutionRecord {
                        item_id,
                        object_id: ObjectId::new(row.get::<_, String>(0)?),
                        ra: row.get(1)?,
                        dec: row.get(2)?,
                        offset_ra: row.get(4)?,
                        offset_dec: row.get(5)?,
                        sigma_ra: row.get(6)?,
                        sigma_dec: row.get(7)?,
                        correlation: row.get(8)?,
                        chi_square: row.get(9)?,
                        date_proc: ObsTimestamp::from_unix_seconds(row.get(3)?),
                        artifacts: SolutionArtifacts {
                            dist_map_path: row.get(10)?,
                            fgroup_map_path: row.get(11)?,
                            referr_1d_path: row.get(12)?,
                            referr_2d_path: row.get(13)?,
                        },
                    })
                },
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(row)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw image row before identifier validation.
struct RawImageRow {
    /// Row id from the `items` table.
    item_id: i64,
    /// Filesystem path of the image data.
    file_path: String,
    /// Natural key.
    object_id: String,
    /// Photometric filter name.
    filter: String,
    /// Right ascension in degrees.
    ra: Option<f64>,
    /// Declination in degrees.
    dec: Option<f64>,
    /// Quality grade.
    quality: Option<String>,
    /// Number of co-added exposures.
    n_coadds: Option<i64>,
    /// Number of detected sources.
    n_sources: Option<i64>,
    /// Assigned reference image path.
    reference_path: Option<String>,
    /// Angular distance to the reference image in degrees.
    reference_distance: Option<f64>,
}

impl RawImageRow {
    /// Converts the raw row into an [`ImageRecord`].
    fn into_record(self) -> Result<ImageRecord, SqliteStoreError> {
        Ok(ImageRecord {
            item_id: item_id_from_row(self.item_id)?,
            file_path: self.file_path,
            object_id: ObjectId::new(self.object_id),
            filter: self.filter,
            ra: self.ra,
            dec: self.dec,
            quality: self.quality,
            n_coadds: self.n_coadds,
            n_sources: self.n_sources,
            reference_path: self.reference_path,
            reference_distance: self.reference_distance,
        })
    }
}

/// Maps an `items` row in `SELECT` column order.
fn read_image_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawImageRow> {
    Ok(RawImageRow {
        item_id: row.get(0)?,
        file_path: row.get(1)?,
        object_id: row.get(2)?,
        filter: row.get(3)?,
        ra: row.get(4)?,
        dec: row.get(5)?,
        quality: row.get(6)?,
        n_coadds: row.get(7)?,
        n_sources: row.get(8)?,
        reference_path: row.get(9)?,
        reference_distance: row.get(10)?,
    })
}

/// Raw calibration frame row before kind and identifier validation.
struct RawFrameRow {
    /// Row id from the `calibration_frames` table.
    item_id: i64,
    /// Filesystem path of the frame data.
    file_path: String,
    /// Composite natural key.
    object_id: String,
    /// Telescope or camera key.
    site_key: String,
    /// Photometric filter, for flats.
    filter: Option<String>,
    /// Stored frame kind column.
    kind: String,
    /// Flat subtype, for flats.
    frame_type: Option<String>,
    /// Observation timestamp in unix seconds.
    date_obs: i64,
    /// Download flag.
    downloaded: bool,
}

impl RawFrameRow {
    /// Converts the raw row into a [`CalibrationFrame`].
    fn into_frame(self) -> Result<CalibrationFrame, SqliteStoreError> {
        let kind = FrameKind::parse(&self.kind)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("unknown frame kind: {}", self.kind)))?;
        Ok(CalibrationFrame {
            item_id: item_id_from_row(self.item_id)?,
            file_path: self.file_path,
            object_id: ObjectId::new(self.object_id),
            site_key: SiteKey::new(self.site_key),
            filter: self.filter,
            kind,
            frame_type: self.frame_type,
            date_obs: ObsTimestamp::from_unix_seconds(self.date_obs),
            downloaded: self.downloaded,
        })
    }
}

/// Maps a `calibration_frames` row in `SELECT` column order.
fn read_frame_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFrameRow> {
    Ok(RawFrameRow {
        item_id: row.get(0)?,
        file_path: row.get(1)?,
        object_id: row.get(2)?,
        site_key: row.get(3)?,
        filter: row.get(4)?,
        kind: row.get(5)?,
        frame_type: row.get(6)?,
        date_obs: row.get(7)?,
        downloaded: row.get(8)?,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Begins an immediate write transaction on the locked connection.
fn begin_immediate<'conn>(
    connection: &'conn mut MutexGuard<'_, Connection>,
) -> Result<Transaction<'conn>, SqliteStoreError> {
    connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Inserts an image row plus its stage status and counter increment.
///
/// Callers must have verified the natural key is absent within the same
/// transaction.
fn insert_image(
    tx: &Transaction<'_>,
    image: &NewImage,
    stage: &str,
) -> Result<ItemId, SqliteStoreError> {
    tx.execute(
        "INSERT INTO items (file_path, object_id, filter, ra, dec)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![image.file_path, image.object_id.as_str(), image.filter, image.ra, image.dec],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let item_id = item_id_from_row(tx.last_insert_rowid())?;
    tx.execute(
        "INSERT INTO stage_status
             (item_id, file_path, pipeline_step, processing_time, step_message, claim_state,
              claimed_at)
         VALUES (?1, ?2, ?3, 0, '', 'idle', NULL)",
        params![item_id.get(), image.file_path, stage],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute(
        "UPDATE stage_definition SET n_current = n_current + 1 WHERE pipeline_step = ?1",
        params![stage],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(item_id)
}

/// Registers a stage definition with zero counters if it is unknown.
fn ensure_stage_definition(
    tx: &Transaction<'_>,
    stage: &StageName,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO stage_definition
             (pipeline_step, shortname, total_runtime, n_processed, n_current)
         VALUES (?1, ?2, 0, 0, 0)",
        params![stage.as_str(), stage_shortname(stage)],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Abbreviates a stage name for display counters.
fn stage_shortname(stage: &StageName) -> String {
    stage.as_str().chars().take(STAGE_SHORTNAME_CHARS).collect()
}

/// Truncates a step message to the stored column width.
fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_STEP_MESSAGE_CHARS).collect()
}

/// Validates a row id read back from the database.
fn item_id_from_row(raw: i64) -> Result<ItemId, SqliteStoreError> {
    ItemId::from_raw(raw)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("non-positive item id: {raw}")))
}

/// Returns whether an `SQLite` error is a uniqueness constraint violation.
fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
    )
}

/// Creates the parent directory of the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS stage_definition (
                    pipeline_step TEXT PRIMARY KEY,
                    shortname TEXT NOT NULL,
                    total_runtime REAL NOT NULL,
                    n_processed INTEGER NOT NULL,
                    n_current INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS items (
                    item_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    file_path TEXT NOT NULL,
                    object_id TEXT NOT NULL UNIQUE,
                    filter TEXT NOT NULL,
                    ra REAL,
                    dec REAL,
                    quality TEXT,
                    n_coadds INTEGER,
                    n_sources INTEGER,
                    reference_path TEXT,
                    reference_distance REAL
                );
                CREATE INDEX IF NOT EXISTS idx_items_filter
                    ON items (filter);
                CREATE TABLE IF NOT EXISTS stage_status (
                    item_id INTEGER PRIMARY KEY,
                    file_path TEXT NOT NULL,
                    pipeline_step TEXT NOT NULL,
                    processing_time REAL NOT NULL,
                    step_message TEXT NOT NULL,
                    claim_state TEXT NOT NULL,
                    claimed_at INTEGER,
                    FOREIGN KEY (item_id) REFERENCES items(item_id) ON DELETE CASCADE,
                    FOREIGN KEY (pipeline_step)
                        REFERENCES stage_definition(pipeline_step) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_stage_status_queue
                    ON stage_status (pipeline_step, claim_state);
                CREATE TABLE IF NOT EXISTS timing_record (
                    item_id INTEGER NOT NULL,
                    pipeline_step TEXT NOT NULL,
                    runtime REAL NOT NULL,
                    PRIMARY KEY (item_id, pipeline_step),
                    FOREIGN KEY (item_id) REFERENCES items(item_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS calibration_frames (
                    item_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    file_path TEXT NOT NULL,
                    object_id TEXT NOT NULL UNIQUE,
                    site_key TEXT NOT NULL,
                    filter TEXT,
                    kind TEXT NOT NULL,
                    frame_type TEXT,
                    date_obs INTEGER NOT NULL,
                    downloaded INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_calibration_lookup
                    ON calibration_frames (site_key, kind, downloaded, date_obs);
                CREATE TABLE IF NOT EXISTS calibration_result (
                    item_id INTEGER NOT NULL,
                    object_id TEXT NOT NULL,
                    ra REAL NOT NULL,
                    dec REAL NOT NULL,
                    date_proc INTEGER NOT NULL,
                    offset_ra REAL NOT NULL,
                    offset_dec REAL NOT NULL,
                    sigma_ra REAL NOT NULL,
                    sigma_dec REAL NOT NULL,
                    correlation REAL NOT NULL,
                    chi_square REAL NOT NULL,
                    dist_map_path TEXT,
                    fgroup_map_path TEXT,
                    referr_1d_path TEXT,
                    referr_2d_path TEXT,
                    PRIMARY KEY (item_id, date_proc),
                    FOREIGN KEY (item_id) REFERENCES items(item_id) ON DELETE CASCADE
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "INSERT OR IGNORE INTO stage_definition
                     (pipeline_step, shortname, total_runtime, n_processed, n_current)
                 VALUES ('received', 'receiv', 0, 0, 0), ('captured', 'captur', 0, 0, 0);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
