// crates/photopipe-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Pipeline Store Unit Tests
// Description: Targeted integrity tests for the SQLite pipeline store.
// Purpose: Validate registration, claims, counters, timing, calibration,
//          reference ranking, solutions, and schema versioning.
// ============================================================================

//! ## Overview
//! Unit-level tests for the `SQLite` pipeline store:
//! - Registration and natural-key resolution
//! - Claim handout uniqueness across connections and threads
//! - Counter moves on stage transitions and re-entry
//! - Exactly-once completion timing
//! - Calibration frame dedup, download upsert, and nearest-in-time lookup
//! - Reference ranking by great-circle distance
//! - Solution ingest and duplicate rejection
//! - Path safety and schema version validation

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::thread;

use photopipe_core::CalibrationRegistry;
use photopipe_core::ClaimState;
use photopipe_core::FrameKind;
use photopipe_core::FrameSpec;
use photopipe_core::ItemId;
use photopipe_core::ItemRegistry;
use photopipe_core::NewImage;
use photopipe_core::ObjectId;
use photopipe_core::ObsTimestamp;
use photopipe_core::Reentry;
use photopipe_core::ReferenceFinder;
use photopipe_core::Registration;
use photopipe_core::SiteKey;
use photopipe_core::SolutionArtifacts;
use photopipe_core::SolutionDocument;
use photopipe_core::SolutionLedger;
use photopipe_core::StageName;
use photopipe_core::StageTracker;
use photopipe_core::StoreError;
use photopipe_store_sqlite::SqlitePipelineStore;
use photopipe_store_sqlite::SqliteStoreConfig;
use photopipe_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn store_at(path: &Path) -> SqlitePipelineStore {
    let mut config = SqliteStoreConfig::new(path.to_path_buf());
    config.busy_timeout_ms = 1_000;
    SqlitePipelineStore::new(config).expect("store init")
}

fn image(object_id: &str, ra: Option<f64>, dec: Option<f64>, filter: &str) -> NewImage {
    NewImage {
        file_path: format!("/data/{object_id}.fits"),
        object_id: ObjectId::new(object_id),
        filter: filter.to_string(),
        ra,
        dec,
    }
}

fn solution_json(ident: &str, time: &str) -> String {
    format!(
        r#"{{
            "date": "2024-03-01",
            "time": "{time}",
            "fields": {{
                "image_ident": "{ident}",
                "field_coordinates": [150.0, 2.5],
                "astrom_offset_reference": [0.11, -0.07],
                "astrom_sigma_reference": [0.013, 0.021],
                "astrom_corr_reference": 0.87,
                "chi2_reference": 1.31
            }}
        }}"#
    )
}

// ============================================================================
// SECTION: Registration
// ============================================================================

#[test]
fn registers_new_image_and_resolves_duplicate() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let first = store.register_or_resolve(&image("obj-1", Some(10.0), Some(20.0), "V")).unwrap();
    let Registration::New(item_id) = first else {
        panic!("expected new registration, got {first:?}");
    };
    let second = store.register_or_resolve(&image("obj-1", Some(10.0), Some(20.0), "V")).unwrap();
    assert_eq!(second, Registration::Existing(item_id));
    assert!(store.image_exists(&ObjectId::new("obj-1")).unwrap());
    let stats = store.stage_stats(&StageName::received()).unwrap().expect("received stats");
    assert_eq!(stats.n_current, 1);
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.pipeline_step, StageName::received());
    assert_eq!(status.claim_state, ClaimState::Idle);
    assert_eq!(status.processing_time, 0.0);
}

#[test]
fn concurrent_registration_yields_one_row_and_one_identity() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("pipeline.db");
    // Warm the schema so both racers contend on registration alone.
    drop(store_at(&db_path));
    let mut handles = Vec::new();
    for _ in 0 .. 2 {
        let worker = store_at(&db_path);
        handles.push(thread::spawn(move || {
            worker.register_or_resolve(&image("race-1", Some(5.0), Some(-5.0), "V")).unwrap()
        }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.join().expect("registrar thread"));
    }
    assert_eq!(outcomes[0].item_id(), outcomes[1].item_id(), "both callers see one identity");
    let fresh = outcomes.iter().filter(|outcome| matches!(outcome, Registration::New(_))).count();
    assert_eq!(fresh, 1, "exactly one caller created the row");
    let store = store_at(&db_path);
    let record = store.lookup_image(&ObjectId::new("race-1")).unwrap().expect("image row");
    assert_eq!(record.item_id, outcomes[0].item_id());
    let stats = store.stage_stats(&StageName::received()).unwrap().expect("received stats");
    assert_eq!(stats.n_current, 1, "a single intake row was counted");
}

#[test]
fn register_exposure_starts_in_captured_and_rejects_duplicates() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_exposure(&image("exp-1", None, None, "NONE")).unwrap();
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.pipeline_step, StageName::captured());
    let err = store.register_exposure(&image("exp-1", None, None, "NONE")).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "got {err:?}");
    let stats = store.stage_stats(&StageName::captured()).unwrap().expect("captured stats");
    assert_eq!(stats.n_current, 1);
}

#[test]
fn lookup_and_source_count_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let registration =
        store.register_or_resolve(&image("obj-look", Some(1.0), Some(2.0), "R")).unwrap();
    store.set_source_count(registration.item_id(), 42).unwrap();
    let record = store.lookup_image(&ObjectId::new("obj-look")).unwrap().expect("image row");
    assert_eq!(record.n_sources, Some(42));
    assert_eq!(record.filter, "R");
    assert_eq!(record.ra, Some(1.0));
    assert!(store.lookup_image(&ObjectId::new("missing")).unwrap().is_none());
    let unknown = ItemId::from_raw(9_999).unwrap();
    assert!(matches!(store.set_source_count(unknown, 1), Err(StoreError::Invalid(_))));
}

#[test]
fn reference_assignment_is_write_once() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let registration =
        store.register_or_resolve(&image("obj-ref", Some(1.0), Some(2.0), "V")).unwrap();
    let item_id = registration.item_id();
    store.assign_reference(item_id, "/data/ref.fits", 0.25).unwrap();
    let record = store.lookup_image(&ObjectId::new("obj-ref")).unwrap().expect("image row");
    assert_eq!(record.reference_path.as_deref(), Some("/data/ref.fits"));
    assert_eq!(record.reference_distance, Some(0.25));
    let err = store.assign_reference(item_id, "/data/other.fits", 0.5).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "got {err:?}");
    let unknown = ItemId::from_raw(9_999).unwrap();
    let err = store.assign_reference(unknown, "/data/ref.fits", 0.1).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)), "got {err:?}");
}

// ============================================================================
// SECTION: Claims
// ============================================================================

#[test]
fn claim_next_hands_out_each_item_once() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let first = store.register_or_resolve(&image("c-1", None, None, "V")).unwrap().item_id();
    let second = store.register_or_resolve(&image("c-2", None, None, "V")).unwrap().item_id();
    let now = ObsTimestamp::from_unix_seconds(1_000);
    let claim_a = store.claim_next(&StageName::received(), now).unwrap().expect("first claim");
    let claim_b = store.claim_next(&StageName::received(), now).unwrap().expect("second claim");
    assert_ne!(claim_a.item_id, claim_b.item_id);
    assert_eq!(
        [claim_a.item_id, claim_b.item_id],
        [first.min(second), first.max(second)]
    );
    assert!(store.claim_next(&StageName::received(), now).unwrap().is_none());
    let status = store.stage_status(claim_a.item_id).unwrap().expect("status row");
    assert_eq!(status.claim_state, ClaimState::Claimed);
    assert_eq!(status.claimed_at, Some(now));
}

#[test]
fn concurrent_claims_across_connections_never_collide() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("pipeline.db");
    let seed = store_at(&db_path);
    let mut expected = Vec::new();
    for index in 0 .. 8 {
        let id = seed
            .register_or_resolve(&image(&format!("cc-{index}"), None, None, "V"))
            .unwrap()
            .item_id();
        expected.push(id);
    }
    let mut handles = Vec::new();
    for _ in 0 .. 2 {
        let worker = store_at(&db_path);
        handles.push(thread::spawn(move || {
            let mut claimed = Vec::new();
            let now = ObsTimestamp::from_unix_seconds(2_000);
            while let Some(item) = worker.claim_next(&StageName::received(), now).unwrap() {
                claimed.push(item.item_id);
            }
            claimed
        }));
    }
    let mut all: Vec<ItemId> = Vec::new();
    for handle in handles {
        all.extend(handle.join().expect("worker thread"));
    }
    all.sort_unstable();
    let mut deduped = all.clone();
    deduped.dedup();
    assert_eq!(all.len(), expected.len(), "every item claimed exactly once");
    assert_eq!(all, deduped, "no item claimed twice");
}

#[test]
fn stale_claims_are_released_by_threshold() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_or_resolve(&image("stale-1", None, None, "V")).unwrap().item_id();
    let claimed_at = ObsTimestamp::from_unix_seconds(1_000);
    store.claim_next(&StageName::received(), claimed_at).unwrap().expect("claim");
    let fresh = store.release_stale_claims(60, ObsTimestamp::from_unix_seconds(1_030)).unwrap();
    assert_eq!(fresh, 0, "claim younger than threshold stays held");
    let boundary = store.release_stale_claims(60, ObsTimestamp::from_unix_seconds(1_060)).unwrap();
    assert_eq!(boundary, 0, "claim aged exactly the threshold stays held");
    let released = store.release_stale_claims(60, ObsTimestamp::from_unix_seconds(1_061)).unwrap();
    assert_eq!(released, 1);
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.claim_state, ClaimState::Idle);
    assert_eq!(status.claimed_at, None);
    let reclaim = store.claim_next(&StageName::received(), claimed_at).unwrap();
    assert!(reclaim.is_some(), "released item is claimable again");
}

#[test]
fn release_claim_requires_known_item() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_or_resolve(&image("rel-1", None, None, "V")).unwrap().item_id();
    store.claim_next(&StageName::received(), ObsTimestamp::from_unix_seconds(10)).unwrap();
    store.release_claim(item_id).unwrap();
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.claim_state, ClaimState::Idle);
    let unknown = ItemId::from_raw(9_999).unwrap();
    assert!(matches!(store.release_claim(unknown), Err(StoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Stage Transitions
// ============================================================================

#[test]
fn counters_match_row_population_after_every_transition() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let first = store.register_or_resolve(&image("t-1", None, None, "V")).unwrap().item_id();
    let second = store.register_or_resolve(&image("t-2", None, None, "V")).unwrap().item_id();
    let astrometry = StageName::new("astrometry");
    store.enter_stage(first, &astrometry, 3.5, "plate solving").unwrap();
    let received = store.stage_stats(&StageName::received()).unwrap().expect("received stats");
    assert_eq!(received.n_current, 1);
    let solving = store.stage_stats(&astrometry).unwrap().expect("astrometry stats");
    assert_eq!(solving.n_current, 1);
    assert_eq!(solving.n_processed, 0);
    assert_eq!(solving.shortname, "astrom");
    let status = store.stage_status(first).unwrap().expect("status row");
    assert_eq!(status.pipeline_step, astrometry);
    assert_eq!(status.processing_time, 3.5);
    assert_eq!(status.step_message, "plate solving");
    let untouched = store.stage_status(second).unwrap().expect("status row");
    assert_eq!(untouched.pipeline_step, StageName::received());
}

#[test]
fn enter_stage_rejects_same_stage_and_unknown_items() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_or_resolve(&image("e-1", None, None, "V")).unwrap().item_id();
    let err = store.enter_stage(item_id, &StageName::received(), 1.0, "noop").unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)), "got {err:?}");
    let unknown = ItemId::from_raw(9_999).unwrap();
    let err = store.enter_stage(unknown, &StageName::new("astrometry"), 1.0, "x").unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)), "got {err:?}");
    let stats = store.stage_stats(&StageName::received()).unwrap().expect("received stats");
    assert_eq!(stats.n_current, 1, "failed transitions leave counters untouched");
}

#[test]
fn finish_stage_accounts_completion_exactly_once() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_or_resolve(&image("f-1", None, None, "V")).unwrap().item_id();
    let astrometry = StageName::new("astrometry");
    store.enter_stage(item_id, &astrometry, 2.0, "entering").unwrap();
    store.finish_stage(item_id, &astrometry, 7.5, "solved").unwrap();
    let stats = store.stage_stats(&astrometry).unwrap().expect("astrometry stats");
    assert_eq!(stats.n_processed, 1);
    assert_eq!(stats.total_runtime, 7.5);
    assert_eq!(stats.n_current, 1, "finish does not vacate the stage");
    let timing = store.timing_record(item_id, &astrometry).unwrap().expect("timing record");
    assert_eq!(timing.runtime, 7.5);
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.processing_time, 9.5);
    let err = store.finish_stage(item_id, &astrometry, 7.5, "solved again").unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)), "got {err:?}");
    let stats = store.stage_stats(&astrometry).unwrap().expect("astrometry stats");
    assert_eq!(stats.n_processed, 1, "repeated finish does not double count");
    assert_eq!(stats.total_runtime, 7.5);
}

#[test]
fn finish_stage_requires_occupancy() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_or_resolve(&image("f-2", None, None, "V")).unwrap().item_id();
    let err = store.finish_stage(item_id, &StageName::new("astrometry"), 1.0, "x").unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)), "got {err:?}");
}

#[test]
fn step_messages_are_truncated_to_column_width() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_or_resolve(&image("m-1", None, None, "V")).unwrap().item_id();
    let long_message = "a".repeat(300);
    store.enter_stage(item_id, &StageName::new("reduction"), 1.0, &long_message).unwrap();
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.step_message.chars().count(), 127);
}

#[test]
fn reentry_resets_captured_items_and_rejects_advanced_ones() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store.register_exposure(&image("re-1", None, None, "NONE")).unwrap();
    store.claim_next(&StageName::captured(), ObsTimestamp::from_unix_seconds(5)).unwrap();
    let resubmission = NewImage {
        file_path: "/data/re-1-v2.fits".to_string(),
        ..image("re-1", None, None, "NONE")
    };
    let outcome = store.restart_if_reentrant(&resubmission).unwrap();
    assert_eq!(outcome, Reentry::Resumed(item_id));
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.pipeline_step, StageName::received());
    assert_eq!(status.processing_time, 0.0);
    assert_eq!(status.claim_state, ClaimState::Idle);
    assert_eq!(status.file_path, "/data/re-1-v2.fits");
    let captured = store.stage_stats(&StageName::captured()).unwrap().expect("captured stats");
    assert_eq!(captured.n_current, 0);
    let received = store.stage_stats(&StageName::received()).unwrap().expect("received stats");
    assert_eq!(received.n_current, 1);

    store.enter_stage(item_id, &StageName::new("reduction"), 1.0, "reducing").unwrap();
    let err = store.restart_if_reentrant(&resubmission).unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)), "got {err:?}");

    let fresh = store.restart_if_reentrant(&image("re-new", None, None, "V")).unwrap();
    assert!(matches!(fresh, Reentry::New(_)), "got {fresh:?}");
}

#[test]
fn reset_current_counters_zeroes_every_stage() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    store.register_or_resolve(&image("z-1", None, None, "V")).unwrap();
    store.register_exposure(&image("z-2", None, None, "V")).unwrap();
    store.reset_current_counters().unwrap();
    let received = store.stage_stats(&StageName::received()).unwrap().expect("received stats");
    assert_eq!(received.n_current, 0);
    let captured = store.stage_stats(&StageName::captured()).unwrap().expect("captured stats");
    assert_eq!(captured.n_current, 0);
}

// ============================================================================
// SECTION: Calibration
// ============================================================================

#[test]
fn calibration_frames_dedupe_by_natural_key() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let spec = FrameSpec::flat(
        "/cal/flat-v.fits",
        SiteKey::new("T1"),
        "V",
        "2024-03-01",
        "dome",
        ObsTimestamp::from_unix_seconds(1_000),
    );
    let first = store.add_frame(&spec).unwrap();
    assert!(first.is_some());
    let second = store.add_frame(&spec).unwrap();
    assert!(second.is_none(), "duplicate key is absorbed, not an error");
    assert!(store.calibration_exists(&spec.object_id).unwrap());

    let bias = FrameSpec::bias(
        "/cal/bias-7.fits",
        ObjectId::new("bias-7"),
        SiteKey::new("cam-1"),
        ObsTimestamp::from_unix_seconds(2_000),
    );
    assert!(store.add_frame(&bias).unwrap().is_some());
    assert!(store.calibration_exists(&bias.object_id).unwrap());
    assert!(!store.calibration_exists(&ObjectId::new("bias-8")).unwrap());
}

#[test]
fn mark_downloaded_upserts_and_enables_lookup() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let camera = SiteKey::new("cam-1");
    let spec = FrameSpec::dark(
        "/cal/dark-1.fits",
        ObjectId::new("dark-1"),
        camera.clone(),
        ObsTimestamp::from_unix_seconds(5_000),
    );
    // Unknown key inserts directly as downloaded.
    let item_id = store.mark_downloaded(&spec).unwrap();
    let found = store
        .nearest_calibration(&camera, None, FrameKind::Dark, ObsTimestamp::from_unix_seconds(0))
        .unwrap()
        .expect("downloaded dark");
    assert_eq!(found.item_id, item_id);
    assert!(found.downloaded);

    // Known key updates the stored path in place.
    let moved = FrameSpec::dark(
        "/cal/archive/dark-1.fits",
        ObjectId::new("dark-1"),
        camera.clone(),
        ObsTimestamp::from_unix_seconds(5_000),
    );
    let same_id = store.mark_downloaded(&moved).unwrap();
    assert_eq!(same_id, item_id);
    let found = store
        .latest_calibration(&camera, FrameKind::Dark)
        .unwrap()
        .expect("downloaded dark");
    assert_eq!(found.file_path, "/cal/archive/dark-1.fits");
}

#[test]
fn nearest_calibration_ranks_by_time_distance() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let telescope = SiteKey::new("T1");
    for (date, stamp) in [("2024-03-01", 1_000_i64), ("2024-03-05", 9_000), ("2024-03-09", 20_000)]
    {
        let spec = FrameSpec::flat(
            format!("/cal/flat-{date}.fits"),
            telescope.clone(),
            "V",
            date,
            "dome",
            ObsTimestamp::from_unix_seconds(stamp),
        );
        store.mark_downloaded(&spec).unwrap();
    }
    // Registered but never downloaded; must be invisible to lookups.
    let pending = FrameSpec::flat(
        "/cal/flat-pending.fits",
        telescope.clone(),
        "V",
        "2024-03-06",
        "dome",
        ObsTimestamp::from_unix_seconds(10_000),
    );
    store.add_frame(&pending).unwrap();

    let target = ObsTimestamp::from_unix_seconds(10_500);
    let nearest = store
        .nearest_calibration(&telescope, Some("V"), FrameKind::Flat, target)
        .unwrap()
        .expect("nearest flat");
    assert_eq!(nearest.date_obs, ObsTimestamp::from_unix_seconds(9_000));
    assert!(
        store
            .nearest_calibration(&telescope, Some("R"), FrameKind::Flat, target)
            .unwrap()
            .is_none(),
        "filter mismatch yields no frame"
    );
    let latest = store
        .latest_calibration(&telescope, FrameKind::Flat)
        .unwrap()
        .expect("latest flat");
    assert_eq!(latest.date_obs, ObsTimestamp::from_unix_seconds(20_000));
}

#[test]
fn nearest_calibration_on_empty_store_is_none() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let found = store
        .nearest_calibration(
            &SiteKey::new("T1"),
            Some("V"),
            FrameKind::Flat,
            ObsTimestamp::from_unix_seconds(0),
        )
        .unwrap();
    assert!(found.is_none());
}

// ============================================================================
// SECTION: Reference Ranking
// ============================================================================

#[test]
fn find_reference_returns_angularly_closest_match_in_filter() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let near = store
        .register_or_resolve(&image("ref-near", Some(0.0), Some(0.0), "V"))
        .unwrap()
        .item_id();
    store.register_or_resolve(&image("ref-far", Some(10.0), Some(10.0), "V")).unwrap();
    store.register_or_resolve(&image("ref-other", Some(0.1), Some(0.1), "R")).unwrap();
    store.register_or_resolve(&image("ref-blind", None, None, "V")).unwrap();

    let found = store.find_reference(0.0, 0.6, "V").unwrap().expect("reference match");
    assert_eq!(found.item_id, near);
    assert!((found.distance_deg - 0.6).abs() < 1e-9, "got {}", found.distance_deg);
    assert!(store.find_reference(0.0, 0.6, "B").unwrap().is_none());
}

// ============================================================================
// SECTION: Solutions
// ============================================================================

#[test]
fn solution_ingest_is_readable_and_rejects_duplicates() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(&dir.path().join("pipeline.db"));
    let item_id = store
        .register_or_resolve(&image("sol-1", Some(150.0), Some(2.5), "V"))
        .unwrap()
        .item_id();
    let document = SolutionDocument::parse(&solution_json("sol-1", "12:00:00")).unwrap();
    let artifacts = SolutionArtifacts {
        dist_map_path: Some("/plots/dist.png".to_string()),
        fgroup_map_path: Some("/plots/fgroup.png".to_string()),
        referr_1d_path: Some("/plots/referr1d.png".to_string()),
        referr_2d_path: None,
    };
    store.ingest_solution(item_id, &document, &artifacts).unwrap();
    let stored = store.latest_solution(item_id).unwrap().expect("solution row");
    assert_eq!(stored.ra, 150.0 / 15.0);
    assert_eq!(stored.chi_square, 1.31);
    assert_eq!(stored.artifacts, artifacts);

    let err = store.ingest_solution(item_id, &document, &artifacts).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "got {err:?}");

    // A later solver run for the same item lands as a second row.
    let rerun = SolutionDocument::parse(&solution_json("sol-1", "13:30:00")).unwrap();
    store.ingest_solution(item_id, &rerun, &SolutionArtifacts::default()).unwrap();
    let latest = store.latest_solution(item_id).unwrap().expect("solution row");
    assert_eq!(latest.date_proc, rerun.date_proc);
}

// ============================================================================
// SECTION: Store Lifecycle
// ============================================================================

#[test]
fn rejects_directory_store_path() {
    let dir = TempDir::new().expect("tempdir");
    let err = SqlitePipelineStore::new(SqliteStoreConfig::new(dir.path().to_path_buf()))
        .expect_err("directory path must be rejected");
    assert!(matches!(err, SqliteStoreError::Invalid(_)), "got {err:?}");
}

#[test]
fn unsupported_schema_version_fails_closed() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("pipeline.db");
    {
        let store = store_at(&db_path);
        store.register_or_resolve(&image("v-1", None, None, "V")).unwrap();
    }
    {
        let connection = Connection::open(&db_path).expect("raw connection");
        connection
            .execute("UPDATE store_meta SET version = ?1", params![99_i64])
            .expect("version bump");
    }
    let err = SqlitePipelineStore::new(SqliteStoreConfig::new(db_path))
        .expect_err("mismatched schema must fail closed");
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)), "got {err:?}");
}

#[test]
fn reopened_store_preserves_state() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("pipeline.db");
    let item_id = {
        let store = store_at(&db_path);
        store.register_or_resolve(&image("persist-1", Some(5.0), Some(5.0), "V")).unwrap().item_id()
    };
    let store = store_at(&db_path);
    let status = store.stage_status(item_id).unwrap().expect("status row");
    assert_eq!(status.pipeline_step, StageName::received());
    let stats = store.stage_stats(&StageName::received()).unwrap().expect("received stats");
    assert_eq!(stats.n_current, 1, "reopen does not reseed counters");
}
