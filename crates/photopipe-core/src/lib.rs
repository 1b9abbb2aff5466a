// crates/photopipe-core/src/lib.rs
// ============================================================================
// Module: Photopipe Core
// Description: Domain types and operation contracts for the pipeline tracker.
// Purpose: Backend-agnostic core consumed by store implementations and workers.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! `photopipe-core` defines the state model of a multi-stage astronomical
//! image-processing pipeline — items, stage status, aggregate counters,
//! timing ledger, calibration frames, and solver results — plus the traits a
//! backing store implements. The core embeds no storage engine and reads no
//! wall-clock time; stores provide durability and workers provide time.

/// Domain model: identifiers, records, time, spatial math, solutions.
pub mod core;
/// Operation contracts implemented by backing stores.
pub mod interfaces;

pub use crate::core::identifiers::ItemId;
pub use crate::core::identifiers::ObjectId;
pub use crate::core::identifiers::SiteKey;
pub use crate::core::identifiers::StageName;
pub use crate::core::items::CalibrationFrame;
pub use crate::core::items::ClaimState;
pub use crate::core::items::ClaimedItem;
pub use crate::core::items::FrameKind;
pub use crate::core::items::FrameSpec;
pub use crate::core::items::ImageRecord;
pub use crate::core::items::NewImage;
pub use crate::core::items::Reentry;
pub use crate::core::items::ReferenceMatch;
pub use crate::core::items::Registration;
pub use crate::core::items::StageStats;
pub use crate::core::items::StageStatus;
pub use crate::core::items::TimingRecord;
pub use crate::core::solution::SolutionArtifacts;
pub use crate::core::solution::SolutionDocument;
pub use crate::core::solution::SolutionParseError;
pub use crate::core::solution::SolutionRecord;
pub use crate::core::spatial::angular_distance_deg;
pub use crate::core::time::ObsTimestamp;
pub use crate::core::time::TimeParseError;
pub use crate::interfaces::CalibrationRegistry;
pub use crate::interfaces::ItemRegistry;
pub use crate::interfaces::ReferenceFinder;
pub use crate::interfaces::SolutionLedger;
pub use crate::interfaces::StageTracker;
pub use crate::interfaces::StoreError;
