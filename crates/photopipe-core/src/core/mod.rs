// crates/photopipe-core/src/core/mod.rs
// ============================================================================
// Module: Photopipe Core Model
// Description: Domain model for the pipeline state tracker.
// Purpose: Group identifiers, records, time, spatial math, and solutions.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! The core model holds everything a store implementation persists and
//! everything a worker exchanges with it: identifiers, item and stage
//! records, timestamps, the reference-ranking distance formula, and the
//! astrometric-solution document model.

/// Canonical identifiers.
pub mod identifiers;
/// Image, stage, timing, and calibration-frame records.
pub mod items;
/// Astrometric-solution document parsing.
pub mod solution;
/// Great-circle distance math.
pub mod spatial;
/// Timestamp representation.
pub mod time;
