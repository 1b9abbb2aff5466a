// crates/photopipe-core/src/core/solution.rs
// ============================================================================
// Module: Photopipe Solution Documents
// Description: Parser for external astrometric-solution result documents.
// Purpose: Turn a solver's field table into a validated calibration result.
// Dependencies: serde, serde_json, thiserror, crate::core
// ============================================================================

//! ## Overview
//! The external astrometric solver emits one result document per run: a
//! field table carrying the image identifier, the solved field coordinates,
//! offset/sigma/correlation/chi-square statistics against the reference
//! catalog, and a processing timestamp split across separate date and time
//! fields. This module parses and validates that document. The first field
//! coordinate is divided by 15 to convert degrees to hour-angle-scaled right
//! ascension; this scaling is load-bearing and must stay bit-exact.
//!
//! Parsing is all-or-nothing: a document missing any required field yields
//! [`SolutionParseError`] and nothing is ever inserted from it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ItemId;
use crate::core::identifiers::ObjectId;
use crate::core::time::ObsTimestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Solution document parse errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - A parse error implies no partial state was produced.
#[derive(Debug, Error)]
pub enum SolutionParseError {
    /// A required field is absent from the document.
    #[error("solution document missing required field: {0}")]
    MissingField(&'static str),
    /// The document is not well-formed.
    #[error("malformed solution document: {0}")]
    Malformed(String),
}

// ============================================================================
// SECTION: Wire Form
// ============================================================================

/// Raw field table as emitted by the solver, before validation.
///
/// # Invariants
/// - All fields optional here; presence is enforced by [`SolutionDocument::parse`].
#[derive(Debug, Deserialize)]
struct RawSolution {
    /// Processing date, `YYYY-MM-DD`.
    date: Option<String>,
    /// Processing time of day, `HH:MM:SS`.
    time: Option<String>,
    /// Field table keyed by solver field names.
    fields: Option<RawFields>,
}

/// Raw per-field entries of the solver table.
///
/// # Invariants
/// - Field names follow the solver's export; renames here track the solver.
#[derive(Debug, Deserialize)]
struct RawFields {
    /// Image identifier the solution belongs to.
    image_ident: Option<String>,
    /// Solved field center, `[ra_deg, dec_deg]`.
    field_coordinates: Option<[f64; 2]>,
    /// Positional offset against the reference catalog, `[ra, dec]`.
    astrom_offset_reference: Option<[f64; 2]>,
    /// Positional scatter against the reference catalog, `[ra, dec]`.
    astrom_sigma_reference: Option<[f64; 2]>,
    /// Correlation against the reference catalog.
    astrom_corr_reference: Option<f64>,
    /// Chi-square of the astrometric fit.
    chi2_reference: Option<f64>,
}

// ============================================================================
// SECTION: Parsed Document
// ============================================================================

/// A validated astrometric-solution document.
///
/// # Invariants
/// - `ra` is hour-angle-scaled (solver degrees divided by 15); `dec` stays
///   in degrees.
/// - `date_proc` is composed from the solver's separate date and time fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionDocument {
    /// Identifier of the solved image as reported by the solver.
    pub object_id: ObjectId,
    /// Hour-angle-scaled right ascension of the field center.
    pub ra: f64,
    /// Declination of the field center in degrees.
    pub dec: f64,
    /// Reference offset, right ascension component.
    pub offset_ra: f64,
    /// Reference offset, declination component.
    pub offset_dec: f64,
    /// Reference sigma, right ascension component.
    pub sigma_ra: f64,
    /// Reference sigma, declination component.
    pub sigma_dec: f64,
    /// Correlation against the reference catalog.
    pub correlation: f64,
    /// Chi-square of the astrometric fit.
    pub chi_square: f64,
    /// Processing timestamp.
    pub date_proc: ObsTimestamp,
}

impl SolutionDocument {
    /// Parses and validates a solver result document from its JSON export.
    ///
    /// # Errors
    ///
    /// Returns [`SolutionParseError`] when the document is not valid JSON or
    /// any required field is absent or malformed. No partial document is
    /// ever returned.
    pub fn parse(json: &str) -> Result<Self, SolutionParseError> {
        let raw: RawSolution = serde_json::from_str(json)
            .map_err(|err| SolutionParseError::Malformed(err.to_string()))?;
        let date = raw.date.ok_or(SolutionParseError::MissingField("date"))?;
        let time = raw.time.ok_or(SolutionParseError::MissingField("time"))?;
        let fields = raw.fields.ok_or(SolutionParseError::MissingField("fields"))?;
        let image_ident =
            fields.image_ident.ok_or(SolutionParseError::MissingField("image_ident"))?;
        let [field_ra, field_dec] = fields
            .field_coordinates
            .ok_or(SolutionParseError::MissingField("field_coordinates"))?;
        let [offset_ra, offset_dec] = fields
            .astrom_offset_reference
            .ok_or(SolutionParseError::MissingField("astrom_offset_reference"))?;
        let [sigma_ra, sigma_dec] = fields
            .astrom_sigma_reference
            .ok_or(SolutionParseError::MissingField("astrom_sigma_reference"))?;
        let correlation = fields
            .astrom_corr_reference
            .ok_or(SolutionParseError::MissingField("astrom_corr_reference"))?;
        let chi_square =
            fields.chi2_reference.ok_or(SolutionParseError::MissingField("chi2_reference"))?;
        let date_proc = ObsTimestamp::from_date_and_time(&date, &time)
            .map_err(|err| SolutionParseError::Malformed(err.to_string()))?;
        Ok(Self {
            object_id: ObjectId::new(image_ident),
            // Degrees to hour-angle-scaled right ascension. Bit-exact: a
            // single division, no rounding.
            ra: field_ra / 15.0,
            dec: field_dec,
            offset_ra,
            offset_dec,
            sigma_ra,
            sigma_dec,
            correlation,
            chi_square,
            date_proc,
        })
    }
}

/// Auxiliary artifact paths produced alongside a solution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SolutionArtifacts {
    /// Distortion map plot path.
    pub dist_map_path: Option<String>,
    /// Field-group plot path.
    pub fgroup_map_path: Option<String>,
    /// 1-D reference error plot path.
    pub referr_1d_path: Option<String>,
    /// 2-D reference error plot path.
    pub referr_2d_path: Option<String>,
}

/// A stored calibration-result row.
///
/// # Invariants
/// - Keyed by (`item_id`, `date_proc`); created once per solver run and never
///   mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionRecord {
    /// Item the solution belongs to.
    pub item_id: ItemId,
    /// Solver-reported image identifier.
    pub object_id: ObjectId,
    /// Hour-angle-scaled right ascension of the field center.
    pub ra: f64,
    /// Declination of the field center in degrees.
    pub dec: f64,
    /// Reference offset, right ascension component.
    pub offset_ra: f64,
    /// Reference offset, declination component.
    pub offset_dec: f64,
    /// Reference sigma, right ascension component.
    pub sigma_ra: f64,
    /// Reference sigma, declination component.
    pub sigma_dec: f64,
    /// Correlation against the reference catalog.
    pub correlation: f64,
    /// Chi-square of the astrometric fit.
    pub chi_square: f64,
    /// Processing timestamp.
    pub date_proc: ObsTimestamp,
    /// Auxiliary artifact paths.
    pub artifacts: SolutionArtifacts,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::float_cmp,
        reason = "Test-only assertions are permitted."
    )]

    use super::SolutionDocument;
    use super::SolutionParseError;

    /// A complete solver export used as the baseline for field-removal tests.
    const COMPLETE: &str = r#"{
        "date": "2024-03-01",
        "time": "12:00:00",
        "fields": {
            "image_ident": "obj-42",
            "field_coordinates": [150.0, 2.5],
            "astrom_offset_reference": [0.11, -0.07],
            "astrom_sigma_reference": [0.013, 0.021],
            "astrom_corr_reference": 0.87,
            "chi2_reference": 1.31
        }
    }"#;

    #[test]
    fn parses_complete_document() {
        let doc = SolutionDocument::parse(COMPLETE).unwrap();
        assert_eq!(doc.object_id.as_str(), "obj-42");
        assert_eq!(doc.ra, 150.0 / 15.0);
        assert_eq!(doc.dec, 2.5);
        assert_eq!(doc.offset_ra, 0.11);
        assert_eq!(doc.sigma_dec, 0.021);
        assert_eq!(doc.correlation, 0.87);
        assert_eq!(doc.chi_square, 1.31);
        assert_eq!(doc.date_proc.unix_seconds(), 1_709_294_400);
    }

    #[test]
    fn right_ascension_scaling_is_a_plain_division() {
        let json = COMPLETE.replace("150.0", "187.65432");
        let doc = SolutionDocument::parse(&json).unwrap();
        assert_eq!(doc.ra, 187.654_32 / 15.0);
    }

    #[test]
    fn rejects_missing_field_table() {
        let json = r#"{"date": "2024-03-01", "time": "12:00:00"}"#;
        let err = SolutionDocument::parse(json).unwrap_err();
        assert!(matches!(err, SolutionParseError::MissingField("fields")));
    }

    #[test]
    fn rejects_missing_statistics() {
        let json = COMPLETE.replace("\"chi2_reference\": 1.31", "\"unrelated\": 0");
        let err = SolutionDocument::parse(&json).unwrap_err();
        assert!(matches!(err, SolutionParseError::MissingField("chi2_reference")));
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let json = COMPLETE.replace("12:00:00", "noon");
        let err = SolutionDocument::parse(&json).unwrap_err();
        assert!(matches!(err, SolutionParseError::Malformed(_)));
    }

    #[test]
    fn rejects_non_json_input() {
        assert!(matches!(
            SolutionDocument::parse("<votable/>"),
            Err(SolutionParseError::Malformed(_))
        ));
    }
}
