//! FILENAME: core/cube-engine/src/view.rs
//! Query View - Renderable output of a query.
//!
//! This module holds the data half of a result document: pivot headers for
//! both axes, one dense value matrix per measure, and the optional flat row
//! list. Header keys are a pure function of their coordinate list and are
//! part of the external contract (clients dedupe on them), so the
//! serialization here must stay stable across builds.

use crate::definition::{Scalar, ALL_LABEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key used for a header with no coordinates (the synthetic "All" axis).
pub const ALL_KEY: &str = "__all__";

// ============================================================================
// HEADERS
// ============================================================================

/// One resolved (dimension, level, value) coordinate of a pivot header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub dimension: String,
    pub level: String,
    pub value: Scalar,
}

/// A row or column header: a stable key, a display label, and the ordered
/// coordinates that produced both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotHeader {
    pub key: String,
    pub label: String,
    pub coordinates: Vec<Coordinate>,
}

impl PivotHeader {
    /// Builds a header from its coordinates. Key and label derive from the
    /// coordinate list alone, so identical coordinates always produce an
    /// identical header.
    pub fn from_coordinates(coordinates: Vec<Coordinate>) -> Self {
        let key = Self::key_of(&coordinates);
        let label = if coordinates.is_empty() {
            ALL_LABEL.to_string()
        } else {
            coordinates
                .iter()
                .map(|c| c.value.to_string())
                .collect::<Vec<_>>()
                .join(" / ")
        };
        PivotHeader {
            key,
            label,
            coordinates,
        }
    }

    /// The synthetic header used when an axis has no dimensions.
    pub fn all() -> Self {
        PivotHeader::from_coordinates(Vec::new())
    }

    /// Canonical key serialization: `dim.level:value` fragments joined by
    /// `|`, or `__all__` for an empty coordinate list.
    pub fn key_of(coordinates: &[Coordinate]) -> String {
        if coordinates.is_empty() {
            return ALL_KEY.to_string();
        }
        coordinates
            .iter()
            .map(|c| format!("{}.{}:{}", c.dimension, c.level, c.value))
            .collect::<Vec<_>>()
            .join("|")
    }
}

// ============================================================================
// DATA BLOCK
// ============================================================================

/// The dense value matrix for one measure, `values[row][column]`, plus the
/// measure's presentation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureBlock {
    pub values: Vec<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// The pivoted result: headers on both axes and one block per measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotData {
    pub rows: Vec<PivotHeader>,
    pub columns: Vec<PivotHeader>,
    /// Keyed by measure name. A BTreeMap keeps serialization order stable.
    pub measures: BTreeMap<String, MeasureBlock>,
}

/// One populated cell flattened into record form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRow {
    /// Key of the row header this cell belongs to.
    pub row: String,
    /// Key of the column header this cell belongs to.
    pub column: String,
    /// Row coordinates followed by column coordinates.
    pub coordinates: Vec<Coordinate>,
    /// measure name -> finalized value for this cell.
    pub values: BTreeMap<String, f64>,
}

/// The `data` half of a result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    pub pivot: PivotData,

    /// Present when the query asked for flattened output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat: Option<Vec<FlatRow>>,
}
