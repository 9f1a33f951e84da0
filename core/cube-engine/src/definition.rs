//! FILENAME: core/cube-engine/src/definition.rs
//! Cube Definition - The serializable configuration and fact model.
//!
//! This module contains all the types needed to DESCRIBE a cube:
//! dimensions with their level hierarchies, measures with aggregation kinds,
//! and the fact rows themselves. These structures are designed to be:
//! - Serializable (registration payloads arrive as JSON documents)
//! - Immutable snapshots once registered (the registry never mutates them)

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Sentinel coordinate used when a fact carries no value at an axis level.
pub const ALL_LABEL: &str = "All";

// ============================================================================
// SCALARS
// ============================================================================

/// A dynamically-typed value carried by fact rows, filters, and coordinates.
/// Numbers and text are the only shapes the engine distinguishes; numeric
/// operators reject the text variant rather than coercing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    /// The numeric value, when this scalar is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(_) => None,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Scalar::Text(s.into())
    }

    /// Sentinel for a missing coordinate.
    pub fn all() -> Self {
        Scalar::Text(ALL_LABEL.to_string())
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl std::hash::Hash for Scalar {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Scalar::Number(n) => {
                0u8.hash(state);
                if n.is_nan() {
                    // All NaN values hash to the same thing
                    u64::MAX.hash(state);
                } else {
                    n.to_bits().hash(state);
                }
            }
            Scalar::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

/// Canonical scalar ordering: numeric vs numeric compares numerically,
/// everything else compares the string forms. Stable and total.
pub fn canonical_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Number(na), Scalar::Number(nb)) => na.partial_cmp(nb).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation kinds for measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    Distinct,
}

impl Default for AggregationType {
    fn default() -> Self {
        AggregationType::Sum
    }
}

// ============================================================================
// DIMENSIONS AND MEASURES
// ============================================================================

/// A categorical attribute with an ordered hierarchy of levels.
/// Levels run coarse to fine (e.g. time: year, quarter, month).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionDef {
    pub name: String,

    /// Display label (defaults to the name when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Level names, coarse to fine. Never empty for a valid cube.
    pub hierarchy: Vec<String>,
}

impl DimensionDef {
    /// Index of a level within the hierarchy.
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.hierarchy.iter().position(|l| l == level)
    }

    /// The coarsest level (first in the hierarchy).
    pub fn coarsest_level(&self) -> &str {
        &self.hierarchy[0]
    }

    /// The finest level (last in the hierarchy).
    pub fn finest_level(&self) -> &str {
        self.hierarchy.last().map(String::as_str).unwrap_or_default()
    }
}

/// A numerically aggregatable quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureDef {
    pub name: String,

    /// Key into each fact row's metrics map.
    pub value_field: String,

    pub aggregation: AggregationType,

    /// Display label (e.g. "Revenue (USD)").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Number format hint passed through to rendering clients (e.g. "#,##0.00").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

// ============================================================================
// FACT ROWS
// ============================================================================

/// A single observation: level coordinates for each dimension plus metric
/// values. Any subset of a dimension's levels may be populated; a missing
/// level surfaces as the "All" coordinate when pivoted on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactRow {
    /// dimension name -> (level name -> value)
    #[serde(default)]
    pub dimensions: HashMap<String, HashMap<String, Scalar>>,

    /// metric field -> value (explicit null is preserved and means "absent")
    #[serde(default)]
    pub metrics: HashMap<String, Option<Scalar>>,
}

impl FactRow {
    /// The value this fact carries at (dimension, level), if any.
    pub fn value_at(&self, dimension: &str, level: &str) -> Option<&Scalar> {
        self.dimensions.get(dimension).and_then(|levels| levels.get(level))
    }

    /// The metric value for a measure's value field. Flattens the explicit
    /// null inside the map into plain absence.
    pub fn metric(&self, field: &str) -> Option<&Scalar> {
        self.metrics.get(field).and_then(Option::as_ref)
    }
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete, serializable definition of a cube.
/// This is the "source of truth" handed to `registerCube`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubeDefinition {
    /// Unique cube name (registration rejects duplicates).
    pub name: String,

    /// Display label for catalog listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Ordered dimensions. A valid cube has at least one.
    pub dimensions: Vec<DimensionDef>,

    /// Ordered measures, unique by name.
    pub measures: Vec<MeasureDef>,

    /// The fact rows, immutable after registration.
    #[serde(default)]
    pub facts: Vec<FactRow>,
}

impl CubeDefinition {
    pub fn dimension(&self, name: &str) -> Option<&DimensionDef> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn measure(&self, name: &str) -> Option<&MeasureDef> {
        self.measures.iter().find(|m| m.name == name)
    }
}
