//! FILENAME: core/cube-engine/src/query.rs
//! Query Payload - Shared type definitions for the query wire contract.
//! All structs use camelCase serialization for JavaScript interoperability.
//!
//! Every field except `cube` and `measures` is optional; defaults are
//! resolved by the normalizer, not here.

use crate::definition::Scalar;
use serde::{Deserialize, Serialize};

/// Sort direction accepted on axis specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One pivoting direction: a dimension, optionally pinned to a level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisSpec {
    pub dimension: String,

    /// Defaults to the dimension's finest level when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDirection>,

    /// Accepted for client convenience; not reflected in output headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AxisSpec {
    pub fn new(dimension: impl Into<String>) -> Self {
        AxisSpec {
            dimension: dimension.into(),
            level: None,
            sort: None,
            alias: None,
        }
    }

    pub fn at_level(dimension: impl Into<String>, level: impl Into<String>) -> Self {
        AxisSpec {
            dimension: dimension.into(),
            level: Some(level.into()),
            sort: None,
            alias: None,
        }
    }
}

/// Filter operators. Slices, dices, and filters all collapse into this
/// single predicate shape during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    In,
    Nin,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
}

/// A filter's comparison value: one scalar, or a list for in/nin/between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl FilterValue {
    pub fn as_list(&self) -> &[Scalar] {
        match self {
            FilterValue::One(v) => std::slice::from_ref(v),
            FilterValue::Many(vs) => vs,
        }
    }

    pub fn single(&self) -> Option<&Scalar> {
        match self {
            FilterValue::One(v) => Some(v),
            FilterValue::Many(vs) if vs.len() == 1 => vs.first(),
            FilterValue::Many(_) => None,
        }
    }
}

/// A predicate over one (dimension, level) coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub dimension: String,

    /// Defaults to the dimension's finest level when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    pub operator: FilterOperator,

    pub value: FilterValue,
}

/// Request to refine rendering of a dimension to a finer level, optionally
/// pinned to a path of ancestor values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillSpec {
    pub dimension: String,
    pub from_level: String,
    pub to_level: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Scalar>,
}

/// Request to raise rendering of a dimension to a coarser level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupSpec {
    pub dimension: String,
    pub level: String,
}

/// Nested axis override block. When present, its axes take precedence over
/// the top-level `rows` / `columns`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<AxisSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<AxisSpec>>,
}

/// The structured query payload as it arrives from the transport.
/// Schema-level shape checking happens upstream; semantic validation
/// happens in the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub cube: String,

    #[serde(default)]
    pub measures: Vec<String>,

    #[serde(default)]
    pub rows: Vec<AxisSpec>,

    #[serde(default)]
    pub columns: Vec<AxisSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<PivotSection>,

    #[serde(default)]
    pub slices: Vec<FilterSpec>,

    #[serde(default)]
    pub dices: Vec<FilterSpec>,

    #[serde(default)]
    pub filters: Vec<FilterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drill: Option<DrillSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollup: Option<RollupSpec>,

    /// Optional terse textual helper; parsed and merged underneath this
    /// payload (the structured fields always win).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mdx: Option<String>,

    /// Emit the flat row list alongside the pivot (defaults to true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_flattened: Option<bool>,
}

impl QueryPayload {
    pub fn new(cube: impl Into<String>, measures: &[&str]) -> Self {
        QueryPayload {
            cube: cube.into(),
            measures: measures.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }
}
