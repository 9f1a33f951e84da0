//! FILENAME: core/cube-engine/src/normalize.rs
//! Query Normalizer - payload resolution against a registered cube.
//!
//! Normalization happens at a single merge site: the optional textual helper
//! is parsed into a partial query, the structured payload overrides it
//! field by field (never the other way around), axes are resolved to
//! concrete levels with drill/rollup rewriting applied, and the filter
//! surface (slices, dices, filters) collapses into one ordered list.
//!
//! The output is serializable on purpose: the cache fingerprint is derived
//! from the normalized query, so two payload spellings of the same question
//! normalize to the same bytes.

use crate::definition::Scalar;
use crate::error::{EngineError, EngineResult};
use crate::query::{
    AxisSpec, DrillSpec, FilterOperator, FilterSpec, FilterValue, QueryPayload, RollupSpec,
    SortDirection,
};
use crate::registry::CubeInstance;
use mdx_parser::{ComparisonOp, PartialQuery, ScalarLit};
use serde::{Deserialize, Serialize};

// ============================================================================
// NORMALIZED FORMS
// ============================================================================

/// An axis with its level fully resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAxis {
    pub dimension: String,
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDirection>,
}

/// The fully resolved question the executor answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQuery {
    pub cube: String,
    pub measures: Vec<String>,
    pub rows: Vec<ResolvedAxis>,
    pub columns: Vec<ResolvedAxis>,
    /// slices, then dices, then filters, original order preserved.
    pub filters: Vec<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drill: Option<DrillSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollup: Option<RollupSpec>,
    pub include_flattened: bool,
}

// ============================================================================
// HELPER MERGE
// ============================================================================

fn scalar_from_lit(lit: &ScalarLit) -> Scalar {
    match lit {
        ScalarLit::Number(n) => Scalar::Number(*n),
        ScalarLit::Text(s) => Scalar::Text(s.clone()),
    }
}

fn axis_from_ref(axis: &mdx_parser::AxisRef) -> AxisSpec {
    AxisSpec {
        dimension: axis.dimension.clone(),
        level: axis.level.clone(),
        sort: None,
        alias: None,
    }
}

fn filter_from_clause(clause: &mdx_parser::FilterClause) -> FilterSpec {
    let operator = match clause.operator {
        ComparisonOp::Eq => FilterOperator::Eq,
        ComparisonOp::Neq => FilterOperator::Neq,
        ComparisonOp::Gt => FilterOperator::Gt,
        ComparisonOp::Gte => FilterOperator::Gte,
        ComparisonOp::Lt => FilterOperator::Lt,
        ComparisonOp::Lte => FilterOperator::Lte,
        ComparisonOp::In => FilterOperator::In,
    };
    let value = if clause.values.len() == 1 && operator != FilterOperator::In {
        FilterValue::One(scalar_from_lit(&clause.values[0]))
    } else {
        FilterValue::Many(clause.values.iter().map(scalar_from_lit).collect())
    };
    FilterSpec {
        dimension: clause.dimension.clone(),
        level: clause.level.clone(),
        operator,
        value,
    }
}

/// Parses the payload's `mdx` helper string, if any.
fn parse_helper(payload: &QueryPayload) -> EngineResult<PartialQuery> {
    match payload.mdx.as_deref() {
        Some(text) if !text.trim().is_empty() => {
            mdx_parser::parse(text).map_err(|e| EngineError::HelperSyntax(e.message))
        }
        _ => Ok(PartialQuery::default()),
    }
}

/// Field-by-field merge: the structured side wins whenever it says anything.
fn merge_field<T>(structured: Vec<T>, partial: Vec<T>) -> Vec<T> {
    if structured.is_empty() {
        partial
    } else {
        structured
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Resolves a payload into the normalized query the planner and executor
/// consume. All semantic validation lives here; the executor can assume a
/// normalized query is internally consistent with its cube.
pub fn normalize(cube: &CubeInstance, payload: &QueryPayload) -> EngineResult<NormalizedQuery> {
    let partial = parse_helper(payload)?;

    // Structured payload wins per field; the helper only fills gaps.
    let measures = merge_field(
        payload.measures.clone(),
        partial.measures.clone(),
    );
    let drill = payload
        .drill
        .clone()
        .or_else(|| partial.drill.as_ref().map(|d| DrillSpec {
            dimension: d.dimension.clone(),
            from_level: d.from_level.clone(),
            to_level: d.to_level.clone(),
            path: d.path.iter().map(scalar_from_lit).collect(),
        }));
    let rollup = payload
        .rollup
        .clone()
        .or_else(|| partial.rollup.as_ref().map(|r| RollupSpec {
            dimension: r.dimension.clone(),
            level: r.level.clone(),
        }));

    // Axis precedence: pivot block > top-level > helper.
    let pivot_rows = payload.pivot.as_ref().and_then(|p| p.rows.clone());
    let pivot_columns = payload.pivot.as_ref().and_then(|p| p.columns.clone());
    let mut row_specs = match pivot_rows {
        Some(rows) => rows,
        None => merge_field(
            payload.rows.clone(),
            partial.rows.iter().map(axis_from_ref).collect(),
        ),
    };
    let column_specs = match pivot_columns {
        Some(columns) => columns,
        None => merge_field(
            payload.columns.clone(),
            partial.columns.iter().map(axis_from_ref).collect(),
        ),
    };

    // Default axis: the first dimension at its coarsest level.
    if row_specs.is_empty() && column_specs.is_empty() {
        let first = &cube.definition.dimensions[0];
        row_specs.push(AxisSpec::at_level(
            first.name.clone(),
            first.coarsest_level().to_string(),
        ));
    }

    // Drill/rollup references are checked before they can rewrite axes.
    if let Some(d) = &drill {
        validate_drill(cube, d)?;
    }
    if let Some(r) = &rollup {
        validate_rollup(cube, r)?;
    }

    let rows = row_specs
        .iter()
        .map(|a| resolve_axis(cube, a, drill.as_ref(), rollup.as_ref()))
        .collect::<EngineResult<Vec<_>>>()?;
    let columns = column_specs
        .iter()
        .map(|a| resolve_axis(cube, a, drill.as_ref(), rollup.as_ref()))
        .collect::<EngineResult<Vec<_>>>()?;

    // Predicate surface: slices, dices, filters, in that order.
    let slices = merge_field(
        payload.slices.clone(),
        partial.slices.iter().map(filter_from_clause).collect(),
    );
    let dices = merge_field(
        payload.dices.clone(),
        partial.dices.iter().map(filter_from_clause).collect(),
    );
    let filter_specs = merge_field(
        payload.filters.clone(),
        partial.filters.iter().map(filter_from_clause).collect(),
    );
    let mut filters = Vec::with_capacity(slices.len() + dices.len() + filter_specs.len());
    for spec in slices.into_iter().chain(dices).chain(filter_specs) {
        filters.push(resolve_filter(cube, spec)?);
    }

    if measures.is_empty() {
        return Err(EngineError::InvalidQuery(
            "query requires at least one measure".to_string(),
        ));
    }
    for measure in &measures {
        if cube.measure(measure).is_none() {
            return Err(EngineError::UnknownMeasure(measure.clone()));
        }
    }

    Ok(NormalizedQuery {
        cube: cube.name().to_string(),
        measures,
        rows,
        columns,
        filters,
        drill,
        rollup,
        include_flattened: payload.include_flattened.unwrap_or(true),
    })
}

/// Resolves one axis: default level, then rollup rewrite, then drill rewrite.
fn resolve_axis(
    cube: &CubeInstance,
    spec: &AxisSpec,
    drill: Option<&DrillSpec>,
    rollup: Option<&RollupSpec>,
) -> EngineResult<ResolvedAxis> {
    let dim = cube
        .dimension(&spec.dimension)
        .ok_or_else(|| EngineError::UnknownDimension(spec.dimension.clone()))?;

    let mut level = match &spec.level {
        Some(level) => level.clone(),
        None => dim.finest_level().to_string(),
    };
    let level_idx = dim
        .level_index(&level)
        .ok_or_else(|| EngineError::UnknownLevel {
            dimension: dim.name.clone(),
            level: level.clone(),
        })?;

    // A rollup raises any finer axis on its dimension to the rollup level.
    if let Some(r) = rollup {
        if r.dimension == dim.name {
            if let Some(rollup_idx) = dim.level_index(&r.level) {
                if level_idx > rollup_idx {
                    level = r.level.clone();
                }
            }
        }
    }

    // A drill pins the axis to its target level outright.
    if let Some(d) = drill {
        if d.dimension == dim.name {
            level = d.to_level.clone();
        }
    }

    Ok(ResolvedAxis {
        dimension: dim.name.clone(),
        level,
        sort: spec.sort,
    })
}

fn validate_drill(cube: &CubeInstance, drill: &DrillSpec) -> EngineResult<()> {
    let dim = cube
        .dimension(&drill.dimension)
        .ok_or_else(|| EngineError::InvalidDrill(format!("unknown dimension '{}'", drill.dimension)))?;
    let from = dim.level_index(&drill.from_level).ok_or_else(|| {
        EngineError::InvalidDrill(format!(
            "unknown level '{}' on dimension '{}'",
            drill.from_level, dim.name
        ))
    })?;
    let to = dim.level_index(&drill.to_level).ok_or_else(|| {
        EngineError::InvalidDrill(format!(
            "unknown level '{}' on dimension '{}'",
            drill.to_level, dim.name
        ))
    })?;
    let range = from.abs_diff(to);
    if drill.path.len() > range + 1 {
        return Err(EngineError::InvalidDrill(format!(
            "path of {} values exceeds the {}..{} level range",
            drill.path.len(),
            drill.from_level,
            drill.to_level
        )));
    }
    Ok(())
}

fn validate_rollup(cube: &CubeInstance, rollup: &RollupSpec) -> EngineResult<()> {
    let dim = cube.dimension(&rollup.dimension).ok_or_else(|| {
        EngineError::InvalidRollup(format!("unknown dimension '{}'", rollup.dimension))
    })?;
    if dim.level_index(&rollup.level).is_none() {
        return Err(EngineError::InvalidRollup(format!(
            "unknown level '{}' on dimension '{}'",
            rollup.level, dim.name
        )));
    }
    Ok(())
}

/// Resolves a filter's level and checks operator arity.
fn resolve_filter(cube: &CubeInstance, spec: FilterSpec) -> EngineResult<FilterSpec> {
    let dim = cube
        .dimension(&spec.dimension)
        .ok_or_else(|| EngineError::UnknownDimension(spec.dimension.clone()))?;

    let level = match &spec.level {
        Some(level) => {
            if dim.level_index(level).is_none() {
                return Err(EngineError::UnknownLevel {
                    dimension: dim.name.clone(),
                    level: level.clone(),
                });
            }
            level.clone()
        }
        None => dim.finest_level().to_string(),
    };

    match spec.operator {
        FilterOperator::Eq | FilterOperator::Neq => {
            if spec.value.single().is_none() {
                return Err(EngineError::InvalidFilter(format!(
                    "operator '{:?}' takes a single value",
                    spec.operator
                )));
            }
        }
        FilterOperator::In | FilterOperator::Nin => {
            if spec.value.as_list().is_empty() {
                return Err(EngineError::InvalidFilter(
                    "in/nin require a non-empty value list".to_string(),
                ));
            }
        }
        FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte => {
            let numeric = spec.value.single().and_then(Scalar::as_number);
            if numeric.is_none() {
                return Err(EngineError::InvalidFilter(format!(
                    "operator '{:?}' requires a numeric value",
                    spec.operator
                )));
            }
        }
        FilterOperator::Between => {
            let list = spec.value.as_list();
            if list.len() != 2 || list.iter().any(|v| v.as_number().is_none()) {
                return Err(EngineError::InvalidFilter(
                    "between requires a two-element numeric pair".to_string(),
                ));
            }
        }
    }

    Ok(FilterSpec {
        dimension: dim.name.clone(),
        level: Some(level),
        operator: spec.operator,
        value: spec.value,
    })
}
