//! FILENAME: core/cube-engine/src/execute.rs
//! Executor - runs a chosen plan against a registered cube.
//!
//! Two paths produce the same QueryData shape:
//! - Pre-aggregate: a direct lookup into the store materialized at
//!   registration, rows ordered by the canonical value comparator.
//! - Raw scan: a single streaming pass over the fact rows applying the
//!   filter list and drill path, grouping cells by interned row/column
//!   coordinate tuples, accumulating per-cell state, and finalizing into a
//!   dense per-measure matrix whose headers are ordered by the same
//!   canonical comparator as the fast path.
//!
//! Accumulators are local to one invocation; nothing here mutates the cube.

use crate::accumulator::{new_accumulator, Accumulator};
use crate::definition::{canonical_cmp, FactRow, Scalar};
use crate::error::{EngineError, EngineResult};
use crate::normalize::{NormalizedQuery, ResolvedAxis};
use crate::plan::{PlanStrategy, QueryPlan};
use crate::query::{DrillSpec, FilterOperator, FilterSpec, SortDirection};
use crate::registry::CubeInstance;
use crate::view::{Coordinate, FlatRow, MeasureBlock, PivotData, PivotHeader, QueryData, ALL_KEY};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Runs the plan and assembles the data block of the result document.
pub fn execute_plan(
    cube: &CubeInstance,
    query: &NormalizedQuery,
    plan: &QueryPlan,
) -> EngineResult<QueryData> {
    match plan.strategy {
        PlanStrategy::PreAggregate => run_pre_aggregate(cube, query),
        PlanStrategy::RawScan => run_raw_scan(cube, query),
    }
}

// ============================================================================
// PRE-AGGREGATE PATH
// ============================================================================

fn run_pre_aggregate(cube: &CubeInstance, query: &NormalizedQuery) -> EngineResult<QueryData> {
    let axis = query
        .rows
        .first()
        .ok_or_else(|| EngineError::Internal("pre-aggregate plan without a row axis".to_string()))?;

    let mut entries: Vec<(&Scalar, &HashMap<String, f64>)> = cube
        .pre_aggregates
        .level(&axis.dimension, &axis.level)
        .map(|values| values.iter().collect())
        .unwrap_or_default();
    entries.sort_by(|a, b| canonical_cmp(a.0, b.0));
    if axis.sort == Some(SortDirection::Desc) {
        entries.reverse();
    }

    let rows: Vec<PivotHeader> = entries
        .iter()
        .map(|(value, _)| {
            PivotHeader::from_coordinates(vec![Coordinate {
                dimension: axis.dimension.clone(),
                level: axis.level.clone(),
                value: (*value).clone(),
            }])
        })
        .collect();
    let columns = vec![PivotHeader::all()];

    let mut measures = BTreeMap::new();
    for name in &query.measures {
        let def = cube
            .measure(name)
            .ok_or_else(|| EngineError::UnknownMeasure(name.clone()))?;
        let values: Vec<Vec<f64>> = entries
            .iter()
            .map(|(_, by_measure)| vec![by_measure.get(name).copied().unwrap_or(0.0)])
            .collect();
        measures.insert(
            name.clone(),
            MeasureBlock {
                values,
                label: def.label.clone(),
                format: def.format.clone(),
            },
        );
    }

    let flat = query.include_flattened.then(|| {
        rows.iter()
            .enumerate()
            .map(|(row_idx, header)| FlatRow {
                row: header.key.clone(),
                column: ALL_KEY.to_string(),
                coordinates: header.coordinates.clone(),
                values: query
                    .measures
                    .iter()
                    .map(|name| (name.clone(), measures[name].values[row_idx][0]))
                    .collect(),
            })
            .collect()
    });

    Ok(QueryData {
        pivot: PivotData {
            rows,
            columns,
            measures,
        },
        flat,
    })
}

// ============================================================================
// HEADER INTERNING
// ============================================================================

/// Header store for the scan: a lookup map paired with a list, so every
/// coordinate tuple interns to one stable index that cell keys reference.
/// Display order is computed afterwards by `header_order`.
#[derive(Default)]
struct HeaderSet {
    index: HashMap<String, usize>,
    headers: Vec<PivotHeader>,
}

impl HeaderSet {
    /// Interns a coordinate tuple and returns its header index.
    fn intern(&mut self, coordinates: Vec<Coordinate>) -> usize {
        let key = PivotHeader::key_of(&coordinates);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.headers.len();
        self.index.insert(key, idx);
        self.headers.push(PivotHeader::from_coordinates(coordinates));
        idx
    }
}

// ============================================================================
// RAW-SCAN PATH
// ============================================================================

fn run_raw_scan(cube: &CubeInstance, query: &NormalizedQuery) -> EngineResult<QueryData> {
    let mut row_set = HeaderSet::default();
    let mut col_set = HeaderSet::default();
    let mut cells: HashMap<(usize, usize), Vec<Box<dyn Accumulator>>> = HashMap::new();

    let measure_defs: Vec<_> = query
        .measures
        .iter()
        .map(|name| {
            cube.measure(name)
                .ok_or_else(|| EngineError::UnknownMeasure(name.clone()))
        })
        .collect::<EngineResult<_>>()?;

    for fact in &cube.definition.facts {
        if !passes_filters(fact, &query.filters, cube) {
            continue;
        }
        if !passes_drill_path(fact, query.drill.as_ref(), cube) {
            continue;
        }

        let row_idx = row_set.intern(coordinates_for(fact, &query.rows));
        let col_idx = col_set.intern(coordinates_for(fact, &query.columns));

        let accumulators = cells.entry((row_idx, col_idx)).or_insert_with(|| {
            measure_defs
                .iter()
                .map(|m| new_accumulator(m.aggregation))
                .collect()
        });
        for (acc, measure) in accumulators.iter_mut().zip(&measure_defs) {
            acc.add(fact.metric(&measure.value_field));
        }
    }

    // Headers order by the canonical comparator (honoring any explicit axis
    // direction), matching the pre-aggregate path's default.
    let row_order = header_order(&row_set.headers, &query.rows);
    let col_order = header_order(&col_set.headers, &query.columns);

    let rows: Vec<PivotHeader> = row_order
        .iter()
        .map(|&i| row_set.headers[i].clone())
        .collect();
    let columns: Vec<PivotHeader> = col_order
        .iter()
        .map(|&i| col_set.headers[i].clone())
        .collect();

    let mut measures = BTreeMap::new();
    for (m_idx, name) in query.measures.iter().enumerate() {
        let def = &measure_defs[m_idx];
        let values: Vec<Vec<f64>> = row_order
            .iter()
            .map(|&r| {
                col_order
                    .iter()
                    .map(|&c| {
                        cells
                            .get(&(r, c))
                            .map(|accs| accs[m_idx].finalize())
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();
        measures.insert(
            name.clone(),
            MeasureBlock {
                values,
                label: def.label.clone(),
                format: def.format.clone(),
            },
        );
    }

    let flat = query.include_flattened.then(|| {
        let mut out = Vec::new();
        for (new_r, &r) in row_order.iter().enumerate() {
            for (new_c, &c) in col_order.iter().enumerate() {
                let accs = match cells.get(&(r, c)) {
                    Some(accs) => accs,
                    None => continue,
                };
                let mut coordinates = rows[new_r].coordinates.clone();
                coordinates.extend(columns[new_c].coordinates.clone());
                out.push(FlatRow {
                    row: rows[new_r].key.clone(),
                    column: columns[new_c].key.clone(),
                    coordinates,
                    values: query
                        .measures
                        .iter()
                        .zip(accs)
                        .map(|(name, acc)| (name.clone(), acc.finalize()))
                        .collect(),
                });
            }
        }
        out
    });

    Ok(QueryData {
        pivot: PivotData {
            rows,
            columns,
            measures,
        },
        flat,
    })
}

/// Coordinate tuple for one fact along an axis list. A missing value at a
/// level maps to the "All" sentinel rather than dropping the fact.
fn coordinates_for(fact: &FactRow, axes: &[ResolvedAxis]) -> Vec<Coordinate> {
    axes.iter()
        .map(|axis| Coordinate {
            dimension: axis.dimension.clone(),
            level: axis.level.clone(),
            value: fact
                .value_at(&axis.dimension, &axis.level)
                .cloned()
                .unwrap_or_else(Scalar::all),
        })
        .collect()
}

/// Computes the header ordering: coordinate values compare under the
/// canonical comparator, ascending unless the axis asked for a descending
/// sort. Both executor paths therefore agree on default row order.
fn header_order(headers: &[PivotHeader], axes: &[ResolvedAxis]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..headers.len()).collect();
    order.sort_by(|&a, &b| {
        for (pos, axis) in axes.iter().enumerate() {
            let va = &headers[a].coordinates[pos].value;
            let vb = &headers[b].coordinates[pos].value;
            let mut ord = canonical_cmp(va, vb);
            if axis.sort == Some(SortDirection::Desc) {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    order
}

// ============================================================================
// PREDICATES
// ============================================================================

/// Applies every filter in order; all must pass.
fn passes_filters(
    fact: &FactRow,
    filters: &[FilterSpec],
    cube: &CubeInstance,
) -> bool {
    filters.iter().all(|f| passes_filter(fact, f, cube))
}

fn passes_filter(fact: &FactRow, filter: &FilterSpec, cube: &CubeInstance) -> bool {
    // The normalizer resolves levels, but fall back to the finest level so a
    // hand-built spec behaves the same way.
    let level = match &filter.level {
        Some(level) => level.clone(),
        None => match cube.dimension(&filter.dimension) {
            Some(dim) => dim.finest_level().to_string(),
            None => return false,
        },
    };
    let value = fact.value_at(&filter.dimension, &level);

    match filter.operator {
        FilterOperator::Eq => match (value, filter.value.single()) {
            (Some(v), Some(target)) => v == target,
            _ => false,
        },
        FilterOperator::Neq => match (value, filter.value.single()) {
            (Some(v), Some(target)) => v != target,
            (None, Some(_)) => true,
            _ => false,
        },
        FilterOperator::In => match value {
            Some(v) => filter.value.as_list().contains(v),
            None => false,
        },
        FilterOperator::Nin => match value {
            Some(v) => !filter.value.as_list().contains(v),
            None => true,
        },
        FilterOperator::Gt => numeric_cmp(value, filter).map_or(false, Ordering::is_gt),
        FilterOperator::Gte => numeric_cmp(value, filter).map_or(false, Ordering::is_ge),
        FilterOperator::Lt => numeric_cmp(value, filter).map_or(false, Ordering::is_lt),
        FilterOperator::Lte => numeric_cmp(value, filter).map_or(false, Ordering::is_le),
        FilterOperator::Between => {
            let list = filter.value.as_list();
            let (lo, hi) = match (list.first(), list.get(1)) {
                (Some(lo), Some(hi)) => (lo.as_number(), hi.as_number()),
                _ => (None, None),
            };
            match (value.and_then(Scalar::as_number), lo, hi) {
                (Some(v), Some(lo), Some(hi)) => v >= lo && v <= hi,
                _ => false,
            }
        }
    }
}

/// Numeric comparison of the fact value against a single-valued filter.
/// None when either side is non-numeric (the predicate then fails).
fn numeric_cmp(value: Option<&Scalar>, filter: &FilterSpec) -> Option<Ordering> {
    let left = value.and_then(Scalar::as_number)?;
    let right = filter.value.single().and_then(Scalar::as_number)?;
    left.partial_cmp(&right)
}

/// Drill-path matching: the path binds consecutive hierarchy levels starting
/// at the coarser end of the drilled range. A fact missing a value at any
/// bound level fails.
fn passes_drill_path(
    fact: &FactRow,
    drill: Option<&DrillSpec>,
    cube: &CubeInstance,
) -> bool {
    let drill = match drill {
        Some(d) if !d.path.is_empty() => d,
        _ => return true,
    };
    let dim = match cube.dimension(&drill.dimension) {
        Some(d) => d,
        None => return false,
    };
    let (from, to) = match (
        dim.level_index(&drill.from_level),
        dim.level_index(&drill.to_level),
    ) {
        (Some(f), Some(t)) => (f, t),
        _ => return false,
    };

    let start = from.min(to);
    let bound = drill.path.len().min(from.abs_diff(to) + 1);

    for (offset, expected) in drill.path.iter().take(bound).enumerate() {
        let level = &dim.hierarchy[start + offset];
        let actual = match fact.value_at(&dim.name, level) {
            Some(v) => v,
            None => return false,
        };
        let matches = match (actual.as_number(), expected.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => actual.to_string() == expected.to_string(),
        };
        if !matches {
            return false;
        }
    }
    true
}
