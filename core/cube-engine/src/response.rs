//! FILENAME: core/cube-engine/src/response.rs
//! Response Assembler - decorates executor output into the result document.
//!
//! The document has two halves: `data` (the pivot and flat rows, produced by
//! the executor and cached verbatim) and `metadata` (breadcrumbs,
//! visualization suggestions, cache status, planner verdict, and the cube's
//! available measures). Only the cache block is re-stamped on a cache hit;
//! everything else travels with the cached payload.

use crate::cache::CacheStatsSnapshot;
use crate::definition::{AggregationType, Scalar};
use crate::normalize::NormalizedQuery;
use crate::plan::QueryPlan;
use crate::registry::CubeInstance;
use crate::view::QueryData;
use serde::{Deserialize, Serialize};

/// One ancestor pinned by a drill path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub dimension: String,
    pub level: String,
    pub value: Scalar,
}

/// Cache status stamped onto every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub hit: bool,
    pub key: String,
    /// Milliseconds of TTL left; null when the result was computed fresh.
    pub ttl_remaining_ms: Option<u64>,
    pub stats: CacheStatsSnapshot,
}

/// Catalog entry for one measure of the queried cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureDescriptor {
    pub name: String,
    pub aggregation: AggregationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// The `metadata` half of a result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub cube: String,
    /// Measures the query asked for, in request order.
    pub measures: Vec<String>,
    /// Every measure the cube offers.
    pub available_measures: Vec<MeasureDescriptor>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub cache: CacheInfo,
    pub planner: QueryPlan,
    pub suggestions: Vec<String>,
}

/// The complete response: pivoted data plus decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub data: QueryData,
    pub metadata: QueryMetadata,
}

/// Builds the result document around finished executor output. The cache
/// block receives a fresh-miss stamp here; the engine overwrites it when the
/// document is served from cache.
pub fn assemble(
    cube: &CubeInstance,
    query: &NormalizedQuery,
    plan: QueryPlan,
    data: QueryData,
    cache_key: String,
    stats: CacheStatsSnapshot,
) -> ResultDocument {
    let available_measures = cube
        .definition
        .measures
        .iter()
        .map(|m| MeasureDescriptor {
            name: m.name.clone(),
            aggregation: m.aggregation,
            label: m.label.clone(),
            format: m.format.clone(),
        })
        .collect();

    ResultDocument {
        data,
        metadata: QueryMetadata {
            cube: cube.name().to_string(),
            measures: query.measures.clone(),
            available_measures,
            breadcrumbs: breadcrumbs(cube, query),
            cache: CacheInfo {
                hit: false,
                key: cache_key,
                ttl_remaining_ms: None,
                stats,
            },
            planner: plan,
            suggestions: suggestions(query),
        },
    }
}

/// Breadcrumbs pair each drill-path element with consecutive levels of the
/// drilled range, starting at the coarser end.
fn breadcrumbs(cube: &CubeInstance, query: &NormalizedQuery) -> Vec<Breadcrumb> {
    let drill = match &query.drill {
        Some(d) if !d.path.is_empty() => d,
        _ => return Vec::new(),
    };
    let dim = match cube.dimension(&drill.dimension) {
        Some(d) => d,
        None => return Vec::new(),
    };
    let (from, to) = match (
        dim.level_index(&drill.from_level),
        dim.level_index(&drill.to_level),
    ) {
        (Some(f), Some(t)) => (f, t),
        _ => return Vec::new(),
    };

    let start = from.min(to);
    let bound = drill.path.len().min(from.abs_diff(to) + 1);

    drill
        .path
        .iter()
        .take(bound)
        .enumerate()
        .map(|(offset, value)| Breadcrumb {
            dimension: dim.name.clone(),
            level: dim.hierarchy[start + offset].clone(),
            value: value.clone(),
        })
        .collect()
}

/// Visualization suggestions from axis cardinality and measure count.
fn suggestions(query: &NormalizedQuery) -> Vec<String> {
    let rows = query.rows.len();
    let columns = query.columns.len();

    let picks: &[&str] = match (rows, columns) {
        (r, c) if r >= 1 && c >= 1 => &["heatmap", "stacked-bar"],
        (1, 0) => &["column", "line"],
        (r, 0) if r > 1 => &["matrix", "line"],
        (0, 1) => &["column", "line"],
        (0, c) if c > 1 => &["matrix", "line"],
        _ => {
            if query.measures.len() == 1 {
                &["big-number"]
            } else {
                &["multi-stat"]
            }
        }
    };
    picks.iter().map(|s| s.to_string()).collect()
}
