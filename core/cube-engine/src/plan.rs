//! FILENAME: core/cube-engine/src/plan.rs
//! Planner - strategy selection between the pre-aggregate fast path and a
//! raw fact scan.
//!
//! The decision table is deliberately small and fully deterministic: the
//! pre-aggregate store can only answer a single-dimension row listing with
//! no predicates and no level rewriting, so anything else scans.

use crate::normalize::NormalizedQuery;
use serde::{Deserialize, Serialize};

/// The two execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStrategy {
    #[serde(rename = "pre-aggregate")]
    PreAggregate,
    #[serde(rename = "raw-scan")]
    RawScan,
}

/// The chosen strategy plus a human-readable justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub strategy: PlanStrategy,
    pub reason: String,
}

/// Pure, reproducible plan selection over the normalized query.
pub fn choose_plan(query: &NormalizedQuery) -> QueryPlan {
    if query.rows.len() == 1
        && query.columns.is_empty()
        && query.filters.is_empty()
        && query.drill.is_none()
        && query.rollup.is_none()
    {
        let axis = &query.rows[0];
        return QueryPlan {
            strategy: PlanStrategy::PreAggregate,
            reason: format!(
                "single row axis ({}.{}) with no filters, drill, or rollup is served from pre-aggregates",
                axis.dimension, axis.level
            ),
        };
    }

    let mut causes = Vec::new();
    if query.rows.len() + query.columns.len() != 1 {
        causes.push(format!(
            "{} row and {} column axes",
            query.rows.len(),
            query.columns.len()
        ));
    } else if query.rows.is_empty() {
        causes.push("the only axis is a column axis".to_string());
    }
    if !query.filters.is_empty() {
        causes.push(format!("{} filter(s)", query.filters.len()));
    }
    if query.drill.is_some() {
        causes.push("a drill".to_string());
    }
    if query.rollup.is_some() {
        causes.push("a rollup".to_string());
    }

    QueryPlan {
        strategy: PlanStrategy::RawScan,
        reason: format!("raw scan required by {}", causes.join(", ")),
    }
}
