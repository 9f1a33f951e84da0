//! FILENAME: core/cube-engine/src/accumulator.rs
//! Accumulators - per-measure running state for aggregation.
//!
//! One accumulator instance exists per (cell, measure) during a raw scan and
//! per (dimension, level, value, measure) during pre-aggregate
//! materialization. Accumulators are created, fed, finalized, and discarded
//! inside a single calculation; they are never shared.
//!
//! Zero-observation semantics are part of the external contract:
//! SUM/COUNT/AVG/MIN/MAX all finalize to 0 when nothing qualified, and
//! DISTINCT finalizes to the cardinality of the stringified value set.

use crate::definition::{AggregationType, Scalar};
use std::collections::HashSet;

/// Running aggregation state.
/// `add` receives the fact's metric value, absent when the fact carried
/// no value (or an explicit null) for the measure's value field.
pub trait Accumulator {
    fn add(&mut self, value: Option<&Scalar>);
    fn finalize(&self) -> f64;
}

/// Creates the accumulator for an aggregation kind.
pub fn new_accumulator(kind: AggregationType) -> Box<dyn Accumulator> {
    match kind {
        AggregationType::Sum => Box::new(SumAccumulator::default()),
        AggregationType::Count => Box::new(CountAccumulator::default()),
        AggregationType::Avg => Box::new(AvgAccumulator::default()),
        AggregationType::Min => Box::new(MinAccumulator::default()),
        AggregationType::Max => Box::new(MaxAccumulator::default()),
        AggregationType::Distinct => Box::new(DistinctAccumulator::default()),
    }
}

/// SUM: numeric inputs only, non-numeric ignored.
#[derive(Debug, Default)]
struct SumAccumulator {
    total: f64,
}

impl Accumulator for SumAccumulator {
    fn add(&mut self, value: Option<&Scalar>) {
        if let Some(n) = value.and_then(Scalar::as_number) {
            self.total += n;
        }
    }

    fn finalize(&self) -> f64 {
        self.total
    }
}

/// COUNT: increments on any present input, strings included.
#[derive(Debug, Default)]
struct CountAccumulator {
    count: u64,
}

impl Accumulator for CountAccumulator {
    fn add(&mut self, value: Option<&Scalar>) {
        if value.is_some() {
            self.count += 1;
        }
    }

    fn finalize(&self) -> f64 {
        self.count as f64
    }
}

/// AVG: numeric sum over numeric count; 0 when nothing numeric was seen.
#[derive(Debug, Default)]
struct AvgAccumulator {
    sum: f64,
    count: u64,
}

impl Accumulator for AvgAccumulator {
    fn add(&mut self, value: Option<&Scalar>) {
        if let Some(n) = value.and_then(Scalar::as_number) {
            self.sum += n;
            self.count += 1;
        }
    }

    fn finalize(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }
}

/// MIN: smallest numeric seen; 0 when nothing numeric was seen.
#[derive(Debug, Default)]
struct MinAccumulator {
    min: Option<f64>,
}

impl Accumulator for MinAccumulator {
    fn add(&mut self, value: Option<&Scalar>) {
        if let Some(n) = value.and_then(Scalar::as_number) {
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
        }
    }

    fn finalize(&self) -> f64 {
        self.min.unwrap_or(0.0)
    }
}

/// MAX: largest numeric seen; 0 when nothing numeric was seen.
#[derive(Debug, Default)]
struct MaxAccumulator {
    max: Option<f64>,
}

impl Accumulator for MaxAccumulator {
    fn add(&mut self, value: Option<&Scalar>) {
        if let Some(n) = value.and_then(Scalar::as_number) {
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }

    fn finalize(&self) -> f64 {
        self.max.unwrap_or(0.0)
    }
}

/// DISTINCT: cardinality of the stringified non-null inputs.
#[derive(Debug, Default)]
struct DistinctAccumulator {
    seen: HashSet<String>,
}

impl Accumulator for DistinctAccumulator {
    fn add(&mut self, value: Option<&Scalar>) {
        if let Some(v) = value {
            self.seen.insert(v.to_string());
        }
    }

    fn finalize(&self) -> f64 {
        self.seen.len() as f64
    }
}
