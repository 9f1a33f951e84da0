//! FILENAME: core/cube-engine/src/registry.rs
//! Cube Registry - registered instances and per-level pre-aggregates.
//!
//! Registration is the only write: the registry validates the definition,
//! builds name->index lookup tables, and materializes one finalized
//! aggregate per (dimension, level, value, measure) observed in the facts.
//! Facts missing a level fold into that level's "All" bucket so the fast
//! path returns the same totals as a raw scan. Instances are immutable
//! afterwards and shared behind `Arc` so query execution never copies a cube.

use crate::accumulator::{new_accumulator, Accumulator};
use crate::definition::{CubeDefinition, DimensionDef, MeasureDef, Scalar};
use crate::error::{EngineError, EngineResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// PRE-AGGREGATE STORE
// ============================================================================

/// Finalized measure values keyed by (dimension, level) and then by the
/// distinct value observed at that level.
#[derive(Debug, Default)]
pub struct PreAggregateStore {
    groups: HashMap<(String, String), HashMap<Scalar, HashMap<String, f64>>>,
}

impl PreAggregateStore {
    /// The value -> {measure -> number} map for one (dimension, level).
    pub fn level(&self, dimension: &str, level: &str) -> Option<&HashMap<Scalar, HashMap<String, f64>>> {
        self.groups.get(&(dimension.to_string(), level.to_string()))
    }

    /// Number of (dimension, level) groups materialized.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Builds the pre-aggregate store for a validated definition.
fn materialize(def: &CubeDefinition) -> PreAggregateStore {
    // Accumulators keyed by (dim, level) -> value -> one accumulator per measure,
    // in measure declaration order.
    let mut building: HashMap<(String, String), HashMap<Scalar, Vec<Box<dyn Accumulator>>>> =
        HashMap::new();

    for fact in &def.facts {
        for dim in &def.dimensions {
            for level in &dim.hierarchy {
                // A fact without a value at this level lands in the "All"
                // bucket, the same coordinate the raw scan gives it.
                let value = fact
                    .value_at(&dim.name, level)
                    .cloned()
                    .unwrap_or_else(Scalar::all);
                let slot = building
                    .entry((dim.name.clone(), level.clone()))
                    .or_default()
                    .entry(value)
                    .or_insert_with(|| {
                        def.measures
                            .iter()
                            .map(|m| new_accumulator(m.aggregation))
                            .collect()
                    });
                for (acc, measure) in slot.iter_mut().zip(&def.measures) {
                    acc.add(fact.metric(&measure.value_field));
                }
            }
        }
    }

    let mut groups = HashMap::new();
    for (key, values) in building {
        let finalized: HashMap<Scalar, HashMap<String, f64>> = values
            .into_iter()
            .map(|(value, accs)| {
                let by_measure = def
                    .measures
                    .iter()
                    .zip(&accs)
                    .map(|(m, acc)| (m.name.clone(), acc.finalize()))
                    .collect();
                (value, by_measure)
            })
            .collect();
        groups.insert(key, finalized);
    }

    PreAggregateStore { groups }
}

// ============================================================================
// CUBE INSTANCE
// ============================================================================

/// An immutable registered cube: the definition plus lookup tables and the
/// finalized pre-aggregate store.
#[derive(Debug)]
pub struct CubeInstance {
    pub definition: CubeDefinition,
    dimension_index: HashMap<String, usize>,
    measure_index: HashMap<String, usize>,
    pub pre_aggregates: PreAggregateStore,
}

impl CubeInstance {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionDef> {
        self.dimension_index
            .get(name)
            .map(|&i| &self.definition.dimensions[i])
    }

    pub fn measure(&self, name: &str) -> Option<&MeasureDef> {
        self.measure_index
            .get(name)
            .map(|&i| &self.definition.measures[i])
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Owns every registered cube. Reads are concurrent; registration is the
/// caller's exclusive section (the engine wraps the registry in a RwLock).
#[derive(Debug, Default)]
pub struct CubeRegistry {
    cubes: HashMap<String, Arc<CubeInstance>>,
}

impl CubeRegistry {
    pub fn new() -> Self {
        CubeRegistry {
            cubes: HashMap::new(),
        }
    }

    /// Validates and registers a cube, materializing its pre-aggregates.
    pub fn register(&mut self, def: CubeDefinition) -> EngineResult<Arc<CubeInstance>> {
        if self.cubes.contains_key(&def.name) {
            return Err(EngineError::DuplicateCube(def.name));
        }
        validate(&def)?;

        let dimension_index = def
            .dimensions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        let measure_index = def
            .measures
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        let pre_aggregates = materialize(&def);

        let instance = Arc::new(CubeInstance {
            definition: def,
            dimension_index,
            measure_index,
            pre_aggregates,
        });
        self.cubes
            .insert(instance.name().to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<CubeInstance>> {
        self.cubes
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::CubeNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cubes.contains_key(name)
    }

    /// Registered cube names, sorted for a deterministic listing.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cubes.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Structural validation run at registration time.
fn validate(def: &CubeDefinition) -> EngineResult<()> {
    if def.dimensions.is_empty() {
        return Err(EngineError::EmptyDimensions(def.name.clone()));
    }

    let mut dim_names = HashSet::new();
    for dim in &def.dimensions {
        if !dim_names.insert(dim.name.as_str()) {
            return Err(EngineError::InvalidDefinition(format!(
                "duplicate dimension name '{}'",
                dim.name
            )));
        }
        if dim.hierarchy.is_empty() {
            return Err(EngineError::InvalidDefinition(format!(
                "dimension '{}' has an empty hierarchy",
                dim.name
            )));
        }
        let mut levels = HashSet::new();
        for level in &dim.hierarchy {
            if !levels.insert(level.as_str()) {
                return Err(EngineError::InvalidDefinition(format!(
                    "dimension '{}' repeats level '{}'",
                    dim.name, level
                )));
            }
        }
    }

    let mut measure_names = HashSet::new();
    for measure in &def.measures {
        if !measure_names.insert(measure.name.as_str()) {
            return Err(EngineError::InvalidDefinition(format!(
                "duplicate measure name '{}'",
                measure.name
            )));
        }
    }

    // A measure whose value field appears in no fact at all can never
    // aggregate to anything; reject it while the facts are at hand.
    if !def.facts.is_empty() {
        for measure in &def.measures {
            let observed = def
                .facts
                .iter()
                .any(|f| f.metrics.contains_key(&measure.value_field));
            if !observed {
                return Err(EngineError::InvalidDefinition(format!(
                    "measure '{}' references value field '{}' unknown to every fact",
                    measure.name, measure.value_field
                )));
            }
        }
    }

    Ok(())
}
