//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for cube-engine integration tests.

use cube_engine::{
    AggregationType, CacheConfig, CubeDefinition, DimensionDef, EngineConfig, FactRow, MeasureDef,
    OlapEngine, Scalar,
};
use std::collections::HashMap;

/// Test harness owning an engine with the sample cube registered.
pub struct TestHarness {
    pub engine: OlapEngine,
}

impl TestHarness {
    /// Create a harness with default cache settings and the sales cube.
    pub fn new() -> Self {
        let engine = OlapEngine::new();
        engine
            .register_cube(SalesFixture::definition())
            .expect("sales cube registers");
        TestHarness { engine }
    }

    /// Create a harness with explicit cache sizing.
    pub fn with_cache(max: usize, ttl_ms: u64) -> Self {
        let engine = OlapEngine::with_config(EngineConfig {
            cache: CacheConfig { max, ttl_ms },
        });
        engine
            .register_cube(SalesFixture::definition())
            .expect("sales cube registers");
        TestHarness { engine }
    }

    /// Create a harness with an empty engine (no cubes).
    pub fn empty() -> Self {
        TestHarness {
            engine: OlapEngine::new(),
        }
    }
}

/// The sample cube: time (year, quarter, month), geography (region, country,
/// state), product (category, item); revenue and units as SUM measures;
/// ten seed facts spanning 2023 Q1-Q4 and 2024 Q1-Q4.
pub struct SalesFixture;

impl SalesFixture {
    pub fn definition() -> CubeDefinition {
        CubeDefinition {
            name: "sales".to_string(),
            label: Some("Sales".to_string()),
            dimensions: vec![
                dimension("time", &["year", "quarter", "month"]),
                dimension("geography", &["region", "country", "state"]),
                dimension("product", &["category", "item"]),
            ],
            measures: vec![
                MeasureDef {
                    name: "revenue".to_string(),
                    value_field: "revenue".to_string(),
                    aggregation: AggregationType::Sum,
                    label: Some("Revenue".to_string()),
                    format: Some("#,##0".to_string()),
                },
                MeasureDef {
                    name: "units".to_string(),
                    value_field: "units".to_string(),
                    aggregation: AggregationType::Sum,
                    label: Some("Units Sold".to_string()),
                    format: None,
                },
            ],
            facts: Self::facts(),
        }
    }

    /// The ten seed facts.
    ///
    /// 2023 revenue by quarter: Q1 2100, Q2 2700, Q3 2000, Q4 1400.
    /// 2024 revenue by quarter: Q1 1300, Q2 800, Q3 1700, Q4 900.
    /// North America revenue: 3500 in 2023, 1300 in 2024.
    pub fn facts() -> Vec<FactRow> {
        let rows = [
            (2023.0, "Q1", "Jan", "North America", "USA", "California", "Electronics", "Laptop", 1200.0, 4.0),
            (2023.0, "Q1", "Feb", "Europe", "Germany", "Bavaria", "Electronics", "Phone", 900.0, 2.0),
            (2023.0, "Q2", "Apr", "North America", "USA", "Texas", "Furniture", "Desk", 900.0, 5.0),
            (2023.0, "Q2", "May", "Europe", "France", "Provence", "Electronics", "Laptop", 1800.0, 3.0),
            (2023.0, "Q3", "Jul", "Europe", "Germany", "Berlin", "Furniture", "Chair", 2000.0, 6.0),
            (2023.0, "Q4", "Oct", "North America", "Canada", "Ontario", "Electronics", "Phone", 1400.0, 4.0),
            (2024.0, "Q1", "Feb", "North America", "USA", "California", "Electronics", "Laptop", 1300.0, 3.0),
            (2024.0, "Q2", "May", "Europe", "France", "Provence", "Furniture", "Desk", 800.0, 2.0),
            (2024.0, "Q3", "Aug", "Europe", "Germany", "Bavaria", "Electronics", "Phone", 1700.0, 4.0),
            (2024.0, "Q4", "Nov", "Europe", "Germany", "Berlin", "Furniture", "Chair", 900.0, 2.0),
        ];

        rows.iter()
            .map(
                |&(year, quarter, month, region, country, state, category, item, revenue, units)| {
                    sales_fact(
                        year, quarter, month, region, country, state, category, item, revenue,
                        units,
                    )
                },
            )
            .collect()
    }
}

/// Builds a dimension definition from a name and level names.
pub fn dimension(name: &str, levels: &[&str]) -> DimensionDef {
    DimensionDef {
        name: name.to_string(),
        label: None,
        hierarchy: levels.iter().map(|l| l.to_string()).collect(),
    }
}

/// Builds one fully-populated sales fact.
#[allow(clippy::too_many_arguments)]
fn sales_fact(
    year: f64,
    quarter: &str,
    month: &str,
    region: &str,
    country: &str,
    state: &str,
    category: &str,
    item: &str,
    revenue: f64,
    units: f64,
) -> FactRow {
    let mut dimensions = HashMap::new();
    dimensions.insert(
        "time".to_string(),
        levels(&[
            ("year", Scalar::Number(year)),
            ("quarter", Scalar::text(quarter)),
            ("month", Scalar::text(month)),
        ]),
    );
    dimensions.insert(
        "geography".to_string(),
        levels(&[
            ("region", Scalar::text(region)),
            ("country", Scalar::text(country)),
            ("state", Scalar::text(state)),
        ]),
    );
    dimensions.insert(
        "product".to_string(),
        levels(&[
            ("category", Scalar::text(category)),
            ("item", Scalar::text(item)),
        ]),
    );

    let mut metrics = HashMap::new();
    metrics.insert("revenue".to_string(), Some(Scalar::Number(revenue)));
    metrics.insert("units".to_string(), Some(Scalar::Number(units)));

    FactRow {
        dimensions,
        metrics,
    }
}

fn levels(pairs: &[(&str, Scalar)]) -> HashMap<String, Scalar> {
    pairs
        .iter()
        .map(|(level, value)| (level.to_string(), value.clone()))
        .collect()
}
