//! FILENAME: tests/test_query.rs
//! Integration tests for query execution: axes, filters, drill, rollup,
//! planner routing, and the assembled result document.

mod common;

use common::{dimension, TestHarness};
use cube_engine::{
    AggregationType, AxisSpec, CubeDefinition, DrillSpec, EngineError, FactRow, FilterOperator,
    FilterSpec, FilterValue, MeasureDef, PivotSection, PlanStrategy, QueryPayload, ResultDocument,
    RollupSpec, Scalar, SortDirection,
};
use std::collections::HashMap;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn row_labels(doc: &ResultDocument) -> Vec<&str> {
    doc.data
        .pivot
        .rows
        .iter()
        .map(|h| h.label.as_str())
        .collect()
}

fn measure_values<'a>(doc: &'a ResultDocument, measure: &str) -> &'a Vec<Vec<f64>> {
    &doc.data.pivot.measures[measure].values
}

fn eq_filter(dimension: &str, level: &str, value: Scalar) -> FilterSpec {
    FilterSpec {
        dimension: dimension.to_string(),
        level: Some(level.to_string()),
        operator: FilterOperator::Eq,
        value: FilterValue::One(value),
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// S1: slice by region.
#[test]
fn test_slice_by_region() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];
    payload.slices = vec![eq_filter(
        "geography",
        "region",
        Scalar::text("North America"),
    )];

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(row_labels(&doc), vec!["2023", "2024"]);
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![vec![3500.0], vec![1300.0]]
    );
    assert!(!doc.metadata.cache.hit);
    assert_eq!(doc.metadata.planner.strategy, PlanStrategy::RawScan);
}

/// S2: drill from year to month pinned to 2023, with breadcrumb.
#[test]
fn test_drill_with_breadcrumb() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["units"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];
    payload.drill = Some(DrillSpec {
        dimension: "time".to_string(),
        from_level: "year".to_string(),
        to_level: "month".to_string(),
        path: vec![Scalar::Number(2023.0)],
    });

    let doc = harness.engine.execute(&payload).unwrap();
    // Months of 2023 only, in canonical (lexicographic) order
    assert_eq!(
        row_labels(&doc),
        vec!["Apr", "Feb", "Jan", "Jul", "May", "Oct"]
    );
    assert_eq!(
        measure_values(&doc, "units"),
        &vec![
            vec![5.0],
            vec![2.0],
            vec![4.0],
            vec![6.0],
            vec![3.0],
            vec![4.0]
        ]
    );

    assert_eq!(doc.metadata.breadcrumbs.len(), 1);
    let crumb = &doc.metadata.breadcrumbs[0];
    assert_eq!(crumb.dimension, "time");
    assert_eq!(crumb.level, "year");
    assert_eq!(crumb.value, Scalar::Number(2023.0));
}

/// S3: a rollup raises the month axis to quarter.
#[test]
fn test_rollup_to_quarter() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![
        AxisSpec::at_level("time", "year"),
        AxisSpec::at_level("time", "month"),
    ];
    payload.rollup = Some(RollupSpec {
        dimension: "time".to_string(),
        level: "quarter".to_string(),
    });

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![
            vec![2100.0],
            vec![2700.0],
            vec![2000.0],
            vec![1400.0],
            vec![1300.0],
            vec![800.0],
            vec![1700.0],
            vec![900.0]
        ]
    );
    // The year axis is coarser than the rollup level and is left alone
    assert_eq!(doc.data.pivot.rows[0].coordinates[0].level, "year");
    assert_eq!(doc.data.pivot.rows[0].coordinates[1].level, "quarter");
}

// ============================================================================
// PLANNER ROUTING
// ============================================================================

#[test]
fn test_single_axis_query_uses_pre_aggregates() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(doc.metadata.planner.strategy, PlanStrategy::PreAggregate);
    // Canonical comparator orders the years numerically
    assert_eq!(row_labels(&doc), vec!["2023", "2024"]);
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![vec![8200.0], vec![4700.0]]
    );
    // Single synthetic column
    assert_eq!(doc.data.pivot.columns.len(), 1);
    assert_eq!(doc.data.pivot.columns[0].key, "__all__");
    assert_eq!(doc.data.pivot.columns[0].label, "All");
}

/// Both plans must agree on the pivot block for a plan-eligible query.
/// geography.country is deliberate: its first-appearance order differs from
/// canonical order, so the paths only match if both sort the same way.
#[test]
fn test_plan_equivalence_between_paths() {
    let harness = TestHarness::new();

    let mut fast = QueryPayload::new("sales", &["revenue", "units"]);
    fast.rows = vec![AxisSpec::at_level("geography", "country")];
    let fast_doc = harness.engine.execute(&fast).unwrap();
    assert_eq!(fast_doc.metadata.planner.strategy, PlanStrategy::PreAggregate);
    assert_eq!(
        row_labels(&fast_doc),
        vec!["Canada", "France", "Germany", "USA"]
    );

    // An always-true predicate forces the scan path over identical data
    let mut slow = fast.clone();
    slow.filters = vec![FilterSpec {
        dimension: "geography".to_string(),
        level: Some("region".to_string()),
        operator: FilterOperator::Neq,
        value: FilterValue::One(Scalar::text("Atlantis")),
    }];
    let slow_doc = harness.engine.execute(&slow).unwrap();
    assert_eq!(slow_doc.metadata.planner.strategy, PlanStrategy::RawScan);

    assert_eq!(fast_doc.data.pivot, slow_doc.data.pivot);
}

// ============================================================================
// MATRIX SHAPE
// ============================================================================

#[test]
fn test_dense_matrix_fills_unpopulated_cells_with_zero() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("geography", "country")];
    payload.columns = vec![AxisSpec::at_level("time", "year")];

    let doc = harness.engine.execute(&payload).unwrap();
    let rows = &doc.data.pivot.rows;
    let columns = &doc.data.pivot.columns;
    assert_eq!(row_labels(&doc), vec!["Canada", "France", "Germany", "USA"]);
    assert_eq!(columns.len(), 2);

    let values = measure_values(&doc, "revenue");
    // Every (row, column) cell is defined
    assert_eq!(values.len(), rows.len());
    for row in values {
        assert_eq!(row.len(), columns.len());
    }
    assert_eq!(
        values,
        &vec![
            vec![1400.0, 0.0],
            vec![1800.0, 800.0],
            vec![2900.0, 2600.0],
            vec![2100.0, 1300.0],
        ]
    );

    // Flat rows only exist for populated cells: Canada/2024 is absent
    let flat = doc.data.flat.as_ref().unwrap();
    assert_eq!(flat.len(), 7);
    assert!(!flat
        .iter()
        .any(|r| r.row.contains("Canada") && r.column.contains("2024")));
}

#[test]
fn test_header_keys_are_stable_coordinate_functions() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];

    let a = harness.engine.execute(&payload).unwrap();
    let b = harness.engine.execute(&payload).unwrap();
    assert_eq!(a.data.pivot.rows[0].key, "time.year:2023");
    assert_eq!(
        a.data.pivot.rows.iter().map(|h| &h.key).collect::<Vec<_>>(),
        b.data.pivot.rows.iter().map(|h| &h.key).collect::<Vec<_>>()
    );
}

#[test]
fn test_flattened_output_can_be_disabled() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];
    payload.include_flattened = Some(false);

    let doc = harness.engine.execute(&payload).unwrap();
    assert!(doc.data.flat.is_none());
}

// ============================================================================
// AXIS RESOLUTION
// ============================================================================

#[test]
fn test_default_axis_is_first_dimension_at_coarsest_level() {
    let harness = TestHarness::new();
    let payload = QueryPayload::new("sales", &["revenue"]);

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(doc.metadata.planner.strategy, PlanStrategy::PreAggregate);
    assert_eq!(doc.data.pivot.rows[0].coordinates[0].dimension, "time");
    assert_eq!(doc.data.pivot.rows[0].coordinates[0].level, "year");
}

#[test]
fn test_axis_level_defaults_to_finest() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::new("time")];

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(doc.data.pivot.rows[0].coordinates[0].level, "month");
}

#[test]
fn test_pivot_block_overrides_top_level_axes() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("geography", "region")];
    payload.pivot = Some(PivotSection {
        rows: Some(vec![AxisSpec::at_level("time", "year")]),
        columns: None,
    });

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(doc.data.pivot.rows[0].coordinates[0].dimension, "time");
}

#[test]
fn test_axis_sort_descending() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec {
        dimension: "time".to_string(),
        level: Some("year".to_string()),
        sort: Some(SortDirection::Desc),
        alias: None,
    }];

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(row_labels(&doc), vec!["2024", "2023"]);
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![vec![4700.0], vec![8200.0]]
    );
}

#[test]
fn test_missing_level_value_maps_to_all_sentinel() {
    let harness = TestHarness::empty();
    let page_fact = |section: &str, url: Option<&str>, hits: f64| {
        let mut page = HashMap::new();
        page.insert("section".to_string(), Scalar::text(section));
        if let Some(url) = url {
            page.insert("url".to_string(), Scalar::text(url));
        }
        let mut dimensions = HashMap::new();
        dimensions.insert("page".to_string(), page);
        let mut metrics = HashMap::new();
        metrics.insert("hits".to_string(), Some(Scalar::Number(hits)));
        FactRow {
            dimensions,
            metrics,
        }
    };
    harness
        .engine
        .register_cube(CubeDefinition {
            name: "web".to_string(),
            label: None,
            dimensions: vec![dimension("page", &["section", "url"])],
            measures: vec![MeasureDef {
                name: "hits".to_string(),
                value_field: "hits".to_string(),
                aggregation: AggregationType::Sum,
                label: None,
                format: None,
            }],
            facts: vec![
                page_fact("docs", Some("/docs/intro"), 10.0),
                page_fact("docs", None, 3.0),
            ],
        })
        .unwrap();

    let mut payload = QueryPayload::new("web", &["hits"]);
    payload.rows = vec![AxisSpec::at_level("page", "url")];
    payload.filters = vec![eq_filter("page", "section", Scalar::text("docs"))];

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(doc.metadata.planner.strategy, PlanStrategy::RawScan);
    assert_eq!(row_labels(&doc), vec!["/docs/intro", "All"]);
    assert_eq!(
        measure_values(&doc, "hits"),
        &vec![vec![10.0], vec![3.0]]
    );

    // The fast path must see the same "All" bucket: without the filter the
    // planner picks pre-aggregates, and the url-less fact must not vanish
    let mut unfiltered = QueryPayload::new("web", &["hits"]);
    unfiltered.rows = vec![AxisSpec::at_level("page", "url")];
    let doc = harness.engine.execute(&unfiltered).unwrap();
    assert_eq!(doc.metadata.planner.strategy, PlanStrategy::PreAggregate);
    assert_eq!(row_labels(&doc), vec!["/docs/intro", "All"]);
    assert_eq!(
        measure_values(&doc, "hits"),
        &vec![vec![10.0], vec![3.0]]
    );
}

// ============================================================================
// FILTER OPERATORS
// ============================================================================

#[test]
fn test_in_filter() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];
    payload.filters = vec![FilterSpec {
        dimension: "geography".to_string(),
        level: Some("country".to_string()),
        operator: FilterOperator::In,
        value: FilterValue::Many(vec![Scalar::text("USA"), Scalar::text("Canada")]),
    }];

    let doc = harness.engine.execute(&payload).unwrap();
    // USA + Canada: 2023 = 1200 + 900 + 1400, 2024 = 1300
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![vec![3500.0], vec![1300.0]]
    );
}

#[test]
fn test_between_filter_is_inclusive() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "quarter")];
    payload.filters = vec![FilterSpec {
        dimension: "time".to_string(),
        level: Some("year".to_string()),
        operator: FilterOperator::Between,
        value: FilterValue::Many(vec![Scalar::Number(2023.0), Scalar::Number(2023.0)]),
    }];

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(row_labels(&doc), vec!["Q1", "Q2", "Q3", "Q4"]);
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![vec![2100.0], vec![2700.0], vec![2000.0], vec![1400.0]]
    );
}

#[test]
fn test_numeric_operator_rejects_text_value() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.filters = vec![FilterSpec {
        dimension: "time".to_string(),
        level: Some("year".to_string()),
        operator: FilterOperator::Gt,
        value: FilterValue::One(Scalar::text("not-a-number")),
    }];

    let err = harness.engine.execute(&payload).unwrap_err();
    assert!(matches!(err, EngineError::InvalidFilter(_)));
    assert_eq!(err.status_class(), 400);
}

#[test]
fn test_numeric_operator_fails_rows_with_text_values() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];
    // Quarter values are text; a numeric comparison matches no fact
    payload.filters = vec![FilterSpec {
        dimension: "time".to_string(),
        level: Some("quarter".to_string()),
        operator: FilterOperator::Gte,
        value: FilterValue::One(Scalar::Number(1.0)),
    }];

    let doc = harness.engine.execute(&payload).unwrap();
    assert!(doc.data.pivot.rows.is_empty());
}

// ============================================================================
// TEXTUAL HELPER MERGE
// ============================================================================

#[test]
fn test_helper_fills_gaps_in_the_structured_payload() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.mdx = Some("MEASURES units; ROWS time.quarter".to_string());

    let doc = harness.engine.execute(&payload).unwrap();
    // Structured measures win; the helper's row axis fills the gap
    assert_eq!(doc.metadata.measures, vec!["revenue".to_string()]);
    assert_eq!(row_labels(&doc), vec!["Q1", "Q2", "Q3", "Q4"]);
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![vec![3400.0], vec![3500.0], vec![3700.0], vec![2300.0]]
    );
}

#[test]
fn test_structured_slices_override_helper_slices() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];
    payload.mdx = Some("SLICE geography.region = Europe".to_string());
    payload.slices = vec![eq_filter(
        "geography",
        "region",
        Scalar::text("North America"),
    )];

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(
        measure_values(&doc, "revenue"),
        &vec![vec![3500.0], vec![1300.0]]
    );
}

#[test]
fn test_helper_drill_applies_when_structured_has_none() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["units"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];
    payload.mdx = Some("DRILL time year -> month PATH 2023".to_string());

    let doc = harness.engine.execute(&payload).unwrap();
    assert_eq!(
        row_labels(&doc),
        vec!["Apr", "Feb", "Jan", "Jul", "May", "Oct"]
    );
}

#[test]
fn test_malformed_helper_is_a_bad_request() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.mdx = Some("SELECT nope".to_string());

    let err = harness.engine.execute(&payload).unwrap_err();
    assert!(matches!(err, EngineError::HelperSyntax(_)));
    assert_eq!(err.status_class(), 400);
}

// ============================================================================
// VALIDATION ERRORS
// ============================================================================

#[test]
fn test_unknown_dimension_and_level() {
    let harness = TestHarness::new();

    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("flavor", "scoop")];
    let err = harness.engine.execute(&payload).unwrap_err();
    assert!(matches!(err, EngineError::UnknownDimension(_)));

    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rows = vec![AxisSpec::at_level("time", "weekday")];
    let err = harness.engine.execute(&payload).unwrap_err();
    assert!(matches!(err, EngineError::UnknownLevel { .. }));
}

#[test]
fn test_unknown_measure() {
    let harness = TestHarness::new();
    let payload = QueryPayload::new("sales", &["margin"]);
    let err = harness.engine.execute(&payload).unwrap_err();
    assert_eq!(err, EngineError::UnknownMeasure("margin".to_string()));
}

#[test]
fn test_malformed_drill_levels() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.drill = Some(DrillSpec {
        dimension: "time".to_string(),
        from_level: "year".to_string(),
        to_level: "weekday".to_string(),
        path: Vec::new(),
    });
    let err = harness.engine.execute(&payload).unwrap_err();
    assert!(matches!(err, EngineError::InvalidDrill(_)));
}

#[test]
fn test_drill_path_longer_than_range() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.drill = Some(DrillSpec {
        dimension: "time".to_string(),
        from_level: "year".to_string(),
        to_level: "quarter".to_string(),
        path: vec![
            Scalar::Number(2023.0),
            Scalar::text("Q1"),
            Scalar::text("Jan"),
        ],
    });
    let err = harness.engine.execute(&payload).unwrap_err();
    assert!(matches!(err, EngineError::InvalidDrill(_)));
}

#[test]
fn test_malformed_rollup_level() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["revenue"]);
    payload.rollup = Some(RollupSpec {
        dimension: "time".to_string(),
        level: "decade".to_string(),
    });
    let err = harness.engine.execute(&payload).unwrap_err();
    assert!(matches!(err, EngineError::InvalidRollup(_)));
}

// ============================================================================
// METADATA DECORATION
// ============================================================================

#[test]
fn test_suggestions_follow_axis_cardinality() {
    let harness = TestHarness::new();

    let mut one_row = QueryPayload::new("sales", &["revenue"]);
    one_row.rows = vec![AxisSpec::at_level("time", "year")];
    let doc = harness.engine.execute(&one_row).unwrap();
    assert_eq!(doc.metadata.suggestions, vec!["column", "line"]);

    let mut crosstab = QueryPayload::new("sales", &["revenue"]);
    crosstab.rows = vec![AxisSpec::at_level("time", "year")];
    crosstab.columns = vec![AxisSpec::at_level("product", "category")];
    let doc = harness.engine.execute(&crosstab).unwrap();
    assert_eq!(doc.metadata.suggestions, vec!["heatmap", "stacked-bar"]);

    let mut two_rows = QueryPayload::new("sales", &["revenue"]);
    two_rows.rows = vec![
        AxisSpec::at_level("time", "year"),
        AxisSpec::at_level("geography", "region"),
    ];
    let doc = harness.engine.execute(&two_rows).unwrap();
    assert_eq!(doc.metadata.suggestions, vec!["matrix", "line"]);
}

#[test]
fn test_available_measures_catalog() {
    let harness = TestHarness::new();
    let mut payload = QueryPayload::new("sales", &["units"]);
    payload.rows = vec![AxisSpec::at_level("time", "year")];

    let doc = harness.engine.execute(&payload).unwrap();
    let names: Vec<&str> = doc
        .metadata
        .available_measures
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(names, vec!["revenue", "units"]);
    assert_eq!(
        doc.metadata.available_measures[0].aggregation,
        AggregationType::Sum
    );
    assert_eq!(
        doc.metadata.available_measures[0].label.as_deref(),
        Some("Revenue")
    );
    // The requested measure list reflects the query, not the catalog
    assert_eq!(doc.metadata.measures, vec!["units".to_string()]);
}
