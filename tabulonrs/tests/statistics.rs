//! Statistic field resolution tests.

use std::collections::BTreeMap;

use tabulon::fields::{
    index_fields, CellValueType, ColumnMeta, Field, StatisticFunc, View,
};
use tabulon::statistics::{
    resolve_statistic_fields, statistic_alias, CustomFieldStats, ROW_WILDCARD,
};
use tabulon::TabulonError;

fn field(id: &str, cell_value_type: CellValueType) -> Field {
    Field {
        id: id.to_string(),
        name: id.to_string(),
        db_field_name: id.trim_start_matches("fld").to_lowercase(),
        cell_value_type,
        is_multiple_cell_value: false,
    }
}

fn view_with(metas: &[(&str, bool, Option<StatisticFunc>)]) -> View {
    let mut column_metas = BTreeMap::new();
    for (field_id, hidden, statistic_func) in metas {
        column_metas.insert(
            field_id.to_string(),
            ColumnMeta {
                hidden: *hidden,
                statistic_func: *statistic_func,
            },
        );
    }
    View {
        id: "viwDefault".to_string(),
        column_metas,
        ..Default::default()
    }
}

fn custom(field_id: &str, funcs: &[StatisticFunc]) -> CustomFieldStats {
    CustomFieldStats {
        field_id: field_id.to_string(),
        statistic_funcs: funcs.to_vec(),
    }
}

#[test]
fn view_configuration_produces_statistic_fields() {
    let fields = vec![
        field("fldBudget", CellValueType::Number),
        field("fldNotes", CellValueType::String),
    ];
    let view = view_with(&[
        ("fldBudget", false, Some(StatisticFunc::Sum)),
        ("fldNotes", true, Some(StatisticFunc::Filled)),
    ]);
    let resolved =
        resolve_statistic_fields(Some(&view), None, &index_fields(&fields)).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].field_id, "fldBudget");
    assert_eq!(resolved[0].alias, "fldBudget_sum");
}

#[test]
fn overrides_replace_the_view_function() {
    let fields = vec![field("fldBudget", CellValueType::Number)];
    let view = view_with(&[("fldBudget", false, Some(StatisticFunc::Sum))]);
    let overrides = vec![custom(
        "fldBudget",
        &[StatisticFunc::Average, StatisticFunc::Max],
    )];
    let resolved =
        resolve_statistic_fields(Some(&view), Some(&overrides), &index_fields(&fields)).unwrap();
    let funcs: Vec<_> = resolved.iter().map(|s| s.statistic_func).collect();
    assert_eq!(funcs, vec![StatisticFunc::Average, StatisticFunc::Max]);
}

#[test]
fn two_functions_on_one_field_get_distinct_aliases() {
    let fields = vec![field("fldBudget", CellValueType::Number)];
    let overrides = vec![custom("fldBudget", &[StatisticFunc::Sum, StatisticFunc::Average])];
    let resolved =
        resolve_statistic_fields(None, Some(&overrides), &index_fields(&fields)).unwrap();
    assert_eq!(resolved.len(), 2);
    assert_ne!(resolved[0].alias, resolved[1].alias);
    assert!(resolved.iter().all(|s| s.field_id == "fldBudget"));
}

#[test]
fn duplicate_pairs_collapse_to_one_entry() {
    let fields = vec![field("fldBudget", CellValueType::Number)];
    let overrides = vec![
        custom("fldBudget", &[StatisticFunc::Sum, StatisticFunc::Sum]),
        custom("fldBudget", &[StatisticFunc::Sum]),
    ];
    let resolved =
        resolve_statistic_fields(None, Some(&overrides), &index_fields(&fields)).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(
        resolved[0].alias,
        statistic_alias("fldBudget", StatisticFunc::Sum)
    );
}

#[test]
fn hidden_fields_are_excluded_even_when_overridden() {
    let fields = vec![field("fldBudget", CellValueType::Number)];
    let view = view_with(&[("fldBudget", true, Some(StatisticFunc::Sum))]);
    let overrides = vec![custom("fldBudget", &[StatisticFunc::Average])];
    let resolved =
        resolve_statistic_fields(Some(&view), Some(&overrides), &index_fields(&fields)).unwrap();
    assert!(resolved.is_empty());
}

#[test]
fn whole_row_sentinel_allows_count_only() {
    let fields = vec![field("fldBudget", CellValueType::Number)];
    let counting = vec![custom(ROW_WILDCARD, &[StatisticFunc::Count])];
    let resolved =
        resolve_statistic_fields(None, Some(&counting), &index_fields(&fields)).unwrap();
    assert_eq!(resolved[0].alias, "*_count");

    let averaging = vec![custom(ROW_WILDCARD, &[StatisticFunc::Average])];
    let error = resolve_statistic_fields(None, Some(&averaging), &index_fields(&fields))
        .unwrap_err();
    match error {
        TabulonError::Validation(message) => {
            assert!(message.contains("requires a target field"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn unknown_field_and_incompatible_function_are_rejected() {
    let fields = vec![field("fldNotes", CellValueType::String)];
    let field_map = index_fields(&fields);

    let unknown = vec![custom("fldGone", &[StatisticFunc::Count])];
    let error = resolve_statistic_fields(None, Some(&unknown), &field_map).unwrap_err();
    match error {
        TabulonError::Validation(message) => assert!(message.contains("fldGone")),
        other => panic!("unexpected error {other:?}"),
    }

    let incompatible = vec![custom("fldNotes", &[StatisticFunc::Sum])];
    let error = resolve_statistic_fields(None, Some(&incompatible), &field_map).unwrap_err();
    match error {
        TabulonError::Validation(message) => {
            assert!(message.contains("fldNotes"));
            assert!(message.contains("sum"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
