//! Query-fragment builder tests for both shipped providers.

use chrono::NaiveDate;
use serde_json::json;

use tabulon::db_provider::{DateWindow, DbProvider, PostgresProvider, SqliteProvider};
use tabulon::fields::{index_fields, FieldOrder, SortDirection};
use tabulon::filter::{Conjunction, Filter, FilterOperator};
use tabulon::sql_ast::{SelectQuery, SqlRenderer, TableRef};

mod common;
use common::*;

fn base() -> SelectQuery {
    SelectQuery {
        from: TableRef::table("records_raw"),
        ..Default::default()
    }
}

fn window() -> DateWindow {
    DateWindow {
        start: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2022, 1, 31).unwrap(),
    }
}

#[test]
fn filter_tree_renders_nested_predicates() {
    let provider = PostgresProvider::new();
    let fields = vec![
        text_field("fldName", "name"),
        number_field("fldBudget", "budget"),
    ];
    let filter = Filter::Group {
        conjunction: Conjunction::Or,
        children: vec![
            Filter::Condition {
                field_id: "fldName".to_string(),
                operator: FilterOperator::Contains,
                value: json!("acme"),
            },
            Filter::Condition {
                field_id: "fldBudget".to_string(),
                operator: FilterOperator::IsGreaterEqual,
                value: json!(100),
            },
        ],
    };
    let query = provider
        .filter_query(base(), &filter, &index_fields(&fields))
        .unwrap();
    let rendered = SqlRenderer::new(provider.dialect())
        .render_select(&query)
        .unwrap();
    assert!(
        rendered.sql.contains("CAST(\"name\" AS TEXT) ILIKE $1"),
        "{}",
        rendered.sql
    );
    assert!(rendered.sql.contains(" OR "), "{}", rendered.sql);
    assert!(rendered.sql.contains("(\"budget\" >= $2)"), "{}", rendered.sql);
    assert_eq!(rendered.params, vec![json!("%acme%"), json!(100)]);
}

#[test]
fn filters_and_sorts_on_unknown_fields_are_rejected() {
    let provider = PostgresProvider::new();
    let fields = vec![text_field("fldName", "name")];
    let filter = Filter::Condition {
        field_id: "fldGone".to_string(),
        operator: FilterOperator::Is,
        value: json!("x"),
    };
    assert!(provider
        .filter_query(base(), &filter, &index_fields(&fields))
        .is_err());

    let sort = vec![FieldOrder {
        field_id: "fldGone".to_string(),
        direction: SortDirection::Asc,
    }];
    assert!(provider
        .sort_query(base(), &sort, &index_fields(&fields))
        .is_err());
}

#[test]
fn postgres_search_index_ranks_fields_with_a_lateral_values_join() {
    let provider = PostgresProvider::new();
    let fields = vec![
        text_field("fldName", "name"),
        text_field("fldNotes", "notes"),
    ];
    let rendered = provider
        .search_index_query(base(), "acme", &fields, 10, 50)
        .unwrap();
    assert!(
        rendered.sql.contains("CROSS JOIN LATERAL (VALUES "),
        "{}",
        rendered.sql
    );
    assert!(rendered.sql.contains("ILIKE"), "{}", rendered.sql);
    // Default ordering falls back to the insertion ordinal.
    assert!(rendered.sql.contains("\"__auto_number\""), "{}", rendered.sql);
    assert!(rendered.sql.ends_with("LIMIT 50 OFFSET 10"), "{}", rendered.sql);
    assert!(rendered.params.contains(&json!("fldName")));
    assert!(rendered.params.contains(&json!("%acme%")));
}

#[test]
fn sqlite_search_index_unions_one_arm_per_field() {
    let provider = SqliteProvider::new();
    let fields = vec![
        text_field("fldName", "name"),
        text_field("fldNotes", "notes"),
    ];
    let rendered = provider
        .search_index_query(base(), "acme", &fields, 0, 20)
        .unwrap();
    assert!(rendered.sql.contains(" UNION ALL "), "{}", rendered.sql);
    assert!(rendered.sql.contains(" LIKE "), "{}", rendered.sql);
    assert!(!rendered.sql.contains("ILIKE"), "{}", rendered.sql);
    assert!(rendered.sql.ends_with("LIMIT 20 OFFSET 0"), "{}", rendered.sql);
}

#[test]
fn record_index_query_numbers_the_view_and_filters_to_the_id_set() {
    let provider = PostgresProvider::new();
    let fields = vec![number_field("fldBudget", "budget")];
    let sorted = provider
        .sort_query(
            base(),
            &[FieldOrder {
                field_id: "fldBudget".to_string(),
                direction: SortDirection::Desc,
            }],
            &index_fields(&fields),
        )
        .unwrap();
    let rendered = provider
        .record_index_query(sorted, &["recA".to_string(), "recB".to_string()])
        .unwrap();
    assert!(
        rendered
            .sql
            .contains("ROW_NUMBER() OVER (ORDER BY \"t\".\"__s0\" DESC) AS \"__row_num\""),
        "{}",
        rendered.sql
    );
    assert!(
        rendered.sql.contains("\"__id\" IN ($1, $2)"),
        "{}",
        rendered.sql
    );
    assert_eq!(rendered.params, vec![json!("recA"), json!("recB")]);
}

#[test]
fn record_index_query_requires_record_ids() {
    let provider = PostgresProvider::new();
    assert!(provider.record_index_query(base(), &[]).is_err());
}

#[test]
fn postgres_calendar_query_expands_days_and_aggregates_ids() {
    let provider = PostgresProvider::new();
    let start = date_field("fldStart", "start_at");
    let end = date_field("fldEnd", "end_at");
    let rendered = provider
        .calendar_daily_collection_query(base(), &window(), &start, &end)
        .unwrap();
    assert!(rendered.sql.contains("generate_series(GREATEST("), "{}", rendered.sql);
    assert!(rendered.sql.contains("ARRAY_AGG(\"t\".\"__id\")"), "{}", rendered.sql);
    assert!(rendered.sql.contains("\"start_at\" IS NOT NULL"), "{}", rendered.sql);
    assert!(rendered.sql.contains("GROUP BY \"d\".\"day\""), "{}", rendered.sql);
    // Window bounds for the overlap filter and the series clamp.
    assert_eq!(
        rendered.params,
        vec![
            json!("2022-01-31"),
            json!("2022-01-01"),
            json!("2022-01-01"),
            json!("2022-01-31"),
        ]
    );
}

#[test]
fn sqlite_calendar_query_builds_a_recursive_day_table() {
    let provider = SqliteProvider::new();
    let start = date_field("fldStart", "start_at");
    let end = date_field("fldEnd", "end_at");
    let rendered = provider
        .calendar_daily_collection_query(base(), &window(), &start, &end)
        .unwrap();
    assert!(rendered.sql.starts_with("WITH RECURSIVE"), "{}", rendered.sql);
    assert!(
        rendered.sql.contains("GROUP_CONCAT(\"t\".\"__id\")"),
        "{}",
        rendered.sql
    );
    assert!(rendered.sql.contains("date(\"day\", '+1 day')"), "{}", rendered.sql);
}
