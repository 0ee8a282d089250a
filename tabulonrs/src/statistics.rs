//! Statistic field resolution and result-value conversion.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TabulonError};
use crate::fields::{Field, FieldMap, StatisticFunc, View};

/// Sentinel field id meaning "the whole row"; valid only with `count`.
pub const ROW_WILDCARD: &str = "*";

/// One `(field, function)` pair to aggregate, with a collision-free alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticField {
    pub field_id: String,
    pub statistic_func: StatisticFunc,
    pub alias: String,
}

/// Request-level override: replaces the view's configured function for the
/// field with the full list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldStats {
    pub field_id: String,
    pub statistic_funcs: Vec<StatisticFunc>,
}

/// Unique per `(field, function)`, so several functions on one field never
/// collide in a single result row.
pub fn statistic_alias(field_id: &str, func: StatisticFunc) -> String {
    format!("{}_{}", field_id, func.as_str())
}

/// Merges the view's per-field display configuration with request-level
/// overrides into a deduplicated list of statistic fields. A field
/// contributes only when it is not hidden and has at least one function.
pub fn resolve_statistic_fields(
    view: Option<&View>,
    overrides: Option<&[CustomFieldStats]>,
    field_map: &FieldMap,
) -> Result<Vec<StatisticField>> {
    let override_map: HashMap<&str, &CustomFieldStats> = overrides
        .unwrap_or_default()
        .iter()
        .map(|c| (c.field_id.as_str(), c))
        .collect();
    let hidden = |field_id: &str| {
        view.and_then(|v| v.column_metas.get(field_id))
            .map_or(false, |meta| meta.hidden)
    };

    let mut out = Vec::new();
    let mut seen: HashSet<(String, StatisticFunc)> = HashSet::new();

    for custom in overrides.unwrap_or_default() {
        if hidden(&custom.field_id) {
            continue;
        }
        for &func in &custom.statistic_funcs {
            push_statistic(&custom.field_id, func, field_map, &mut out, &mut seen)?;
        }
    }
    if let Some(view) = view {
        for (field_id, meta) in &view.column_metas {
            if meta.hidden || override_map.contains_key(field_id.as_str()) {
                continue;
            }
            if let Some(func) = meta.statistic_func {
                push_statistic(field_id, func, field_map, &mut out, &mut seen)?;
            }
        }
    }
    Ok(out)
}

fn push_statistic(
    field_id: &str,
    func: StatisticFunc,
    field_map: &FieldMap,
    out: &mut Vec<StatisticField>,
    seen: &mut HashSet<(String, StatisticFunc)>,
) -> Result<()> {
    validate_statistic_target(field_id, func, field_map)?;
    if seen.insert((field_id.to_string(), func)) {
        out.push(StatisticField {
            field_id: field_id.to_string(),
            statistic_func: func,
            alias: statistic_alias(field_id, func),
        });
    }
    Ok(())
}

pub fn validate_statistic_target<'a>(
    field_id: &str,
    func: StatisticFunc,
    field_map: &'a FieldMap,
) -> Result<Option<&'a Field>> {
    if field_id == ROW_WILDCARD {
        if !func.supports_whole_row() {
            return Err(TabulonError::Validation(format!(
                "aggregation {func} requires a target field"
            )));
        }
        return Ok(None);
    }
    let field = field_map.get(field_id).ok_or_else(|| {
        TabulonError::Validation(format!("statistic field {field_id} not found in table"))
    })?;
    if !func.compatible_with(field.cell_value_type) {
        return Err(TabulonError::Validation(format!(
            "statistic {func} is not supported for field {field_id} ({:?})",
            field.cell_value_type
        )));
    }
    Ok(Some(field))
}

/// Converts a raw store value to its reported form. The store rows are
/// already JSON; this applies the per-function rules: the month-range pair
/// becomes a month count, percent functions report `0` over empty input,
/// everything else passes through with null preserved.
pub fn convert_aggregation_value(raw: Option<&Value>, func: StatisticFunc) -> Value {
    match func {
        StatisticFunc::DateRangeOfMonths => {
            let joined = raw.and_then(Value::as_str).unwrap_or("");
            Value::from(month_span(joined))
        }
        func if func.is_percent() => match raw {
            None | Some(Value::Null) => Value::from(0),
            Some(value) => value.clone(),
        },
        _ => raw.cloned().unwrap_or(Value::Null),
    }
}

/// Whole months between the two timestamps of a `"<max>,<min>"` pair;
/// `0` when either side is missing.
fn month_span(joined: &str) -> i64 {
    let Some((max, min)) = joined.split_once(',') else {
        return 0;
    };
    match (parse_timestamp(max), parse_timestamp(min)) {
        (Some(max), Some(min)) => {
            (i64::from(max.year()) * 12 + i64::from(max.month()))
                - (i64::from(min.year()) * 12 + i64::from(min.month()))
        }
        _ => 0,
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
