//! Eager request validation, run before any store round-trip.

use crate::error::{Result, TabulonError};
use crate::fields::{CellValueType, Field, FieldMap};

/// Table ids are structurally prefixed `tbl`.
pub fn ensure_table_id(table_id: &str) -> Result<()> {
    check(
        table_id.starts_with("tbl") && table_id.len() > 3,
        format!("invalid table id {table_id}"),
    )
}

pub fn ensure_search_term(term: &str) -> Result<()> {
    check(
        !term.trim().is_empty(),
        "search term must not be empty".to_string(),
    )
}

pub fn ensure_search_take(take: u64, max_take: u64) -> Result<()> {
    check(take > 0, "take must be positive".to_string())?;
    check(
        take <= max_take,
        format!("take {take} exceeds the maximum of {max_take}"),
    )
}

/// Calendar range fields must be single-valued date fields; a missing field
/// and a wrong-typed field produce distinct messages.
pub fn ensure_calendar_field<'a>(
    field_map: &'a FieldMap,
    field_id: &str,
    role: &str,
) -> Result<&'a Field> {
    let field = field_map.get(field_id).ok_or_else(|| {
        TabulonError::Validation(format!("calendar {role} field {field_id} is missing"))
    })?;
    check(
        field.cell_value_type == CellValueType::DateTime,
        format!("calendar {role} field {field_id} must be a date field"),
    )?;
    check(
        !field.is_multiple_cell_value,
        format!("calendar {role} field {field_id} must be single-valued"),
    )?;
    Ok(field)
}

fn check(condition: bool, message: String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TabulonError::Validation(message))
    }
}
