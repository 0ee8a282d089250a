use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Physical record-id column present on every table.
pub const RECORD_ID_COLUMN: &str = "__id";
/// Monotonic insertion ordinal; the default view ordering.
pub const AUTO_NUMBER_COLUMN: &str = "__auto_number";
/// Alias under which window row numbers are selected.
pub const ROW_NUMBER_ALIAS: &str = "__row_num";
/// Alias under which search-match queries report the matched field id.
pub const MATCHED_FIELD_ALIAS: &str = "__field_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub db_table_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValueType {
    String,
    Number,
    Boolean,
    DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub name: String,
    pub db_field_name: String,
    pub cell_value_type: CellValueType,
    /// Multi-valued cells hold a serialized list rather than a scalar.
    #[serde(default)]
    pub is_multiple_cell_value: bool,
}

/// Fields keyed by id for O(1) resolution during query building.
pub type FieldMap = HashMap<String, Field>;

pub fn index_fields(fields: &[Field]) -> FieldMap {
    fields.iter().map(|f| (f.id.clone(), f.clone())).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One group-by or sort entry; evaluated left-to-right.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOrder {
    pub field_id: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticFunc {
    Count,
    Empty,
    Filled,
    Unique,
    Max,
    Min,
    Sum,
    Average,
    Checked,
    UnChecked,
    PercentEmpty,
    PercentFilled,
    PercentUnique,
    PercentChecked,
    PercentUnChecked,
    EarliestDate,
    LatestDate,
    DateRangeOfDays,
    DateRangeOfMonths,
}

impl StatisticFunc {
    pub fn as_str(self) -> &'static str {
        match self {
            StatisticFunc::Count => "count",
            StatisticFunc::Empty => "empty",
            StatisticFunc::Filled => "filled",
            StatisticFunc::Unique => "unique",
            StatisticFunc::Max => "max",
            StatisticFunc::Min => "min",
            StatisticFunc::Sum => "sum",
            StatisticFunc::Average => "average",
            StatisticFunc::Checked => "checked",
            StatisticFunc::UnChecked => "un_checked",
            StatisticFunc::PercentEmpty => "percent_empty",
            StatisticFunc::PercentFilled => "percent_filled",
            StatisticFunc::PercentUnique => "percent_unique",
            StatisticFunc::PercentChecked => "percent_checked",
            StatisticFunc::PercentUnChecked => "percent_un_checked",
            StatisticFunc::EarliestDate => "earliest_date",
            StatisticFunc::LatestDate => "latest_date",
            StatisticFunc::DateRangeOfDays => "date_range_of_days",
            StatisticFunc::DateRangeOfMonths => "date_range_of_months",
        }
    }

    /// Percent-family functions report `0` instead of null over empty input.
    pub fn is_percent(self) -> bool {
        matches!(
            self,
            StatisticFunc::PercentEmpty
                | StatisticFunc::PercentFilled
                | StatisticFunc::PercentUnique
                | StatisticFunc::PercentChecked
                | StatisticFunc::PercentUnChecked
        )
    }

    /// Whether the function may target the whole row instead of a field.
    pub fn supports_whole_row(self) -> bool {
        matches!(self, StatisticFunc::Count)
    }

    pub fn compatible_with(self, cell_value_type: CellValueType) -> bool {
        match self {
            StatisticFunc::Count
            | StatisticFunc::Empty
            | StatisticFunc::Filled
            | StatisticFunc::Unique
            | StatisticFunc::PercentEmpty
            | StatisticFunc::PercentFilled
            | StatisticFunc::PercentUnique => true,
            StatisticFunc::Max | StatisticFunc::Min | StatisticFunc::Sum | StatisticFunc::Average => {
                cell_value_type == CellValueType::Number
            }
            StatisticFunc::Checked
            | StatisticFunc::UnChecked
            | StatisticFunc::PercentChecked
            | StatisticFunc::PercentUnChecked => cell_value_type == CellValueType::Boolean,
            StatisticFunc::EarliestDate
            | StatisticFunc::LatestDate
            | StatisticFunc::DateRangeOfDays
            | StatisticFunc::DateRangeOfMonths => cell_value_type == CellValueType::DateTime,
        }
    }
}

impl fmt::Display for StatisticFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field display configuration stored on a view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMeta {
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub statistic_func: Option<StatisticFunc>,
}

/// A saved filter/sort/group/column configuration for a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub sort: Option<Vec<FieldOrder>>,
    #[serde(default)]
    pub group_by: Option<Vec<FieldOrder>>,
    #[serde(default)]
    pub column_metas: BTreeMap<String, ColumnMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Search {
    pub query: String,
    /// Restricts the search to these fields; all searchable fields otherwise.
    #[serde(default)]
    pub field_ids: Option<Vec<String>>,
    /// When set, rows that do not match are excluded from the result set
    /// instead of merely being deprioritized.
    #[serde(default)]
    pub hide_not_matched: bool,
}

/// Fields a search term can match against, narrowed to the explicit field
/// scope and the active projection. Boolean cells are not text-searchable.
pub fn searchable_fields(
    fields: &[Field],
    search: &Search,
    projection: Option<&[String]>,
) -> Vec<Field> {
    fields
        .iter()
        .filter(|f| f.cell_value_type != CellValueType::Boolean)
        .filter(|f| {
            search
                .field_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&f.id))
        })
        .filter(|f| projection.map_or(true, |p| p.contains(&f.id)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, cell_value_type: CellValueType) -> Field {
        Field {
            id: id.to_string(),
            name: id.to_string(),
            db_field_name: id.to_string(),
            cell_value_type,
            is_multiple_cell_value: false,
        }
    }

    #[test]
    fn searchable_fields_exclude_booleans_and_respect_scope() {
        let fields = vec![
            field("fld_a", CellValueType::String),
            field("fld_b", CellValueType::Boolean),
            field("fld_c", CellValueType::Number),
        ];
        let search = Search {
            query: "x".to_string(),
            field_ids: None,
            hide_not_matched: false,
        };
        let found = searchable_fields(&fields, &search, None);
        assert_eq!(found.len(), 2);

        let scoped = Search {
            field_ids: Some(vec!["fld_c".to_string()]),
            ..search
        };
        let found = searchable_fields(&fields, &scoped, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "fld_c");
    }

    #[test]
    fn statistic_func_type_compatibility() {
        assert!(StatisticFunc::Sum.compatible_with(CellValueType::Number));
        assert!(!StatisticFunc::Sum.compatible_with(CellValueType::String));
        assert!(StatisticFunc::Checked.compatible_with(CellValueType::Boolean));
        assert!(!StatisticFunc::EarliestDate.compatible_with(CellValueType::Number));
        assert!(StatisticFunc::Unique.compatible_with(CellValueType::DateTime));
    }
}
