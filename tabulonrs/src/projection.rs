//! Column projection resolution.

use std::collections::HashSet;

use crate::fields::FieldOrder;
use crate::filter::Filter;
use crate::statistics::{StatisticField, ROW_WILDCARD};

/// The minimal set of field ids a query must read, constrained to the
/// permission layer's allowed set.
///
/// `None` means "no restriction" and is only returned when nothing is
/// requested and no permission narrowing is active. When everything
/// requested was denied, the allowed set is returned instead of an empty
/// projection, so a caller with visible fields never gets zero columns; a
/// field outside the allowed set is never returned.
pub fn resolve_projection(
    statistic_fields: Option<&[StatisticField]>,
    group_by: Option<&[FieldOrder]>,
    filter: Option<&Filter>,
    search_field_ids: Option<&[String]>,
    allowed_field_ids: Option<&[String]>,
) -> Option<Vec<String>> {
    let mut requested = Vec::new();
    let mut seen = HashSet::new();

    if let Some(statistic_fields) = statistic_fields {
        for stat in statistic_fields {
            push_unique(&stat.field_id, &mut requested, &mut seen);
        }
    }
    if let Some(group_by) = group_by {
        for item in group_by {
            push_unique(&item.field_id, &mut requested, &mut seen);
        }
    }
    if let Some(filter) = filter {
        for field_id in filter.referenced_field_ids() {
            push_unique(&field_id, &mut requested, &mut seen);
        }
    }
    if let Some(search_field_ids) = search_field_ids {
        for field_id in search_field_ids {
            push_unique(field_id, &mut requested, &mut seen);
        }
    }

    let allowed = allowed_field_ids.filter(|allowed| !allowed.is_empty());
    if requested.is_empty() {
        return allowed.map(|allowed| allowed.to_vec());
    }
    match allowed {
        None => Some(requested),
        Some(allowed) => {
            let intersection: Vec<String> = requested
                .into_iter()
                .filter(|field_id| allowed.contains(field_id))
                .collect();
            if intersection.is_empty() {
                Some(allowed.to_vec())
            } else {
                Some(intersection)
            }
        }
    }
}

fn push_unique(field_id: &str, out: &mut Vec<String>, seen: &mut HashSet<String>) {
    if field_id != ROW_WILDCARD && seen.insert(field_id.to_string()) {
        out.push(field_id.to_string());
    }
}
