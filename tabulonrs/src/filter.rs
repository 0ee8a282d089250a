//! The filter tree attached to views and requests.
//!
//! The tree is opaque to the query services: they only extract referenced
//! field ids and merge view/request filters. Predicate SQL is built by the
//! DB provider.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
    IsGreater,
    IsGreaterEqual,
    IsLess,
    IsLessEqual,
    IsAnyOf,
    IsNoneOf,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Group {
        conjunction: Conjunction,
        children: Vec<Filter>,
    },
    Condition {
        field_id: String,
        operator: FilterOperator,
        #[serde(default)]
        value: Value,
    },
}

impl Filter {
    /// Every field id the tree references, first-seen order, deduplicated.
    pub fn referenced_field_ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_field_ids(&mut out, &mut seen);
        out
    }

    fn collect_field_ids(&self, out: &mut Vec<String>, seen: &mut HashSet<String>) {
        match self {
            Filter::Group { children, .. } => {
                for child in children {
                    child.collect_field_ids(out, seen);
                }
            }
            Filter::Condition { field_id, .. } => {
                if seen.insert(field_id.clone()) {
                    out.push(field_id.clone());
                }
            }
        }
    }

    /// Combines a view's stored filter with a request filter under `and`:
    /// both constraints apply, so a request can only narrow a saved view.
    pub fn merge(view: Option<Filter>, request: Option<Filter>) -> Option<Filter> {
        match (view, request) {
            (None, None) => None,
            (Some(filter), None) | (None, Some(filter)) => Some(filter),
            (Some(view), Some(request)) => Some(Filter::Group {
                conjunction: Conjunction::And,
                children: vec![view, request],
            }),
        }
    }
}
