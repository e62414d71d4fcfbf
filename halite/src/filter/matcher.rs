//! Query predicate matching.
//!
//! The comparison operators form a closed set dispatched through a static
//! table. Comparison uses the store's cross-type total order, so `$lt` and
//! friends behave exactly like an index range scan over the same values.

use super::Query;
use crate::common::{values_equal, Value};
use crate::document::{get_path, Document};
use crate::errors::{ErrorKind, HaliteError, HaliteResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;

type ComparisonFn = fn(&Value, &Value) -> HaliteResult<bool>;

/// Operators that act on an array value itself rather than on its elements.
const ARRAY_OPERATORS: [&str; 2] = ["$size", "$elemMatch"];

static COMPARISON_OPERATORS: Lazy<HashMap<&'static str, ComparisonFn>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, ComparisonFn> = HashMap::new();
    table.insert("$lt", op_lt);
    table.insert("$lte", op_lte);
    table.insert("$gt", op_gt);
    table.insert("$gte", op_gte);
    table.insert("$ne", op_ne);
    table.insert("$in", op_in);
    table.insert("$nin", op_nin);
    table.insert("$exists", op_exists);
    table.insert("$regex", op_regex);
    table.insert("$size", op_size);
    table.insert("$elemMatch", op_elem_match);
    table
});

fn filter_error(message: &str) -> HaliteError {
    log::error!("{}", message);
    HaliteError::new(message, ErrorKind::FilterError)
}

/// Checks whether a document matches a query: the specification document
/// first, then every attached `$where` predicate.
pub fn matches(doc: &Document, query: &Query) -> HaliteResult<bool> {
    if !match_spec(doc, &query.spec)? {
        return Ok(false);
    }
    for predicate in &query.predicates {
        if !predicate(doc) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Matches a document against a query specification document. Top-level
/// entries combine with AND.
pub(crate) fn match_spec(doc: &Document, spec: &Document) -> HaliteResult<bool> {
    for (key, query_value) in spec.iter() {
        if key.starts_with('$') {
            if !match_logical(doc, key, query_value)? {
                return Ok(false);
            }
        } else if !match_query_part(doc, key, query_value, false)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_logical(doc: &Document, operator: &str, query_value: &Value) -> HaliteResult<bool> {
    match operator {
        "$or" | "$and" | "$nor" => {
            let operands = query_value.as_array().ok_or_else(|| {
                filter_error(&format!("{} operator used without an array", operator))
            })?;
            let mut matched = 0usize;
            for operand in operands {
                let sub_query = operand.as_document().ok_or_else(|| {
                    filter_error(&format!("{} operands must be queries", operator))
                })?;
                if match_spec(doc, sub_query)? {
                    matched += 1;
                }
            }
            Ok(match operator {
                "$or" => matched > 0,
                "$and" => matched == operands.len(),
                _ => matched == 0,
            })
        }
        "$where" => Err(filter_error(
            "$where takes a predicate; attach one with Query::and_where",
        )),
        _ => Err(filter_error(&format!(
            "Unknown logical operator {}",
            operator
        ))),
    }
}

/// Matches one field-path entry of a query against a document.
///
/// When the document value at the path is an array, the entry matches if any
/// element matches the query value, with two exceptions handled on the array
/// itself: an array query value (whole-array equality) and the
/// array-specific operators `$size` and `$elemMatch`.
fn match_query_part(
    doc: &Document,
    path: &str,
    query_value: &Value,
    treat_array_as_value: bool,
) -> HaliteResult<bool> {
    let doc_value = get_path(doc, path);
    if let Value::Array(elements) = &doc_value {
        if !treat_array_as_value {
            if query_value.is_array() {
                return match_query_part(doc, path, query_value, true);
            }
            if let Some(operators) = query_value.as_document() {
                if operators
                    .keys()
                    .any(|k| ARRAY_OPERATORS.contains(&k.as_str()))
                {
                    return match_query_part(doc, path, query_value, true);
                }
            }
            for element in elements {
                if value_matches(element, query_value)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
    }
    value_matches(&doc_value, query_value)
}

/// Matches a single value against a query value: an operator object is
/// applied operator by operator (all must hold); anything else is direct
/// equality. Also the rule behind `$pull` and `$elemMatch` element tests.
pub fn value_matches(candidate: &Value, query_value: &Value) -> HaliteResult<bool> {
    if let Some(operators) = query_value.as_document() {
        let operator_keys = operators.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys > 0 {
            if operator_keys != operators.len() {
                return Err(filter_error("You cannot mix operators and normal fields"));
            }
            for (operator, operand) in operators.iter() {
                let compare = COMPARISON_OPERATORS.get(operator.as_str()).ok_or_else(|| {
                    filter_error(&format!("Unknown comparison operator {}", operator))
                })?;
                if !compare(candidate, operand)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(values_equal(candidate, query_value))
}

fn op_lt(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    Ok(candidate.cmp_with(operand, None) == Ordering::Less)
}

fn op_lte(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    Ok(candidate.cmp_with(operand, None) != Ordering::Greater)
}

fn op_gt(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    Ok(candidate.cmp_with(operand, None) == Ordering::Greater)
}

fn op_gte(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    Ok(candidate.cmp_with(operand, None) != Ordering::Less)
}

fn op_ne(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    Ok(!values_equal(candidate, operand))
}

fn op_in(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    let members = operand
        .as_array()
        .ok_or_else(|| filter_error("$in operator called with a non-array"))?;
    Ok(members.iter().any(|member| values_equal(candidate, member)))
}

fn op_nin(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    let members = operand
        .as_array()
        .ok_or_else(|| filter_error("$nin operator called with a non-array"))?;
    Ok(!members.iter().any(|member| values_equal(candidate, member)))
}

fn op_exists(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    let expected = match operand {
        Value::Bool(b) => *b,
        Value::Null | Value::Undefined => false,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        _ => true,
    };
    Ok(candidate.is_defined() == expected)
}

fn op_regex(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    let pattern = operand
        .as_str()
        .ok_or_else(|| filter_error("$regex operator called with a non-string pattern"))?;
    let regex = Regex::new(pattern)
        .map_err(|err| filter_error(&format!("Invalid regular expression: {}", err)))?;
    match candidate {
        Value::String(s) => Ok(regex.is_match(s)),
        // a regex never matches a non-string value and never errors on one
        _ => Ok(false),
    }
}

fn op_size(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    let expected = operand
        .as_integer()
        .ok_or_else(|| filter_error("$size operator called without an integer"))?;
    match candidate {
        Value::Array(items) => Ok(items.len() as i64 == expected),
        _ => Ok(false),
    }
}

fn op_elem_match(candidate: &Value, operand: &Value) -> HaliteResult<bool> {
    let sub_query = operand
        .as_document()
        .ok_or_else(|| filter_error("$elemMatch operator used without a query"))?;
    let items = match candidate {
        Value::Array(items) => items,
        _ => return Ok(false),
    };
    let all_operators = !sub_query.is_empty() && sub_query.keys().all(|k| k.starts_with('$'));
    for element in items {
        let matched = if all_operators {
            value_matches(element, operand)?
        } else {
            match element {
                Value::Document(element_doc) => match_spec(element_doc, sub_query)?,
                _ => false,
            }
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}
