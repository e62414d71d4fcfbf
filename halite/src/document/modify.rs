//! Update modifier evaluation.
//!
//! An update document either replaces the target wholesale (no `$`-prefixed
//! top-level keys) or is a set of modifiers, each mapping dotted paths to
//! operands, applied in declaration order. The target document is never
//! mutated; the result is a fresh document.

use super::{check_document, get_path, remove_path, set_path, Document};
use crate::common::{values_equal, SortOrder, Value, DOC_ID};
use crate::errors::{ErrorKind, HaliteError, HaliteResult};
use crate::filter::value_matches;
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::collections::HashMap;

type ModifierFn = fn(&mut Document, &str, &Value) -> HaliteResult<()>;

static MODIFIERS: Lazy<HashMap<&'static str, ModifierFn>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, ModifierFn> = HashMap::new();
    table.insert("$set", apply_set);
    table.insert("$unset", apply_unset);
    table.insert("$inc", apply_inc);
    table.insert("$min", apply_min);
    table.insert("$max", apply_max);
    table.insert("$push", apply_push);
    table.insert("$pop", apply_pop);
    table.insert("$addToSet", apply_add_to_set);
    table.insert("$pull", apply_pull);
    table
});

fn invalid_update(message: &str) -> HaliteError {
    log::error!("{}", message);
    HaliteError::new(message, ErrorKind::InvalidUpdate)
}

/// Produces the document resulting from applying `update` to `doc`.
///
/// When `update` carries no `$`-prefixed top-level key it is a replacement:
/// the result is `update` with the `_id` of `doc`, and `update` must not
/// carry a different `_id` itself. Otherwise every top-level key must be a
/// known modifier; modifiers and plain fields cannot be mixed.
///
/// The result is validated like an inserted document and must keep the
/// original `_id`. `doc` is left untouched.
pub fn modify(doc: &Document, update: &Document) -> HaliteResult<Document> {
    let total_keys = update.len();
    let modifier_keys = update.keys().filter(|k| k.starts_with('$')).count();

    if let Some(new_id) = update.get(DOC_ID) {
        let unchanged = matches!(doc.get(DOC_ID), Some(old_id) if values_equal(old_id, new_id));
        if !unchanged {
            return Err(invalid_update("You cannot change a document's _id"));
        }
    }

    let new_doc = if modifier_keys == 0 {
        let mut new_doc = update.clone();
        if let Some(old_id) = doc.get(DOC_ID) {
            new_doc.put(DOC_ID, old_id.clone())?;
        }
        new_doc
    } else if modifier_keys != total_keys {
        return Err(invalid_update("You cannot mix modifiers and normal fields"));
    } else {
        let mut new_doc = doc.clone();
        for (modifier, operand) in update.iter() {
            let apply = MODIFIERS.get(modifier.as_str()).ok_or_else(|| {
                invalid_update(&format!("Unknown modifier {}", modifier))
            })?;
            let paths = operand.as_document().ok_or_else(|| {
                invalid_update(&format!("Modifier {}'s argument must be an object", modifier))
            })?;
            for (path, argument) in paths.iter() {
                apply(&mut new_doc, path, argument)?;
            }
        }
        new_doc
    };

    check_document(&new_doc)?;

    let id_unchanged = match (doc.get(DOC_ID), new_doc.get(DOC_ID)) {
        (Some(old_id), Some(new_id)) => values_equal(old_id, new_id),
        (None, None) => true,
        _ => false,
    };
    if !id_unchanged {
        return Err(invalid_update("You cannot change a document's _id"));
    }

    Ok(new_doc)
}

fn apply_set(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    set_path(doc, path, argument.clone())
}

fn apply_unset(doc: &mut Document, path: &str, _argument: &Value) -> HaliteResult<()> {
    remove_path(doc, path);
    Ok(())
}

fn apply_inc(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    let delta = argument
        .as_number()
        .ok_or_else(|| invalid_update("$inc modifier expects a number value"))?;
    match get_path(doc, path) {
        Value::Undefined => set_path(doc, path, Value::Number(delta)),
        Value::Number(current) => set_path(doc, path, Value::Number(current + delta)),
        _ => Err(invalid_update(
            "Cannot use the $inc modifier on non-number fields",
        )),
    }
}

fn apply_min(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    let current = get_path(doc, path);
    if current.is_undefined() || argument.cmp_with(&current, None) == Ordering::Less {
        set_path(doc, path, argument.clone())
    } else {
        Ok(())
    }
}

fn apply_max(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    let current = get_path(doc, path);
    if current.is_undefined() || argument.cmp_with(&current, None) == Ordering::Greater {
        set_path(doc, path, argument.clone())
    } else {
        Ok(())
    }
}

/// Reads the array a `$push`/`$addToSet` target path points at, starting a
/// fresh one when the path is absent.
fn target_array(doc: &Document, path: &str, modifier: &str) -> HaliteResult<Vec<Value>> {
    match get_path(doc, path) {
        Value::Undefined => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        _ => Err(invalid_update(&format!(
            "Cannot use the {} modifier on non-array fields",
            modifier
        ))),
    }
}

struct PushSpec {
    each: Vec<Value>,
    slice: Option<i64>,
    sort: Option<Value>,
}

/// Recognizes a `$push` operand carrying sub-operators. Returns `None` for a
/// plain payload (including plain nested documents).
fn push_spec(argument: &Value) -> HaliteResult<Option<PushSpec>> {
    let sub = match argument.as_document() {
        Some(sub) => sub,
        None => return Ok(None),
    };
    let has_sub_operators = sub.contains_key("$each")
        || sub.contains_key("$slice")
        || sub.contains_key("$sort");
    if !has_sub_operators {
        return Ok(None);
    }
    for key in sub.keys() {
        if key != "$each" && key != "$slice" && key != "$sort" {
            return Err(invalid_update(&format!("Unknown modifier {} in $push", key)));
        }
    }
    let each = match sub.get("$each") {
        Some(Value::Array(values)) => values.clone(),
        Some(_) => return Err(invalid_update("$each requires an array value")),
        None => {
            return Err(invalid_update(
                "$slice and $sort can only be used in conjunction with $each",
            ))
        }
    };
    let slice = match sub.get("$slice") {
        None => None,
        Some(value) => Some(
            value
                .as_integer()
                .ok_or_else(|| invalid_update("$slice requires an integer value"))?,
        ),
    };
    Ok(Some(PushSpec {
        each,
        slice,
        sort: sub.get("$sort").cloned(),
    }))
}

fn sort_items(items: &mut [Value], spec: &Value) -> HaliteResult<()> {
    match spec {
        Value::Number(direction) => {
            let order = SortOrder::from_direction(*direction)
                .ok_or_else(|| invalid_update("$sort requires 1, -1 or a sort specification"))?;
            items.sort_by(|a, b| match order {
                SortOrder::Ascending => a.cmp(b),
                SortOrder::Descending => b.cmp(a),
            });
            Ok(())
        }
        Value::Document(fields) => {
            let mut keys = Vec::with_capacity(fields.len());
            for (path, direction) in fields.iter() {
                let direction = direction
                    .as_number()
                    .and_then(SortOrder::from_direction)
                    .ok_or_else(|| {
                        invalid_update("$sort requires 1, -1 or a sort specification")
                    })?;
                keys.push((path.clone(), direction));
            }
            items.sort_by(|a, b| {
                for (path, order) in &keys {
                    let left = match a.as_document() {
                        Some(doc) => get_path(doc, path),
                        None => Value::Undefined,
                    };
                    let right = match b.as_document() {
                        Some(doc) => get_path(doc, path),
                        None => Value::Undefined,
                    };
                    let ordering = match order {
                        SortOrder::Ascending => left.cmp(&right),
                        SortOrder::Descending => right.cmp(&left),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
            Ok(())
        }
        _ => Err(invalid_update("$sort requires 1, -1 or a sort specification")),
    }
}

fn slice_items(items: &mut Vec<Value>, slice: i64) {
    if slice == 0 {
        items.clear();
    } else if slice > 0 {
        items.truncate(slice as usize);
    } else {
        let keep = (-slice) as usize;
        if items.len() > keep {
            let drop = items.len() - keep;
            items.drain(..drop);
        }
    }
}

fn apply_push(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    let mut items = target_array(doc, path, "$push")?;
    match push_spec(argument)? {
        Some(spec) => {
            items.extend(spec.each);
            if let Some(sort) = &spec.sort {
                sort_items(&mut items, sort)?;
            }
            if let Some(slice) = spec.slice {
                slice_items(&mut items, slice);
            }
        }
        None => items.push(argument.clone()),
    }
    set_path(doc, path, Value::Array(items))
}

fn apply_pop(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    let direction = argument
        .as_integer()
        .ok_or_else(|| invalid_update("$pop expects an integer value"))?;
    let mut items = match get_path(doc, path) {
        Value::Array(items) => items,
        _ => {
            return Err(invalid_update(
                "Cannot use the $pop modifier on non-array fields",
            ))
        }
    };
    if direction > 0 {
        items.pop();
    } else if direction < 0 && !items.is_empty() {
        items.remove(0);
    }
    set_path(doc, path, Value::Array(items))
}

fn apply_add_to_set(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    let mut items = target_array(doc, path, "$addToSet")?;
    let additions: Vec<Value> = match argument.as_document() {
        Some(sub) if sub.contains_key("$each") => {
            for key in sub.keys() {
                if key != "$each" {
                    return Err(invalid_update(
                        "Cannot use another field in conjunction with $each",
                    ));
                }
            }
            match sub.get("$each") {
                Some(Value::Array(values)) => values.clone(),
                _ => return Err(invalid_update("$each requires an array value")),
            }
        }
        _ => vec![argument.clone()],
    };
    for addition in additions {
        if !items.iter().any(|existing| values_equal(existing, &addition)) {
            items.push(addition);
        }
    }
    set_path(doc, path, Value::Array(items))
}

fn apply_pull(doc: &mut Document, path: &str, argument: &Value) -> HaliteResult<()> {
    let items = match get_path(doc, path) {
        Value::Array(items) => items,
        _ => {
            return Err(invalid_update(
                "Cannot use the $pull modifier on non-array fields",
            ))
        }
    };
    let mut kept = Vec::with_capacity(items.len());
    for element in items {
        if !value_matches(&element, argument)? {
            kept.push(element);
        }
    }
    set_path(doc, path, Value::Array(kept))
}
