//! Dotted-path access into documents.
//!
//! A path is a string of keys separated by `.`. Integer segments index
//! arrays. A non-integer segment applied to an array maps the remaining path
//! over the elements, collecting the defined per-element results into an
//! array. A missing path reads as [Value::Undefined].

use super::Document;
use crate::common::{Value, FIELD_SEPARATOR};
use crate::errors::HaliteResult;
use smallvec::SmallVec;

type Segments<'a> = SmallVec<[&'a str; 8]>;

fn split(path: &str) -> Segments<'_> {
    path.split(FIELD_SEPARATOR).collect()
}

/// Reads the value at a dotted path, or [Value::Undefined] if the path is
/// absent.
///
/// # Examples
///
/// ```ignore
/// let doc = doc! { a: { b: 1 }, list: [{ x: 1 }, { y: 2 }] };
/// assert_eq!(get_path(&doc, "a.b"), Value::Number(1.0));
/// assert_eq!(get_path(&doc, "list.0.x"), Value::Number(1.0));
/// // mapping over array elements, skipping those without the key
/// assert_eq!(get_path(&doc, "list.x"), Value::Array(vec![Value::Number(1.0)]));
/// assert_eq!(get_path(&doc, "missing"), Value::Undefined);
/// ```
pub fn get_path(doc: &Document, path: &str) -> Value {
    read_in_doc(doc, &split(path))
}

fn read_in_doc(doc: &Document, segments: &[&str]) -> Value {
    match segments.first() {
        None => Value::Undefined,
        Some(key) => match doc.get(key) {
            None => Value::Undefined,
            Some(value) => {
                if segments.len() == 1 {
                    value.clone()
                } else {
                    read_in_value(value, &segments[1..])
                }
            }
        },
    }
}

fn read_in_value(value: &Value, segments: &[&str]) -> Value {
    if segments.is_empty() {
        return value.clone();
    }
    match value {
        Value::Document(doc) => read_in_doc(doc, segments),
        Value::Array(items) => {
            if let Ok(index) = segments[0].parse::<usize>() {
                match items.get(index) {
                    Some(element) => read_in_value(element, &segments[1..]),
                    None => Value::Undefined,
                }
            } else {
                let mut results = Vec::new();
                for element in items {
                    let result = read_in_value(element, segments);
                    if result.is_defined() {
                        results.push(result);
                    }
                }
                Value::Array(results)
            }
        }
        _ => Value::Undefined,
    }
}

/// Writes a value at a dotted path, creating intermediate documents as
/// needed. Integer segments index arrays, padding with nulls when writing
/// past the current length; non-container intermediates are replaced.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> HaliteResult<()> {
    set_in_doc(doc, &split(path), value)
}

fn set_in_doc(doc: &mut Document, segments: &[&str], value: Value) -> HaliteResult<()> {
    let key = segments[0];
    if segments.len() == 1 {
        return doc.put(key, value);
    }
    if doc.get(key).is_none() {
        doc.put(key, Value::Document(Document::new()))?;
    }
    match doc.get_mut(key) {
        Some(target) => set_in_value(target, &segments[1..], value),
        None => Ok(()),
    }
}

fn set_in_value(target: &mut Value, segments: &[&str], value: Value) -> HaliteResult<()> {
    if let Value::Array(items) = target {
        if let Ok(index) = segments[0].parse::<usize>() {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            if segments.len() == 1 {
                items[index] = value;
            } else {
                let element = &mut items[index];
                if !element.is_document() && !element.is_array() {
                    *element = Value::Document(Document::new());
                }
                set_in_value(element, &segments[1..], value)?;
            }
            return Ok(());
        }
    }
    if !target.is_document() {
        *target = Value::Document(Document::new());
    }
    match target.as_document_mut() {
        Some(doc) => set_in_doc(doc, segments, value),
        None => Ok(()),
    }
}

/// Removes the value at a dotted path. Removing an array element by integer
/// segment shifts the remaining elements; absent paths are a no-op.
pub fn remove_path(doc: &mut Document, path: &str) {
    remove_in_doc(doc, &split(path));
}

fn remove_in_doc(doc: &mut Document, segments: &[&str]) {
    let key = segments[0];
    if segments.len() == 1 {
        doc.remove(key);
        return;
    }
    if let Some(target) = doc.get_mut(key) {
        remove_in_value(target, &segments[1..]);
    }
}

fn remove_in_value(value: &mut Value, segments: &[&str]) {
    match value {
        Value::Document(doc) => remove_in_doc(doc, segments),
        Value::Array(items) => {
            if let Ok(index) = segments[0].parse::<usize>() {
                if segments.len() == 1 {
                    if index < items.len() {
                        items.remove(index);
                    }
                } else if let Some(element) = items.get_mut(index) {
                    remove_in_value(element, &segments[1..]);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};

    fn set_up() -> Document {
        doc! {
            a: { b: { c: 3 } },
            list: [{ x: 1 }, { y: 2 }, { x: 5 }],
            scalars: [10, 20, 30],
            plain: 7
        }
    }

    #[test]
    fn test_get_path_top_level() {
        let doc = set_up();
        assert_eq!(get_path(&doc, "plain"), val!(7));
    }

    #[test]
    fn test_get_path_nested() {
        let doc = set_up();
        assert_eq!(get_path(&doc, "a.b.c"), val!(3));
        assert_eq!(get_path(&doc, "a.b"), Value::Document(doc! { c: 3 }));
    }

    #[test]
    fn test_get_path_missing_is_undefined() {
        let doc = set_up();
        assert_eq!(get_path(&doc, "missing"), Value::Undefined);
        assert_eq!(get_path(&doc, "a.missing"), Value::Undefined);
        assert_eq!(get_path(&doc, "plain.deeper"), Value::Undefined);
    }

    #[test]
    fn test_get_path_array_integer_segment() {
        let doc = set_up();
        assert_eq!(get_path(&doc, "scalars.1"), val!(20));
        assert_eq!(get_path(&doc, "list.0.x"), val!(1));
        assert_eq!(get_path(&doc, "scalars.9"), Value::Undefined);
    }

    #[test]
    fn test_get_path_maps_over_array_elements() {
        let doc = set_up();
        // elements without the key are skipped
        assert_eq!(
            get_path(&doc, "list.x"),
            Value::Array(vec![val!(1), val!(5)])
        );
        assert_eq!(get_path(&doc, "list.y"), Value::Array(vec![val!(2)]));
        assert_eq!(get_path(&doc, "list.z"), Value::Array(vec![]));
    }

    #[test]
    fn test_set_path_top_level() {
        let mut doc = Document::new();
        set_path(&mut doc, "a", val!(1)).unwrap();
        assert_eq!(get_path(&doc, "a"), val!(1));
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut doc = Document::new();
        set_path(&mut doc, "a.b.c", val!(9)).unwrap();
        assert_eq!(get_path(&doc, "a.b.c"), val!(9));
    }

    #[test]
    fn test_set_path_replaces_scalar_intermediate() {
        let mut doc = set_up();
        set_path(&mut doc, "plain.inner", val!(1)).unwrap();
        assert_eq!(get_path(&doc, "plain.inner"), val!(1));
    }

    #[test]
    fn test_set_path_array_index() {
        let mut doc = set_up();
        set_path(&mut doc, "scalars.1", val!(99)).unwrap();
        assert_eq!(get_path(&doc, "scalars.1"), val!(99));
    }

    #[test]
    fn test_set_path_array_index_pads_with_null() {
        let mut doc = set_up();
        set_path(&mut doc, "scalars.4", val!(50)).unwrap();
        let scalars = get_path(&doc, "scalars");
        assert_eq!(
            scalars,
            Value::Array(vec![val!(10), val!(20), val!(30), Value::Null, val!(50)])
        );
    }

    #[test]
    fn test_set_path_into_array_element() {
        let mut doc = set_up();
        set_path(&mut doc, "list.1.y", val!(42)).unwrap();
        assert_eq!(get_path(&doc, "list.1.y"), val!(42));
    }

    #[test]
    fn test_remove_path_top_level() {
        let mut doc = set_up();
        remove_path(&mut doc, "plain");
        assert_eq!(get_path(&doc, "plain"), Value::Undefined);
    }

    #[test]
    fn test_remove_path_nested() {
        let mut doc = set_up();
        remove_path(&mut doc, "a.b.c");
        assert_eq!(get_path(&doc, "a.b.c"), Value::Undefined);
        // parent containers survive
        assert!(get_path(&doc, "a.b").is_defined());
    }

    #[test]
    fn test_remove_path_array_element_shifts() {
        let mut doc = set_up();
        remove_path(&mut doc, "scalars.0");
        assert_eq!(
            get_path(&doc, "scalars"),
            Value::Array(vec![val!(20), val!(30)])
        );
    }

    #[test]
    fn test_remove_path_missing_is_noop() {
        let mut doc = set_up();
        remove_path(&mut doc, "nothing.here");
        assert_eq!(doc, set_up());
    }
}
